//! Deterministic scanner for tests and clamav-disabled deployments.

use crate::scanner::{ScanError, ScanReport, Scanner};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Content marker the stub treats as a signature match, in the spirit of the
/// EICAR test string.
pub const INFECTED_MARKER: &[u8] = b"VERISCAN-TEST-SIGNATURE";

/// Content marker that makes the stub report an engine error.
pub const ENGINE_ERROR_MARKER: &[u8] = b"VERISCAN-ENGINE-ERROR";

/// Scanner double: clean unless the bytes contain one of the markers, with an
/// optional scripted run of failures before answering.
#[derive(Clone, Default)]
pub struct StubScanner {
    /// Attempts that fail with an engine error before the stub starts
    /// answering. Shared across clones so a test can observe attempts.
    failures_remaining: Arc<AtomicU32>,
    attempts: Arc<AtomicU32>,
}

impl StubScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` scan attempts with `ScanError::Unreachable`.
    pub fn fail_next(n: u32) -> Self {
        let stub = Self::new();
        stub.failures_remaining.store(n, Ordering::SeqCst);
        stub
    }

    /// Total scan attempts observed, including failed ones.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn contains(data: &[u8], marker: &[u8]) -> bool {
        data.windows(marker.len()).any(|w| w == marker)
    }
}

#[async_trait]
impl Scanner for StubScanner {
    async fn scan(&self, data: &[u8]) -> Result<ScanReport, ScanError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(ScanError::Unreachable("scripted failure".to_string()));
        }

        if Self::contains(data, ENGINE_ERROR_MARKER) {
            return Err(ScanError::Engine("marker-triggered engine error".to_string()));
        }

        if Self::contains(data, INFECTED_MARKER) {
            return Ok(ScanReport::infected("Veriscan-Test-Signature", Some("stub-1".to_string())));
        }

        Ok(ScanReport::clean(Some("stub-1".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::ScanVerdict;

    #[tokio::test]
    async fn clean_and_infected_verdicts() {
        let scanner = StubScanner::new();

        let report = scanner.scan(b"ordinary bytes").await.unwrap();
        assert_eq!(report.verdict, ScanVerdict::Clean);

        let mut payload = b"prefix ".to_vec();
        payload.extend_from_slice(INFECTED_MARKER);
        let report = scanner.scan(&payload).await.unwrap();
        assert!(matches!(report.verdict, ScanVerdict::Infected { .. }));
    }

    #[tokio::test]
    async fn scripted_failures_then_success() {
        let scanner = StubScanner::fail_next(2);

        assert!(scanner.scan(b"data").await.is_err());
        assert!(scanner.scan(b"data").await.is_err());
        assert!(scanner.scan(b"data").await.is_ok());
        assert_eq!(scanner.attempts(), 3);
    }

    #[tokio::test]
    async fn engine_error_marker() {
        let scanner = StubScanner::new();
        let result = scanner.scan(ENGINE_ERROR_MARKER).await;
        assert!(matches!(result, Err(ScanError::Engine(_))));
    }
}
