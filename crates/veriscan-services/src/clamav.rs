use crate::scanner::{ScanError, ScanReport, Scanner};
use async_trait::async_trait;
use clamav_client::{clean, Tcp};
use std::str;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct ClamAvScanner {
    host: String,
    port: u16,
    /// Timeout in seconds for each scan operation (default: 30)
    timeout_secs: u64,
}

impl ClamAvScanner {
    /// Create a new ClamAvScanner.
    ///
    /// # Arguments
    /// * `host` - ClamAV daemon hostname
    /// * `port` - ClamAV daemon port (typically 3310)
    pub fn new(host: String, port: u16) -> Self {
        Self::with_timeout(host, port, 30)
    }

    /// Create with a custom scan timeout (for large files or slow ClamAV instances).
    pub fn with_timeout(host: String, port: u16, timeout_secs: u64) -> Self {
        Self {
            host,
            port,
            timeout_secs,
        }
    }
}

/// Extract the threat name from a ClamAV `... : Name FOUND` response line.
fn parse_threat_name(response: &[u8]) -> String {
    let response_str = match str::from_utf8(response) {
        Ok(s) => s.trim(),
        Err(_) => return "unknown".to_string(),
    };
    if response_str.contains("FOUND") {
        response_str
            .split(':')
            .nth(1)
            .unwrap_or("unknown")
            .split_whitespace()
            .next()
            .unwrap_or("unknown")
            .to_string()
    } else {
        "unknown".to_string()
    }
}

#[async_trait]
impl Scanner for ClamAvScanner {
    /// Scan in-memory data using the sync client inside spawn_blocking to
    /// avoid !Send tokio futures.
    async fn scan(&self, data: &[u8]) -> Result<ScanReport, ScanError> {
        let start = Instant::now();
        tracing::debug!(host = %self.host, port = %self.port, "Starting ClamAV scan");
        let data = data.to_vec();
        let host = self.host.clone();
        let port = self.port;
        let timeout_secs = self.timeout_secs;

        let result = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            tokio::task::spawn_blocking(move || {
                let address = format!("{}:{}", host, port);
                let connection = Tcp {
                    host_address: address.as_str(),
                };
                clamav_client::scan_buffer(data.as_slice(), connection, None)
            }),
        )
        .await;

        let response = match result {
            Ok(Ok(Ok(response))) => response,
            Ok(Ok(Err(e))) => {
                tracing::error!(error = %e, "ClamAV scan failed");
                return Err(ScanError::Unreachable(e.to_string()));
            }
            Ok(Err(join_err)) => {
                tracing::error!(error = %join_err, "ClamAV scan task panicked");
                return Err(ScanError::Engine(format!("scan task join error: {}", join_err)));
            }
            Err(_) => {
                tracing::error!(timeout_secs, "ClamAV scan timeout");
                return Err(ScanError::Timeout(timeout_secs));
            }
        };

        match clean(&response) {
            Ok(true) => {
                tracing::info!(
                    duration_ms = start.elapsed().as_millis(),
                    "File scan completed: clean"
                );
                Ok(ScanReport::clean(None))
            }
            Ok(false) => {
                let threat = parse_threat_name(&response);
                tracing::warn!(
                    duration_ms = start.elapsed().as_millis(),
                    threat = %threat,
                    "File scan detected threat"
                );
                Ok(ScanReport::infected(threat, None))
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to parse ClamAV response");
                Err(ScanError::Engine(format!(
                    "failed to parse ClamAV response: {}",
                    e
                )))
            }
        }
    }
}
