//! The scanning capability seam.

use async_trait::async_trait;
use thiserror::Error;

/// Outcome of one successful scan attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    /// A signature matched; carries the threat name reported by the engine.
    Infected { threat: String },
}

/// A verdict plus engine metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub verdict: ScanVerdict,
    /// Signature database version the engine reported, when available.
    pub signature_version: Option<String>,
}

impl ScanReport {
    pub fn clean(signature_version: Option<String>) -> Self {
        Self {
            verdict: ScanVerdict::Clean,
            signature_version,
        }
    }

    pub fn infected(threat: impl Into<String>, signature_version: Option<String>) -> Self {
        Self {
            verdict: ScanVerdict::Infected {
                threat: threat.into(),
            },
            signature_version,
        }
    }
}

/// Engine failures for one attempt. All variants are retryable from the
/// worker's point of view; the retry budget decides when to stop.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Scan engine unreachable: {0}")]
    Unreachable(String),

    #[error("Scan timed out after {0} seconds")]
    Timeout(u64),

    #[error("Scan engine error: {0}")]
    Engine(String),
}

/// An opaque signature-matching scan capability.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Scan in-memory bytes and return a verdict, or an error for this
    /// attempt. An error never implies a verdict; the caller owns retries.
    async fn scan(&self, data: &[u8]) -> Result<ScanReport, ScanError>;
}
