//! Veriscan services
//!
//! The scanning capability seam. The pipeline treats the scan engine as an
//! opaque collaborator behind the [`Scanner`] trait: the production
//! implementation talks to a ClamAV daemon, tests use [`StubScanner`].

#[cfg(feature = "clamav")]
pub mod clamav;
pub mod scanner;
pub mod stub;

#[cfg(feature = "clamav")]
pub use clamav::ClamAvScanner;
pub use scanner::{ScanError, ScanReport, ScanVerdict, Scanner};
pub use stub::StubScanner;
