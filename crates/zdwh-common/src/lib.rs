//! ZDWH Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared building blocks for the helpdesk warehouse sync jobs.
//!
//! # Overview
//!
//! - **Error Handling**: common error type and result alias
//! - **Logging**: `tracing` subscriber setup for console and rolling files
//! - **Timestamps**: ISO-8601 parsing into UTC instants
//! - **Identifiers**: validated, quoted warehouse object names
//!
//! # Example
//!
//! ```no_run
//! use zdwh_common::time::parse_timestamp;
//!
//! fn main() -> zdwh_common::Result<()> {
//!     let created = parse_timestamp("2021-01-01T00:00:00Z")?;
//!     println!("{}", created);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod ident;
pub mod logging;
pub mod time;

// Re-export commonly used types
pub use error::{Result, ZdwhError};
pub use ident::QualifiedName;
