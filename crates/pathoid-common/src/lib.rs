//! pathoid-common: Shared error type and the allowlisted HTTP client used by
//! every PathoID crate.

pub mod error;
pub mod sandbox;

pub use error::{PathoidError, Result};
pub use sandbox::SandboxClient;
