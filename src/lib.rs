// # firebase-setup: Automated Firebase Project Provisioning
//
// Creates a Google Cloud project, adds Firebase to it, registers an Android app
// (and optionally an iOS app) and downloads their generated config files.
//
// Network-facing parts (OAuth flows, the HTTP transport) sit behind the
// `reqwest` feature; the workflow itself only depends on the `Transport` trait.

/// Shared blocking HTTP client. Enabled with the `reqwest` feature.
#[cfg(feature = "reqwest")]
pub mod client;

/// Argument resolution and validation.
pub mod args;

/// Error taxonomy and exit codes.
pub mod error;

/// Google Cloud Platform and Firebase utilities.
pub mod gcp;

/// The provisioning workflow, its polling and config artifacts.
pub mod provision;

#[cfg(test)]
mod testing;

pub use args::{Params, RawArgs, resolve};
pub use error::ProvisionError;
pub use provision::{Outcome, Provisioner};
