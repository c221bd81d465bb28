//! Remote file-protocol collaborators

pub mod client;
pub mod errors;
pub mod types;

pub use client::DavClient;
pub use errors::RemoteError;
pub use types::*;
