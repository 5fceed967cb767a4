//! Registry module for OCI distribution interactions
//!
//! This module covers authentication negotiation, the authenticated transport
//! and the [`RegistryClient`] façade used by the CLI.

pub mod auth;
pub mod challenge;
pub mod client;
pub mod transport;

pub use auth::{CredentialProvider, Credentials, RegistryProbe};
pub use challenge::{AuthChallenge, AuthScheme};
pub use client::{RegistryClient, RegistryClientBuilder};
pub use transport::AuthenticatedTransport;
