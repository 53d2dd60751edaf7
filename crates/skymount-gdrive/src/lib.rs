//! Google Drive backend for skymount
//!
//! Implements the `Backend` contract from `skymount-core` against the
//! Drive v3 REST API:
//! - [`auth`] - file-based credentials and access-token refresh
//! - [`client`] - typed HTTP client with error classification
//! - [`backend`] - the [`GdriveBackend`] adapter the engine drives
//!
//! [`GdriveBackend`]: backend::GdriveBackend

pub mod auth;
pub mod backend;
pub mod client;

pub use backend::GdriveBackend;
