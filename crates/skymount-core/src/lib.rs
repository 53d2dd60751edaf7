//! skymount core - domain types and the backend contract
//!
//! This crate contains the provider-neutral pieces of skymount:
//! - **Domain types** - [`RemoteFile`], [`Change`], [`Quota`] and the
//!   [`BackendError`] taxonomy shared by every provider adapter
//! - **Port definition** - the [`Backend`] trait that each cloud provider
//!   implements (Google Drive ships in `skymount-gdrive`)
//! - **Configuration** - the [`MountConfig`] assembled by the host binary
//!   and the credential-file helpers
//!
//! The filesystem engine in `skymount-fuse` depends only on this crate and
//! drives everything through the [`Backend`] trait; no provider-specific
//! branch exists outside the driver factory.
//!
//! [`RemoteFile`]: domain::RemoteFile
//! [`Change`]: domain::Change
//! [`Quota`]: domain::Quota
//! [`BackendError`]: domain::BackendError
//! [`Backend`]: ports::Backend
//! [`MountConfig`]: config::MountConfig

pub mod config;
pub mod domain;
pub mod ports;
