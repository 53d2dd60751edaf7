//! skymount FUSE engine
//!
//! The backend-agnostic filesystem engine behind every skymount mount:
//! - [`FileContainer`] - the authoritative inode→entry index
//! - [`FileEntry`] - per-inode state (local name, attributes, scratch file)
//! - [`CloudFs`] - the `fuser::Filesystem` implementation that translates
//!   kernel operations into container and backend calls
//! - the change-synchronization loop in [`sync`]
//!
//! The engine never talks to a provider directly; all remote side effects
//! go through the [`Backend`] trait from `skymount-core`.
//!
//! [`Backend`]: skymount_core::ports::Backend
//! [`FileContainer`]: container::FileContainer
//! [`FileEntry`]: entry::FileEntry
//! [`CloudFs`]: filesystem::CloudFs

pub mod cache;
pub mod container;
pub mod entry;
pub mod error;
pub mod filesystem;
pub mod handle;
pub mod sync;

pub use container::FileContainer;
pub use entry::FileEntry;
pub use error::FsError;
pub use filesystem::{CloudFs, FsState};
