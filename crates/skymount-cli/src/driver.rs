//! Backend factory.
//!
//! The only place in the tree that names concrete providers; everything
//! past this point drives the `Backend` trait.

use std::sync::Arc;

use skymount_core::{config::MountConfig, ports::Backend};
use skymount_gdrive::GdriveBackend;

/// Construct the backend selected with `-t`.
pub fn new_backend(config: &MountConfig) -> anyhow::Result<Arc<dyn Backend>> {
    match config.backend.as_str() {
        "gdrive" => Ok(Arc::new(GdriveBackend::from_source(&config.source)?)),
        other => anyhow::bail!(
            "cloud service '{other}' is not supported (available: gdrive)"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_is_refused() {
        let config = MountConfig::new("hyperdrive", "/mnt/x");
        let err = new_backend(&config).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn gdrive_requires_a_readable_credential_file() {
        let mut config = MountConfig::new("gdrive", "/mnt/x");
        config.source = "/definitely/not/there.yaml".into();
        assert!(new_backend(&config).is_err());
    }
}
