//! Stable per-device identity.
//!
//! Each device carries a locally generated opaque id, persisted so it
//! survives restarts. The replicator uses it to drop self-originated echoes
//! when the transport is not self-filtering.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Generate a fresh, unpersisted id.
    pub fn generate() -> Self {
        Self(format!("device-{}", Uuid::new_v4()))
    }

    /// Load the id persisted at `path`, or generate one and persist it.
    ///
    /// If the id cannot be written the generated id is still returned — the
    /// device just won't keep it across restarts.
    pub fn load_or_create(path: &Path) -> Self {
        if let Ok(contents) = std::fs::read_to_string(path) {
            let stored = contents.trim();
            if !stored.is_empty() {
                return Self(stored.to_string());
            }
        }

        let id = Self::generate();

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %path.display(), error = %e, "Could not create device id directory");
                return id;
            }
        }
        if let Err(e) = std::fs::write(path, id.as_str()) {
            warn!(path = %path.display(), error = %e, "Could not persist device id");
        }

        id
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_unique() {
        assert_ne!(DeviceId::generate(), DeviceId::generate());
    }

    #[test]
    fn test_load_or_create_is_stable_across_loads() {
        let dir = std::env::temp_dir().join(format!("core-live-{}", Uuid::new_v4()));
        let path = dir.join("device_id");

        let first = DeviceId::load_or_create(&path);
        let second = DeviceId::load_or_create(&path);

        assert_eq!(first, second);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unwritable_path_still_yields_an_id() {
        let path = Path::new("/proc/does-not-exist/device_id");
        let id = DeviceId::load_or_create(path);
        assert!(id.as_str().starts_with("device-"));
    }
}
