use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::schema::ComcoreConfig;

const CONFIG_FILENAME: &str = "comcore.toml";

/// Load config from the given path.
pub fn load_config(path: &Path) -> anyhow::Result<ComcoreConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let config = toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
    Ok(config)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./comcore.toml` (project-local)
/// 2. `~/.config/comcore/comcore.toml` (user-global)
///
/// Returns `ComcoreConfig::default()` if no config file is found.
pub fn discover_and_load() -> ComcoreConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    ComcoreConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }
    if let Some(dir) = config_dir() {
        let p = dir.join(CONFIG_FILENAME);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

/// Returns the user-global config directory (`~/.config/comcore/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "comcore").map(|d| d.config_dir().to_path_buf())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comcore.toml");
        std::fs::write(&path, "").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1");
        assert_eq!(cfg.server.port, 4433);
        assert!(cfg.tls.cert_file.is_none());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comcore.toml");
        std::fs::write(&path, "[server]\nport = 9000\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.bind, "127.0.0.1");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comcore.toml");
        std::fs::write(&path, "[server]\nprot = 9000\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
