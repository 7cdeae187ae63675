//! Configuration management for easy-sync.

use anyhow::{Context, Result};
use easysync_client::ClientConfig;
use std::path::Path;

/// Config file looked up inside the data directory when `--config` is absent.
pub const CONFIG_FILE: &str = "easy-sync.toml";

/// Resolve the client configuration.
///
/// An explicit `--config` path must exist. Otherwise `easy-sync.toml` in the
/// data directory is used when present, falling back to the defaults.
/// `--server` overrides whatever URL the file set.
pub fn load(
    explicit: Option<&Path>,
    data_dir: &Path,
    server: Option<&str>,
) -> Result<ClientConfig> {
    let mut config = match explicit {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            let path = data_dir.join(CONFIG_FILE);
            if path.exists() {
                ClientConfig::from_file(&path)
                    .with_context(|| format!("Failed to load config from {}", path.display()))?
            } else {
                ClientConfig::default()
            }
        }
    };

    if let Some(url) = server {
        config.server.url = url.to_string();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Create the data directory and restrict it to the owner.
pub async fn prepare_data_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .context("Failed to create data directory")?;
    set_dir_permissions_0700(path).await
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
