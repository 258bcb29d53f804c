//! Server configuration, kept as `fm-server.json` in the data directory

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories::BaseDirs;
use fm_monitor::MonitorConfig;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "fm-server.json";
pub const DEFAULT_PORT: u16 = 1234;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
	/// Config schema version
	pub version: u32,
	pub port: u16,
	/// Default filter when `RUST_LOG` is not set
	pub log_level: String,
	/// Storage manifest seeding the authority, written back on every commit
	pub manifest_path: Option<PathBuf>,
	pub monitor: MonitorConfig,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			version: Self::TARGET_VERSION,
			port: DEFAULT_PORT,
			log_level: "info".to_string(),
			manifest_path: None,
			monitor: MonitorConfig::default(),
		}
	}
}

impl ServerConfig {
	pub const TARGET_VERSION: u32 = 1;

	/// Load the config of `data_dir`, writing the defaults there first when it has none
	pub async fn load_or_create(data_dir: &Path) -> Result<Self> {
		let config_path = data_dir.join(CONFIG_FILE_NAME);

		match fs::read(&config_path).await {
			Ok(bytes) => {
				let mut config = serde_json::from_slice::<Self>(&bytes)
					.with_context(|| format!("parsing {}", config_path.display()))?;

				if config.version < Self::TARGET_VERSION {
					info!(
						from = config.version,
						to = Self::TARGET_VERSION,
						"Migrating server config",
					);
					config.migrate()?;
					config.save(data_dir).await?;
				} else if config.version > Self::TARGET_VERSION {
					return Err(anyhow!("Unknown config version: {}", config.version));
				}

				Ok(config)
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				warn!(path = %config_path.display(), "No config found, creating default");
				let config = Self::default();
				config.save(data_dir).await?;
				Ok(config)
			}
			Err(e) => Err(e).with_context(|| format!("reading {}", config_path.display())),
		}
	}

	pub async fn save(&self, data_dir: &Path) -> Result<()> {
		fs::create_dir_all(data_dir)
			.await
			.with_context(|| format!("creating {}", data_dir.display()))?;

		let config_path = data_dir.join(CONFIG_FILE_NAME);
		fs::write(&config_path, serde_json::to_vec_pretty(self)?)
			.await
			.with_context(|| format!("writing {}", config_path.display()))?;

		Ok(())
	}

	fn migrate(&mut self) -> Result<()> {
		match self.version {
			0 => {
				self.version = 1;
				Ok(())
			}
			1 => Ok(()),
			v => Err(anyhow!("Unknown config version: {v}")),
		}
	}
}

/// Platform data directory, falling back to the working directory
#[must_use]
pub fn default_data_dir() -> PathBuf {
	BaseDirs::new().map_or_else(
		|| PathBuf::from("fm-server-data"),
		|dirs| dirs.data_local_dir().join("filemonitor"),
	)
}
