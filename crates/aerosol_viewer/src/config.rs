use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use aerosol_forecast::{archive::ads::DEFAULT_POLL_INTERVAL, Credentials, RefreshPolicy};
use anyhow::Context;
use serde::Deserialize;

/// Optional YAML configuration. Every field has a default, so an empty file is valid.
///
/// ```yaml
/// download_path: forecast.grib
/// output_dir: renders
/// refresh: follow_clock   # or `session`
/// poll_interval_secs: 2
/// pixels_per_cell: 8
/// archive:
///   url: https://ads.atmosphere.copernicus.eu/api
///   key: <your key>
/// ```
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub download_path: PathBuf,
    pub output_dir: PathBuf,
    pub refresh: RefreshPolicy,
    pub poll_interval_secs: u64,
    pub pixels_per_cell: u32,
    pub show_progress: bool,
    pub archive: ArchiveConfig,
}

/// Overrides for the archive endpoint. When absent, the `CDSAPI_*` environment
/// variables and `~/.cdsapirc` are used.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    pub url: Option<String>,
    pub key: Option<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            download_path: PathBuf::from(aerosol_forecast::cache::DEFAULT_DOWNLOAD_PATH),
            output_dir: PathBuf::from("renders"),
            refresh: RefreshPolicy::default(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            pixels_per_cell: 8,
            show_progress: true,
            archive: ArchiveConfig::default(),
        }
    }
}

impl ViewerConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&contents).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        // serde_yaml reads an empty document as `null`, not as an empty mapping.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(contents)?;
        anyhow::ensure!(config.pixels_per_cell > 0, "pixels_per_cell must be at least 1");
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn credentials(&self) -> anyhow::Result<Credentials> {
        match (&self.archive.url, &self.archive.key) {
            (Some(url), Some(key)) => Ok(Credentials::new(url, key.as_str())?),
            (None, None) => Ok(Credentials::discover()?),
            _ => anyhow::bail!("archive.url and archive.key must be set together"),
        }
    }
}
