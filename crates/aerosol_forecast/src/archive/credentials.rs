//! Where to find the Atmosphere Data Store and the API key to use.
//!
//! Lookup order is the same as the official `cdsapi` client: the `CDSAPI_URL` and
//! `CDSAPI_KEY` environment variables, then the file named by `CDSAPI_RC`, then
//! `~/.cdsapirc`. The rc file holds two lines, `url: ...` and `key: ...`, which
//! happens to be valid YAML.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use crate::error::{ForecastError, Result};

pub const URL_ENV: &str = "CDSAPI_URL";
pub const KEY_ENV: &str = "CDSAPI_KEY";
pub const RC_ENV: &str = "CDSAPI_RC";
const RC_FILENAME: &str = ".cdsapirc";

#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub url: Url,
    pub key: String,
}

// Keep the API key out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url.as_str())
            .field("key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct RcFile {
    url: String,
    key: String,
}

impl Credentials {
    pub fn new(url: &str, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(ForecastError::Credentials("the API key is empty".to_string()));
        }
        Ok(Self {
            url: Url::parse(url.trim())?,
            key: key.trim().to_string(),
        })
    }

    /// Read an rc file of the form `url: ...\nkey: ...`.
    pub fn from_rc_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let rc: RcFile = serde_yaml::from_str(&contents).map_err(|e| {
            ForecastError::Credentials(format!("failed to parse {}: {e}", path.display()))
        })?;
        Self::new(&rc.url, rc.key)
    }

    /// `Some` only when both environment variables are set.
    pub fn from_env() -> Option<Result<Self>> {
        let url = std::env::var(URL_ENV).ok()?;
        let key = std::env::var(KEY_ENV).ok()?;
        Some(Self::new(&url, key))
    }

    pub fn rc_path() -> Option<PathBuf> {
        match std::env::var_os(RC_ENV) {
            Some(path) => Some(PathBuf::from(path)),
            None => dirs::home_dir().map(|home| home.join(RC_FILENAME)),
        }
    }

    /// Environment variables first, then the rc file.
    pub fn discover() -> Result<Self> {
        if let Some(credentials) = Self::from_env() {
            return credentials;
        }
        let path = Self::rc_path().ok_or_else(|| {
            ForecastError::Credentials("cannot locate the home directory".to_string())
        })?;
        if !path.exists() {
            return Err(ForecastError::Credentials(format!(
                "set {URL_ENV} and {KEY_ENV}, or create {}",
                path.display()
            )));
        }
        Self::from_rc_file(&path)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_from_rc_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "url: https://ads.atmosphere.copernicus.eu/api")?;
        writeln!(file, "key: 00000000-1111-2222-3333-444444444444")?;
        let credentials = Credentials::from_rc_file(file.path())?;
        assert_eq!(
            credentials.url.as_str(),
            "https://ads.atmosphere.copernicus.eu/api"
        );
        assert_eq!(credentials.key, "00000000-1111-2222-3333-444444444444");
        Ok(())
    }

    #[test]
    fn test_legacy_uid_key_is_kept_verbatim() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "url: https://ads.atmosphere.copernicus.eu/api/v2")?;
        writeln!(file, "key: 1234:abcdef")?;
        assert_eq!(Credentials::from_rc_file(file.path())?.key, "1234:abcdef");
        Ok(())
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            Credentials::new("https://example.com/api", "  "),
            Err(ForecastError::Credentials(_))
        ));
        assert!(matches!(
            Credentials::new("not a url", "key"),
            Err(ForecastError::Url(_))
        ));
    }

    #[test]
    fn test_debug_hides_key() -> anyhow::Result<()> {
        let credentials = Credentials::new("https://example.com/api", "secret")?;
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("example.com"));
        Ok(())
    }
}
