// ── Host configuration ────────────────────────────────────────────────────────
//
// Every field has a default, so an empty JSON object (or no file at all) is a
// valid configuration.  Unknown fields are rejected to catch typos.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Address navigated to before an HTML string is delivered.
pub const BLANK_URL: &str = "about:blank";

/// `FEATURE_BROWSER_EMULATION` value for IE11 edge mode.
pub const IE11_EMULATION: u32 = 11_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Neutral address navigated to by `load_html`.
    pub placeholder_url: String,
    /// Base URL used when `load_html` is given an empty one.
    pub default_base_url: String,
    /// Size of the chunks the content source supplies.
    pub chunk_size: usize,
    /// Register the executable for modern document mode before creating the
    /// control (Windows only).
    pub fix_compat_mode: bool,
    /// Value written for the executable under `FEATURE_BROWSER_EMULATION`.
    pub emulation_version: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            placeholder_url: BLANK_URL.to_owned(),
            default_base_url: BLANK_URL.to_owned(),
            chunk_size: 16 * 1024,
            fix_compat_mode: true,
            emulation_version: IE11_EMULATION,
        }
    }
}

impl HostConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load from a JSON file.  A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// The base URL to pair with an HTML string.
    pub fn base_url_or_default<'a>(&'a self, base_url: &'a str) -> &'a str {
        if base_url.is_empty() {
            &self.default_base_url
        } else {
            base_url
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrowserError;

    #[test]
    fn empty_object_is_default() {
        assert_eq!(HostConfig::from_json("{}").unwrap(), HostConfig::default());
    }

    #[test]
    fn partial_override() {
        let cfg = HostConfig::from_json(r#"{ "chunk_size": 512, "fix_compat_mode": false }"#).unwrap();
        assert_eq!(cfg.chunk_size, 512);
        assert!(!cfg.fix_compat_mode);
        assert_eq!(cfg.placeholder_url, "about:blank");
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = HostConfig::from_json(r#"{ "chunksize": 1 }"#).unwrap_err();
        assert!(matches!(err, BrowserError::Config(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = HostConfig::load(Path::new("definitely/not/here.json")).unwrap();
        assert_eq!(cfg, HostConfig::default());
    }

    #[test]
    fn empty_base_url_falls_back() {
        let cfg = HostConfig::default();
        assert_eq!(cfg.base_url_or_default(""), "about:blank");
        assert_eq!(cfg.base_url_or_default("http://x/"), "http://x/");
    }
}
