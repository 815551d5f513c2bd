//! Shared configuration loader for mdscan.
//!
//! `defaults/mdscan.default.toml` is embedded into every binary so that docs and runtime
//! behavior stay in sync. Applications layer user-specific files on top of those defaults
//! via [`Loader`] before deserializing into [`ScanConfig`].
//!
//! Everything that is policy rather than structure lives here: timeouts, whether to isolate
//! the tokenizer in a child process, HTML handling, URL scheme allow-lists and per-collector
//! caps. None of it is hard-coded in the extraction crates.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

const DEFAULT_TOML: &str = include_str!("../defaults/mdscan.default.toml");

/// Top-level configuration consumed by mdscan applications.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    pub default_profile: String,
    pub profiles: BTreeMap<String, ProfileConfig>,
}

/// One named security profile.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProfileConfig {
    /// Wall-clock budget for tokenize + dispatch.
    pub timeout_secs: f64,
    /// Run the tokenizer in a separate worker process.
    pub process_isolation: bool,
    pub allow_html: bool,
    pub allowed_schemes: Vec<String>,
    pub max_data_uri_bytes: usize,
    pub max_input_bytes: Option<usize>,
    /// Stack size of the tokenizer thread, in-process or in the worker process.
    pub worker_stack_mib: usize,
    pub caps: CapsConfig,
}

/// Hard item caps per built-in collector.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CapsConfig {
    pub links: usize,
    pub images: usize,
    pub headings: usize,
    pub code_blocks: usize,
    pub tables: usize,
    pub lists: usize,
    pub html: usize,
    pub plain_text: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("unknown profile '{name}' (available: {})", .available.join(", "))]
    Unknown {
        name: String,
        available: Vec<String>,
    },
}

impl ScanConfig {
    /// Look up a profile by name.
    pub fn profile(&self, name: &str) -> Result<&ProfileConfig, ProfileError> {
        self.profiles.get(name).ok_or_else(|| ProfileError::Unknown {
            name: name.to_string(),
            available: self.profile_names(),
        })
    }

    pub fn default_profile(&self) -> Result<&ProfileConfig, ProfileError> {
        self.profile(&self.default_profile)
    }

    /// Profile names in sorted order.
    pub fn profile_names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }
}

/// Builds a [`ScanConfig`] from the embedded profiles plus whatever is layered on top.
///
/// Later layers win key by key, so a site file only needs the keys it changes, e.g.
/// `profiles.strict.caps.links = 100`.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Loader { builder }
    }

    /// Layer a TOML policy file. The file must exist.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Override one key of one profile, `key` being relative to the profile
    /// (`"timeout_secs"`, `"caps.links"`).
    pub fn set_profile_value<I>(
        mut self,
        profile: &str,
        key: &str,
        value: I,
    ) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        let path = format!("profiles.{}.{}", profile, key);
        self.builder = self.builder.set_override(path, value)?;
        Ok(self)
    }

    /// Deserialize the layered configuration. Fails when `default_profile` names a profile
    /// that does not exist.
    pub fn build(self) -> Result<ScanConfig, ConfigError> {
        let config: ScanConfig = self.builder.build()?.try_deserialize()?;
        if let Err(err) = config.default_profile() {
            return Err(ConfigError::Message(format!("default_profile: {}", err)));
        }
        Ok(config)
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// The embedded profiles with nothing layered on top.
pub fn load_defaults() -> Result<ScanConfig, ConfigError> {
    Loader::new().build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_default_config() {
        let config = load_defaults().expect("defaults to deserialize");
        assert_eq!(config.default_profile, "strict");
        assert_eq!(
            config.profile_names(),
            vec!["moderate", "permissive", "strict"]
        );

        let strict = config.default_profile().expect("strict profile");
        assert!(strict.process_isolation);
        assert!(!strict.allow_html);
        assert_eq!(strict.allowed_schemes, vec!["http", "https", "mailto"]);
    }

    #[test]
    fn only_permissive_allows_html() {
        let config = load_defaults().unwrap();
        let allowing: Vec<_> = config
            .profiles
            .iter()
            .filter(|(_, p)| p.allow_html)
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(allowing, vec!["permissive"]);
    }

    #[test]
    fn overrides_single_profile_values() {
        let config = Loader::new()
            .set_profile_value("strict", "timeout_secs", 0.5)
            .expect("override to apply")
            .set_profile_value("strict", "caps.links", 2)
            .expect("override to apply")
            .build()
            .expect("config to build");
        let strict = config.profile("strict").unwrap();
        assert_eq!(strict.timeout_secs, 0.5);
        assert_eq!(strict.caps.links, 2);
        let moderate = config.profile("moderate").unwrap();
        assert_eq!(moderate.caps.links, 2000);
    }

    #[test]
    fn layers_user_file_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "default_profile = \"moderate\"\n\n[profiles.moderate]\nallow_html = true\n"
        )
        .unwrap();

        let config = Loader::new().with_file(file.path()).build().unwrap();
        assert_eq!(config.default_profile, "moderate");
        let moderate = config.default_profile().unwrap();
        assert!(moderate.allow_html);
        // untouched keys keep their defaults
        assert!(!moderate.process_isolation);
    }

    #[test]
    fn missing_policy_file_is_an_error() {
        let config = Loader::new()
            .with_file("/definitely/not/here/mdscan.toml")
            .build();
        assert!(config.is_err());
    }

    #[test]
    fn default_profile_must_exist() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "default_profile = \"paranoid\"").unwrap();

        let err = Loader::new().with_file(file.path()).build().unwrap_err();
        assert!(err.to_string().contains("unknown profile 'paranoid'"), "{}", err);
    }

    #[test]
    fn unknown_profile_lists_alternatives() {
        let config = load_defaults().unwrap();
        let err = config.profile("paranoid").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown profile 'paranoid' (available: moderate, permissive, strict)"
        );
    }
}
