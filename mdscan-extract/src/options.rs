//! Per-parse options, resolved from a configuration profile.

use crate::security::SecurityPolicy;
use mdscan_config::{CapsConfig, ProfileConfig, ProfileError, ScanConfig};
use mdscan_parser::TokenizerOptions;
use std::time::Duration;

const MIB: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    /// Name of the profile these options came from, reported in result metadata.
    pub profile: String,
    pub timeout: Duration,
    pub process_isolation: bool,
    pub worker_stack_bytes: usize,
    pub tokenizer: TokenizerOptions,
    pub policy: SecurityPolicy,
    pub caps: CapsConfig,
}

impl ExtractOptions {
    pub fn from_profile(name: &str, profile: &ProfileConfig) -> Self {
        // negative or NaN budgets mean no time at all
        let timeout = Duration::try_from_secs_f64(profile.timeout_secs).unwrap_or(Duration::ZERO);
        ExtractOptions {
            profile: name.to_string(),
            timeout,
            process_isolation: profile.process_isolation,
            worker_stack_bytes: profile.worker_stack_mib.max(1).saturating_mul(MIB),
            tokenizer: TokenizerOptions {
                max_input_bytes: profile.max_input_bytes,
                ..TokenizerOptions::default()
            },
            policy: SecurityPolicy::from_profile(profile),
            caps: profile.caps.clone(),
        }
    }

    pub fn from_config(config: &ScanConfig, name: &str) -> Result<Self, ProfileError> {
        Ok(Self::from_profile(name, config.profile(name)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_strict_profile() {
        let config = mdscan_config::load_defaults().unwrap();
        let options = ExtractOptions::from_config(&config, "strict").unwrap();
        assert_eq!(options.profile, "strict");
        assert_eq!(options.timeout, Duration::from_secs(2));
        assert!(options.process_isolation);
        assert_eq!(options.worker_stack_bytes, 32 * MIB);
        assert!(!options.policy.allow_html);
        assert_eq!(options.tokenizer.max_input_bytes, Some(2 * MIB));
    }

    #[test]
    fn negative_timeout_is_zero() {
        let config = mdscan_config::Loader::new()
            .set_profile_value("moderate", "timeout_secs", -1.0)
            .unwrap()
            .build()
            .unwrap();
        let options = ExtractOptions::from_config(&config, "moderate").unwrap();
        assert_eq!(options.timeout, Duration::ZERO);
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let config = mdscan_config::load_defaults().unwrap();
        assert!(ExtractOptions::from_config(&config, "nope").is_err());
    }
}
