//! Pipeline configuration.
//!
//! The configuration surface is deliberately small: a detection margin,
//! a privileged-tool allowlist, three masking/sanitization toggles, a
//! concurrency bound, and the attribution failure policy. There are no
//! other tunables in the core.
//!
//! Configuration is resolved with the following precedence (highest
//! first):
//!
//! 1. Explicit builder calls on a loaded config
//! 2. `ARMET_*` environment variables
//! 3. An `armet.toml` file (path from `ARMET_CONFIG_PATH`, else an upward
//!    search from the working directory)
//! 4. Built-in defaults

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GuardError;

/// File name searched for when `ARMET_CONFIG_PATH` is unset.
const CONFIG_FILE_NAME: &str = "armet.toml";

// =============================================================================
// AttributionFailurePolicy
// =============================================================================

/// What the orchestrator does when attribution cannot run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionFailurePolicy {
    /// Return the original action with `was_defended = false`.
    #[default]
    Passthrough,
    /// Return a stripped action with `was_defended = true`.
    Block,
}

impl FromStr for AttributionFailurePolicy {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passthrough" => Ok(Self::Passthrough),
            "block" => Ok(Self::Block),
            other => Err(GuardError::InvalidConfig {
                reason: format!(
                    "unknown attribution failure policy '{other}' (valid: passthrough, block)"
                ),
            }),
        }
    }
}

// =============================================================================
// GuardConfig
// =============================================================================

/// Configuration for the guardrail pipeline.
///
/// # Invariants
///
/// - `margin_tau` is finite and non-negative.
/// - `max_loo_batch_size`, when set, is at least 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GuardConfig {
    /// Detection margin τ. At τ = 0 any span strictly more influential
    /// than the user request is flagged; larger values demand a safety
    /// margin.
    pub margin_tau: f64,

    /// Tool names whose actions bypass the pipeline entirely and whose
    /// results are never treated as untrusted spans.
    pub privileged_tools: BTreeSet<String>,

    /// Mask assistant reasoning in the scoring context before LOO
    /// attribution.
    pub mask_cot_for_scoring: bool,

    /// Mask assistant reasoning in the rebuilt context before
    /// regeneration.
    pub enable_cot_masking: bool,

    /// Run the sanitizer on flagged spans. Disabled only for ablation
    /// studies; the rebuilt context then keeps the original span content.
    pub enable_sanitization: bool,

    /// Bound on in-flight proxy scoring calls. `None` means all ablation
    /// variants are scored concurrently.
    pub max_loo_batch_size: Option<usize>,

    /// Policy applied when the proxy fails or returns inconsistent
    /// shapes.
    pub on_attribution_failure: AttributionFailurePolicy,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            margin_tau: 0.0,
            privileged_tools: BTreeSet::new(),
            mask_cot_for_scoring: true,
            enable_cot_masking: true,
            enable_sanitization: true,
            max_loo_batch_size: None,
            on_attribution_failure: AttributionFailurePolicy::default(),
        }
    }
}

impl GuardConfig {
    /// Sets the detection margin.
    #[must_use]
    pub const fn with_margin_tau(mut self, tau: f64) -> Self {
        self.margin_tau = tau;
        self
    }

    /// Sets the privileged tool set.
    #[must_use]
    pub fn with_privileged_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.privileged_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables pre-scoring reasoning masking.
    #[must_use]
    pub const fn with_mask_cot_for_scoring(mut self, enabled: bool) -> Self {
        self.mask_cot_for_scoring = enabled;
        self
    }

    /// Enables or disables reasoning masking during regeneration.
    #[must_use]
    pub const fn with_cot_masking(mut self, enabled: bool) -> Self {
        self.enable_cot_masking = enabled;
        self
    }

    /// Enables or disables span sanitization.
    #[must_use]
    pub const fn with_sanitization(mut self, enabled: bool) -> Self {
        self.enable_sanitization = enabled;
        self
    }

    /// Bounds the number of concurrent proxy scoring calls.
    #[must_use]
    pub const fn with_max_loo_batch_size(mut self, bound: Option<usize>) -> Self {
        self.max_loo_batch_size = bound;
        self
    }

    /// Sets the attribution failure policy.
    #[must_use]
    pub const fn with_attribution_failure_policy(
        mut self,
        policy: AttributionFailurePolicy,
    ) -> Self {
        self.on_attribution_failure = policy;
        self
    }

    /// Validates numeric constraints.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::InvalidConfig`] when `margin_tau` is negative
    /// or not finite, or when `max_loo_batch_size` is zero.
    pub fn validate(&self) -> Result<(), GuardError> {
        if !self.margin_tau.is_finite() || self.margin_tau < 0.0 {
            return Err(GuardError::InvalidConfig {
                reason: format!(
                    "margin_tau must be finite and non-negative, got {}",
                    self.margin_tau
                ),
            });
        }
        if self.max_loo_batch_size == Some(0) {
            return Err(GuardError::InvalidConfig {
                reason: "max_loo_batch_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Layered loading
    // -------------------------------------------------------------------------

    /// Builds a config from the TOML file and `ARMET_*` environment
    /// variables layered over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::InvalidConfig`] when the file cannot be
    /// parsed, an environment variable holds an unparseable value, or the
    /// resulting config fails [`Self::validate`].
    pub fn from_env() -> Result<Self, GuardError> {
        let file_path = match std::env::var_os("ARMET_CONFIG_PATH") {
            Some(path) => {
                let path = PathBuf::from(path);
                path.is_file().then_some(path)
            }
            None => std::env::current_dir()
                .ok()
                .and_then(|cwd| find_config_file(&cwd)),
        };

        let mut config = match file_path {
            Some(path) => Self::from_toml_file(&path)?,
            None => Self::default(),
        };

        if let Some(tau) = env_parse::<f64>("ARMET_MARGIN_TAU")? {
            config.margin_tau = tau;
        }
        if let Some(enabled) = env_bool("ARMET_MASK_COT_FOR_SCORING")? {
            config.mask_cot_for_scoring = enabled;
        }
        if let Some(enabled) = env_bool("ARMET_ENABLE_COT_MASKING")? {
            config.enable_cot_masking = enabled;
        }
        if let Some(enabled) = env_bool("ARMET_ENABLE_SANITIZATION")? {
            config.enable_sanitization = enabled;
        }
        if let Some(bound) = env_parse::<usize>("ARMET_MAX_LOO_BATCH_SIZE")? {
            config.max_loo_batch_size = Some(bound);
        }
        if let Some(policy) = env_var("ARMET_ON_ATTRIBUTION_FAILURE") {
            config.on_attribution_failure = policy.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads a config from a TOML file.
    ///
    /// The file may hold the options at the top level or under an
    /// `[armet]` table.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::InvalidConfig`] on read or parse failure, or
    /// when the parsed config fails [`Self::validate`].
    pub fn from_toml_file(path: &Path) -> Result<Self, GuardError> {
        let text = std::fs::read_to_string(path).map_err(|e| GuardError::InvalidConfig {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        let config = Self::from_toml_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::InvalidConfig`] on parse failure.
    pub fn from_toml_str(text: &str) -> Result<Self, GuardError> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Wrapper {
            armet: GuardConfig,
        }

        if let Ok(wrapper) = toml::from_str::<Wrapper>(text) {
            return Ok(wrapper.armet);
        }
        toml::from_str::<Self>(text).map_err(|e| GuardError::InvalidConfig {
            reason: format!("cannot parse config: {e}"),
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Walks upward from `start` looking for the config file.
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, GuardError>
where
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e| GuardError::InvalidConfig {
                reason: format!("cannot parse {key}={value}: {e}"),
            }),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>, GuardError> {
    match env_var(key) {
        None => Ok(None),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" => Ok(Some(false)),
            other => Err(GuardError::InvalidConfig {
                reason: format!("cannot parse {key}={other} as a boolean"),
            }),
        },
    }
}
