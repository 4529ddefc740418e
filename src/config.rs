//! Configuration types for a redaction run.
//!
//! All run behaviour is controlled through [`RedactionConfig`], built via its
//! [`RedactionConfigBuilder`]. One struct keeps every knob in a single place
//! that can be cloned into concurrent tasks and logged at the start of a run.

use crate::error::RedactError;
use crate::model::DEFAULT_OUTPUT_PREFIX;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Configuration for one redaction run.
///
/// Built via [`RedactionConfig::builder()`] or using
/// [`RedactionConfig::default()`].
///
/// # Example
/// ```rust
/// use pii_redactor::{MaskScope, RedactionConfig};
///
/// let config = RedactionConfig::builder()
///     .poll_interval_ms(2_000)
///     .max_poll_attempts(60)
///     .mask_scope(MaskScope::Entity)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct RedactionConfig {
    /// Wait between two status polls of the extraction job, in ms. Default: 5000.
    pub poll_interval_ms: u64,

    /// Maximum number of status polls before giving up. Default: 120.
    ///
    /// With the default interval this bounds a run at ten minutes of polling.
    pub max_poll_attempts: u32,

    /// Wall-clock limit for the whole submit-and-poll phase, in seconds.
    /// Default: 900. `None` leaves only `max_poll_attempts` as the bound.
    pub poll_deadline_secs: Option<u64>,

    /// Language code sent with every detection query. Default: "en".
    pub language_code: String,

    /// Character used to mask flagged text. Default: '*'.
    pub mask_char: char,

    /// Where masking is applied. Default: [`RedactionMode::Structured`].
    pub redaction_mode: RedactionMode,

    /// How much of a flagged line is masked. Default: [`MaskScope::Line`].
    pub mask_scope: MaskScope,

    /// Detection queries in flight at once. Default: 1 (sequential).
    ///
    /// Results are always merged back in line order regardless of this value.
    pub detection_concurrency: usize,

    /// Prefix of the output key. Default: "redacted/".
    pub output_prefix: String,

    /// Pretty-print the persisted JSON. Default: false.
    pub pretty_output: bool,

    /// Per-request timeout for the HTTP service clients, in seconds. Default: 30.
    pub api_timeout_secs: u64,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,

    /// Cancels polling when triggered.
    pub cancellation: Option<CancellationToken>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            max_poll_attempts: 120,
            poll_deadline_secs: Some(900),
            language_code: "en".to_string(),
            mask_char: '*',
            redaction_mode: RedactionMode::default(),
            mask_scope: MaskScope::default(),
            detection_concurrency: 1,
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            pretty_output: false,
            api_timeout_secs: 30,
            progress_callback: None,
            cancellation: None,
        }
    }
}

impl fmt::Debug for RedactionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedactionConfig")
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .field("poll_deadline_secs", &self.poll_deadline_secs)
            .field("language_code", &self.language_code)
            .field("mask_char", &self.mask_char)
            .field("redaction_mode", &self.redaction_mode)
            .field("mask_scope", &self.mask_scope)
            .field("detection_concurrency", &self.detection_concurrency)
            .field("output_prefix", &self.output_prefix)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn RedactionProgressCallback>"),
            )
            .field("cancellable", &self.cancellation.is_some())
            .finish()
    }
}

impl RedactionConfig {
    /// Create a new builder for `RedactionConfig`.
    pub fn builder() -> RedactionConfigBuilder {
        RedactionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_deadline(&self) -> Option<Duration> {
        self.poll_deadline_secs.map(Duration::from_secs)
    }
}

/// Builder for [`RedactionConfig`].
#[derive(Debug)]
pub struct RedactionConfigBuilder {
    config: RedactionConfig,
}

impl RedactionConfigBuilder {
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn max_poll_attempts(mut self, n: u32) -> Self {
        self.config.max_poll_attempts = n;
        self
    }

    pub fn poll_deadline_secs(mut self, secs: Option<u64>) -> Self {
        self.config.poll_deadline_secs = secs;
        self
    }

    pub fn language_code(mut self, code: impl Into<String>) -> Self {
        self.config.language_code = code.into();
        self
    }

    pub fn mask_char(mut self, c: char) -> Self {
        self.config.mask_char = c;
        self
    }

    pub fn redaction_mode(mut self, mode: RedactionMode) -> Self {
        self.config.redaction_mode = mode;
        self
    }

    pub fn mask_scope(mut self, scope: MaskScope) -> Self {
        self.config.mask_scope = scope;
        self
    }

    pub fn detection_concurrency(mut self, n: usize) -> Self {
        self.config.detection_concurrency = n.max(1);
        self
    }

    pub fn output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.output_prefix = prefix.into();
        self
    }

    pub fn pretty_output(mut self, v: bool) -> Self {
        self.config.pretty_output = v;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.config.cancellation = Some(token);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RedactionConfig, RedactError> {
        let c = &self.config;
        if c.poll_interval_ms == 0 {
            return Err(RedactError::InvalidConfig(
                "Poll interval must be > 0 ms".into(),
            ));
        }
        if c.max_poll_attempts == 0 {
            return Err(RedactError::InvalidConfig(
                "Max poll attempts must be ≥ 1".into(),
            ));
        }
        if c.language_code.trim().is_empty() {
            return Err(RedactError::InvalidConfig(
                "Language code must not be empty".into(),
            ));
        }
        if c.mask_char.is_whitespace() {
            return Err(RedactError::InvalidConfig(format!(
                "Mask character must be visible, got {:?}",
                c.mask_char
            )));
        }
        if c.output_prefix.is_empty() {
            // An empty prefix would overwrite the source object.
            return Err(RedactError::InvalidConfig(
                "Output prefix must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Where masks are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedactionMode {
    /// Replace the `Text` of flagged blocks, then serialise. (default)
    #[default]
    Structured,
    /// Serialise first, then replace every literal occurrence of each flagged
    /// line in the serialised payload. Can over-redact when a line's text
    /// also appears in another field.
    Serialized,
}

/// How much of a flagged line is masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskScope {
    /// The whole line. (default)
    #[default]
    Line,
    /// Only the detected entity spans; falls back to the whole line when a
    /// span cannot be located.
    Entity,
}
