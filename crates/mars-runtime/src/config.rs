//! Session tuning – read from TOML, overridable through `MARS_*` variables.
//!
//! ```toml
//! containment_interval = 20
//! settle_samples = 30
//! assist_after_samples = 120
//! probe_distance = 100.0
//! connection_tie_break = "first_declared"
//! ```
//!
//! Every field is optional; missing ones take the defaults above.

use std::fs;
use std::path::Path;

use mars_spatial::containment::{ConnectionTieBreak, ContainmentResolver, DEFAULT_PROBE_DISTANCE};
use mars_types::MarsError;
use serde::{Deserialize, Serialize};

/// Tuning knobs of a [`LocalizationSession`][crate::session::LocalizationSession].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizationConfig {
    /// Run containment and connection checks on every N-th nominal sample.
    #[serde(default = "default_containment_interval")]
    pub containment_interval: u32,

    /// Nominal samples after a recovery during which containment is
    /// suppressed.
    #[serde(default = "default_settle_samples")]
    pub settle_samples: u32,

    /// Degraded samples before assisted recovery is requested.
    #[serde(default = "default_assist_after_samples")]
    pub assist_after_samples: u32,

    /// Length of the containment probe ray, in metres.
    #[serde(default = "default_probe_distance")]
    pub probe_distance: f64,

    /// Which connection wins when several altitude windows match.
    #[serde(default)]
    pub connection_tie_break: ConnectionTieBreak,
}

fn default_containment_interval() -> u32 {
    20
}
fn default_settle_samples() -> u32 {
    30
}
fn default_assist_after_samples() -> u32 {
    120
}
fn default_probe_distance() -> f64 {
    DEFAULT_PROBE_DISTANCE
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            containment_interval: default_containment_interval(),
            settle_samples: default_settle_samples(),
            assist_after_samples: default_assist_after_samples(),
            probe_distance: default_probe_distance(),
            connection_tie_break: ConnectionTieBreak::default(),
        }
    }
}

impl LocalizationConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, MarsError> {
        let cfg: Self =
            toml::from_str(raw).map_err(|e| MarsError::Config(format!("Failed to parse config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `path`, apply `MARS_*` environment overrides and validate.
    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, MarsError> {
        let mut cfg = if path.exists() {
            let raw = fs::read_to_string(path).map_err(|e| {
                MarsError::Config(format!("Failed to read config at {}: {e}", path.display()))
            })?;
            toml::from_str::<Self>(&raw)
                .map_err(|e| MarsError::Config(format!("Failed to parse config: {e}")))?
        } else {
            Self::default()
        };
        cfg.apply_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply overrides looked up by variable name.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `MARS_CONTAINMENT_INTERVAL` | `containment_interval` |
    /// | `MARS_SETTLE_SAMPLES` | `settle_samples` |
    /// | `MARS_ASSIST_AFTER_SAMPLES` | `assist_after_samples` |
    /// | `MARS_PROBE_DISTANCE` | `probe_distance` |
    /// | `MARS_CONNECTION_TIE_BREAK` | `connection_tie_break` (`first_declared` / `nearest_altitude`) |
    ///
    /// Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("MARS_CONTAINMENT_INTERVAL")
            && let Ok(n) = v.trim().parse()
        {
            self.containment_interval = n;
        }
        if let Some(v) = lookup("MARS_SETTLE_SAMPLES")
            && let Ok(n) = v.trim().parse()
        {
            self.settle_samples = n;
        }
        if let Some(v) = lookup("MARS_ASSIST_AFTER_SAMPLES")
            && let Ok(n) = v.trim().parse()
        {
            self.assist_after_samples = n;
        }
        if let Some(v) = lookup("MARS_PROBE_DISTANCE")
            && let Ok(d) = v.trim().parse()
        {
            self.probe_distance = d;
        }
        if let Some(v) = lookup("MARS_CONNECTION_TIE_BREAK") {
            match v.trim() {
                "first_declared" => self.connection_tie_break = ConnectionTieBreak::FirstDeclared,
                "nearest_altitude" => self.connection_tie_break = ConnectionTieBreak::NearestAltitude,
                _ => {}
            }
        }
    }

    pub fn validate(&self) -> Result<(), MarsError> {
        if self.containment_interval == 0 {
            return Err(MarsError::Config("containment_interval must be at least 1".to_string()));
        }
        if !self.probe_distance.is_finite() || self.probe_distance <= 0.0 {
            return Err(MarsError::Config(format!(
                "probe_distance must be a positive finite length, got {}",
                self.probe_distance
            )));
        }
        Ok(())
    }

    /// Containment resolver configured from these settings.
    pub fn resolver(&self) -> ContainmentResolver {
        ContainmentResolver::new(self.probe_distance, self.connection_tie_break)
    }
}
