//! `mars-runtime` – the localization session and its host-facing plumbing.
//!
//! # Modules
//!
//! - [`session`] – [`LocalizationSession`]: per-sample state machine that
//!   tracks the active floor and room, dead-reckons through degraded
//!   tracking and notifies observers.
//! - [`marker_search`] – [`MarkerSearch`]: finds the starting room from a
//!   recognized reference marker.
//! - [`provider`] – [`TrackingProvider`]: seam to the external
//!   visual-tracking provider.
//! - [`config`] – [`LocalizationConfig`]: TOML + environment tuning.
//! - [`telemetry`] – `tracing` subscriber and OTLP export setup.

pub mod config;
pub mod marker_search;
pub mod provider;
pub mod session;
pub mod telemetry;

pub use config::LocalizationConfig;
pub use marker_search::MarkerSearch;
pub use provider::{ProviderCommand, RecordingProvider, TrackingProvider};
pub use session::{LocalizationSession, Phase, SampleReport};
