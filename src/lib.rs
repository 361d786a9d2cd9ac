//! Synheart Glucose - On-device insight and projection engine for CGM logs
//!
//! The engine correlates irregularly sampled glucose readings with logged meals
//! and insulin doses. It runs two independent passes:
//!
//! - **Analysis**: log ingestion → response curves → time-of-day statistics →
//!   ISF/ICR estimation → advisory rules → insight report
//! - **Alerts**: rate-of-change projection over the newest samples → high/low
//!   alert requests gated by per-kind cooldowns
//!
//! Rendering, notification delivery and storage belong to the host; the engine
//! only exchanges plain data with them.

pub mod adapter;
pub mod align;
pub mod config;
pub mod curves;
pub mod encoder;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod projection;
pub mod prompt;
pub mod time_of_day;
pub mod tips;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use adapter::{IngestReport, LogAdapter};
pub use config::{AlertSettings, AnalysisSettings, Settings};
pub use error::{ComputeError, RecordError};
pub use pipeline::{analyze, analyze_json, prompt_json, InsightProcessor};
pub use projection::{evaluate_alerts, AlertDispatcher, CooldownState};
pub use prompt::build_prompt;

/// Engine version embedded in all insight reports
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for insight reports
pub const PRODUCER_NAME: &str = "synheart-glucose";
