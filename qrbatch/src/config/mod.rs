//! Pipeline configuration loading.
//!
//! Runtime knobs live in [`crate::pipeline::PipelineConfig`]; this module
//! only maps an INI file onto that struct. Keys sit in a `[pipeline]`
//! section:
//!
//! ```ini
//! [pipeline]
//! batch_size = 5
//! max_retries = 2
//! retries_enabled = true
//! encode_timeout_secs = 10
//! batch_delay_ms = 100
//! ```

mod file;

pub use file::{load_pipeline_config, ConfigError};
