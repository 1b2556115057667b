//! Configuration for planwright.
//!
//! Settings resolve in layers: compiled defaults, then an optional JSON file
//! deep-merged on top, then `PLANWRIGHT_*` environment variables. The result
//! is a plain value handed to constructors; there is no global instance.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{default_data_dir, deep_merge, load_settings, load_settings_from_path};
pub use types::{
    AssetSettings, GenerationSettings, LoggingSettings, PackagingSettings, PlanwrightSettings,
    ServerSettings, SessionBackend, StorageSettings,
};
