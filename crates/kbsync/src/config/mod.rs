pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, API_URL_ENV_VAR};
pub use schema::{AuthConfig, SyncConfig, TelemetryConfig, UploadConfig};
