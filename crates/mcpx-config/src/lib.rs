//! Server configuration model, loading, hashing, and env-derived settings.

mod hash;
mod loader;
mod server;
mod settings;

pub use hash::{canonical_json, config_hash};
pub use loader::{ConfigDocument, ConfigSource, load_config};
pub use server::{ServerConfig, ServerTransport};
pub use settings::Settings;
