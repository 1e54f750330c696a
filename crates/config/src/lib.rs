//! Server configuration: TOML schema, discovery, and loading.

mod loader;
mod schema;

pub use loader::{config_dir, discover_and_load, find_config_file, load_config};
pub use schema::{ComcoreConfig, DataConfig, ServerConfig, TlsConfig};
