pub mod loader;
pub mod schema;

pub use loader::{load_file_config, load_from_str, read_manifest, ConfigError, CONFIG_FILE_NAME};
pub use schema::{
    FileConfig, MakePatchOptions, Options, DEFAULT_EXCLUDE, DEFAULT_INCLUDE, DEFAULT_PATCH_DIR,
};
