//! Layered configuration.
//!
//! A resolved tree is built from up to five tiers, each deep-merged over the
//! previous one:
//! 1. **Defaults** - built into the binary
//! 2. **Profile** - `./config/profiles/<name>.yaml` when a profile is selected
//! 3. **Project** - `./config/config.yaml`
//! 4. **User** - an explicit file, or `$XDG_CONFIG_HOME/edge-detection/config.yaml`
//! 5. **Environment** - `EDGE_DETECTION_*` variables
//!
//! ## Environment Variables
//! `EDGE_DETECTION_` is stripped, the rest is lowercased and `__` separates
//! nesting levels, so `EDGE_DETECTION_DETECTION__CONFIDENCE_THRESHOLD=0.6`
//! sets `detection.confidence_threshold`. Values become booleans, integers,
//! floats or strings, tried in that order.

mod defaults;
mod env;
mod files;
mod loader;
mod merge;
mod profiles;
mod schema;

pub use defaults::{SECTIONS, default_tree};
pub use env::{ENV_PREFIX, apply_overrides, collect_env_overrides, collect_overrides, convert_value};
pub use files::{FileError, TREE_EXTENSIONS, parse_tree, read_tree_file};
pub use loader::{
    ConfigManager, ConfigPaths, ConfigSource, ConfigTier, LoadOptions, lookup_path,
    user_config_file,
};
pub use merge::{deep_merge, deep_merge_all, merged};
pub use profiles::{ProfileError, ProfileStore, RESERVED_PROFILES, list_profiles, load_profile};
pub use schema::{
    CUSTOM_MODEL, FieldViolation, KNOWN_MODELS, OUTPUT_FORMATS, OutputFormat, SchemaError,
    ValidatedConfig, validate,
};
