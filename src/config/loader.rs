//! Configuration manager with tier-based merging.
//!
//! Resolution order, lowest to highest precedence:
//! 1. built-in defaults
//! 2. named profile (`<profiles_dir>/<name>.yaml`)
//! 3. project file (`./config/config.yaml`)
//! 4. explicit file passed to `load`, or else the user file
//!    (`$XDG_CONFIG_HOME/edge-detection/config.yaml`)
//! 5. `EDGE_DETECTION_*` environment variables
//!
//! Missing optional files are skipped. A missing named profile, malformed
//! YAML and (unless skipped) validation failures are errors.
//!
//! `load` takes `&mut self`; share a loaded manager behind your own lock if
//! several threads need it.

use super::defaults::default_tree;
use super::env::{ENV_PREFIX, apply_overrides, collect_env_overrides, collect_overrides};
use super::files::read_tree_file;
use super::merge::deep_merge;
use super::profiles::ProfileStore;
use super::schema::{ValidatedConfig, validate};
use crate::error::ConfigError;
use crate::logging::Logger;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// Directory name under the user config dir.
pub const APP_DIR: &str = "edge-detection";

/// File name of project and user config files.
pub const CONFIG_FILE: &str = "config.yaml";

/// Configuration tier, lowest to highest precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    Defaults = 0,
    Profile = 1,
    Project = 2,
    /// Explicit path given to `load`.
    Explicit = 3,
    User = 4,
    Environment = 5,
}

impl fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Profile => write!(f, "profile"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::Explicit => write!(f, "explicit"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// A source that contributed to the resolved tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub tier: ConfigTier,
    /// File path, profile name, or overridden keys.
    pub detail: String,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tier, self.detail)
    }
}

/// Locations searched during `load`.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Project-local config file.
    pub project_file: Option<PathBuf>,
    /// User-level config file, used when no explicit path is given.
    pub user_file: Option<PathBuf>,
    /// Directory holding profile files.
    pub profiles_dir: PathBuf,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Conventional locations relative to the working directory and user home.
    pub fn discover() -> Self {
        Self {
            project_file: Some(PathBuf::from("config").join(CONFIG_FILE)),
            user_file: user_config_file(),
            profiles_dir: PathBuf::from("config").join("profiles"),
        }
    }

    /// Create paths with explicit locations.
    pub fn with_files(
        project_file: Option<PathBuf>,
        user_file: Option<PathBuf>,
        profiles_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_file,
            user_file,
            profiles_dir: profiles_dir.into(),
        }
    }
}

/// `$XDG_CONFIG_HOME/edge-detection/config.yaml`, falling back to `~/.config`.
pub fn user_config_file() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

/// Options for one `load` call.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file. Replaces the user file in the chain; skipped if missing.
    pub path: Option<PathBuf>,
    /// Profile for this load, overriding the manager's profile.
    pub profile: Option<String>,
    /// Leave the tree unvalidated.
    pub skip_validation: bool,
}

impl LoadOptions {
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn skip_validation(mut self) -> Self {
        self.skip_validation = true;
        self
    }
}

/// Walk `key` (`a.b.c`) through nested mappings.
pub fn lookup_path<'a>(tree: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.')
        .try_fold(tree, |node, segment| node.as_object()?.get(segment))
}

/// Resolves, validates and serves configuration.
#[derive(Debug)]
pub struct ConfigManager {
    paths: ConfigPaths,
    profiles: ProfileStore,
    profile: Option<String>,
    env_prefix: String,
    /// Fixed variables instead of the process environment.
    env_vars: Option<Vec<(String, String)>>,
    logger: Logger,
    tree: Option<Value>,
    validated: Option<ValidatedConfig>,
    sources: Vec<ConfigSource>,
}

impl ConfigManager {
    pub fn new(paths: ConfigPaths) -> Self {
        let profiles = ProfileStore::new(paths.profiles_dir.clone());
        Self {
            paths,
            profiles,
            profile: None,
            env_prefix: ENV_PREFIX.to_string(),
            env_vars: None,
            logger: Logger::new().with_name("config"),
            tree: None,
            validated: None,
            sources: Vec::new(),
        }
    }

    /// Manager over the conventional locations.
    pub fn discover() -> Self {
        Self::new(ConfigPaths::discover())
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Read overrides from `vars` instead of the process environment.
    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Run the full resolution pipeline, replacing any previous state.
    ///
    /// On a validation failure the error is returned but the manager stays
    /// loaded, so the offending tree can still be inspected.
    ///
    /// Events emitted while loading are scoped to a `config_load` span that
    /// carries the profile, the explicit path and the number of sources.
    pub fn load(&mut self, options: &LoadOptions) -> Result<(), ConfigError> {
        self.tree = None;
        self.validated = None;
        self.sources.clear();

        let profile = options.profile.clone().or_else(|| self.profile.clone());
        let span = tracing::info_span!(
            "config_load",
            profile = profile.as_deref(),
            path = options.path.as_deref().and_then(Path::to_str),
            sources = tracing::field::Empty,
        );
        let _entered = span.enter();

        let mut tree = default_tree();
        self.record(ConfigTier::Defaults, "built-in");

        if let Some(name) = profile {
            let overlay = self.profiles.load(&name)?;
            self.logger.info(&format!("Applying profile '{name}'"));
            tree = deep_merge(tree, overlay);
            self.record(ConfigTier::Profile, name);
        }

        if let Some(project_file) = self.paths.project_file.clone() {
            tree = self.merge_optional(tree, &project_file, ConfigTier::Project)?;
        }

        match (options.path.as_deref(), self.paths.user_file.clone()) {
            (Some(explicit), _) => {
                tree = self.merge_optional(tree, explicit, ConfigTier::Explicit)?;
            }
            (None, Some(user_file)) => {
                tree = self.merge_optional(tree, &user_file, ConfigTier::User)?;
            }
            (None, None) => {}
        }

        let overrides = match &self.env_vars {
            Some(vars) => collect_overrides(
                &self.env_prefix,
                vars.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            ),
            None => collect_env_overrides(&self.env_prefix),
        };
        if !overrides.is_empty() {
            let keys: Vec<&str> = overrides.keys().map(String::as_str).collect();
            self.logger.debug(&format!(
                "Applying {} environment override(s): {}",
                overrides.len(),
                keys.join(", ")
            ));
            apply_overrides(&mut tree, &overrides);
            let detail = keys.join(", ");
            self.record(ConfigTier::Environment, detail);
        }

        span.record("sources", self.sources.len());
        self.tree = Some(tree);

        if options.skip_validation {
            self.logger.debug("Validation skipped");
            return Ok(());
        }

        let tree = self.tree.as_ref().ok_or(ConfigError::NotLoaded)?;
        match validate(tree) {
            Ok(validated) => {
                self.validated = Some(validated);
                Ok(())
            }
            Err(err) => {
                self.logger.debug(&format!(
                    "Validation failed with {} violation(s)",
                    err.violations.len()
                ));
                Err(err.into())
            }
        }
    }

    fn record(&mut self, tier: ConfigTier, detail: impl Into<String>) {
        self.sources.push(ConfigSource {
            tier,
            detail: detail.into(),
        });
    }

    fn merge_optional(
        &mut self,
        tree: Value,
        path: &Path,
        tier: ConfigTier,
    ) -> Result<Value, ConfigError> {
        match read_tree_file(path) {
            Ok(overlay) => {
                self.logger
                    .debug(&format!("Merging {tier} config from {}", path.display()));
                self.record(tier, path.display().to_string());
                Ok(deep_merge(tree, overlay))
            }
            Err(err) if err.is_not_found() => {
                self.logger.debug(&format!(
                    "No {tier} config at {}, skipping",
                    path.display()
                ));
                Ok(tree)
            }
            Err(source) => Err(ConfigError::InvalidFile {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.tree.is_some()
    }

    /// Value at `key`. `Ok(None)` means the key is absent; a stored null is
    /// `Ok(Some(Value::Null))`.
    pub fn get(&self, key: &str) -> Result<Option<&Value>, ConfigError> {
        let tree = self.tree.as_ref().ok_or(ConfigError::NotLoaded)?;
        Ok(lookup_path(tree, key))
    }

    /// Value at `key`, or `default` when the key is absent.
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Result<Value, ConfigError> {
        match self.get(key)? {
            Some(value) => Ok(value.clone()),
            None => {
                self.logger
                    .debug(&format!("Config key '{key}' not found, using default"));
                Ok(default.into())
            }
        }
    }

    /// Value at `key` deserialized into `T`; `Ok(None)` if the key is absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        let Some(value) = self.get(key)? else {
            return Ok(None);
        };
        T::deserialize(value)
            .map(Some)
            .map_err(|source| ConfigError::TypeMismatch {
                key: key.to_string(),
                source,
            })
    }

    /// A full copy of the resolved tree.
    pub fn get_all(&self) -> Result<Value, ConfigError> {
        self.tree.clone().ok_or(ConfigError::NotLoaded)
    }

    /// Typed view from the last successful validation.
    pub fn validated(&self) -> Option<&ValidatedConfig> {
        self.validated.as_ref()
    }

    /// Sources that contributed to the last load, in merge order.
    pub fn sources(&self) -> &[ConfigSource] {
        &self.sources
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::capture::Captured;
    use serde_json::json;
    use tempfile::TempDir;

    const NO_ENV: [(&str, &str); 0] = [];

    fn manager(temp: &TempDir) -> ConfigManager {
        let paths = ConfigPaths::with_files(
            Some(temp.path().join("project.yaml")),
            Some(temp.path().join("user.yaml")),
            temp.path().join("profiles"),
        );
        ConfigManager::new(paths).with_env(NO_ENV)
    }

    #[test]
    fn test_user_config_file_location() {
        let path = user_config_file();
        if let Some(path) = path {
            assert!(path.ends_with("edge-detection/config.yaml"));
        }
    }

    #[test]
    fn test_lookup_path() {
        let tree = json!({"a": {"b": {"c": 1}}, "list": [1, 2]});
        assert_eq!(lookup_path(&tree, "a.b.c"), Some(&json!(1)));
        assert_eq!(lookup_path(&tree, "a.b"), Some(&json!({"c": 1})));
        assert_eq!(lookup_path(&tree, "a.x"), None);
        assert_eq!(lookup_path(&tree, "a.b.c.d"), None);
        assert_eq!(lookup_path(&tree, "list.0"), None);
    }

    #[test]
    fn test_load_defaults_only() {
        let temp = TempDir::new().unwrap();
        let mut config = manager(&temp);
        config.load(&LoadOptions::default()).unwrap();

        assert_eq!(config.get_all().unwrap(), default_tree());
        assert_eq!(config.validated().unwrap().model.name, "yolov8n");
        assert_eq!(
            config.sources(),
            &[ConfigSource {
                tier: ConfigTier::Defaults,
                detail: "built-in".into()
            }]
        );
    }

    #[test]
    fn test_get_before_load_fails() {
        let temp = TempDir::new().unwrap();
        let config = manager(&temp);
        assert!(!config.is_loaded());
        assert!(matches!(config.get("model.name"), Err(ConfigError::NotLoaded)));
        assert!(matches!(config.get_or("model.name", "x"), Err(ConfigError::NotLoaded)));
        assert!(matches!(config.get_all(), Err(ConfigError::NotLoaded)));
    }

    #[test]
    fn test_get_distinguishes_missing_from_null() {
        let temp = TempDir::new().unwrap();
        let mut config = manager(&temp);
        config.load(&LoadOptions::default()).unwrap();

        assert_eq!(config.get("missing.key").unwrap(), None);
        assert_eq!(config.get("model.checksum").unwrap(), Some(&Value::Null));
        assert_eq!(config.get_or("missing.key", "X").unwrap(), json!("X"));
        assert_eq!(config.get_or("model.name", "X").unwrap(), json!("yolov8n"));
    }

    #[test]
    fn test_get_as_typed_values() {
        let temp = TempDir::new().unwrap();
        let mut config = manager(&temp);
        config.load(&LoadOptions::default()).unwrap();

        let size: Option<Vec<u32>> = config.get_as("input.image_size").unwrap();
        assert_eq!(size, Some(vec![640, 640]));
        let threshold: Option<f64> = config.get_as("detection.confidence_threshold").unwrap();
        assert_eq!(threshold, Some(0.25));
        assert_eq!(config.get_as::<String>("missing").unwrap(), None);

        let err = config.get_as::<u32>("model.name").unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));
        assert!(err.to_string().contains("model.name"));
    }

    #[test]
    fn test_project_then_user_precedence() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("project.yaml"),
            "model:\n  name: yolov8s\ndetection:\n  iou_threshold: 0.5\n",
        )
        .unwrap();
        std::fs::write(temp.path().join("user.yaml"), "model:\n  name: yolov8m\n").unwrap();

        let mut config = manager(&temp);
        config.load(&LoadOptions::default()).unwrap();

        assert_eq!(config.get("model.name").unwrap(), Some(&json!("yolov8m")));
        assert_eq!(config.get("detection.iou_threshold").unwrap(), Some(&json!(0.5)));
        let tiers: Vec<ConfigTier> = config.sources().iter().map(|s| s.tier).collect();
        assert_eq!(
            tiers,
            vec![ConfigTier::Defaults, ConfigTier::Project, ConfigTier::User]
        );
    }

    #[test]
    fn test_explicit_path_replaces_user_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("user.yaml"), "model:\n  name: yolov8m\n").unwrap();
        let explicit = temp.path().join("explicit.yaml");
        std::fs::write(&explicit, "device:\n  type: cpu\n").unwrap();

        let mut config = manager(&temp);
        config.load(&LoadOptions::default().path(&explicit)).unwrap();

        assert_eq!(config.get("device.type").unwrap(), Some(&json!("cpu")));
        assert_eq!(config.get("model.name").unwrap(), Some(&json!("yolov8n")));
    }

    #[test]
    fn test_missing_explicit_path_is_skipped() {
        let temp = TempDir::new().unwrap();
        let mut config = manager(&temp);
        config
            .load(&LoadOptions::default().path(temp.path().join("absent.yaml")))
            .unwrap();
        assert_eq!(config.get_all().unwrap(), default_tree());
    }

    #[test]
    fn test_malformed_project_file_surfaces() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("project.yaml"), "model: [unclosed\n").unwrap();

        let mut config = manager(&temp);
        let err = config.load(&LoadOptions::default()).unwrap_err();
        let message = err.to_string();

        assert!(matches!(err, ConfigError::InvalidFile { .. }));
        assert!(message.contains("project.yaml"));
        assert!(message.contains("Hint:"));
        assert!(!config.is_loaded());
    }

    #[test]
    fn test_profile_applied_below_project() {
        let temp = TempDir::new().unwrap();
        let profiles = temp.path().join("profiles");
        std::fs::create_dir_all(&profiles).unwrap();
        std::fs::write(
            profiles.join("dev.yaml"),
            "model:\n  name: yolov8x\nlogging:\n  level: DEBUG\n",
        )
        .unwrap();
        std::fs::write(temp.path().join("project.yaml"), "model:\n  name: yolov8s\n").unwrap();

        let mut config = manager(&temp).with_profile("dev");
        config.load(&LoadOptions::default()).unwrap();

        assert_eq!(config.get("model.name").unwrap(), Some(&json!("yolov8s")));
        assert_eq!(config.get("logging.level").unwrap(), Some(&json!("DEBUG")));
    }

    #[test]
    fn test_load_events_carry_profile_span() {
        let temp = TempDir::new().unwrap();
        let profiles = temp.path().join("profiles");
        std::fs::create_dir_all(&profiles).unwrap();
        std::fs::write(profiles.join("dev.yaml"), "model:\n  name: yolov8x\n").unwrap();

        let sink = Captured::default();
        let mut config = manager(&temp).with_profile("dev");
        tracing::subscriber::with_default(sink.subscriber(), || {
            config.load(&LoadOptions::default()).unwrap();
        });

        let events = sink.events();
        assert!(
            events
                .iter()
                .any(|e| e["fields"]["message"] == json!("Applying profile 'dev'"))
        );
        for event in &events {
            assert_eq!(event["span"]["name"], json!("config_load"));
            assert_eq!(event["span"]["profile"], json!("dev"));
        }
    }

    #[test]
    fn test_load_option_profile_overrides_constructor_profile() {
        let temp = TempDir::new().unwrap();
        let profiles = temp.path().join("profiles");
        std::fs::create_dir_all(&profiles).unwrap();
        std::fs::write(profiles.join("prod.yaml"), "performance:\n  workers: 8\n").unwrap();

        let mut config = manager(&temp).with_profile("missing");
        config
            .load(&LoadOptions::default().profile("prod"))
            .unwrap();
        assert_eq!(config.get("performance.workers").unwrap(), Some(&json!(8)));
    }

    #[test]
    fn test_missing_profile_fails() {
        let temp = TempDir::new().unwrap();
        let mut config = manager(&temp).with_profile("staging");
        let err = config.load(&LoadOptions::default()).unwrap_err();

        assert!(matches!(err, ConfigError::Profile(_)));
        assert!(err.to_string().contains("staging"));
        assert!(!config.is_loaded());
    }

    #[test]
    fn test_env_overrides_win() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("user.yaml"), "model:\n  name: yolov8m\n").unwrap();

        let mut config = manager(&temp).with_env([
            ("EDGE_DETECTION_MODEL__NAME", "yolov8l"),
            ("EDGE_DETECTION_A__B", "5"),
        ]);
        config.load(&LoadOptions::default()).unwrap();

        assert_eq!(config.get("model.name").unwrap(), Some(&json!("yolov8l")));
        assert_eq!(config.get("a.b").unwrap(), Some(&json!(5)));
        let last = config.sources().last().unwrap();
        assert_eq!(last.tier, ConfigTier::Environment);
        assert_eq!(last.detail, "a.b, model.name");
    }

    #[test]
    fn test_custom_env_prefix() {
        let temp = TempDir::new().unwrap();
        let mut config = manager(&temp)
            .with_env_prefix("EDGE_TEST_")
            .with_env([
                ("EDGE_TEST_DEVICE__TYPE", "cpu"),
                ("EDGE_DETECTION_DEVICE__TYPE", "mps"),
            ]);
        config.load(&LoadOptions::default()).unwrap();
        assert_eq!(config.get("device.type").unwrap(), Some(&json!("cpu")));
    }

    #[test]
    fn test_validation_failure_keeps_tree() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("project.yaml"),
            "detection:\n  confidence_threshold: 1.5\n",
        )
        .unwrap();

        let mut config = manager(&temp);
        let err = config.load(&LoadOptions::default()).unwrap_err();

        assert!(matches!(err, ConfigError::Schema(_)));
        assert!(config.is_loaded());
        assert!(config.validated().is_none());
        assert_eq!(
            config.get("detection.confidence_threshold").unwrap(),
            Some(&json!(1.5))
        );
    }

    #[test]
    fn test_skip_validation() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("project.yaml"), "performance:\n  workers: 0\n").unwrap();

        let mut config = manager(&temp);
        config
            .load(&LoadOptions::default().skip_validation())
            .unwrap();
        assert!(config.validated().is_none());
        assert_eq!(config.get("performance.workers").unwrap(), Some(&json!(0)));
    }

    #[test]
    fn test_reload_resets_state() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project.yaml");
        std::fs::write(&project, "model:\n  name: yolov8s\n").unwrap();

        let mut config = manager(&temp);
        config.load(&LoadOptions::default()).unwrap();
        assert_eq!(config.get("model.name").unwrap(), Some(&json!("yolov8s")));

        std::fs::remove_file(&project).unwrap();
        config.load(&LoadOptions::default()).unwrap();
        assert_eq!(config.get("model.name").unwrap(), Some(&json!("yolov8n")));
        assert_eq!(config.sources().len(), 1);
    }

    #[test]
    fn test_get_all_is_a_copy() {
        let temp = TempDir::new().unwrap();
        let mut config = manager(&temp);
        config.load(&LoadOptions::default()).unwrap();

        let mut copy = config.get_all().unwrap();
        copy["model"]["name"] = json!("changed");
        assert_eq!(config.get("model.name").unwrap(), Some(&json!("yolov8n")));
    }
}
