//! Named configuration profiles.
//!
//! A profile is a partial tree stored as `<name>.yaml` (or `.yml`) in the
//! profiles directory. `default` and `example` are reserved names and never
//! listed.

use super::files::{FileError, TREE_EXTENSIONS, find_with_extensions, read_tree_file};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Profile names that exist on disk but are not selectable.
pub const RESERVED_PROFILES: &[&str] = &["default", "example"];

/// Errors raised while loading a named profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("{}", render_not_found(.name, .path, .available))]
    NotFound {
        name: String,
        path: PathBuf,
        available: Vec<String>,
    },

    #[error("profile '{name}' at {} is not a valid configuration: {source}", .path.display())]
    InvalidFormat {
        name: String,
        path: PathBuf,
        #[source]
        source: FileError,
    },
}

fn render_not_found(name: &str, path: &Path, available: &[String]) -> String {
    let available = if available.is_empty() {
        "(none)".to_string()
    } else {
        available.join(", ")
    };
    format!(
        "profile '{name}' not found (looked for {})\n\
         Available profiles: {available}\n\
         Hint: create {} or pick one of the available profiles",
        path.display(),
        path.display(),
    )
}

/// Names of the selectable profiles in `dir`, sorted.
///
/// A missing directory has no profiles.
pub fn list_profiles(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut names = BTreeSet::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let recognized = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| TREE_EXTENSIONS.contains(&ext));
        if !recognized {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            && !RESERVED_PROFILES.contains(&stem)
        {
            names.insert(stem.to_string());
        }
    }
    names.into_iter().collect()
}

/// Load the profile `name` from `dir`.
pub fn load_profile(dir: &Path, name: &str) -> Result<Value, ProfileError> {
    let Some(path) = find_with_extensions(dir, name) else {
        return Err(ProfileError::NotFound {
            name: name.to_string(),
            path: dir.join(format!("{name}.{}", TREE_EXTENSIONS[0])),
            available: list_profiles(dir),
        });
    };

    read_tree_file(&path).map_err(|source| ProfileError::InvalidFormat {
        name: name.to_string(),
        path,
        source,
    })
}

/// Profile lookup rooted at one directory.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    /// Create a store over `dir`. The directory need not exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory searched for profile files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List selectable profile names, sorted, without reserved names.
    pub fn list(&self) -> Vec<String> {
        list_profiles(&self.dir)
    }

    /// Load profile `name` as a tree to merge over the defaults.
    pub fn load(&self, name: &str) -> Result<Value, ProfileError> {
        load_profile(&self.dir, name)
    }

    /// Check if a file for `name` exists, reserved names included.
    pub fn exists(&self, name: &str) -> bool {
        find_with_extensions(&self.dir, name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn profiles_dir(files: &[(&str, &str)]) -> TempDir {
        let temp = TempDir::new().unwrap();
        for (name, content) in files {
            std::fs::write(temp.path().join(name), content).unwrap();
        }
        temp
    }

    #[test]
    fn test_list_excludes_reserved_and_sorts() {
        let temp = profiles_dir(&[
            ("prod.yaml", ""),
            ("dev.yaml", ""),
            ("default.yaml", ""),
            ("example.yaml", ""),
        ]);
        assert_eq!(list_profiles(temp.path()), vec!["dev", "prod"]);
    }

    #[test]
    fn test_list_ignores_other_extensions_and_dedups() {
        let temp = profiles_dir(&[
            ("testing.yml", ""),
            ("testing.yaml", ""),
            ("notes.txt", ""),
            ("README.md", ""),
        ]);
        assert_eq!(list_profiles(temp.path()), vec!["testing"]);
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(list_profiles(&temp.path().join("nope")).is_empty());
    }

    #[test]
    fn test_load_profile_tree() {
        let temp = profiles_dir(&[("dev.yaml", "detection:\n  confidence_threshold: 0.1\n")]);
        let tree = load_profile(temp.path(), "dev").unwrap();
        assert_eq!(tree, json!({"detection": {"confidence_threshold": 0.1}}));
    }

    #[test]
    fn test_load_yml_extension() {
        let temp = profiles_dir(&[("edge.yml", "device:\n  type: cpu\n")]);
        let tree = load_profile(temp.path(), "edge").unwrap();
        assert_eq!(tree["device"]["type"], "cpu");
    }

    #[test]
    fn test_not_found_lists_available() {
        let temp = profiles_dir(&[("dev.yaml", ""), ("prod.yaml", "")]);
        let err = load_profile(temp.path(), "staging").unwrap_err();
        let message = err.to_string();

        assert!(matches!(err, ProfileError::NotFound { .. }));
        assert!(message.contains("'staging'"));
        assert!(message.contains("staging.yaml"));
        assert!(message.contains("dev, prod"));
        assert!(message.contains("Hint:"));
    }

    #[test]
    fn test_not_found_with_no_profiles() {
        let temp = TempDir::new().unwrap();
        let message = load_profile(temp.path(), "dev").unwrap_err().to_string();
        assert!(message.contains("(none)"));
    }

    #[test]
    fn test_invalid_format_scalar() {
        let temp = profiles_dir(&[("bad.yaml", "42\n")]);
        let err = load_profile(temp.path(), "bad").unwrap_err();
        assert!(matches!(
            err,
            ProfileError::InvalidFormat {
                source: FileError::NotAMapping { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_format_syntax_reports_location() {
        let temp = profiles_dir(&[("broken.yaml", "model:\n  name: \"yolov8n\n")]);
        let err = load_profile(temp.path(), "broken").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("broken"));
        assert!(message.contains("line"));
        assert!(message.contains("Hint:"));
    }

    #[test]
    fn test_store_wraps_directory() {
        let temp = profiles_dir(&[("dev.yaml", "model:\n  name: yolov8s\n")]);
        let store = ProfileStore::new(temp.path());
        assert!(store.exists("dev"));
        assert!(!store.exists("prod"));
        assert_eq!(store.list(), vec!["dev"]);
        assert_eq!(store.load("dev").unwrap()["model"]["name"], "yolov8s");
    }
}
