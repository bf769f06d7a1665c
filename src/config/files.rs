//! Reading configuration trees from YAML files.
//!
//! Every config source (project file, user file, explicit path, profile)
//! goes through [`read_tree_file`], so they all share the same notion of
//! "missing", "empty" and "malformed".

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extensions recognized for config and profile files, in lookup order.
pub const TREE_EXTENSIONS: &[&str] = &["yaml", "yml"];

/// Hint attached to every YAML syntax error.
pub const YAML_SYNTAX_HINT: &str = "Hint: check the YAML syntax. Common causes are incorrect indentation \
     (use spaces, not tabs), a missing colon after a key, unmatched brackets or quotes, \
     and unquoted special characters such as ':', '#', '@' or '`'.";

/// Failure to turn a file into a configuration tree.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("cannot read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}\n{}", render_syntax(.line, .column, .message), YAML_SYNTAX_HINT)]
    Syntax {
        line: Option<usize>,
        column: Option<usize>,
        message: String,
    },

    #[error(
        "expected a mapping of sections at the top level, found {found}\n\
         Hint: a config file must start with section keys such as 'model:' or 'detection:'"
    )]
    NotAMapping { found: &'static str },
}

fn render_syntax(line: &Option<usize>, column: &Option<usize>, message: &str) -> String {
    match (*line, *column) {
        (Some(line), Some(column)) => {
            format!("syntax error at line {line}, column {column}: {message}")
        }
        (Some(line), None) => format!("syntax error at line {line}: {message}"),
        _ => format!("syntax error: {message}"),
    }
}

impl FileError {
    /// True when the underlying cause is a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FileError::Io(err) if err.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Short name of a JSON value's kind, for error messages.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// Parse YAML text into a configuration tree.
///
/// Empty and comment-only documents are an empty tree.
pub fn parse_tree(content: &str) -> Result<Value, FileError> {
    let parsed: Option<Value> = serde_yaml::from_str(content).map_err(|err| {
        let location = err.location();
        FileError::Syntax {
            line: location.as_ref().map(|l| l.line()),
            column: location.as_ref().map(|l| l.column()),
            message: err.to_string(),
        }
    })?;

    match parsed {
        None | Some(Value::Null) => Ok(Value::Object(Map::new())),
        Some(tree @ Value::Object(_)) => Ok(tree),
        Some(other) => Err(FileError::NotAMapping {
            found: kind_name(&other),
        }),
    }
}

/// Read and parse a YAML file into a configuration tree.
pub fn read_tree_file(path: &Path) -> Result<Value, FileError> {
    let content = std::fs::read_to_string(path)?;
    parse_tree(&content)
}

/// Find `<dir>/<stem>.<ext>` for the first recognized extension that exists.
pub fn find_with_extensions(dir: &Path, stem: &str) -> Option<PathBuf> {
    TREE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|path| path.is_file())
}
