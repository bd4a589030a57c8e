//! CLI configuration
//!
//! Read from an optional JSON file with camelCase keys, every key optional:
//!
//! ```json
//! {
//!   "build": { "verify": "always" },
//!   "lint": { "unusedDeclarations": "error" }
//! }
//! ```

use keel_ir::{BuildOptions, LintOptions};
use keel_semantic::BoundProgram;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a valid bound tree: {source}")]
    Tree {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no symbol named `{0}`")]
    UnknownSymbol(String),

    #[error("cannot serialize output: {0}")]
    Output(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub build: BuildOptions,
    pub lint: LintOptions,
}

impl Config {
    /// Loads `path`, or the defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = read(path)?;
        let config = serde_json::from_str(&text).map_err(|source| CliError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), ?config, "loaded configuration");
        Ok(config)
    }
}

pub fn read(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a bound tree serialized as JSON
pub fn load_program(path: &Path) -> Result<BoundProgram, CliError> {
    let text = read(path)?;
    serde_json::from_str(&text).map_err(|source| CliError::Tree {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_error::Level;
    use keel_ir::VerifyMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.lint.unused_declarations, Some(Level::Warning));
    }

    #[test]
    fn test_load_partial_config() {
        let file = write_temp(r#"{ "lint": { "unusedDeclarations": "error" } }"#);
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.lint.unused_declarations, Some(Level::Error));
        assert_eq!(config.build.verify, VerifyMode::Debug);
    }

    #[test]
    fn test_invalid_config_reports_path() {
        let file = write_temp(r#"{ "build": { "verify": "sometimes" } }"#);
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_program(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
    }

    #[test]
    fn test_load_program() {
        let file = write_temp(
            r#"{
                "targetScope": "subscription",
                "declarations": [
                    { "id": 1, "name": "rg", "kind": "resource",
                      "type": "Microsoft.Resources/resourceGroups@2022-09-01",
                      "value": { "id": 0, "kind": "object", "properties": [] } }
                ]
            }"#,
        );
        let program = load_program(file.path()).unwrap();
        assert_eq!(program.declarations.len(), 1);
        assert_eq!(program.declarations[0].name, "rg");
    }
}
