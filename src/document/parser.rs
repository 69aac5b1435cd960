//! Stack document parser.
//!
//! This module handles loading the stack document from YAML files and
//! environment variables, with proper precedence and error handling.

use crate::error::{DocumentError, Result, StackformError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::StackDocument;

/// File names probed when no explicit document path is given.
const DEFAULT_DOCUMENT_NAMES: &[&str] = &["stack.yaml", "stack.yml", "stackform.yaml"];

/// Parser for loading stack documents.
#[derive(Debug, Default)]
pub struct DocumentParser;

impl DocumentParser {
    /// Creates a new document parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Loads a stack document from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<StackDocument> {
        let path = path.as_ref();
        info!("Loading stack document from: {}", path.display());

        if !path.exists() {
            return Err(StackformError::Document(DocumentError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            StackformError::Document(DocumentError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a stack document from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<StackDocument> {
        debug!("Parsing YAML stack document");

        let mut document: StackDocument = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            StackformError::Document(DocumentError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        Self::apply_env_overrides(&mut document);

        if document.resources.is_empty() {
            return Err(StackformError::Document(DocumentError::validation(
                "Stack document declares no resources",
                "resources",
            )));
        }

        debug!(
            "Successfully parsed stack document for: {}",
            document.stack.name
        );
        Ok(document)
    }

    /// Applies `STACKFORM_*` environment variable overrides.
    fn apply_env_overrides(document: &mut StackDocument) {
        if let Ok(name) = std::env::var("STACKFORM_STACK_NAME") {
            debug!("Overriding stack.name from environment");
            document.stack.name = name;
        }
        if let Ok(environment) = std::env::var("STACKFORM_ENVIRONMENT") {
            debug!("Overriding stack.environment from environment");
            document.stack.environment = environment;
        }
        if let Ok(path) = std::env::var("STACKFORM_STATE_PATH") {
            debug!("Overriding state.path from environment");
            document.state.path = Some(path);
        }
    }
}

/// Finds a stack document in the given directory, probing default names.
#[must_use]
pub fn find_document_file(dir: impl AsRef<Path>) -> Option<PathBuf> {
    let dir = dir.as_ref();
    DEFAULT_DOCUMENT_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.exists())
}
