#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Errors raised while loading an input document.
///
/// Any of these aborts the run before the first question is graded.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    /// The file could not be read at all.
    #[error("Could not read `{}`: {source}", path.display())]
    Io {
        /// Path that failed to open.
        path:   PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not well-formed structured data.
    #[error("`{origin}` is not well-formed JSON: {message}")]
    Parse {
        /// Name of the document being parsed.
        origin:  String,
        /// Parser diagnostic.
        message: String,
    },
    /// The file parsed but required fields are missing or malformed.
    #[error("`{origin}` does not match the expected schema: {message}")]
    Schema {
        /// Name of the document being validated.
        origin:  String,
        /// What was wrong.
        message: String,
    },
}

impl LoadError {
    /// Shorthand for a schema error.
    pub fn schema(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            origin:  origin.into(),
            message: message.into(),
        }
    }
}

/// Reads `path` to a string.
pub(crate) fn read_document(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses `text` as JSON, reporting syntax problems as [`LoadError::Parse`].
pub(crate) fn parse_json(origin: &str, text: &str) -> Result<Value, LoadError> {
    serde_json::from_str(text).map_err(|e| LoadError::Parse {
        origin:  origin.to_string(),
        message: e.to_string(),
    })
}

/// Extracts the list of entries from a document that is either a bare array
/// or an object holding the array under `key`.
pub(crate) fn document_entries(
    origin: &str,
    document: Value,
    key: &str,
) -> Result<Vec<Value>, LoadError> {
    match document {
        Value::Array(entries) => Ok(entries),
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(entries)) => Ok(entries),
            Some(_) => Err(LoadError::schema(origin, format!("`{key}` must be an array"))),
            None => Err(LoadError::schema(origin, format!("missing required field `{key}`"))),
        },
        _ => Err(LoadError::schema(origin, format!("expected an array or an object with `{key}`"))),
    }
}

/// Decodes one entry, reporting its position on failure.
pub(crate) fn decode_entry<T: DeserializeOwned>(
    origin: &str,
    what: &str,
    index: usize,
    entry: Value,
) -> Result<T, LoadError> {
    serde_json::from_value(entry)
        .map_err(|e| LoadError::schema(origin, format!("{what} #{}: {e}", index + 1)))
}
