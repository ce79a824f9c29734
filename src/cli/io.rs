//! JSON I/O handling for CLI
//!
//! - Fixture: one JSON object `{collection: [documents]}`
//! - Input: a single JSON request on stdin
//! - Output: JSON lines on stdout

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::errors::{CliError, CliResult};
use crate::document::Document;
use crate::record::normalize_item_document;
use crate::store::{DocumentStore, MemoryStore};

const SOURCE_PREFIX: &str = "item_";

/// Loads a fixture file into a fresh store.
///
/// Source collections (`item_*`) are normalized on load.
pub async fn load_fixture(path: &Path) -> CliResult<MemoryStore> {
    let content = fs::read_to_string(path)
        .map_err(|e| CliError::fixture_error(format!("{}: {}", path.display(), e)))?;
    let collections: serde_json::Map<String, Value> = serde_json::from_str(&content)
        .map_err(|e| CliError::fixture_error(format!("{}: {}", path.display(), e)))?;

    let store = MemoryStore::new();
    for (name, documents) in collections {
        let Value::Array(documents) = documents else {
            return Err(CliError::fixture_error(format!("collection {} is not an array", name)));
        };
        let documents = if name.starts_with(SOURCE_PREFIX) {
            documents
                .into_iter()
                .map(normalize_item_document)
                .collect::<Result<Vec<Document>, _>>()
                .map_err(|e| CliError::fixture_error(format!("{}: {}", name, e)))?
        } else {
            documents
        };
        store
            .insert_many(&name, documents)
            .await
            .map_err(|e| CliError::fixture_error(e.to_string()))?;
    }
    Ok(store)
}

/// Read a JSON request from stdin
pub fn read_request<T: DeserializeOwned>() -> CliResult<T> {
    let stdin = io::stdin();
    let mut line = String::new();

    stdin.lock().read_line(&mut line)?;

    if line.trim().is_empty() {
        return Err(CliError::io_error("Empty input"));
    }

    Ok(serde_json::from_str(&line)?)
}

/// Write one JSON line to stdout
pub fn write_line(data: &Value) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, data)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    write_line(&serde_json::json!({
        "status": "ok",
        "data": data
    }))
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    write_line(&serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    }))
}
