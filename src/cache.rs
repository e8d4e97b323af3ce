use std::path::Path;

use anyhow::Context as _;

use crate::store::{read_json, write_json_atomic};

/// Loads `path` when it exists; otherwise runs `build`, persists the result
/// and returns it. A persisted file is never invalidated.
pub fn get_or_build<T, F>(path: &Path, build: F) -> anyhow::Result<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
    F: FnOnce() -> anyhow::Result<T>,
{
    if let Some(value) = read_json(path)? {
        tracing::info!(path = %path.display(), "loaded from file");
        return Ok(value);
    }

    tracing::info!(path = %path.display(), "building from scratch");
    let value = build().with_context(|| format!("build {}", path.display()))?;
    write_json_atomic(path, &value)?;
    tracing::info!(path = %path.display(), "wrote to file");
    Ok(value)
}
