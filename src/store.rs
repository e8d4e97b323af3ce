use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use unicode_normalization::UnicodeNormalization as _;
use unicode_normalization::char::is_combining_mark;

use crate::tier::Tier;

pub fn articles_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("articles")
}

pub fn tier_dir(data_dir: &Path, tier: Tier) -> PathBuf {
    articles_dir(data_dir).join(tier.as_str())
}

pub fn media_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("media")
}

pub fn metadata_path(data_dir: &Path) -> PathBuf {
    data_dir.join("metadata.json")
}

pub fn urls_path(data_dir: &Path) -> PathBuf {
    data_dir.join("urls.json")
}

pub fn stats_path(data_dir: &Path) -> PathBuf {
    data_dir.join("stats.json")
}

/// Strips diacritics and drops every character outside letters, digits,
/// space and `. , ; '`.
pub fn sanitize_filename(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | ',' | ';' | '\''))
        .collect()
}

/// Sanitized `"{id} {title}"`, the stem shared by article files and media
/// folders.
pub fn article_stem(id: &str, title: &str) -> String {
    sanitize_filename(&format!("{id} {title}"))
}

pub fn article_path(data_dir: &Path, tier: Tier, id: &str, title: &str) -> PathBuf {
    tier_dir(data_dir, tier).join(format!("{}.json", article_stem(id, title)))
}

/// Id prefix of a stored article file name (`"352902 cat.json"` -> `352902`).
pub fn id_from_file_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let id = stem.split(' ').next()?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_owned())
    }
}

pub fn make_directories(data_dir: &Path) -> anyhow::Result<()> {
    for tier in Tier::ALL {
        let dir = tier_dir(data_dir, tier);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create articles dir: {}", dir.display()))?;
    }
    let media = media_dir(data_dir);
    std::fs::create_dir_all(&media)
        .with_context(|| format!("create media dir: {}", media.display()))?;
    Ok(())
}

/// Article JSON files of one tier, sorted by file name.
pub fn tier_article_paths(data_dir: &Path, tier: Tier) -> anyhow::Result<Vec<PathBuf>> {
    let dir = tier_dir(data_dir, tier);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("read articles dir: {}", dir.display()));
        }
    };

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read articles dir: {}", dir.display()))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        paths.push(path);
    }
    paths.sort();
    Ok(paths)
}

/// Ids of every article already persisted under `articles/*/`.
pub fn saved_ids(data_dir: &Path) -> anyhow::Result<HashSet<String>> {
    let mut ids = HashSet::new();
    for tier in Tier::ALL {
        for path in tier_article_paths(data_dir, tier)? {
            if let Some(id) = id_from_file_name(&path) {
                ids.insert(id);
            }
        }
    }
    Ok(ids)
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("read: {}", path.display())),
    };
    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse json: {}", path.display()))?;
    Ok(Some(value))
}

pub fn write_json_atomic<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec(value).context("serialize json")?;
    std::fs::write(&tmp_path, &data)
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

pub async fn write_json_atomic_async<T: serde::Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    tokio::fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec(value).context("serialize json")?;
    tokio::fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | ',' | ';' | '\'')
    }

    #[test]
    fn sanitize_strips_diacritics_and_symbols() {
        let out = sanitize_filename("Günther & Søn");
        assert!(out.chars().all(allowed), "{out:?}");
        // `ø` has no decomposition, so it is dropped rather than folded.
        assert_eq!(out, "Gunther  Sn");
    }

    #[test]
    fn sanitize_keeps_permitted_punctuation() {
        assert_eq!(
            sanitize_filename("12 Côte d'Ivoire, Part 1.; (map)"),
            "12 Cote d'Ivoire, Part 1.; map"
        );
    }

    #[test]
    fn article_path_is_prefixed_by_id() -> anyhow::Result<()> {
        let path = article_path(Path::new("data"), Tier::Students, "273594", "Cat/Felis?");
        assert_eq!(
            path,
            PathBuf::from("data/articles/students/273594 CatFelis.json")
        );
        assert_eq!(id_from_file_name(&path).as_deref(), Some("273594"));
        Ok(())
    }

    #[test]
    fn saved_ids_reads_file_name_prefixes() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        make_directories(temp.path())?;
        std::fs::write(tier_dir(temp.path(), Tier::Kids).join("1 a.json"), "{}")?;
        std::fs::write(tier_dir(temp.path(), Tier::Scholars).join("22 b c.json"), "{}")?;
        std::fs::write(tier_dir(temp.path(), Tier::Scholars).join("notes.txt"), "")?;

        let ids = saved_ids(temp.path())?;
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("1"));
        assert!(ids.contains("22"));
        Ok(())
    }

    #[test]
    fn json_round_trip_through_atomic_write() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("nested").join("urls.json");
        assert!(read_json::<Vec<String>>(&path)?.is_none());

        write_json_atomic(&path, &vec!["a".to_owned()])?;
        let back: Option<Vec<String>> = read_json(&path)?;
        assert_eq!(back, Some(vec!["a".to_owned()]));

        let leftovers = std::fs::read_dir(path.parent().unwrap())?.count();
        assert_eq!(leftovers, 1);
        Ok(())
    }
}
