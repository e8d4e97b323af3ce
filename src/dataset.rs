use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use once_cell::sync::OnceCell;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::cache;
use crate::formats::{Article, MetadataEntry};
use crate::stats::{self, CorpusStats};
use crate::store;
use crate::tier::Tier;

/// id -> [`MetadataEntry`], kept in insertion order. Persisted as a JSON
/// object keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<MetadataEntry>,
    index: HashMap<String, usize>,
}

impl Metadata {
    /// A repeated id keeps its first position and takes the later value.
    pub fn from_entries(entries: impl IntoIterator<Item = MetadataEntry>) -> Self {
        let mut metadata = Self::default();
        for entry in entries {
            metadata.insert(entry);
        }
        metadata
    }

    fn insert(&mut self, entry: MetadataEntry) {
        match self.index.get(&entry.id) {
            Some(&position) => self.entries[position] = entry,
            None => {
                self.index.insert(entry.id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&MetadataEntry> {
        self.index.get(id).map(|&position| &self.entries[position])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.id, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MetadataVisitor;

        impl<'de> Visitor<'de> for MetadataVisitor {
            type Value = Metadata;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of article id to metadata entry")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Metadata, A::Error> {
                let mut metadata = Metadata::default();
                while let Some((_, entry)) = access.next_entry::<String, MetadataEntry>()? {
                    metadata.insert(entry);
                }
                Ok(metadata)
            }
        }

        deserializer.deserialize_map(MetadataVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlignedTriple {
    pub kids: String,
    pub students: String,
    pub scholars: String,
}

impl AlignedTriple {
    pub fn id(&self, tier: Tier) -> &str {
        match tier {
            Tier::Kids => &self.kids,
            Tier::Students => &self.students,
            Tier::Scholars => &self.scholars,
        }
    }
}

/// Lazily walks metadata entries in order, anchoring a triple on each
/// kids-tier entry whose own id plus `adjacent_ids` covers all three tiers.
/// A triple is skipped when any of its ids was already emitted, so a kids
/// entry whose students or scholars id belongs to an earlier triple yields
/// no triple of its own.
pub struct AlignedTripleIds<'a> {
    entries: std::slice::Iter<'a, MetadataEntry>,
    seen: HashSet<&'a str>,
}

pub fn aligned_triple_ids(entries: &[MetadataEntry]) -> AlignedTripleIds<'_> {
    AlignedTripleIds {
        entries: entries.iter(),
        seen: HashSet::new(),
    }
}

impl<'a> Iterator for AlignedTripleIds<'a> {
    type Item = AlignedTriple;

    fn next(&mut self) -> Option<Self::Item> {
        for entry in self.entries.by_ref() {
            if entry.tier != Tier::Kids {
                continue;
            }

            let mut tier_to_id: BTreeMap<Tier, &'a str> = entry
                .adjacent_ids
                .iter()
                .map(|(tier, id)| (*tier, id.as_str()))
                .collect();
            tier_to_id.insert(Tier::Kids, entry.id.as_str());

            let (Some(&kids), Some(&students), Some(&scholars)) = (
                tier_to_id.get(&Tier::Kids),
                tier_to_id.get(&Tier::Students),
                tier_to_id.get(&Tier::Scholars),
            ) else {
                continue;
            };

            let ids = [kids, students, scholars];
            if ids.iter().any(|id| self.seen.contains(id)) {
                continue;
            }
            self.seen.extend(ids);

            return Some(AlignedTriple {
                kids: kids.to_owned(),
                students: students.to_owned(),
                scholars: scholars.to_owned(),
            });
        }
        None
    }
}

pub type ArticleTriple = (Option<Article>, Option<Article>, Option<Article>);

/// A local corpus laid out as `articles/{tier}/*.json` with derived
/// `metadata.json` and `stats.json` next to it.
pub struct Dataset {
    data_dir: PathBuf,
    paths: BTreeMap<Tier, Vec<PathBuf>>,
    metadata: OnceCell<Metadata>,
    path_index: OnceCell<HashMap<String, PathBuf>>,
    statistics: OnceCell<CorpusStats>,
}

impl Dataset {
    pub fn open(data_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();
        let mut paths = BTreeMap::new();
        for tier in Tier::ALL {
            paths.insert(tier, store::tier_article_paths(&data_dir, tier)?);
        }

        if paths.values().all(Vec::is_empty) {
            anyhow::bail!(
                "no articles found in {}; download the data first (`kbds fetch` or `kbds download`)",
                data_dir.display()
            );
        }

        Ok(Self {
            data_dir,
            paths,
            metadata: OnceCell::new(),
            path_index: OnceCell::new(),
            statistics: OnceCell::new(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn article_paths(&self, tier: Tier) -> &[PathBuf] {
        self.paths.get(&tier).map(Vec::as_slice).unwrap_or_default()
    }

    /// Kids, then students, then scholars.
    pub fn all_article_paths(&self) -> impl Iterator<Item = &PathBuf> + '_ {
        Tier::ALL
            .into_iter()
            .flat_map(|tier| self.article_paths(tier).iter())
    }

    pub fn tier_articles(&self, tier: Tier) -> impl Iterator<Item = anyhow::Result<Article>> + '_ {
        self.article_paths(tier)
            .iter()
            .map(|path| load_article(path))
    }

    pub fn articles(&self) -> impl Iterator<Item = anyhow::Result<Article>> + '_ {
        self.all_article_paths().map(|path| load_article(path))
    }

    /// Loads `metadata.json`, building and persisting it from the article
    /// files on first use.
    pub fn metadata(&self) -> anyhow::Result<&Metadata> {
        self.metadata.get_or_try_init(|| {
            cache::get_or_build(&store::metadata_path(&self.data_dir), || {
                self.build_metadata()
            })
        })
    }

    fn build_metadata(&self) -> anyhow::Result<Metadata> {
        let mut entries = Vec::new();
        for path in self.all_article_paths() {
            match load_article(path) {
                Ok(article) => entries.push(MetadataEntry::from_article(&article, path.clone())),
                Err(err) => {
                    tracing::warn!(path = %path.display(), ?err, "skipping unreadable article")
                }
            }
        }
        Ok(Metadata::from_entries(entries))
    }

    /// Errors when `id` is not in the metadata index. `Ok(None)` means the
    /// id is indexed but its file can no longer be found.
    pub fn article_by_id(&self, id: &str) -> anyhow::Result<Option<Article>> {
        let entry = self
            .metadata()?
            .get(id)
            .ok_or_else(|| anyhow::anyhow!("article id not in metadata: {id}"))?;
        match self.resolve_article_path(entry) {
            Some(path) => load_article(&path).map(Some),
            None => Ok(None),
        }
    }

    /// Exact sanitized file name first, then any file whose name starts with
    /// the id.
    fn resolve_article_path(&self, entry: &MetadataEntry) -> Option<PathBuf> {
        let exact = store::article_path(&self.data_dir, entry.tier, &entry.id, &entry.title);
        if exact.is_file() {
            return Some(exact);
        }
        self.path_index().get(&entry.id).cloned()
    }

    fn path_index(&self) -> &HashMap<String, PathBuf> {
        self.path_index.get_or_init(|| {
            self.all_article_paths()
                .filter_map(|path| Some((store::id_from_file_name(path)?, path.clone())))
                .collect()
        })
    }

    fn lookup(&self, metadata: &Metadata, id: &str) -> anyhow::Result<Option<Article>> {
        if metadata.contains(id) {
            self.article_by_id(id)
        } else {
            Ok(None)
        }
    }

    pub fn aligned_triple_ids(&self) -> anyhow::Result<AlignedTripleIds<'_>> {
        Ok(aligned_triple_ids(self.metadata()?.entries()))
    }

    /// Articles of each aligned triple; an id that was never downloaded is
    /// `None`.
    pub fn aligned_triples(
        &self,
    ) -> anyhow::Result<impl Iterator<Item = anyhow::Result<ArticleTriple>> + '_> {
        let metadata = self.metadata()?;
        Ok(self.aligned_triple_ids()?.map(move |triple| {
            Ok((
                self.lookup(metadata, &triple.kids)?,
                self.lookup(metadata, &triple.students)?,
                self.lookup(metadata, &triple.scholars)?,
            ))
        }))
    }

    /// The `tier` member of every aligned triple that is available locally.
    pub fn tier_aligned(
        &self,
        tier: Tier,
    ) -> anyhow::Result<impl Iterator<Item = anyhow::Result<Article>> + '_> {
        let metadata = self.metadata()?;
        Ok(self
            .aligned_triple_ids()?
            .filter_map(move |triple| self.lookup(metadata, triple.id(tier)).transpose()))
    }

    pub fn kids_aligned(&self) -> anyhow::Result<impl Iterator<Item = anyhow::Result<Article>> + '_> {
        self.tier_aligned(Tier::Kids)
    }

    pub fn students_aligned(
        &self,
    ) -> anyhow::Result<impl Iterator<Item = anyhow::Result<Article>> + '_> {
        self.tier_aligned(Tier::Students)
    }

    pub fn scholars_aligned(
        &self,
    ) -> anyhow::Result<impl Iterator<Item = anyhow::Result<Article>> + '_> {
        self.tier_aligned(Tier::Scholars)
    }

    /// Every available member of every aligned triple, kids then students
    /// then scholars within each triple.
    pub fn aligned(&self) -> anyhow::Result<impl Iterator<Item = anyhow::Result<Article>> + '_> {
        let metadata = self.metadata()?;
        Ok(self.aligned_triple_ids()?.flat_map(move |triple| {
            Tier::ALL
                .into_iter()
                .filter_map(|tier| self.lookup(metadata, triple.id(tier)).transpose())
                .collect::<Vec<_>>()
        }))
    }

    /// Ids referenced through `adjacent_ids` that are not in the metadata
    /// index, i.e. linked articles that were never downloaded.
    pub fn missing_aligned_ids(&self) -> anyhow::Result<Vec<(Tier, String)>> {
        let metadata = self.metadata()?;
        let missing: BTreeSet<(Tier, String)> = metadata
            .entries()
            .iter()
            .flat_map(|entry| entry.adjacent_ids.iter())
            .filter(|(_, id)| !metadata.contains(id))
            .map(|(tier, id)| (*tier, id.clone()))
            .collect();
        Ok(missing.into_iter().collect())
    }

    /// Writes the given articles into a fresh corpus at `new_data_dir`,
    /// skipping ids that are not available. Returns how many were written.
    pub fn copy_subset(&self, ids: &[String], new_data_dir: &Path) -> anyhow::Result<usize> {
        let metadata = self.metadata()?;
        store::make_directories(new_data_dir)?;
        let mut written = 0_usize;
        for id in ids {
            let Some(article) = self.lookup(metadata, id)? else {
                tracing::warn!(%id, "article not available; not copied");
                continue;
            };
            let path = store::article_path(new_data_dir, article.tier, &article.id, &article.title);
            store::write_json_atomic(&path, &article)?;
            written += 1;
        }
        tracing::info!(written, out = %new_data_dir.display(), "copied subset");
        Ok(written)
    }

    /// Loads `stats.json`, computing and persisting it on first use.
    pub fn statistics(&self) -> anyhow::Result<&CorpusStats> {
        self.statistics.get_or_try_init(|| {
            cache::get_or_build(&store::stats_path(&self.data_dir), || stats::compute(self))
        })
    }
}

pub fn load_article(path: &Path) -> anyhow::Result<Article> {
    store::read_json(path)?
        .with_context(|| format!("article file not found: {}", path.display()))
}
