use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cli::DataArgs;
use crate::dataset::Dataset;
use crate::formats::Article;
use crate::tier::Tier;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierStats {
    pub n_articles: usize,
    pub n_paragraphs: usize,
    pub n_sentences: usize,
    pub n_tokens: usize,
    pub n_unique_tokens: usize,
    pub avg_paragraphs_per_article: f64,
    pub avg_sentences_per_article: f64,
    pub avg_tokens_per_article: f64,
    pub avg_tokens_per_sentence: f64,
}

/// Raw distributions behind [`TierStats`], one value per article (or per
/// sentence for `sentence_lengths`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierStructures {
    pub paragraph_counts: Vec<usize>,
    pub sentence_counts: Vec<usize>,
    pub token_counts: Vec<usize>,
    pub sentence_lengths: Vec<usize>,
    pub token_frequencies: BTreeMap<String, usize>,
}

/// Stored in `stats.json` as `[stats, structures]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StatsPair", into = "StatsPair")]
pub struct CorpusStats {
    pub stats: BTreeMap<Tier, TierStats>,
    pub structures: BTreeMap<Tier, TierStructures>,
}

type StatsPair = (BTreeMap<Tier, TierStats>, BTreeMap<Tier, TierStructures>);

impl From<StatsPair> for CorpusStats {
    fn from((stats, structures): StatsPair) -> Self {
        Self { stats, structures }
    }
}

impl From<CorpusStats> for StatsPair {
    fn from(corpus: CorpusStats) -> Self {
        (corpus.stats, corpus.structures)
    }
}

/// Splits a paragraph into sentences of normalized tokens. A sentence ends
/// at a word closing with `.`, `!` or `?`.
pub fn tokenize(paragraph: &str) -> Vec<Vec<String>> {
    let mut sentences = Vec::new();
    let mut current = Vec::new();

    for word in paragraph.split_whitespace() {
        let token: String = word
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if !token.is_empty() {
            current.push(token);
        }

        let tail = word.trim_end_matches(['"', '\'', ')', ']', '\u{201d}', '\u{2019}']);
        if tail.ends_with(['.', '!', '?']) && !current.is_empty() {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        sentences.push(current);
    }
    sentences
}

fn average(total: usize, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    structures: TierStructures,
}

impl Accumulator {
    fn add(&mut self, article: &Article) {
        let mut paragraphs = 0;
        let mut sentences = 0;
        let mut tokens = 0;

        for paragraph in article.text.iter().flat_map(|s| s.paragraphs.iter()) {
            paragraphs += 1;
            for sentence in tokenize(paragraph) {
                sentences += 1;
                tokens += sentence.len();
                self.structures.sentence_lengths.push(sentence.len());
                for token in sentence {
                    *self.structures.token_frequencies.entry(token).or_default() += 1;
                }
            }
        }

        self.structures.paragraph_counts.push(paragraphs);
        self.structures.sentence_counts.push(sentences);
        self.structures.token_counts.push(tokens);
    }

    fn finish(self) -> (TierStats, TierStructures) {
        let s = &self.structures;
        let n_articles = s.paragraph_counts.len();
        let n_paragraphs = s.paragraph_counts.iter().sum();
        let n_sentences = s.sentence_lengths.len();
        let n_tokens = s.token_counts.iter().sum();

        let stats = TierStats {
            n_articles,
            n_paragraphs,
            n_sentences,
            n_tokens,
            n_unique_tokens: s.token_frequencies.len(),
            avg_paragraphs_per_article: average(n_paragraphs, n_articles),
            avg_sentences_per_article: average(n_sentences, n_articles),
            avg_tokens_per_article: average(n_tokens, n_articles),
            avg_tokens_per_sentence: average(n_tokens, n_sentences),
        };
        (stats, self.structures)
    }
}

pub fn tier_stats<'a>(articles: impl IntoIterator<Item = &'a Article>) -> (TierStats, TierStructures) {
    let mut acc = Accumulator::default();
    for article in articles {
        acc.add(article);
    }
    acc.finish()
}

pub fn compute(dataset: &Dataset) -> anyhow::Result<CorpusStats> {
    let mut corpus = CorpusStats::default();
    for tier in Tier::ALL {
        let mut acc = Accumulator::default();
        for article in dataset.tier_articles(tier) {
            acc.add(&article?);
        }
        let (stats, structures) = acc.finish();
        tracing::info!(%tier, articles = stats.n_articles, tokens = stats.n_tokens, "tier statistics");
        corpus.stats.insert(tier, stats);
        corpus.structures.insert(tier, structures);
    }
    Ok(corpus)
}

impl fmt::Display for CorpusStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<10} {:>9} {:>11} {:>10} {:>11} {:>9} {:>10} {:>12}",
            "tier", "articles", "paragraphs", "sentences", "tokens", "unique", "tok/sent", "tok/article"
        )?;
        for (tier, s) in &self.stats {
            writeln!(
                f,
                "{:<10} {:>9} {:>11} {:>10} {:>11} {:>9} {:>10.2} {:>12.2}",
                tier.as_str(),
                s.n_articles,
                s.n_paragraphs,
                s.n_sentences,
                s.n_tokens,
                s.n_unique_tokens,
                s.avg_tokens_per_sentence,
                s.avg_tokens_per_article
            )?;
        }
        Ok(())
    }
}

pub fn run(args: DataArgs) -> anyhow::Result<()> {
    let dataset = Dataset::open(&args.data_dir)?;
    let corpus = dataset.statistics()?;
    print!("{corpus}");
    for (tier, structures) in &corpus.structures {
        let top: Vec<String> = top_tokens(structures, 10)
            .into_iter()
            .map(|(token, count)| format!("{token} ({count})"))
            .collect();
        println!("{tier} top tokens: {}", top.join(", "));
    }
    Ok(())
}

/// Most frequent tokens of a tier, ties broken alphabetically.
pub fn top_tokens(structures: &TierStructures, n: usize) -> Vec<(&str, usize)> {
    let mut tokens: Vec<(&str, usize)> = structures
        .token_frequencies
        .iter()
        .map(|(token, count)| (token.as_str(), *count))
        .collect();
    tokens.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    tokens.truncate(n);
    tokens
}
