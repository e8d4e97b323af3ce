use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::tier::Tier;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub id: String,
    pub tier: Tier,
    pub title: String,
    pub text: Vec<Section>,
    #[serde(default)]
    pub media: Vec<Media>,
    /// Tier -> id of the same topic at the other reading levels (never the
    /// article's own tier). Older corpora call this `aligned_ids`.
    #[serde(default, alias = "aligned_ids")]
    pub adjacent_ids: BTreeMap<Tier, String>,
    #[serde(default)]
    pub related_articles: Vec<String>,
    #[serde(default)]
    pub related_websites: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub htmls: Option<HtmlBundle>,
}

/// A headed run of paragraphs. Stored on disk as `[title, [paragraph, ...]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, Vec<String>)", into = "(String, Vec<String>)")]
pub struct Section {
    pub title: String,
    pub paragraphs: Vec<String>,
}

impl Section {
    pub fn new(title: impl Into<String>, paragraphs: Vec<String>) -> Self {
        Self {
            title: title.into(),
            paragraphs,
        }
    }
}

impl From<(String, Vec<String>)> for Section {
    fn from((title, paragraphs): (String, Vec<String>)) -> Self {
        Self { title, paragraphs }
    }
}

impl From<Section> for (String, Vec<String>) {
    fn from(section: Section) -> Self {
        (section.title, section.paragraphs)
    }
}

/// Raw page HTML an article was parsed from, kept so it can be re-parsed
/// offline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlBundle {
    pub text: String,
    pub media: String,
    pub related_articles: Vec<String>,
    pub related_websites: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    Image,
    Audio,
    Video,
}

impl MediaType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "IMAGE" => Some(Self::Image),
            "AUDIO" => Some(Self::Audio),
            "VIDEO" => Some(Self::Video),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMedia", into = "RawMedia")]
pub struct Media {
    pub title: String,
    pub caption: String,
    pub id: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Image {
        src: String,
        file_type: String,
    },
    Audio {
        src: String,
        file_type: String,
    },
    Video {
        transcript: String,
        video_id: String,
        manifest_url: String,
        file_type: String,
    },
}

impl MediaKind {
    pub fn media_type(&self) -> MediaType {
        match self {
            MediaKind::Image { .. } => MediaType::Image,
            MediaKind::Audio { .. } => MediaType::Audio,
            MediaKind::Video { .. } => MediaType::Video,
        }
    }

    pub fn file_type(&self) -> &str {
        match self {
            MediaKind::Image { file_type, .. }
            | MediaKind::Audio { file_type, .. }
            | MediaKind::Video { file_type, .. } => file_type,
        }
    }

    /// Downloadable source, if the media is a plain file.
    pub fn src(&self) -> Option<&str> {
        match self {
            MediaKind::Image { src, .. } | MediaKind::Audio { src, .. } => Some(src),
            MediaKind::Video { .. } => None,
        }
    }
}

impl Media {
    pub fn media_type(&self) -> MediaType {
        self.kind.media_type()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawMedia {
    #[serde(default)]
    title: String,
    #[serde(rename = "media-type")]
    media_type: MediaType,
    #[serde(default)]
    caption: String,
    #[serde(default)]
    id: String,
    data: RawMediaData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawMediaData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transcript: Option<String>,
    #[serde(rename = "video-id", default, skip_serializing_if = "Option::is_none")]
    video_id: Option<String>,
    #[serde(rename = "manifest-url", default, skip_serializing_if = "Option::is_none")]
    manifest_url: Option<String>,
    #[serde(rename = "file-type", default)]
    file_type: String,
}

impl TryFrom<RawMedia> for Media {
    type Error = String;

    fn try_from(raw: RawMedia) -> Result<Self, Self::Error> {
        let data = raw.data;
        let kind = match raw.media_type {
            MediaType::Image => MediaKind::Image {
                src: data.src.ok_or("IMAGE media without data.src")?,
                file_type: data.file_type,
            },
            MediaType::Audio => MediaKind::Audio {
                src: data.src.ok_or("AUDIO media without data.src")?,
                file_type: data.file_type,
            },
            MediaType::Video => MediaKind::Video {
                transcript: data.transcript.unwrap_or_default(),
                video_id: data.video_id.ok_or("VIDEO media without data.video-id")?,
                manifest_url: data.manifest_url.unwrap_or_default(),
                file_type: data.file_type,
            },
        };
        Ok(Self {
            title: raw.title,
            caption: raw.caption,
            id: raw.id,
            kind,
        })
    }
}

impl From<Media> for RawMedia {
    fn from(media: Media) -> Self {
        let media_type = media.media_type();
        let data = match media.kind {
            MediaKind::Image { src, file_type } | MediaKind::Audio { src, file_type } => {
                RawMediaData {
                    src: Some(src),
                    file_type,
                    ..RawMediaData::default()
                }
            }
            MediaKind::Video {
                transcript,
                video_id,
                manifest_url,
                file_type,
            } => RawMediaData {
                transcript: Some(transcript),
                video_id: Some(video_id),
                manifest_url: Some(manifest_url),
                file_type,
                ..RawMediaData::default()
            },
        };
        Self {
            title: media.title,
            media_type,
            caption: media.caption,
            id: media.id,
            data,
        }
    }
}

/// Projection of an [`Article`] kept in `metadata.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub id: String,
    pub url: String,
    pub tier: Tier,
    pub title: String,
    #[serde(default, alias = "aligned_ids")]
    pub adjacent_ids: BTreeMap<Tier, String>,
    pub path: PathBuf,
}

impl MetadataEntry {
    pub fn from_article(article: &Article, path: PathBuf) -> Self {
        Self {
            id: article.id.clone(),
            url: article.url.clone(),
            tier: article.tier,
            title: article.title.clone(),
            adjacent_ids: article.adjacent_ids.clone(),
            path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleSummary {
    pub title: String,
    pub url: String,
    pub sections: usize,
    pub words: usize,
    pub images: usize,
    pub videos: usize,
    pub audios: usize,
    pub related_articles: usize,
    pub related_websites: usize,
}

impl Article {
    pub fn summary(&self) -> ArticleSummary {
        let words = self
            .text
            .iter()
            .flat_map(|section| section.paragraphs.iter())
            .map(|paragraph| paragraph.split_whitespace().count())
            .sum();
        let count = |media_type: MediaType| {
            self.media
                .iter()
                .filter(|m| m.media_type() == media_type)
                .count()
        };
        ArticleSummary {
            title: self.title.clone(),
            url: self.url.clone(),
            sections: self.text.len(),
            words,
            images: count(MediaType::Image),
            videos: count(MediaType::Video),
            audios: count(MediaType::Audio),
            related_articles: self.related_articles.len(),
            related_websites: self.related_websites.len(),
        }
    }
}

impl fmt::Display for ArticleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", self.url)?;
        writeln!(
            f,
            "{} section(s) containing {} words",
            self.sections, self.words
        )?;
        writeln!(
            f,
            "{} piece(s) of media consisting of {} image(s), {} video(s), and {} audio(s)",
            self.images + self.videos + self.audios,
            self.images,
            self.videos,
            self.audios
        )?;
        write!(
            f,
            "{} related article(s) and {} related website(s)",
            self.related_articles, self.related_websites
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_json_uses_site_field_names() {
        let media = Media {
            title: "Lion".to_owned(),
            caption: "A lion".to_owned(),
            id: "123".to_owned(),
            kind: MediaKind::Image {
                src: "https://cdn.example.com/a/123.jpg".to_owned(),
                file_type: "jpg".to_owned(),
            },
        };
        let value = serde_json::to_value(&media).unwrap();
        assert_eq!(value["media-type"], "IMAGE");
        assert_eq!(value["data"]["src"], "https://cdn.example.com/a/123.jpg");
        assert_eq!(value["data"]["file-type"], "jpg");
        assert!(value["data"].get("video-id").is_none());
    }

    #[test]
    fn video_media_reads_from_disk_shape() {
        let json = r#"{
            "title": "Volcano",
            "media-type": "VIDEO",
            "caption": "",
            "id": "abc123",
            "data": {
                "transcript": "Lava flows.",
                "video-id": "abc123",
                "manifest-url": "https://content.jwplatform.com/manifests/abc123.m3u8",
                "file-type": "mp4"
            }
        }"#;
        let media: Media = serde_json::from_str(json).unwrap();
        assert_eq!(media.media_type(), MediaType::Video);
        assert_eq!(media.kind.file_type(), "mp4");
        assert_eq!(media.kind.src(), None);
    }

    #[test]
    fn image_without_src_is_rejected() {
        let json = r#"{"title":"x","media-type":"IMAGE","caption":"","id":"1","data":{"file-type":"png"}}"#;
        let err = serde_json::from_str::<Media>(json).unwrap_err().to_string();
        assert!(err.contains("without data.src"));
    }

    #[test]
    fn article_accepts_legacy_aligned_ids() {
        let json = r#"{
            "url": "https://kids.britannica.com/kids/article/cat/352902",
            "id": "352902",
            "tier": "kids",
            "title": "cat",
            "text": [["", ["Cats purr."]]],
            "aligned_ids": {"students": "273594", "scholars": "102"}
        }"#;
        let article: Article = serde_json::from_str(json).unwrap();
        assert_eq!(article.text, vec![Section::new("", vec!["Cats purr.".to_owned()])]);
        assert_eq!(article.adjacent_ids.get(&Tier::Students).map(String::as_str), Some("273594"));
        assert!(article.media.is_empty());

        let value = serde_json::to_value(&article).unwrap();
        assert!(value.get("adjacent_ids").is_some());
        assert!(value.get("aligned_ids").is_none());
        assert!(value.get("htmls").is_none());
    }

    #[test]
    fn summary_counts() {
        let article = Article {
            url: "https://kids.britannica.com/kids/article/cat/1".to_owned(),
            id: "1".to_owned(),
            tier: Tier::Kids,
            title: "cat".to_owned(),
            text: vec![
                Section::new("", vec!["one two three".to_owned()]),
                Section::new("More", vec!["four five".to_owned(), "six".to_owned()]),
            ],
            media: vec![Media {
                title: String::new(),
                caption: String::new(),
                id: "9".to_owned(),
                kind: MediaKind::Audio {
                    src: "https://cdn.example.com/9.mp3".to_owned(),
                    file_type: "mp3".to_owned(),
                },
            }],
            adjacent_ids: BTreeMap::new(),
            related_articles: vec!["a".to_owned(), "b".to_owned()],
            related_websites: Vec::new(),
            htmls: None,
        };
        let summary = article.summary();
        assert_eq!(summary.sections, 2);
        assert_eq!(summary.words, 6);
        assert_eq!(summary.audios, 1);
        let printed = summary.to_string();
        assert!(printed.contains("2 section(s) containing 6 words"));
        assert!(printed.contains("2 related article(s) and 0 related website(s)"));
    }
}
