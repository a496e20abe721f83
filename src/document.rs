//! Document and facet data model shared by every pipeline layer.
//!
//! A [`Document`] owns one optional [`FacetSlot`] per [`Facet`]. Slots are only ever built from
//! a complete value, so a facet is either absent or fully populated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Derived attribute computed by one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    /// Cleaned source text plus detected language.
    Language,
    /// English rendition of the source text.
    Translation,
    /// Named entities found in the source text.
    Entities,
    /// Ranked keywords.
    Keywords,
    /// Topical category label.
    Category,
    /// Geographic focus of the document.
    Location,
    /// Short summary of the translated text.
    Summary,
    /// Overall sentiment.
    Sentiment,
    /// Search vector.
    Embedding,
}

impl Facet {
    /// Every facet in declaration order.
    pub const ALL: [Facet; 9] = [
        Facet::Language,
        Facet::Translation,
        Facet::Entities,
        Facet::Keywords,
        Facet::Category,
        Facet::Location,
        Facet::Summary,
        Facet::Sentiment,
        Facet::Embedding,
    ];

    /// Stable name used in logs, storage, and requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Language => "language",
            Self::Translation => "translation",
            Self::Entities => "entities",
            Self::Keywords => "keywords",
            Self::Category => "category",
            Self::Location => "location",
            Self::Summary => "summary",
            Self::Sentiment => "sentiment",
            Self::Embedding => "embedding",
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a request names a facet the pipeline does not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown facet '{0}'")]
pub struct FacetParseError(pub String);

impl FromStr for Facet {
    type Err = FacetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "language" | "lang" | "preprocess" | "preprocessing" => Ok(Self::Language),
            "translation" | "translate" => Ok(Self::Translation),
            "entities" | "entity" | "ner" => Ok(Self::Entities),
            "keywords" | "keyword" => Ok(Self::Keywords),
            "category" | "classification" => Ok(Self::Category),
            "location" | "locations" => Ok(Self::Location),
            "summary" | "summarize" | "summarization" => Ok(Self::Summary),
            "sentiment" => Ok(Self::Sentiment),
            "embedding" | "embeddings" | "vector" => Ok(Self::Embedding),
            _ => Err(FacetParseError(s.to_string())),
        }
    }
}

/// Detected language and the cleaned text it was detected on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageInfo {
    /// ISO-639-1 code, or `unknown`.
    pub code: String,
    /// Text after boilerplate and markup cleanup.
    pub source_text: String,
    /// SHA-256 of the cleaned text, hex encoded.
    pub content_hash: String,
}

/// English rendition of the source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    /// Translated body.
    pub text: String,
    /// Language the text was translated from.
    pub source_language: String,
    /// Language the text was translated into.
    pub target_language: String,
}

/// Named entity mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Surface form as it appears in the text.
    pub text: String,
    /// Coarse type such as `PERSON`, `ORG`, `LOC`, or `MISC`.
    pub label: String,
}

/// Resolved geographic focus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// City, when resolved.
    pub city: Option<String>,
    /// State or region, when resolved.
    pub state: Option<String>,
    /// Lowercase country name, or `global`.
    pub country: String,
    /// Lowercase continent name, or `global`.
    pub continent: String,
}

/// Polarity bucket of a sentiment score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    /// Favourable tone.
    Positive,
    /// Unfavourable tone.
    Negative,
    /// Neither.
    Neutral,
}

/// Sentiment verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    /// Polarity bucket.
    pub label: SentimentLabel,
    /// Signed polarity in `[-1, 1]`.
    pub score: f32,
}

/// Value carried by a facet slot. The variant always matches the slot's [`Facet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum FacetValue {
    /// See [`Facet::Language`].
    Language(LanguageInfo),
    /// See [`Facet::Translation`].
    Translation(Translation),
    /// See [`Facet::Entities`].
    Entities(Vec<Entity>),
    /// See [`Facet::Keywords`].
    Keywords(Vec<String>),
    /// See [`Facet::Category`].
    Category(String),
    /// See [`Facet::Location`].
    Location(Location),
    /// See [`Facet::Summary`].
    Summary(String),
    /// See [`Facet::Sentiment`].
    Sentiment(Sentiment),
    /// See [`Facet::Embedding`].
    Embedding(Vec<f32>),
}

impl FacetValue {
    /// Facet this value belongs to.
    pub fn facet(&self) -> Facet {
        match self {
            Self::Language(_) => Facet::Language,
            Self::Translation(_) => Facet::Translation,
            Self::Entities(_) => Facet::Entities,
            Self::Keywords(_) => Facet::Keywords,
            Self::Category(_) => Facet::Category,
            Self::Location(_) => Facet::Location,
            Self::Summary(_) => Facet::Summary,
            Self::Sentiment(_) => Facet::Sentiment,
            Self::Embedding(_) => Facet::Embedding,
        }
    }
}

/// Fully populated facet value together with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetSlot {
    /// Computed value.
    pub value: FacetValue,
    /// Normalised confidence in `[0, 1]`.
    pub confidence: f32,
    /// Method tag of the adapter that produced the value.
    pub method: String,
    /// RFC 3339 timestamp of when the adapter produced the value.
    pub computed_at: String,
}

impl FacetSlot {
    /// Facet this slot fills.
    pub fn facet(&self) -> Facet {
        self.value.facet()
    }
}

/// Coarse enrichment progress of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisState {
    /// No facet has been computed yet.
    Pending,
    /// Some facets are populated.
    Partial,
    /// Every facet slot is populated.
    Complete,
}

/// Unit of analysis persisted by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier.
    pub id: String,
    /// Text as submitted by the caller.
    pub raw_text: String,
    /// Optional headline, used when composing the search-vector input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Language code mirrored from the language facet.
    #[serde(default)]
    pub detected_language: Option<String>,
    /// Cleaned text mirrored from the language facet.
    #[serde(default)]
    pub source_text: Option<String>,
    #[serde(default)]
    facets: BTreeMap<Facet, FacetSlot>,
    /// Enrichment progress derived from the populated slots.
    pub analysis_state: AnalysisState,
}

impl Document {
    /// Create a freshly ingested document with empty facet slots.
    pub fn new(id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw_text: raw_text.into(),
            title: None,
            detected_language: None,
            source_text: None,
            facets: BTreeMap::new(),
            analysis_state: AnalysisState::Pending,
        }
    }

    /// Attach a headline.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Stored slot for `facet`, if populated.
    pub fn slot(&self, facet: Facet) -> Option<&FacetSlot> {
        self.facets.get(&facet)
    }

    /// Iterate populated slots in facet order.
    pub fn slots(&self) -> impl Iterator<Item = &FacetSlot> {
        self.facets.values()
    }

    /// Stored confidence for `facet`, if populated.
    pub fn confidence(&self, facet: Facet) -> Option<f32> {
        self.slot(facet).map(|slot| slot.confidence)
    }

    /// Install `slot` into the position its value dictates, replacing any previous slot.
    pub fn install(&mut self, slot: FacetSlot) {
        if let FacetValue::Language(info) = &slot.value {
            self.detected_language = Some(info.code.clone());
            self.source_text = Some(info.source_text.clone());
        }
        self.facets.insert(slot.facet(), slot);
        self.refresh_state();
    }

    /// Recompute [`AnalysisState`] from the populated slots.
    pub fn refresh_state(&mut self) {
        self.analysis_state = if self.facets.is_empty() {
            AnalysisState::Pending
        } else if Facet::ALL.iter().all(|facet| self.facets.contains_key(facet)) {
            AnalysisState::Complete
        } else {
            AnalysisState::Partial
        };
    }

    /// Translated text, if the translation slot is populated.
    pub fn translated_text(&self) -> Option<&str> {
        match self.slot(Facet::Translation).map(|slot| &slot.value) {
            Some(FacetValue::Translation(translation)) => Some(translation.text.as_str()),
            _ => None,
        }
    }

    /// Entities, or an empty list when the slot is absent.
    pub fn entities(&self) -> &[Entity] {
        match self.slot(Facet::Entities).map(|slot| &slot.value) {
            Some(FacetValue::Entities(entities)) => entities,
            _ => &[],
        }
    }

    /// Keywords, or an empty list when the slot is absent.
    pub fn keywords(&self) -> &[String] {
        match self.slot(Facet::Keywords).map(|slot| &slot.value) {
            Some(FacetValue::Keywords(keywords)) => keywords,
            _ => &[],
        }
    }

    /// Summary text, if populated.
    pub fn summary(&self) -> Option<&str> {
        match self.slot(Facet::Summary).map(|slot| &slot.value) {
            Some(FacetValue::Summary(summary)) => Some(summary.as_str()),
            _ => None,
        }
    }

    /// Search vector, if populated.
    pub fn embedding(&self) -> Option<&[f32]> {
        match self.slot(Facet::Embedding).map(|slot| &slot.value) {
            Some(FacetValue::Embedding(vector)) => Some(vector.as_slice()),
            _ => None,
        }
    }
}

/// Current UTC time formatted as RFC 3339.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}
