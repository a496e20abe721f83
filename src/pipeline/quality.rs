//! Advisory quality score for a merged document.
//!
//! The score is a weighted blend of per-facet signals. Documents without a search vector have
//! their score halved since they cannot be retrieved.

use crate::document::{Document, Facet};
use serde::Serialize;

const TEXT_WEIGHT: f32 = 0.20;
const TRANSLATION_WEIGHT: f32 = 0.15;
const NLP_WEIGHT: f32 = 0.25;
const CATEGORY_WEIGHT: f32 = 0.15;
const SUMMARY_WEIGHT: f32 = 0.15;
const LANGUAGE_WEIGHT: f32 = 0.10;

/// Source text length at which the text signal saturates, in characters.
const FULL_TEXT_CHARS: usize = 300;

/// Reason a document scored lower than it could have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    /// Language could not be detected.
    UnknownLanguage,
    /// Cleaned source text is short.
    ShortText,
    /// No translation is stored.
    MissingTranslation,
    /// Few entities or keywords were extracted.
    SparseNlp,
    /// Category confidence is below 0.5 or no category is stored.
    WeakCategory,
    /// No summary, or a very short one.
    WeakSummary,
    /// No search vector; the score was halved.
    MissingEmbedding,
}

/// Overall score, tier, and flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityAssessment {
    /// Weighted score in `[0, 1]`.
    pub score: f32,
    /// 1 (score ≥ 0.85), 2 (score ≥ 0.70), or 3.
    pub tier: u8,
    /// Signals that pulled the score down.
    pub flags: Vec<QualityFlag>,
}

/// Assess `document`.
pub fn assess(document: &Document) -> QualityAssessment {
    let mut flags = Vec::new();

    let language = document.confidence(Facet::Language).unwrap_or(0.0);
    if matches!(document.detected_language.as_deref(), None | Some("unknown")) {
        flags.push(QualityFlag::UnknownLanguage);
    }

    let text_chars = document
        .source_text
        .as_deref()
        .map_or(0, |text| text.chars().count());
    let text = (text_chars as f32 / FULL_TEXT_CHARS as f32).min(1.0);
    if text < 1.0 {
        flags.push(QualityFlag::ShortText);
    }

    let translation = document.confidence(Facet::Translation).unwrap_or_else(|| {
        flags.push(QualityFlag::MissingTranslation);
        0.0
    });

    let entity_coverage = (document.entities().len() as f32 / 5.0).min(1.0);
    let keyword_coverage = (document.keywords().len() as f32 / 8.0).min(1.0);
    let nlp = entity_coverage * 0.6 + keyword_coverage * 0.4;
    if nlp < 0.5 {
        flags.push(QualityFlag::SparseNlp);
    }

    let category = document.confidence(Facet::Category).unwrap_or(0.0);
    if category < 0.5 {
        flags.push(QualityFlag::WeakCategory);
    }

    let summary = match document.summary() {
        Some(summary) if summary.chars().count() > 50 => 0.8,
        Some(_) => {
            flags.push(QualityFlag::WeakSummary);
            0.3
        }
        None => {
            flags.push(QualityFlag::WeakSummary);
            0.0
        }
    };

    let mut score = text * TEXT_WEIGHT
        + translation * TRANSLATION_WEIGHT
        + nlp * NLP_WEIGHT
        + category * CATEGORY_WEIGHT
        + summary * SUMMARY_WEIGHT
        + language * LANGUAGE_WEIGHT;
    if document.embedding().is_none() {
        flags.push(QualityFlag::MissingEmbedding);
        score *= 0.5;
    }
    let score = score.clamp(0.0, 1.0);

    QualityAssessment {
        score,
        tier: tier(score),
        flags,
    }
}

fn tier(score: f32) -> u8 {
    if score >= 0.85 {
        1
    } else if score >= 0.70 {
        2
    } else {
        3
    }
}
