//! Text helpers shared by the local heuristic adapters.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::LazyLock;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("html regex"));
static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://\S+").expect("url regex"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.-]+@[\w.-]+\.\w+").expect("email regex"));
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{9,12}\b").expect("phone regex"));
static BOILERPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^.*(©\s*copyright|all rights reserved|read more|subscribe to|disponible en todas las plataformas|escúchanos en).*$",
    )
    .expect("boilerplate regex")
});
static INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\r\n]+").expect("space regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n(\s*\n)+").expect("blank line regex"));

/// Strip markup, links, contact details, and syndication boilerplate.
pub(crate) fn clean_text(raw: &str) -> String {
    let text = HTML_TAG.replace_all(raw, " ");
    let text = URL.replace_all(&text, " ");
    let text = EMAIL.replace_all(&text, " ");
    let text = PHONE.replace_all(&text, " ");
    let text = BOILERPLATE.replace_all(&text, "");
    let text: String = text
        .chars()
        .filter(|c| !matches!(*c, '\u{FE00}'..='\u{FE0F}' | '\u{200D}'))
        .collect();
    let text = INLINE_SPACE.replace_all(&text, " ");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Deterministic SHA-256 digest of `text`, hex encoded.
pub(crate) fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

const LATIN_MARKERS: [(&str, &[&str]); 5] = [
    (
        "en",
        &[
            "the", "and", "of", "to", "in", "is", "that", "for", "with", "was", "on", "are",
        ],
    ),
    (
        "es",
        &[
            "el", "la", "de", "que", "y", "en", "los", "las", "por", "con", "una", "para",
        ],
    ),
    (
        "fr",
        &[
            "le", "la", "les", "de", "et", "des", "est", "une", "dans", "pour", "qui", "du",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "und", "das", "ist", "nicht", "mit", "den", "ein", "zu", "von", "sich",
        ],
    ),
    (
        "pt",
        &[
            "o", "a", "de", "que", "e", "do", "da", "em", "um", "para", "com", "não",
        ],
    ),
];

/// Detect the dominant language of `text`.
///
/// Non-Latin scripts are mapped by Unicode block; Latin text is scored by stop-word overlap.
/// Returns `("unknown", 0.4)` when no signal is found.
pub(crate) fn detect_language(text: &str) -> (String, f32) {
    let mut scripts = [0usize; 7];
    let mut letters = 0usize;
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        let slot = match c {
            '\u{0900}'..='\u{097F}' => 1,
            '\u{0600}'..='\u{06FF}' => 2,
            '\u{0400}'..='\u{04FF}' => 3,
            '\u{3040}'..='\u{30FF}' => 4,
            '\u{AC00}'..='\u{D7AF}' | '\u{1100}'..='\u{11FF}' => 5,
            '\u{4E00}'..='\u{9FFF}' => 6,
            _ => 0,
        };
        scripts[slot] += 1;
    }
    if letters == 0 {
        return ("unknown".into(), 0.4);
    }

    // Kana outranks Han so mixed Japanese text is not classified as Chinese.
    let non_latin = [(4, "ja"), (1, "hi"), (2, "ar"), (3, "ru"), (5, "ko"), (6, "zh")];
    if scripts[4] > 0 && scripts[4] + scripts[6] > scripts[0] {
        let share = (scripts[4] + scripts[6]) as f32 / letters as f32;
        return ("ja".into(), share.clamp(0.5, 1.0));
    }
    if let Some((slot, code)) = non_latin
        .iter()
        .filter(|(slot, _)| *slot != 4)
        .max_by_key(|(slot, _)| scripts[*slot])
        .filter(|(slot, _)| scripts[*slot] > scripts[0])
    {
        let share = scripts[*slot] as f32 / letters as f32;
        return ((*code).into(), share.clamp(0.5, 1.0));
    }

    let words = tokenize_words(text);
    if words.is_empty() {
        return ("unknown".into(), 0.4);
    }
    let (code, hits) = LATIN_MARKERS
        .iter()
        .map(|(code, markers)| {
            let hits = words
                .iter()
                .filter(|word| markers.contains(&word.as_str()))
                .count();
            (*code, hits)
        })
        .max_by_key(|(_, hits)| *hits)
        .unwrap_or(("unknown", 0));
    if hits == 0 {
        return ("unknown".into(), 0.4);
    }
    let coverage = hits as f32 / words.len() as f32;
    (code.into(), (0.6 + coverage * 2.0).min(1.0))
}

/// Text labelled English that still carries many non-ASCII characters in its opening.
pub(crate) fn looks_non_english(text: &str) -> bool {
    text.chars().take(500).filter(|c| !c.is_ascii()).count() > 20
}

/// Lowercase alphabetic words.
pub(crate) fn tokenize_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|word| word.trim_matches('\'').to_lowercase())
        .filter(|word| !word.is_empty() && word.chars().any(char::is_alphabetic))
        .collect()
}

pub(crate) static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be",
        "been", "before", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had",
        "has", "have", "he", "her", "his", "how", "i", "if", "in", "into", "is", "it", "its",
        "just", "more", "most", "new", "no", "not", "of", "on", "one", "or", "other", "our",
        "out", "over", "said", "says", "she", "so", "some", "than", "that", "the", "their",
        "them", "then", "there", "these", "they", "this", "those", "to", "two", "up", "us",
        "was", "we", "were", "what", "when", "where", "which", "while", "who", "will", "with",
        "would", "you", "your",
    ]
    .into_iter()
    .collect()
});

/// Split text into trimmed, non-empty sentences.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    text.split_inclusive(['.', '!', '?', '।', '。', '\n'])
        .map(str::trim)
        .filter(|sentence| sentence.chars().any(char::is_alphanumeric))
        .collect()
}

/// Build a deterministic extractive summary bounded by a word budget.
///
/// Leading sentences are kept in order until the budget would be exceeded. The first sentence
/// is always kept, truncated if it alone exceeds the budget.
pub(crate) fn extractive_summary(text: &str, max_words: usize) -> String {
    let mut picked = Vec::new();
    let mut used_words = 0usize;

    for sentence in split_sentences(text) {
        let words = count_words(sentence);
        if !picked.is_empty() && used_words + words > max_words {
            break;
        }
        if picked.is_empty() && words > max_words {
            let truncated = sentence
                .split_whitespace()
                .take(max_words)
                .collect::<Vec<_>>()
                .join(" ");
            picked.push(format!("{truncated}…"));
            break;
        }
        used_words += words;
        picked.push(sentence.to_string());
        if used_words >= max_words {
            break;
        }
    }

    picked.join(" ")
}

/// Truncate to at most `max_chars` characters, appending an ellipsis when shortened.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    truncated.push('…');
    truncated
}

pub(crate) fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
