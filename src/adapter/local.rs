//! Deterministic, dependency-free adapters.
//!
//! These run in milliseconds and never leave the process. They back every facet on their own
//! and act as fallbacks behind the model-backed adapters in [`super::ollama`]. Confidences are
//! fixed or heuristic so that a later model-backed run can outrank them during merge.

use super::text::{
    STOPWORDS, clean_text, content_hash, count_words, detect_language, extractive_summary,
    looks_non_english, split_sentences, tokenize_words,
};
use super::{AdapterError, AdapterOutput, CapabilityAdapter, StageInput};
use crate::document::{
    Entity, Facet, FacetValue, LanguageInfo, Location, Sentiment, SentimentLabel, Translation,
};
use async_trait::async_trait;
use std::collections::HashMap;

/// Cleans markup and boilerplate from the raw text and detects its language.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexCleanup;

#[async_trait]
impl CapabilityAdapter for RegexCleanup {
    fn facet(&self) -> Facet {
        Facet::Language
    }

    fn method(&self) -> &str {
        "regex_cleanup"
    }

    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError> {
        let cleaned = clean_text(&input.raw_text);
        if cleaned.is_empty() {
            return Err(AdapterError::Failed("no text left after cleanup".into()));
        }
        let (code, confidence) = detect_language(&cleaned);
        Ok(AdapterOutput::new(
            FacetValue::Language(LanguageInfo {
                code,
                content_hash: content_hash(&cleaned),
                source_text: cleaned,
            }),
            confidence,
        ))
    }
}

/// Passes English (or undetectable) text through untranslated.
///
/// Any other language is declined so the chain can move on to a real translator.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTranslation;

#[async_trait]
impl CapabilityAdapter for PassthroughTranslation {
    fn facet(&self) -> Facet {
        Facet::Translation
    }

    fn method(&self) -> &str {
        "passthrough"
    }

    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError> {
        let language = input.language_or_unknown();
        let confidence = match language {
            "en" if !looks_non_english(&input.source_text) => 1.0,
            "unknown" => 0.3,
            other => {
                return Err(AdapterError::Unavailable(format!(
                    "no local translator for '{other}'"
                )));
            }
        };
        Ok(AdapterOutput::new(
            FacetValue::Translation(Translation {
                text: input.source_text.clone(),
                source_language: language.to_string(),
                target_language: "en".into(),
            }),
            confidence,
        ))
    }
}

const ORG_MARKERS: [&str; 10] = [
    "inc", "corp", "ltd", "llc", "ministry", "party", "university", "bank", "council", "group",
];

/// Extracts runs of capitalised words as entity mentions.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapitalizedEntities;

impl CapitalizedEntities {
    fn label(phrase: &str) -> &'static str {
        let lower = phrase.to_lowercase();
        if country_continent(&lower).is_some() || city_country(&lower).is_some() {
            return "LOC";
        }
        let last = lower.rsplit(' ').next().unwrap_or_default();
        if ORG_MARKERS.contains(&last.trim_end_matches('.')) {
            return "ORG";
        }
        if phrase.split(' ').count() >= 2 {
            "PERSON"
        } else {
            "MISC"
        }
    }

    fn extract(text: &str) -> Vec<Entity> {
        let mut entities: Vec<Entity> = Vec::new();
        for sentence in split_sentences(text) {
            let words: Vec<&str> = sentence.split_whitespace().collect();
            let mut index = 0;
            while index < words.len() {
                let mut end = index;
                while end < words.len() && is_capitalized(words[end]) {
                    end += 1;
                }
                if end == index {
                    index += 1;
                    continue;
                }
                let phrase = words[index..end]
                    .iter()
                    .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
                    .collect::<Vec<_>>()
                    .join(" ");
                // A lone capitalised word opening a sentence is usually just grammar.
                let sentence_start = index == 0 && end - index == 1;
                let is_stopword = STOPWORDS.contains(phrase.to_lowercase().as_str());
                if !sentence_start
                    && !is_stopword
                    && phrase.chars().count() > 1
                    && !entities.iter().any(|entity| entity.text == phrase)
                {
                    entities.push(Entity {
                        label: Self::label(&phrase).to_string(),
                        text: phrase,
                    });
                }
                index = end;
            }
        }
        entities
    }
}

fn is_capitalized(word: &str) -> bool {
    let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric());
    let mut chars = trimmed.chars();
    matches!(chars.next(), Some(first) if first.is_uppercase())
        && trimmed.chars().skip(1).all(|c| c.is_alphanumeric() || c == '-')
}

#[async_trait]
impl CapabilityAdapter for CapitalizedEntities {
    fn facet(&self) -> Facet {
        Facet::Entities
    }

    fn method(&self) -> &str {
        "capitalized_phrases"
    }

    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError> {
        let entities = Self::extract(&input.source_text);
        // Scripts without case give this heuristic nothing to work with.
        let confidence = if entities.is_empty() { 0.2 } else { 0.45 };
        Ok(AdapterOutput::new(FacetValue::Entities(entities), confidence))
    }
}

/// Ranks non-stop-words by frequency.
#[derive(Debug, Clone, Copy)]
pub struct FrequencyKeywords {
    limit: usize,
}

impl FrequencyKeywords {
    /// Keep at most `limit` keywords.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    fn rank(&self, text: &str) -> Vec<String> {
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for (position, word) in tokenize_words(text).into_iter().enumerate() {
            if word.chars().count() < 3 || STOPWORDS.contains(word.as_str()) {
                continue;
            }
            counts.entry(word).or_insert((0, position)).0 += 1;
        }
        let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
        ranked.sort_by(|(_, (left_count, left_first)), (_, (right_count, right_first))| {
            right_count
                .cmp(left_count)
                .then(left_first.cmp(right_first))
        });
        ranked
            .into_iter()
            .take(self.limit)
            .map(|(word, _)| word)
            .collect()
    }
}

#[async_trait]
impl CapabilityAdapter for FrequencyKeywords {
    fn facet(&self) -> Facet {
        Facet::Keywords
    }

    fn method(&self) -> &str {
        "term_frequency"
    }

    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError> {
        let keywords = self.rank(input.analysis_text());
        let confidence = match keywords.len() {
            0 => 0.1,
            n if n < 5 => 0.4,
            _ => 0.6,
        };
        Ok(AdapterOutput::new(FacetValue::Keywords(keywords), confidence))
    }
}

const CATEGORY_TERMS: [(&str, &[&str]); 9] = [
    (
        "politics",
        &[
            "election", "minister", "parliament", "government", "president", "vote", "party",
            "senate", "policy", "campaign",
        ],
    ),
    (
        "business",
        &[
            "market", "shares", "stock", "economy", "company", "profit", "revenue", "investors",
            "bank", "inflation",
        ],
    ),
    (
        "sports",
        &[
            "match", "tournament", "goal", "team", "coach", "league", "cricket", "football",
            "championship", "player",
        ],
    ),
    (
        "technology",
        &[
            "software", "startup", "smartphone", "internet", "app", "cyber", "chip", "robot",
            "digital", "ai",
        ],
    ),
    (
        "health",
        &[
            "hospital", "doctors", "disease", "vaccine", "patients", "health", "virus",
            "medical", "outbreak", "treatment",
        ],
    ),
    (
        "science",
        &[
            "research", "scientists", "study", "space", "nasa", "discovery", "physics",
            "climate", "species", "laboratory",
        ],
    ),
    (
        "entertainment",
        &[
            "film", "movie", "actor", "music", "album", "festival", "celebrity", "series",
            "box", "concert",
        ],
    ),
    (
        "crime",
        &[
            "police", "arrested", "court", "murder", "theft", "fraud", "suspect", "investigation",
            "charged", "prison",
        ],
    ),
    (
        "environment",
        &[
            "flood", "floods", "earthquake", "storm", "pollution", "rainfall", "wildfire",
            "drought", "cyclone", "emissions",
        ],
    ),
];

/// Assigns the category whose term list best covers the text.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexiconCategory;

impl LexiconCategory {
    fn classify(text: &str) -> (String, f32) {
        let words = tokenize_words(text);
        let scores: Vec<(&str, usize)> = CATEGORY_TERMS
            .iter()
            .map(|(label, terms)| {
                let hits = words
                    .iter()
                    .filter(|word| terms.contains(&word.as_str()))
                    .count();
                (*label, hits)
            })
            .collect();
        let total: usize = scores.iter().map(|(_, hits)| hits).sum();
        // First declared category wins ties.
        let best = scores
            .iter()
            .fold(None::<(&str, usize)>, |best, &(label, hits)| match best {
                Some((_, best_hits)) if best_hits >= hits => best,
                _ if hits > 0 => Some((label, hits)),
                _ => best,
            });
        match best {
            Some((label, hits)) => {
                let share = hits as f32 / total as f32;
                let support = (hits as f32 / 5.0).min(1.0);
                (label.to_string(), (share * support).max(0.2))
            }
            None => ("general".to_string(), 0.1),
        }
    }
}

#[async_trait]
impl CapabilityAdapter for LexiconCategory {
    fn facet(&self) -> Facet {
        Facet::Category
    }

    fn method(&self) -> &str {
        "keyword_rules"
    }

    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError> {
        let (label, confidence) = Self::classify(input.analysis_text());
        Ok(AdapterOutput::new(FacetValue::Category(label), confidence))
    }
}

const COUNTRIES: [(&str, &str); 22] = [
    ("india", "asia"),
    ("china", "asia"),
    ("pakistan", "asia"),
    ("bangladesh", "asia"),
    ("japan", "asia"),
    ("south korea", "asia"),
    ("usa", "americas"),
    ("united states", "americas"),
    ("canada", "americas"),
    ("brazil", "americas"),
    ("mexico", "americas"),
    ("united kingdom", "europe"),
    ("uk", "europe"),
    ("france", "europe"),
    ("germany", "europe"),
    ("spain", "europe"),
    ("italy", "europe"),
    ("russia", "europe"),
    ("australia", "oceania"),
    ("nigeria", "africa"),
    ("kenya", "africa"),
    ("egypt", "africa"),
];

const CITIES: [(&str, &str, &str); 14] = [
    ("mumbai", "maharashtra", "india"),
    ("pune", "maharashtra", "india"),
    ("delhi", "delhi", "india"),
    ("bengaluru", "karnataka", "india"),
    ("new york", "new york", "united states"),
    ("washington", "district of columbia", "united states"),
    ("london", "england", "united kingdom"),
    ("paris", "ile-de-france", "france"),
    ("berlin", "berlin", "germany"),
    ("madrid", "madrid", "spain"),
    ("tokyo", "tokyo", "japan"),
    ("beijing", "beijing", "china"),
    ("sydney", "new south wales", "australia"),
    ("nairobi", "nairobi", "kenya"),
];

fn country_continent(country: &str) -> Option<&'static str> {
    COUNTRIES
        .iter()
        .find(|(name, _)| *name == country)
        .map(|(_, continent)| *continent)
}

fn city_country(city: &str) -> Option<(&'static str, &'static str)> {
    CITIES
        .iter()
        .find(|(name, _, _)| *name == city)
        .map(|(_, state, country)| (*state, *country))
}

fn normalize_country(country: &str) -> &str {
    match country {
        "usa" => "united states",
        "uk" => "united kingdom",
        other => other,
    }
}

/// Resolves the most mentioned country and city against a small gazetteer.
#[derive(Debug, Default, Clone, Copy)]
pub struct GazetteerLocation;

impl GazetteerLocation {
    fn resolve(input: &StageInput) -> (Location, f32) {
        let haystack = format!(
            " {} {} ",
            tokenize_words(input.analysis_text()).join(" "),
            input
                .entities
                .iter()
                .filter(|entity| entity.label == "LOC")
                .map(|entity| entity.text.to_lowercase())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let mentions = |name: &str| haystack.matches(&format!(" {name} ")).count();

        let mut country_hits: HashMap<&str, usize> = HashMap::new();
        for (name, _) in COUNTRIES {
            let hits = mentions(name);
            if hits > 0 {
                *country_hits.entry(normalize_country(name)).or_default() += hits;
            }
        }
        let city = CITIES
            .iter()
            .map(|(name, state, country)| (*name, *state, *country, mentions(name)))
            .filter(|(_, _, _, hits)| *hits > 0)
            .max_by(|left, right| left.3.cmp(&right.3).then(right.0.cmp(left.0)));
        if let Some((_, _, country, hits)) = city {
            *country_hits.entry(country).or_default() += hits;
        }

        let country = country_hits
            .iter()
            .max_by(|left, right| left.1.cmp(right.1).then(right.0.cmp(left.0)))
            .map(|(country, hits)| (*country, *hits));

        match country {
            Some((country, hits)) => {
                let city = city.filter(|(_, _, city_country, _)| *city_country == country);
                let location = Location {
                    city: city.map(|(name, _, _, _)| name.to_string()),
                    state: city.map(|(_, state, _, _)| state.to_string()),
                    country: country.to_string(),
                    continent: country_continent(country).unwrap_or("global").to_string(),
                };
                let confidence = (0.5 + 0.1 * hits as f32).min(0.9);
                (location, confidence)
            }
            None => (
                Location {
                    city: None,
                    state: None,
                    country: "global".into(),
                    continent: "global".into(),
                },
                0.1,
            ),
        }
    }
}

#[async_trait]
impl CapabilityAdapter for GazetteerLocation {
    fn facet(&self) -> Facet {
        Facet::Location
    }

    fn method(&self) -> &str {
        "gazetteer"
    }

    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError> {
        let (location, confidence) = Self::resolve(input);
        Ok(AdapterOutput::new(FacetValue::Location(location), confidence))
    }
}

/// Keeps leading sentences of the analysis text within a word budget.
#[derive(Debug, Clone, Copy)]
pub struct ExtractiveSummary {
    max_words: usize,
}

impl ExtractiveSummary {
    /// Summaries stay within `max_words` words.
    pub fn new(max_words: usize) -> Self {
        Self {
            max_words: max_words.max(1),
        }
    }
}

#[async_trait]
impl CapabilityAdapter for ExtractiveSummary {
    fn facet(&self) -> Facet {
        Facet::Summary
    }

    fn method(&self) -> &str {
        "extractive"
    }

    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError> {
        let summary = extractive_summary(input.analysis_text(), self.max_words);
        if summary.is_empty() {
            return Err(AdapterError::Failed("no sentences to summarize".into()));
        }
        let confidence = if summary.chars().count() > 50 { 0.6 } else { 0.3 };
        Ok(AdapterOutput::new(FacetValue::Summary(summary), confidence))
    }
}

const POSITIVE_TERMS: [&str; 20] = [
    "good", "great", "win", "wins", "won", "success", "successful", "growth", "improve",
    "improved", "record", "celebrate", "relief", "gain", "gains", "praised", "strong", "hope",
    "peace", "recovery",
];

const NEGATIVE_TERMS: [&str; 20] = [
    "bad", "loss", "losses", "crisis", "dead", "death", "killed", "attack", "flood", "floods",
    "damage", "fear", "decline", "fell", "violence", "protest", "injured", "fraud", "collapse",
    "war",
];

/// Scores polarity with a small lexicon, preferring the summary over the body.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexiconSentiment;

impl LexiconSentiment {
    fn score(text: &str) -> (f32, usize) {
        let words = tokenize_words(text);
        let positive = words
            .iter()
            .filter(|word| POSITIVE_TERMS.contains(&word.as_str()))
            .count();
        let negative = words
            .iter()
            .filter(|word| NEGATIVE_TERMS.contains(&word.as_str()))
            .count();
        let hits = positive + negative;
        if hits == 0 {
            return (0.0, 0);
        }
        ((positive as f32 - negative as f32) / hits as f32, hits)
    }
}

#[async_trait]
impl CapabilityAdapter for LexiconSentiment {
    fn facet(&self) -> Facet {
        Facet::Sentiment
    }

    fn method(&self) -> &str {
        "lexicon"
    }

    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError> {
        let (text, summary_bonus) = match input.summary.as_deref() {
            Some(summary) if count_words(summary) >= 5 => (summary, 0.1),
            _ => (input.analysis_text(), 0.0),
        };
        let (score, hits) = Self::score(text);
        let label = if score > 0.15 {
            SentimentLabel::Positive
        } else if score < -0.15 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        };
        let confidence = 0.3 + 0.3 * (hits as f32 / 10.0).min(1.0) + summary_bonus;
        Ok(AdapterOutput::new(
            FacetValue::Sentiment(Sentiment { label, score }),
            confidence,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(text: &str) -> StageInput {
        StageInput {
            document_id: "doc".into(),
            raw_text: text.into(),
            source_text: text.into(),
            language: Some("en".into()),
            ..StageInput::default()
        }
    }

    #[tokio::test]
    async fn cleanup_detects_language_on_cleaned_text() {
        let output = RegexCleanup
            .invoke(&input("<b>The river rose and the town was evacuated.</b>"))
            .await
            .expect("output");
        let FacetValue::Language(info) = output.value else {
            panic!("expected language value");
        };
        assert_eq!(info.code, "en");
        assert_eq!(info.source_text, "The river rose and the town was evacuated.");
        assert_eq!(info.content_hash.len(), 64);
    }

    #[tokio::test]
    async fn cleanup_fails_on_markup_only_input() {
        let error = RegexCleanup
            .invoke(&input("<div><br/></div>"))
            .await
            .expect_err("empty");
        assert!(matches!(error, AdapterError::Failed(_)));
    }

    #[tokio::test]
    async fn passthrough_declines_foreign_text() {
        let mut foreign = input("El gobierno anunció nuevas medidas.");
        foreign.language = Some("es".into());
        let error = PassthroughTranslation
            .invoke(&foreign)
            .await
            .expect_err("declined");
        assert!(matches!(error, AdapterError::Unavailable(_)));

        let output = PassthroughTranslation
            .invoke(&input("Plain English."))
            .await
            .expect("passthrough");
        assert_eq!(output.confidence, 1.0);
    }

    #[tokio::test]
    async fn entities_skip_sentence_openers() {
        let output = CapitalizedEntities
            .invoke(&input(
                "Officials in Mumbai met Priya Sharma today. Reliance Group confirmed the plan.",
            ))
            .await
            .expect("output");
        let FacetValue::Entities(entities) = output.value else {
            panic!("expected entities");
        };
        let names: Vec<(&str, &str)> = entities
            .iter()
            .map(|entity| (entity.text.as_str(), entity.label.as_str()))
            .collect();
        assert!(names.contains(&("Mumbai", "LOC")));
        assert!(names.contains(&("Priya Sharma", "PERSON")));
        assert!(names.contains(&("Reliance Group", "ORG")));
        assert!(!names.iter().any(|(text, _)| *text == "Officials"));
    }

    #[tokio::test]
    async fn keywords_rank_by_frequency() {
        let adapter = FrequencyKeywords::new(3);
        let output = adapter
            .invoke(&input(
                "Flood waters rose. The flood damaged roads and the flood closed schools near roads.",
            ))
            .await
            .expect("output");
        let FacetValue::Keywords(keywords) = output.value else {
            panic!("expected keywords");
        };
        assert_eq!(keywords, vec!["flood", "roads", "waters"]);
    }

    #[tokio::test]
    async fn category_prefers_dominant_lexicon() {
        let output = LexiconCategory
            .invoke(&input(
                "The team won the match after the coach changed the league player lineup.",
            ))
            .await
            .expect("output");
        assert_eq!(output.value, FacetValue::Category("sports".into()));
        assert!(output.confidence >= 0.8);

        let output = LexiconCategory
            .invoke(&input("Nothing to see here."))
            .await
            .expect("output");
        assert_eq!(output.value, FacetValue::Category("general".into()));
    }

    #[tokio::test]
    async fn location_resolves_city_and_continent() {
        let output = GazetteerLocation
            .invoke(&input("Heavy rain flooded Mumbai streets as India braced for more."))
            .await
            .expect("output");
        let FacetValue::Location(location) = output.value else {
            panic!("expected location");
        };
        assert_eq!(location.city.as_deref(), Some("mumbai"));
        assert_eq!(location.state.as_deref(), Some("maharashtra"));
        assert_eq!(location.country, "india");
        assert_eq!(location.continent, "asia");
        assert!(output.confidence > 0.5);
    }

    #[tokio::test]
    async fn sentiment_reads_summary_when_available() {
        let mut with_summary = input("Markets rallied with strong gains and record growth.");
        with_summary.summary = Some("Floods killed many and caused damage and losses.".into());
        let output = LexiconSentiment.invoke(&with_summary).await.expect("output");
        let FacetValue::Sentiment(sentiment) = output.value else {
            panic!("expected sentiment");
        };
        assert_eq!(sentiment.label, SentimentLabel::Negative);
    }
}
