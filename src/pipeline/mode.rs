//! Reduced/Full mode selection.

use crate::document::Facet;
use serde::Serialize;
use std::fmt;

/// Facets whose explicit request upgrades a run to [`Mode::Full`].
pub const FULL_TRIGGERS: [Facet; 2] = [Facet::Summary, Facet::Sentiment];

/// Breadth of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Cheap enrichment used by background discovery.
    Reduced,
    /// Every Reduced stage plus the expensive summary and sentiment stages.
    Full,
}

impl Mode {
    /// Pick the mode for a set of explicitly requested facets.
    ///
    /// Any request naming summary or sentiment runs in Full mode; everything else, including an
    /// empty request, runs Reduced.
    pub fn decide<'a>(requested: impl IntoIterator<Item = &'a Facet>) -> Self {
        if requested
            .into_iter()
            .any(|facet| FULL_TRIGGERS.contains(facet))
        {
            Self::Full
        } else {
            Self::Reduced
        }
    }

    /// Lowercase name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reduced => "reduced",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
