//! Static stage graph: facets, their dependencies, and the adapter chains behind them.

use super::mode::Mode;
use crate::adapter::embedding::{HashedEmbedding, OllamaEmbedding};
use crate::adapter::local::{
    CapitalizedEntities, ExtractiveSummary, FrequencyKeywords, GazetteerLocation,
    LexiconCategory, LexiconSentiment, PassthroughTranslation, RegexCleanup,
};
use crate::adapter::ollama::{
    OllamaCategory, OllamaClient, OllamaSentiment, OllamaSummary, OllamaTranslation,
};
use crate::adapter::SharedAdapter;
use crate::config::Config;
use crate::document::Facet;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Problems found while validating a stage declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Two stages were declared for the same facet.
    #[error("stage '{0}' is declared more than once")]
    DuplicateStage(Facet),
    /// A stage depends on a facet with no declared stage.
    #[error("stage '{stage}' depends on undeclared stage '{dependency}'")]
    UnknownDependency {
        /// Stage carrying the dependency.
        stage: Facet,
        /// Missing dependency.
        dependency: Facet,
    },
    /// Dependencies form a cycle.
    #[error("dependency cycle: {}", format_cycle(.0))]
    Cycle(Vec<Facet>),
    /// A stage has no adapters to run.
    #[error("stage '{0}' has an empty adapter chain")]
    EmptyChain(Facet),
    /// A stage declares no mode that requires it.
    #[error("stage '{0}' is not required by any mode")]
    NoModes(Facet),
    /// An adapter in a chain produces a different facet than its stage.
    #[error("adapter '{method}' produces '{produces}' but is chained under stage '{stage}'")]
    AdapterFacetMismatch {
        /// Stage owning the chain.
        stage: Facet,
        /// Method tag of the offending adapter.
        method: String,
        /// Facet the adapter actually produces.
        produces: Facet,
    },
}

fn with_primary(primary: Option<SharedAdapter>, fallback: SharedAdapter) -> Vec<SharedAdapter> {
    primary.into_iter().chain([fallback]).collect()
}

fn format_cycle(cycle: &[Facet]) -> String {
    cycle
        .iter()
        .map(Facet::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// One node of the graph.
#[derive(Clone)]
pub struct Stage {
    facet: Facet,
    depends_on: Vec<Facet>,
    modes: Vec<Mode>,
    chain: Vec<SharedAdapter>,
}

impl Stage {
    /// Declare the stage computing `facet`, tried in `chain` order.
    pub fn new(
        facet: Facet,
        depends_on: impl IntoIterator<Item = Facet>,
        modes: &[Mode],
        chain: Vec<SharedAdapter>,
    ) -> Self {
        Self {
            facet,
            depends_on: depends_on.into_iter().collect(),
            modes: modes.to_vec(),
            chain,
        }
    }

    /// Facet this stage fills.
    pub fn facet(&self) -> Facet {
        self.facet
    }

    /// Facets that must be settled before this stage runs.
    pub fn depends_on(&self) -> &[Facet] {
        &self.depends_on
    }

    /// Whether runs in `mode` always include this stage.
    pub fn required_for(&self, mode: Mode) -> bool {
        self.modes.contains(&mode)
    }

    /// Adapters in primary-then-fallback order.
    pub fn chain(&self) -> &[SharedAdapter] {
        &self.chain
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("facet", &self.facet)
            .field("depends_on", &self.depends_on)
            .field("modes", &self.modes)
            .field(
                "chain",
                &self
                    .chain
                    .iter()
                    .map(|adapter| adapter.method())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Validated, immutable set of stages.
#[derive(Debug, Clone)]
pub struct StageGraph {
    stages: BTreeMap<Facet, Stage>,
}

impl StageGraph {
    /// Validate `stages` and build the graph.
    pub fn new(stages: Vec<Stage>) -> Result<Self, GraphError> {
        let mut by_facet = BTreeMap::new();
        for stage in stages {
            if stage.chain.is_empty() {
                return Err(GraphError::EmptyChain(stage.facet));
            }
            if stage.modes.is_empty() {
                return Err(GraphError::NoModes(stage.facet));
            }
            if let Some(adapter) = stage
                .chain
                .iter()
                .find(|adapter| adapter.facet() != stage.facet)
            {
                return Err(GraphError::AdapterFacetMismatch {
                    stage: stage.facet,
                    method: adapter.method().to_string(),
                    produces: adapter.facet(),
                });
            }
            let facet = stage.facet;
            if by_facet.insert(facet, stage).is_some() {
                return Err(GraphError::DuplicateStage(facet));
            }
        }

        for stage in by_facet.values() {
            if let Some(dependency) = stage
                .depends_on
                .iter()
                .find(|dependency| !by_facet.contains_key(*dependency))
            {
                return Err(GraphError::UnknownDependency {
                    stage: stage.facet,
                    dependency: *dependency,
                });
            }
        }

        let graph = Self { stages: by_facet };
        graph.detect_cycles()?;
        Ok(graph)
    }

    /// The production graph: local heuristics everywhere, with Ollama adapters first in line
    /// when `OLLAMA_URL` is configured.
    pub fn standard(config: &Config) -> Result<Self, GraphError> {
        use Facet::*;
        use Mode::{Full, Reduced};

        let ollama = config.ollama_url.as_deref().map(OllamaClient::new);
        let model = config.ollama_model.as_str();

        let stages = vec![
            Stage::new(Language, [], &[Reduced, Full], vec![Arc::new(RegexCleanup)]),
            Stage::new(
                Translation,
                [Language],
                &[Reduced, Full],
                // Passthrough declines non-English text, handing it to the model.
                Some(Arc::new(PassthroughTranslation) as SharedAdapter)
                    .into_iter()
                    .chain(ollama.clone().map(|client| {
                        Arc::new(OllamaTranslation::new(client, model)) as SharedAdapter
                    }))
                    .collect(),
            ),
            Stage::new(
                Entities,
                [Language],
                &[Reduced, Full],
                vec![Arc::new(CapitalizedEntities)],
            ),
            Stage::new(
                Keywords,
                [Translation],
                &[Reduced, Full],
                vec![Arc::new(FrequencyKeywords::new(config.keyword_limit))],
            ),
            Stage::new(
                Category,
                [Translation],
                &[Reduced, Full],
                with_primary(
                    ollama.clone().map(|client| {
                        Arc::new(OllamaCategory::new(client, model)) as SharedAdapter
                    }),
                    Arc::new(LexiconCategory),
                ),
            ),
            Stage::new(
                Location,
                [Translation],
                &[Reduced, Full],
                vec![Arc::new(GazetteerLocation)],
            ),
            Stage::new(
                Embedding,
                [Translation, Keywords],
                &[Reduced, Full],
                with_primary(
                    ollama.clone().map(|client| {
                        Arc::new(OllamaEmbedding::new(
                            client,
                            config.embedding_model.as_str(),
                            config.embedding_dimension,
                        )) as SharedAdapter
                    }),
                    Arc::new(HashedEmbedding::new(config.embedding_dimension)),
                ),
            ),
            Stage::new(
                Summary,
                [Translation],
                &[Full],
                with_primary(
                    ollama.clone().map(|client| {
                        Arc::new(OllamaSummary::new(client, model, config.summary_max_words))
                            as SharedAdapter
                    }),
                    Arc::new(ExtractiveSummary::new(config.summary_max_words)),
                ),
            ),
            Stage::new(
                Sentiment,
                [Translation, Summary],
                &[Full],
                with_primary(
                    ollama.map(|client| {
                        Arc::new(OllamaSentiment::new(client, model)) as SharedAdapter
                    }),
                    Arc::new(LexiconSentiment),
                ),
            ),
        ];
        Self::new(stages)
    }

    /// Stage computing `facet`, if declared.
    pub fn stage(&self, facet: Facet) -> Option<&Stage> {
        self.stages.get(&facet)
    }

    /// Whether a stage is declared for `facet`.
    pub fn contains(&self, facet: Facet) -> bool {
        self.stages.contains_key(&facet)
    }

    /// Stages required by `mode`, plus `requested`, closed over dependencies.
    ///
    /// Requested facets without a declared stage are ignored.
    pub fn effective_set(&self, mode: Mode, requested: &BTreeSet<Facet>) -> BTreeSet<Facet> {
        let mut pending: Vec<Facet> = self
            .stages
            .values()
            .filter(|stage| stage.required_for(mode))
            .map(Stage::facet)
            .chain(requested.iter().copied().filter(|facet| self.contains(*facet)))
            .collect();
        let mut effective = BTreeSet::new();
        while let Some(facet) = pending.pop() {
            if effective.insert(facet) {
                if let Some(stage) = self.stage(facet) {
                    pending.extend(stage.depends_on.iter().copied());
                }
            }
        }
        effective
    }

    /// Layer `facets` into waves: each stage lands in the first wave after all its dependencies.
    ///
    /// `facets` must be closed over dependencies, as returned by [`Self::effective_set`].
    /// Stages within a wave are in facet order.
    pub fn waves(&self, facets: &BTreeSet<Facet>) -> Vec<Vec<Facet>> {
        let mut depth: BTreeMap<Facet, usize> = BTreeMap::new();
        let mut remaining: Vec<Facet> = facets.iter().copied().collect();
        while !remaining.is_empty() {
            let before = remaining.len();
            remaining.retain(|facet| {
                let Some(stage) = self.stage(*facet) else {
                    return false;
                };
                let deps: Option<Vec<usize>> = stage
                    .depends_on
                    .iter()
                    .filter(|dependency| facets.contains(*dependency))
                    .map(|dependency| depth.get(dependency).copied())
                    .collect();
                match deps {
                    Some(deps) => {
                        let level = deps.into_iter().max().map_or(0, |max| max + 1);
                        depth.insert(*facet, level);
                        false
                    }
                    None => true,
                }
            });
            if remaining.len() == before {
                // Unreachable for validated graphs.
                break;
            }
        }

        let mut waves: Vec<Vec<Facet>> = Vec::new();
        for (facet, level) in depth {
            if waves.len() <= level {
                waves.resize_with(level + 1, Vec::new);
            }
            waves[level].push(facet);
        }
        waves
    }

    /// Waves for a run in `mode` with `requested` facets.
    pub fn plan(&self, mode: Mode, requested: &BTreeSet<Facet>) -> Vec<Vec<Facet>> {
        self.waves(&self.effective_set(mode, requested))
    }

    fn detect_cycles(&self) -> Result<(), GraphError> {
        let mut visiting = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut path = Vec::new();
        for facet in self.stages.keys() {
            if !visited.contains(facet) {
                self.detect_cycle_dfs(*facet, &mut visiting, &mut visited, &mut path)?;
            }
        }
        Ok(())
    }

    fn detect_cycle_dfs(
        &self,
        facet: Facet,
        visiting: &mut BTreeSet<Facet>,
        visited: &mut BTreeSet<Facet>,
        path: &mut Vec<Facet>,
    ) -> Result<(), GraphError> {
        if visiting.contains(&facet) {
            let start = path.iter().position(|node| *node == facet).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(facet);
            return Err(GraphError::Cycle(cycle));
        }
        if visited.contains(&facet) {
            return Ok(());
        }

        visiting.insert(facet);
        path.push(facet);
        if let Some(stage) = self.stage(facet) {
            for dependency in &stage.depends_on {
                self.detect_cycle_dfs(*dependency, visiting, visited, path)?;
            }
        }
        path.pop();
        visiting.remove(&facet);
        visited.insert(facet);
        Ok(())
    }
}
