use async_trait::async_trait;
use facetflow::adapter::{AdapterError, AdapterOutput, AdapterTimeouts, CapabilityAdapter, SharedAdapter, StageInput};
use facetflow::config::Config;
use facetflow::document::{Facet, FacetValue, LanguageInfo, Translation};
use facetflow::pipeline::{
    CancelHandle, FacetStatus, Mode, PipelineApi, PipelineError, PipelineService, ProcessRequest,
    RunState, Scheduler, Stage, StageGraph, StatusBoard,
};
use facetflow::store::gateway::{DocumentSeed, PersistenceGateway};
use facetflow::store::memory::MemoryStore;
use facetflow::store::{DocumentStore, SharedStore};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;
use uuid::Uuid;

const ARTICLE: &str = "Heavy rain flooded Mumbai on Monday as the monsoon reached the coast. \
    Officials in India said the flood closed schools and roads across the city.";

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Start(Facet),
    End(Facet),
}

/// Adapter whose behaviour is fixed by the test.
struct Scripted {
    facet: Facet,
    method: &'static str,
    confidence: f32,
    fail: bool,
    log: Option<Arc<Mutex<Vec<Event>>>>,
    barrier: Option<Arc<Barrier>>,
    cancel_on_invoke: Option<CancelHandle>,
}

impl Scripted {
    fn new(facet: Facet, method: &'static str, confidence: f32) -> Self {
        Self {
            facet,
            method,
            confidence,
            fail: false,
            log: None,
            barrier: None,
            cancel_on_invoke: None,
        }
    }

    fn failing(facet: Facet, method: &'static str) -> Self {
        Self {
            fail: true,
            ..Self::new(facet, method, 0.0)
        }
    }

    fn logged(mut self, log: &Arc<Mutex<Vec<Event>>>) -> Self {
        self.log = Some(Arc::clone(log));
        self
    }

    fn shared(self) -> SharedAdapter {
        Arc::new(self)
    }

    fn value(&self, input: &StageInput) -> FacetValue {
        match self.facet {
            Facet::Language => FacetValue::Language(LanguageInfo {
                code: "en".into(),
                source_text: input.raw_text.trim().to_string(),
                content_hash: "hash".into(),
            }),
            Facet::Keywords => FacetValue::Keywords(vec![self.method.to_string()]),
            Facet::Category => FacetValue::Category(self.method.to_string()),
            Facet::Summary => FacetValue::Summary(format!("summary by {}", self.method)),
            Facet::Entities => FacetValue::Entities(Vec::new()),
            Facet::Translation => FacetValue::Translation(Translation {
                text: "TRANSLATED".into(),
                source_language: "fr".into(),
                target_language: "en".into(),
            }),
            other => panic!("no scripted value for {other}"),
        }
    }

    fn record(&self, event: Event) {
        if let Some(log) = &self.log {
            log.lock().expect("log").push(event);
        }
    }
}

#[async_trait]
impl CapabilityAdapter for Scripted {
    fn facet(&self) -> Facet {
        self.facet
    }

    fn method(&self) -> &str {
        self.method
    }

    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError> {
        self.record(Event::Start(self.facet));
        if let Some(cancel) = &self.cancel_on_invoke {
            cancel.cancel();
        }
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.record(Event::End(self.facet));
        if self.fail {
            return Err(AdapterError::Failed(format!("{} unavailable", self.method)));
        }
        Ok(AdapterOutput::new(self.value(input), self.confidence))
    }
}

/// Summary adapter that records the text it was asked to summarise.
struct CapturingSummary {
    seen: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl CapabilityAdapter for CapturingSummary {
    fn facet(&self) -> Facet {
        Facet::Summary
    }

    fn method(&self) -> &str {
        "capture"
    }

    async fn invoke(&self, input: &StageInput) -> Result<AdapterOutput, AdapterError> {
        let text = input.analysis_text().to_string();
        *self.seen.lock().expect("seen") = Some(text.clone());
        Ok(AdapterOutput::new(FacetValue::Summary(text), 0.8))
    }
}

fn timeouts() -> AdapterTimeouts {
    AdapterTimeouts {
        cheap: Duration::from_secs(2),
        inference: Duration::from_secs(2),
    }
}

/// language → {keywords, entities} → category; summary is Full-only.
fn graph(
    language: SharedAdapter,
    keywords: SharedAdapter,
    entities: SharedAdapter,
    category: SharedAdapter,
    summary: SharedAdapter,
) -> StageGraph {
    let both = [Mode::Reduced, Mode::Full];
    StageGraph::new(vec![
        Stage::new(Facet::Language, [], &both, vec![language]),
        Stage::new(Facet::Keywords, [Facet::Language], &both, vec![keywords]),
        Stage::new(Facet::Entities, [Facet::Language], &both, vec![entities]),
        Stage::new(Facet::Category, [Facet::Keywords], &both, vec![category]),
        Stage::new(Facet::Summary, [Facet::Language], &[Mode::Full], vec![summary]),
    ])
    .expect("graph")
}

fn default_graph(category_confidence: f32, category_method: &'static str) -> StageGraph {
    graph(
        Scripted::new(Facet::Language, "lang", 1.0).shared(),
        Scripted::new(Facet::Keywords, "kw", 0.6).shared(),
        Scripted::new(Facet::Entities, "ner", 0.5).shared(),
        Scripted::new(Facet::Category, category_method, category_confidence).shared(),
        Scripted::new(Facet::Summary, "sum", 0.8).shared(),
    )
}

fn service(graph: StageGraph, store: SharedStore) -> PipelineService {
    PipelineService::new(graph, store, timeouts(), 3)
}

#[tokio::test]
async fn stored_confidence_never_decreases() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    service(default_graph(0.9, "strong"), store.clone())
        .process_document("doc", ARTICLE, &[])
        .await
        .expect("first run");

    let report = service(default_graph(0.4, "weak"), store.clone())
        .process_document("doc", ARTICLE, &[])
        .await
        .expect("second run");

    let slot = report.document.slot(Facet::Category).expect("category");
    assert_eq!(slot.confidence, 0.9);
    assert_eq!(slot.method, "strong");
    assert_eq!(
        report.facets.get(&Facet::Category),
        Some(&FacetStatus::Preserved {
            stored: 0.9,
            offered: 0.4
        })
    );

    let stored = store.load("doc").await.expect("load").expect("stored");
    assert_eq!(stored.document.confidence(Facet::Category), Some(0.9));
}

#[tokio::test]
async fn mode_follows_requested_facets() {
    let service = PipelineService::from_config(&Config::default()).expect("service");
    let cases: [(&[&str], Mode); 4] = [
        (&[], Mode::Reduced),
        (&["keywords"], Mode::Reduced),
        (&["sentiment"], Mode::Full),
        (&["summary", "entities"], Mode::Full),
    ];
    for (index, (facets, expected)) in cases.into_iter().enumerate() {
        let report = service
            .process_document(&format!("doc-{index}"), ARTICLE, facets)
            .await
            .expect("report");
        assert_eq!(report.mode, expected, "facets {facets:?}");
        assert_eq!(
            report.document.slot(Facet::Summary).is_some(),
            expected == Mode::Full
        );
    }
}

#[tokio::test]
async fn failed_stage_degrades_without_blocking_dependents() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let graph = graph(
        Scripted::new(Facet::Language, "lang", 1.0).shared(),
        Scripted::failing(Facet::Keywords, "kw").shared(),
        Scripted::new(Facet::Entities, "ner", 0.5).shared(),
        Scripted::new(Facet::Category, "cat", 0.7).shared(),
        Scripted::new(Facet::Summary, "sum", 0.8).shared(),
    );
    let report = service(graph, store)
        .process_document("doc", ARTICLE, &[])
        .await
        .expect("run still commits");

    assert!(matches!(
        report.facets.get(&Facet::Keywords),
        Some(FacetStatus::Unavailable { error }) if error.contains("kw unavailable")
    ));
    assert!(report.document.slot(Facet::Keywords).is_none());
    assert!(matches!(
        report.facets.get(&Facet::Category),
        Some(FacetStatus::Ok { .. })
    ));
    assert_eq!(report.unavailable().collect::<Vec<_>>(), vec![Facet::Keywords]);
}

#[tokio::test]
async fn failed_entities_do_not_block_requested_keywords() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let graph = graph(
        Scripted::new(Facet::Language, "lang", 1.0).shared(),
        Scripted::new(Facet::Keywords, "kw", 0.6).shared(),
        Scripted::failing(Facet::Entities, "ner").shared(),
        Scripted::new(Facet::Category, "cat", 0.7).shared(),
        Scripted::new(Facet::Summary, "sum", 0.8).shared(),
    );
    let report = service(graph, store.clone())
        .process_document("doc", ARTICLE, &["keywords", "entities"])
        .await
        .expect("run still commits");

    assert_eq!(report.mode, Mode::Reduced);
    assert!(matches!(
        report.facets.get(&Facet::Entities),
        Some(FacetStatus::Unavailable { error }) if error.contains("ner unavailable")
    ));
    assert!(matches!(
        report.facets.get(&Facet::Keywords),
        Some(FacetStatus::Ok { method, .. }) if method == "kw"
    ));
    assert_eq!(report.unavailable().collect::<Vec<_>>(), vec![Facet::Entities]);

    let stored = store.load("doc").await.expect("load").expect("stored");
    assert_eq!(stored.document.keywords(), ["kw".to_string()]);
    assert!(stored.document.slot(Facet::Entities).is_none());
}

#[tokio::test]
async fn summary_sees_translation_from_the_previous_wave() {
    let seen = Arc::new(Mutex::new(None));
    let both = [Mode::Reduced, Mode::Full];
    let graph = StageGraph::new(vec![
        Stage::new(
            Facet::Language,
            [],
            &both,
            vec![Scripted::new(Facet::Language, "lang", 1.0).shared()],
        ),
        Stage::new(
            Facet::Translation,
            [Facet::Language],
            &both,
            vec![Scripted::new(Facet::Translation, "mt", 0.9).shared()],
        ),
        Stage::new(
            Facet::Summary,
            [Facet::Translation],
            &[Mode::Full],
            vec![Arc::new(CapturingSummary { seen: Arc::clone(&seen) }) as SharedAdapter],
        ),
    ])
    .expect("graph");

    let report = service(graph, Arc::new(MemoryStore::new()))
        .process_document("doc", ARTICLE, &["summary"])
        .await
        .expect("report");

    assert_eq!(report.mode, Mode::Full);
    assert_eq!(seen.lock().expect("seen").as_deref(), Some("TRANSLATED"));
    assert_eq!(report.document.translated_text(), Some("TRANSLATED"));
    assert_eq!(report.document.confidence(Facet::Translation), Some(0.9));
    assert_eq!(report.document.summary(), Some("TRANSLATED"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_keep_the_more_confident_value() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let strong = service(default_graph(0.9, "strong"), store.clone());
    let weak = service(default_graph(0.3, "weak"), store.clone());

    let (first, second) = tokio::join!(
        strong.process_document("doc", ARTICLE, &[]),
        weak.process_document("doc", ARTICLE, &[]),
    );
    first.expect("strong run");
    second.expect("weak run");

    let stored = store.load("doc").await.expect("load").expect("stored");
    let slot = stored.document.slot(Facet::Category).expect("category");
    assert_eq!(slot.confidence, 0.9);
    assert_eq!(slot.method, "strong");
}

#[tokio::test]
async fn replaying_a_run_is_idempotent() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let scheduler = Scheduler::new(
        Arc::new(default_graph(0.7, "cat")),
        timeouts(),
        StatusBoard::new(),
    );
    let gateway = PersistenceGateway::new(store.clone(), 3);
    let seed = DocumentSeed::new(ARTICLE);

    let snapshot = gateway.snapshot("doc", &seed).await.expect("snapshot");
    let context = scheduler
        .run(
            Uuid::new_v4(),
            Mode::Reduced,
            snapshot,
            &BTreeSet::new(),
            &CancelHandle::new(),
        )
        .await
        .expect("context");

    let first = gateway
        .commit_outcomes("doc", &seed, &context.outcomes)
        .await
        .expect("first commit");
    let first_json = serde_json::to_string(&first.document).expect("json");
    let replay = gateway
        .commit_outcomes("doc", &seed, &context.outcomes)
        .await
        .expect("replay");

    assert_eq!(serde_json::to_string(&replay.document).expect("json"), first_json);
    assert_eq!(replay.revision, first.revision);
    let stored = store.load("doc").await.expect("load").expect("stored");
    assert_eq!(serde_json::to_string(&stored.document).expect("json"), first_json);
}

#[tokio::test]
async fn waves_wait_for_every_stage_before_starting_the_next() {
    let log = Arc::new(Mutex::new(Vec::new()));
    // Keywords and entities share a wave; each waits for the other, so a sequential
    // scheduler would time out here.
    let barrier = Arc::new(Barrier::new(2));
    let mut keywords = Scripted::new(Facet::Keywords, "kw", 0.6).logged(&log);
    keywords.barrier = Some(Arc::clone(&barrier));
    let mut entities = Scripted::new(Facet::Entities, "ner", 0.5).logged(&log);
    entities.barrier = Some(barrier);

    let graph = graph(
        Scripted::new(Facet::Language, "lang", 1.0).logged(&log).shared(),
        keywords.shared(),
        entities.shared(),
        Scripted::new(Facet::Category, "cat", 0.7).logged(&log).shared(),
        Scripted::new(Facet::Summary, "sum", 0.8).logged(&log).shared(),
    );
    let report = service(graph, Arc::new(MemoryStore::new()))
        .process_document("doc", ARTICLE, &[])
        .await
        .expect("report");
    assert!(report.unavailable().next().is_none());

    let events = log.lock().expect("log").clone();
    let position = |event: Event| {
        events
            .iter()
            .position(|candidate| *candidate == event)
            .expect("event recorded")
    };
    assert!(position(Event::End(Facet::Language)) < position(Event::Start(Facet::Keywords)));
    assert!(position(Event::End(Facet::Language)) < position(Event::Start(Facet::Entities)));
    assert!(position(Event::End(Facet::Keywords)) < position(Event::Start(Facet::Category)));
    assert!(position(Event::End(Facet::Entities)) < position(Event::Start(Facet::Category)));
    assert!(!events.contains(&Event::Start(Facet::Summary)));
}

#[tokio::test]
async fn equal_confidence_adopts_the_newer_value() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    service(default_graph(0.70, "older"), store.clone())
        .process_document("doc", ARTICLE, &[])
        .await
        .expect("first run");
    let report = service(default_graph(0.70, "newer"), store)
        .process_document("doc", ARTICLE, &[])
        .await
        .expect("second run");

    let slot = report.document.slot(Facet::Category).expect("category");
    assert_eq!(slot.method, "newer");
    assert_eq!(slot.value, FacetValue::Category("newer".into()));
}

#[tokio::test]
async fn cancelled_run_persists_nothing() {
    let store = Arc::new(MemoryStore::new());
    let cancel = CancelHandle::new();
    let mut keywords = Scripted::new(Facet::Keywords, "kw", 0.6);
    keywords.cancel_on_invoke = Some(cancel.clone());
    let graph = graph(
        Scripted::new(Facet::Language, "lang", 1.0).shared(),
        keywords.shared(),
        Scripted::new(Facet::Entities, "ner", 0.5).shared(),
        Scripted::new(Facet::Category, "cat", 0.7).shared(),
        Scripted::new(Facet::Summary, "sum", 0.8).shared(),
    );
    let service = service(graph, store.clone());

    let error = service
        .process(ProcessRequest::new("doc", ARTICLE), &cancel)
        .await
        .expect_err("cancelled");
    assert!(matches!(error, PipelineError::Cancelled));
    assert!(store.is_empty().await);

    let status = service.pipeline_status("doc").await.expect("status");
    assert_eq!(status.state, RunState::Cancelled);
    assert_eq!(status.current_wave, 2);
    assert!(status.stages_completed < status.stages_total);
    assert_eq!(service.metrics_snapshot().runs_cancelled, 1);
}

#[tokio::test]
async fn cancelling_a_refresh_keeps_the_stored_revision() {
    let store = Arc::new(MemoryStore::new());
    service(default_graph(0.5, "cat"), store.clone())
        .process_document("doc", ARTICLE, &[])
        .await
        .expect("ingest");
    let before = store.load("doc").await.expect("load").expect("stored");

    let cancel = CancelHandle::new();
    let mut summary = Scripted::new(Facet::Summary, "sum", 0.9);
    summary.cancel_on_invoke = Some(cancel.clone());
    let graph = graph(
        Scripted::new(Facet::Language, "lang", 1.0).shared(),
        Scripted::new(Facet::Keywords, "kw", 0.9).shared(),
        Scripted::new(Facet::Entities, "ner", 0.9).shared(),
        Scripted::new(Facet::Category, "cat", 0.9).shared(),
        summary.shared(),
    );
    let error = service(graph, store.clone())
        .trigger_facet_with("doc", "summary", &cancel)
        .await
        .expect_err("cancelled");
    assert!(matches!(error, PipelineError::Cancelled));

    let after = store.load("doc").await.expect("load").expect("stored");
    assert_eq!(after, before);
}
