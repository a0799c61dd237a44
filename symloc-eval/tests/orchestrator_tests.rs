//! Batch orchestrator integration tests
//!
//! Providers and retrievers are scripted in-test so retries, failure
//! isolation, cache reuse and cancellation can be observed directly.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use symloc_common::config::{RetryConfig, TomlConfig};
use symloc_common::events::EvalEvent;
use symloc_common::models::{
    AnnotationUnit, DecisionLabel, ErrorKind, EvaluationMode, Prediction, Report, RetrievedSnippet, Symptom,
    UnitState,
};
use symloc_eval::dataset::{DatasetLoader, ReportIdRange};
use symloc_eval::{
    BatchOrchestrator, EvalError, PredictionProvider, PredictionRequest, ProviderError, RetrievalError, Retriever,
};
use tokio_util::sync::CancellationToken;

const LEG: &str = "Swelling and pain in the left calf after a long flight";
const CHEST: &str = "Crushing chest pain radiating to the left arm";

fn truth(text: &str) -> (&'static str, Vec<&'static str>) {
    if text == LEG {
        ("Vein (Vena)", vec!["Femoral Vein", "Popliteal Vein"])
    } else {
        ("Heart", vec!["Left Ventricle"])
    }
}

fn report(report_id: u32) -> Report {
    let symptoms = [LEG, CHEST]
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let (organ, locs) = truth(text);
            Symptom::new(report_id, i, *text, vec![AnnotationUnit::new("Reference diagnosis", organ, locs)])
        })
        .collect();
    Report {
        report_id,
        source_path: None,
        symptoms,
    }
}

fn fast_config() -> TomlConfig {
    let mut config = TomlConfig::default();
    config.retry = RetryConfig {
        max_attempts: 3,
        backoff_base_ms: 1,
        backoff_max_ms: 2,
    };
    config
}

#[derive(Clone, Copy)]
enum Behavior {
    Perfect,
    /// First N calls per symptom fail transiently
    TransientFirst(usize),
    AlwaysTransient,
    Permanent,
    Empty,
    /// Correct only when retrieved knowledge is supplied
    BetterWithKnowledge,
    Slow(Duration),
}

struct MockProvider {
    name: String,
    behavior: Behavior,
    calls: AtomicUsize,
    calls_by_symptom: Mutex<HashMap<String, usize>>,
    labels_seen: Mutex<Vec<DecisionLabel>>,
}

impl MockProvider {
    fn new(name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
            calls_by_symptom: Mutex::new(HashMap::new()),
            labels_seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn perfect(text: &str) -> Prediction {
        let (organ, locs) = truth(text);
        Prediction::new([organ], locs)
    }
}

#[async_trait]
impl PredictionProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict(&self, request: &PredictionRequest) -> Result<Option<Prediction>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let nth = {
            let mut by_symptom = self.calls_by_symptom.lock().unwrap();
            let count = by_symptom.entry(request.symptom_text.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if let Some(knowledge) = &request.knowledge {
            self.labels_seen.lock().unwrap().push(knowledge.decision_label);
        }

        match self.behavior {
            Behavior::Perfect => Ok(Some(Self::perfect(&request.symptom_text))),
            Behavior::TransientFirst(n) if nth <= n => Err(ProviderError::Transient("HTTP 503".to_string())),
            Behavior::TransientFirst(_) => Ok(Some(Self::perfect(&request.symptom_text))),
            Behavior::AlwaysTransient => Err(ProviderError::Transient("HTTP 429".to_string())),
            Behavior::Permanent => Err(ProviderError::Permanent("HTTP 401".to_string())),
            Behavior::Empty => Ok(None),
            Behavior::BetterWithKnowledge => {
                if request.knowledge.is_some() {
                    Ok(Some(Self::perfect(&request.symptom_text)))
                } else {
                    let (_, locs) = truth(&request.symptom_text);
                    Ok(Some(Prediction::new(["Artery (Arteria)"], locs.into_iter().take(1))))
                }
            }
            Behavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Some(Self::perfect(&request.symptom_text)))
            }
        }
    }
}

/// Returns the ground truth organ as a single well-formed snippet
struct StaticRetriever {
    calls: AtomicUsize,
}

impl StaticRetriever {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedSnippet>, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let (organ, locs) = truth(query);
        Ok((0..top_k.min(2))
            .map(|i| RetrievedSnippet {
                source_id: format!("kb-{}", i),
                organ_name: organ.to_string(),
                anatomical_locations: locs.iter().map(|l| l.to_string()).collect(),
                diagnosis_text: "Well documented reference diagnosis text".to_string(),
            })
            .collect())
    }
}

struct FailingRetriever;

#[async_trait]
impl Retriever for FailingRetriever {
    async fn retrieve(&self, _query: &str, _top_k: usize) -> Result<Vec<RetrievedSnippet>, RetrievalError> {
        Err(RetrievalError::Unavailable("vector store offline".to_string()))
    }
}

fn orchestrator(
    providers: Vec<Arc<MockProvider>>,
    retriever: Option<Arc<dyn Retriever>>,
) -> BatchOrchestrator {
    let providers: Vec<Arc<dyn PredictionProvider>> = providers
        .into_iter()
        .map(|p| p as Arc<dyn PredictionProvider>)
        .collect();
    BatchOrchestrator::new(&fast_config(), providers, retriever)
}

#[tokio::test]
async fn test_every_unit_scored_in_both_modes() {
    let provider = MockProvider::new("mock", Behavior::Perfect);
    let orch = orchestrator(vec![provider.clone()], Some(StaticRetriever::new()));

    let outcome = orch
        .run_reports(vec![report(1)], &EvaluationMode::ALL, CancellationToken::new())
        .await
        .unwrap();

    assert!(!outcome.cancelled());
    assert_eq!(outcome.reports.len(), 1);
    let artifact = &outcome.reports[0];
    assert_eq!(artifact.symptoms.len(), 2);
    assert_eq!(artifact.metrics.len(), 2);
    assert_eq!(artifact.comparisons.len(), 1);
    assert_eq!(provider.calls(), 4);

    for symptom in &artifact.symptoms {
        assert_eq!(symptom.units.len(), 2);
        assert_eq!(symptom.units[0].key.mode, EvaluationMode::Baseline);
        assert!(symptom.units.iter().all(|u| u.state == UnitState::Scored && u.attempts == 1));
        assert!(symptom.fused_knowledge.is_some());
    }
    for metrics in &artifact.metrics {
        assert_eq!(metrics.scored_units, 2);
        assert_eq!(metrics.accuracy_counts.exact, 2);
        assert!((metrics.mean_f1 - 1.0).abs() < 1e-12);
    }
    assert_eq!(outcome.summary.failures.total, 0);
}

#[tokio::test]
async fn test_transient_errors_are_retried_until_success() {
    let provider = MockProvider::new("flaky", Behavior::TransientFirst(2));
    let orch = orchestrator(vec![provider.clone()], None);

    let outcome = orch
        .run_reports(vec![report(1)], &[EvaluationMode::Baseline], CancellationToken::new())
        .await
        .unwrap();

    let units: Vec<_> = outcome.reports[0].symptoms.iter().flat_map(|s| s.units.iter()).collect();
    assert_eq!(units.len(), 2);
    for unit in units {
        assert_eq!(unit.state, UnitState::Scored);
        assert_eq!(unit.attempts, 3);
    }
    assert_eq!(provider.calls(), 6);
}

#[tokio::test]
async fn test_exhausted_retries_fail_only_that_provider() {
    let failing = MockProvider::new("rate-limited", Behavior::AlwaysTransient);
    let good = MockProvider::new("good", Behavior::Perfect);
    let orch = orchestrator(vec![failing.clone(), good.clone()], None);

    let outcome = orch
        .run_reports(vec![report(1)], &[EvaluationMode::Baseline], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(failing.calls(), 6);
    let artifact = &outcome.reports[0];
    let failed = artifact.metrics.iter().find(|m| m.provider == "rate-limited").unwrap();
    assert_eq!(failed.scored_units, 0);
    assert_eq!(failed.failures.by_kind[&ErrorKind::TransientProvider], 2);
    assert_eq!(failed.mean_overall_score, 0.0);

    let scored = artifact.metrics.iter().find(|m| m.provider == "good").unwrap();
    assert_eq!(scored.scored_units, 2);
    assert_eq!(scored.failures.total, 0);

    // Provider order is preserved within each symptom
    assert_eq!(artifact.symptoms[0].units[0].key.provider, "rate-limited");
    assert_eq!(artifact.symptoms[0].units[0].attempts, 3);
}

#[tokio::test]
async fn test_permanent_error_is_not_retried() {
    let broken = MockProvider::new("broken", Behavior::Permanent);
    let good = MockProvider::new("good", Behavior::Perfect);
    let orch = orchestrator(vec![broken.clone(), good], None);

    let outcome = orch
        .run_reports(vec![report(1)], &[EvaluationMode::Baseline], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(broken.calls(), 2);
    let unit = &outcome.reports[0].symptoms[0].units[0];
    assert_eq!(unit.state, UnitState::Failed);
    assert_eq!(unit.attempts, 1);
    assert_eq!(unit.error.as_ref().unwrap().kind, ErrorKind::PermanentProvider);
}

#[tokio::test]
async fn test_empty_payload_is_empty_prediction_failure() {
    let empty = MockProvider::new("silent", Behavior::Empty);
    let good = MockProvider::new("good", Behavior::Perfect);
    let orch = orchestrator(vec![empty, good], None);

    let outcome = orch
        .run_reports(vec![report(1)], &[EvaluationMode::Baseline], CancellationToken::new())
        .await
        .unwrap();

    let silent = outcome.reports[0].metrics.iter().find(|m| m.provider == "silent").unwrap();
    assert_eq!(silent.failures.by_kind[&ErrorKind::EmptyPrediction], 2);
    assert_eq!(outcome.summary.failures.by_kind[&ErrorKind::EmptyPrediction], 2);
}

#[tokio::test]
async fn test_batch_fails_when_every_unit_fails() {
    let broken = MockProvider::new("broken", Behavior::Permanent);
    let orch = orchestrator(vec![broken], None);

    let err = orch
        .run_reports(vec![report(1), report(2)], &[EvaluationMode::Baseline], CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        EvalError::BatchFailed { dominant, failed_units } => {
            assert_eq!(dominant, ErrorKind::PermanentProvider);
            assert_eq!(failed_units, 4);
        }
        other => panic!("expected BatchFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_retrieval_failure_fails_rag_units_only() {
    let provider = MockProvider::new("mock", Behavior::Perfect);
    let orch = orchestrator(vec![provider.clone()], Some(Arc::new(FailingRetriever)));

    let outcome = orch
        .run_reports(vec![report(1)], &EvaluationMode::ALL, CancellationToken::new())
        .await
        .unwrap();

    let artifact = &outcome.reports[0];
    let rag = artifact
        .metrics
        .iter()
        .find(|m| m.mode == EvaluationMode::RagEnhanced)
        .unwrap();
    assert_eq!(rag.failures.by_kind[&ErrorKind::Retrieval], 2);
    assert_eq!(artifact.comparisons[0].compared_symptoms, 0);
    // Only baseline units reached the provider
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_malformed_symptom_is_skipped_and_counted() {
    let mut bad = report(3);
    bad.symptoms.push(Symptom::new(
        3,
        2,
        "Numbness with no annotated location",
        vec![AnnotationUnit {
            diagnosis_text: "Peripheral neuropathy".to_string(),
            organ_name: None,
            anatomical_locations: Some(vec!["Sciatic Nerve".to_string()]),
        }],
    ));

    let orch = orchestrator(vec![MockProvider::new("mock", Behavior::Perfect)], None);
    let outcome = orch
        .run_reports(vec![bad], &[EvaluationMode::Baseline], CancellationToken::new())
        .await
        .unwrap();

    let artifact = &outcome.reports[0];
    assert_eq!(artifact.skipped_symptoms, vec!["3_symptom_2".to_string()]);
    assert_eq!(artifact.symptoms.len(), 2);
    assert_eq!(outcome.summary.failures.by_kind[&ErrorKind::MalformedAnnotation], 1);
}

#[tokio::test]
async fn test_retrieval_runs_once_per_symptom_across_providers() {
    let retriever = StaticRetriever::new();
    let a = MockProvider::new("a", Behavior::Perfect);
    let b = MockProvider::new("b", Behavior::Perfect);
    let orch = orchestrator(vec![a.clone(), b.clone()], Some(retriever.clone()));

    let outcome = orch
        .run_reports(vec![report(1)], &[EvaluationMode::RagEnhanced], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(retriever.calls.load(Ordering::SeqCst), 2);
    assert_eq!(orch.cache().len().await, 2);

    // Consistent, well-formed snippets are trusted
    let labels = a.labels_seen.lock().unwrap().clone();
    assert_eq!(labels, vec![DecisionLabel::Trust, DecisionLabel::Trust]);

    let knowledge = outcome.reports[0].knowledge;
    assert_eq!(knowledge.fused_symptoms, 2);
    assert_eq!(knowledge.trust, 2);
    assert_eq!(knowledge.inconsistent, 0);
    assert_eq!(outcome.summary.knowledge, knowledge);
}

#[tokio::test]
async fn test_rag_improvement_is_reported_in_comparison() {
    let provider = MockProvider::new("mock", Behavior::BetterWithKnowledge);
    let orch = orchestrator(vec![provider], Some(StaticRetriever::new()));

    let outcome = orch
        .run_reports(vec![report(1)], &EvaluationMode::ALL, CancellationToken::new())
        .await
        .unwrap();

    let comparison = &outcome.reports[0].comparisons[0];
    assert_eq!(comparison.compared_symptoms, 2);
    assert_eq!(comparison.improved, 2);
    assert_eq!(comparison.degraded, 0);
    assert!(comparison.overall_delta > 0.0);

    let rollup = &outcome.summary.comparisons[0];
    assert_eq!(rollup.provider, "mock");
    assert_eq!(rollup.improved, 2);
    assert_eq!(rollup.improved_ratio(), 1.0);
    assert!(rollup.overall_delta > 0.0);
}

#[tokio::test]
async fn test_cancelled_before_start_returns_empty_outcome() {
    let provider = MockProvider::new("mock", Behavior::Perfect);
    let orch = orchestrator(vec![provider.clone()], None);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = orch
        .run_reports(vec![report(1)], &[EvaluationMode::Baseline], cancel)
        .await
        .unwrap();

    assert!(outcome.cancelled());
    assert!(outcome.reports.is_empty());
    assert_eq!(outcome.summary.failures.total, 0);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_cancellation_abandons_in_flight_units() {
    let provider = MockProvider::new("slow", Behavior::Slow(Duration::from_secs(30)));
    let orch = orchestrator(vec![provider], None);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        orch.run_reports(vec![report(1)], &[EvaluationMode::Baseline], cancel),
    )
    .await
    .expect("cancellation should stop the batch promptly")
    .unwrap();

    assert!(outcome.cancelled());
    assert!(outcome.reports.is_empty());
    // Abandoned units are not failures
    assert_eq!(outcome.summary.failures.total, 0);
}

#[tokio::test]
async fn test_progress_events_bracket_the_batch() {
    let orch = orchestrator(vec![MockProvider::new("mock", Behavior::Perfect)], None);
    let mut rx = orch.event_bus().subscribe();

    orch.run_reports(vec![report(1)], &[EvaluationMode::Baseline], CancellationToken::new())
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(EvalEvent::BatchStarted { unit_count: 2, .. })));
    assert!(matches!(
        events.last(),
        Some(EvalEvent::BatchCompleted {
            cancelled: false,
            scored_units: 2,
            failed_units: 0,
            ..
        })
    ));
    let started = events.iter().filter(|e| matches!(e, EvalEvent::UnitStarted { .. })).count();
    let scored = events.iter().filter(|e| matches!(e, EvalEvent::UnitScored { .. })).count();
    let reports = events
        .iter()
        .filter(|e| matches!(e, EvalEvent::ReportCompleted { report_id: 1, .. }))
        .count();
    assert_eq!((started, scored, reports), (2, 2, 1));
}

#[tokio::test]
async fn test_rag_mode_requires_a_retriever() {
    let orch = orchestrator(vec![MockProvider::new("mock", Behavior::Perfect)], None);
    let err = orch
        .run_reports(vec![report(1)], &EvaluationMode::ALL, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EvalError::Common(symloc_common::Error::Config(_))));
}

#[tokio::test]
async fn test_unreadable_report_file_counts_as_dataset_failure() {
    let dir = tempfile::TempDir::new().unwrap();
    let good = serde_json::json!([
        {
            "s_symptom": LEG,
            "U_unit_set": [
                { "u_unit": {
                    "d_diagnosis": "Deep vein thrombosis",
                    "o_organ": { "organName": "Vein (Vena)", "anatomicalLocations": ["Femoral Vein"] }
                } }
            ]
        }
    ]);
    std::fs::write(dir.path().join("diagnostic_10.json"), good.to_string()).unwrap();
    std::fs::write(dir.path().join("diagnostic_11.json"), "{ not json").unwrap();
    std::fs::write(dir.path().join("diagnostic_99.json"), good.to_string()).unwrap();

    let orch = orchestrator(vec![MockProvider::new("mock", Behavior::Perfect)], None);
    let loader = DatasetLoader::new(dir.path());
    let outcome = orch
        .run_batch(
            &loader,
            ReportIdRange::new(10, 20).unwrap(),
            &[EvaluationMode::Baseline],
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.summary.report_ids, vec![10]);
    assert_eq!(outcome.summary.failures.by_kind[&ErrorKind::Dataset], 1);
}
