//! End-to-end orchestrator tests over the real SQLite store and a scripted
//! generation provider.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use jobs::{Orchestrator, OrchestratorConfig, OrchestratorError, ProcessOutcome};
use pipeline::{
    BatchFilter, ContentItem, ContentItemRepository, GenerationCost, GenerationError,
    GenerationOptions, GenerationProvider, ItemStatus, ModelId, Prompt, PublishedReference,
    SystemClock, Timestamp, DEFAULT_MAX_RETRIES,
};
use store::SqliteStore;

/// Provider that replays a script of responses, counting calls.
struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, GenerationError>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<String, GenerationError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn generate(
        &self,
        _prompt: &Prompt,
        _options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("provider called beyond its script")
    }
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        max_retries: DEFAULT_MAX_RETRIES,
        model: ModelId::new("gemini-1.5-pro").unwrap(),
        cost_per_call: GenerationCost::new(0.002).unwrap(),
    }
}

fn orchestrator(
    repo: Arc<SqliteStore>,
    provider: Arc<ScriptedProvider>,
) -> Orchestrator {
    Orchestrator::new(repo, provider, Arc::new(SystemClock), config())
}

fn testimony_document() -> serde_json::Value {
    json!({
        "vehicle": "Chevrolet Onix 2025",
        "blocks": [
            {
                "id": "t-1",
                "kind": "draft",
                "position": 0,
                "content": {"quote": "carro otimo, voltando pra Salvador depois da viagem",
                            "author": "Marcos T., Porto Velho-RO"}
            },
            {
                "id": "img-1",
                "kind": "image",
                "position": 1,
                "content": {"src": "onix.jpg"}
            }
        ]
    })
}

fn correction_line() -> String {
    json!({
        "quote": "Carro ótimo, voltando pra Salvador depois da viagem.",
        "author": "Marcos T., Porto Velho-RO",
        "vehicle": "Chevrolet Onix 2025",
        "context": "avaliação no site"
    })
    .to_string()
}

fn pending_item(repo: &SqliteStore) -> ContentItem {
    let item = ContentItem::new(testimony_document(), None, Timestamp::now());
    repo.insert(&item).unwrap();
    item
}

#[tokio::test]
async fn happy_path_generates_and_applies_consistency_rules() {
    let repo = Arc::new(SqliteStore::open_in_memory().unwrap());
    let provider = ScriptedProvider::new(vec![Ok(correction_line())]);
    let orch = orchestrator(repo.clone(), provider.clone());

    let item = pending_item(&repo);
    let outcome = orch.process_one(item.clone()).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Generated);
    assert_eq!(provider.calls(), 1);

    let stored = repo.get(item.id).unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::Generated);
    assert_eq!(stored.attempts.len(), 1);
    assert!(stored.generated_at.is_some());

    let blocks = &stored.generated_payload.as_ref().unwrap()["blocks"];
    // The draft was replaced and the coherence rule rewrote the author.
    assert_eq!(blocks[0]["kind"], "corrected");
    assert_eq!(blocks[0]["content"]["author"], "Marcos T., Salvador-BR");
    assert_eq!(blocks[0]["id"], "t-1");
    // The image block is untouched.
    assert_eq!(blocks[1]["kind"], "image");
}

#[tokio::test]
async fn transport_failure_consumes_a_retry_then_succeeds_on_resweep() {
    let repo = Arc::new(SqliteStore::open_in_memory().unwrap());
    let provider = ScriptedProvider::new(vec![
        Err(GenerationError::Transport { message: "connect timeout".into() }),
        Ok(correction_line()),
    ]);
    let orch = orchestrator(repo.clone(), provider.clone());

    let item = pending_item(&repo);
    let outcome = orch.process_one(item.clone()).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Failed { terminal: false });

    let stored = repo.get(item.id).unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::Failed);
    assert_eq!(stored.retry_count, 1);

    // The next sweep picks the failure back up and it succeeds.
    let filter = BatchFilter { max_retries: DEFAULT_MAX_RETRIES, ..BatchFilter::default() };
    let summary = orch.run_batch(&filter, 10).await.unwrap();
    assert_eq!(summary.generated, 1);

    let stored = repo.get(item.id).unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::Generated);
    assert_eq!(stored.retry_count, 1);
    assert_eq!(stored.attempts.len(), 2);
}

#[tokio::test]
async fn rate_limited_item_is_deferred_without_an_attempt() {
    let repo = Arc::new(SqliteStore::open_in_memory().unwrap());
    let provider = ScriptedProvider::new(vec![Err(GenerationError::RateLimited {
        remaining: Duration::from_secs(90),
    })]);
    let orch = orchestrator(repo.clone(), provider);

    let item = pending_item(&repo);
    let outcome = orch.process_one(item.clone()).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Deferred);

    let stored = repo.get(item.id).unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::Pending);
    assert!(stored.attempts.is_empty());
    assert_eq!(stored.retry_count, 0);
}

#[tokio::test]
async fn unusable_response_fails_retryably_and_preserves_the_raw_text() {
    let repo = Arc::new(SqliteStore::open_in_memory().unwrap());
    let provider = ScriptedProvider::new(vec![Ok("totally not json".into())]);
    let orch = orchestrator(repo.clone(), provider);

    let item = pending_item(&repo);
    let outcome = orch.process_one(item.clone()).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Failed { terminal: false });

    let stored = repo.get(item.id).unwrap().unwrap();
    assert!(stored.error.as_ref().unwrap().contains("totally not json"));
}

#[tokio::test]
async fn structurally_invalid_source_fails_terminally_without_a_service_call() {
    let repo = Arc::new(SqliteStore::open_in_memory().unwrap());
    let provider = ScriptedProvider::new(vec![]);
    let orch = orchestrator(repo.clone(), provider.clone());

    let item = ContentItem::new(
        json!({"vehicle": "Onix", "blocks": "not a sequence"}),
        None,
        Timestamp::now(),
    );
    repo.insert(&item).unwrap();

    let outcome = orch.process_one(item.clone()).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Failed { terminal: true });
    assert_eq!(provider.calls(), 0);

    let stored = repo.get(item.id).unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::Failed);
    assert!(!stored.has_retries_remaining(DEFAULT_MAX_RETRIES));
}

#[tokio::test]
async fn fully_corrected_document_passes_through_without_a_service_call() {
    let repo = Arc::new(SqliteStore::open_in_memory().unwrap());
    let provider = ScriptedProvider::new(vec![]);
    let orch = orchestrator(repo.clone(), provider.clone());

    let doc = json!({
        "blocks": [
            {"id": "t-1", "kind": "corrected", "position": 0,
             "content": {"quote": "já revisado", "author": "Ana P."}}
        ]
    });
    let item = ContentItem::new(doc, None, Timestamp::now());
    repo.insert(&item).unwrap();

    let outcome = orch.process_one(item.clone()).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Generated);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn forced_sweep_re_processes_a_generated_item() {
    let repo = Arc::new(SqliteStore::open_in_memory().unwrap());
    let provider = ScriptedProvider::new(vec![Ok(correction_line()), Ok(correction_line())]);
    let orch = orchestrator(repo.clone(), provider.clone());

    let item = pending_item(&repo);
    let filter = BatchFilter { max_retries: DEFAULT_MAX_RETRIES, ..BatchFilter::default() };

    let summary = orch.run_batch(&filter, 10).await.unwrap();
    assert_eq!(summary.generated, 1);
    assert_eq!(repo.get(item.id).unwrap().unwrap().status, ItemStatus::Generated);

    // A plain sweep leaves generated items alone.
    let summary = orch.run_batch(&filter, 10).await.unwrap();
    assert_eq!(summary.processed, 0);

    // A forced sweep selects them again and re-runs generation.
    let forced = BatchFilter { include_generated: true, ..filter };
    let summary = orch.run_batch(&forced, 10).await.unwrap();
    assert_eq!(summary.generated, 1);
    assert_eq!(provider.calls(), 2);

    let stored = repo.get(item.id).unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::Generated);
    assert_eq!(stored.attempts.len(), 2);
}

#[tokio::test]
async fn brief_without_blocks_generates_a_text_blob() {
    let repo = Arc::new(SqliteStore::open_in_memory().unwrap());
    let provider = ScriptedProvider::new(vec![Ok(
        "O Chevrolet Onix 2025 chega com motor 1.0 turbo...".into(),
    )]);
    let orch = orchestrator(repo.clone(), provider.clone());

    let brief = json!({
        "vehicle": "Chevrolet Onix 2025",
        "tema": "lançamento",
        "tom": "informativo"
    });
    let item = ContentItem::new(brief, None, Timestamp::now());
    repo.insert(&item).unwrap();

    let outcome = orch.process_one(item.clone()).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Generated);
    assert_eq!(provider.calls(), 1);

    let stored = repo.get(item.id).unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::Generated);
    assert_eq!(
        stored.generated_payload,
        Some(serde_json::Value::String(
            "O Chevrolet Onix 2025 chega com motor 1.0 turbo...".into()
        ))
    );
}

#[tokio::test]
async fn empty_generation_response_fails_retryably() {
    let repo = Arc::new(SqliteStore::open_in_memory().unwrap());
    let provider = ScriptedProvider::new(vec![Ok("   ".into())]);
    let orch = orchestrator(repo.clone(), provider);

    let item = ContentItem::new(json!({"tema": "comparativo"}), None, Timestamp::now());
    repo.insert(&item).unwrap();

    let outcome = orch.process_one(item.clone()).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Failed { terminal: false });
    assert_eq!(repo.get(item.id).unwrap().unwrap().retry_count, 1);
}

#[tokio::test]
async fn publish_is_idempotent_and_guarded_by_status() {
    let repo = Arc::new(SqliteStore::open_in_memory().unwrap());
    let provider = ScriptedProvider::new(vec![Ok(correction_line())]);
    let orch = orchestrator(repo.clone(), provider);

    let item = pending_item(&repo);

    // Publishing a pending item is an error, not a silent promotion.
    let reference = PublishedReference::new("depoimentos/onix-2025").unwrap();
    assert!(matches!(
        orch.publish(item.id, reference.clone()),
        Err(OrchestratorError::NotValidated { .. })
    ));

    orch.process_one(item.clone()).await.unwrap();
    let mut generated = repo.get(item.id).unwrap().unwrap();
    generated.validate(Timestamp::now()).unwrap();
    repo.update_guarded(&generated, ItemStatus::Generated).unwrap();

    let first = orch.publish(item.id, reference.clone()).unwrap();
    let second = orch
        .publish(item.id, PublishedReference::new("depoimentos/outro").unwrap())
        .unwrap();
    assert_eq!(first, reference);
    assert_eq!(second, reference);

    let stored = repo.get(item.id).unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::Published);
    assert_eq!(stored.published_reference, Some(reference));
}

#[tokio::test]
async fn retry_budget_exhaustion_is_terminal_across_sweeps() {
    let repo = Arc::new(SqliteStore::open_in_memory().unwrap());
    let failures: Vec<Result<String, GenerationError>> = (0..DEFAULT_MAX_RETRIES)
        .map(|_| {
            Err(GenerationError::ServiceRejected {
                status: 500,
                message: "upstream error".into(),
            })
        })
        .collect();
    let provider = ScriptedProvider::new(failures);
    let orch = orchestrator(repo.clone(), provider.clone());

    let item = pending_item(&repo);
    let filter = BatchFilter { max_retries: DEFAULT_MAX_RETRIES, ..BatchFilter::default() };

    for expected_retry in 1..=DEFAULT_MAX_RETRIES {
        let summary = orch.run_batch(&filter, 10).await.unwrap();
        assert_eq!(summary.failed, 1, "sweep {expected_retry}");
        let stored = repo.get(item.id).unwrap().unwrap();
        assert_eq!(stored.retry_count, expected_retry);
    }

    // Exhausted: later sweeps select nothing and the provider is not called again.
    let summary = orch.run_batch(&filter, 10).await.unwrap();
    assert_eq!(summary.processed, 0);
    assert_eq!(provider.calls(), DEFAULT_MAX_RETRIES as usize);
}

#[tokio::test]
async fn cleanup_respects_the_retention_window() {
    let repo = Arc::new(SqliteStore::open_in_memory().unwrap());
    let provider = ScriptedProvider::new(vec![]);
    let orch = orchestrator(repo.clone(), provider);

    // An old terminal failure and a fresh pending item.
    let mut old = ContentItem::new(
        testimony_document(),
        None,
        Timestamp::now().minus(Duration::from_secs(90 * 24 * 3600)),
    );
    old.begin_generation(Timestamp::now()).unwrap();
    old.fail_terminally(
        "bad source".into(),
        ModelId::new("gemini-1.5-pro").unwrap(),
        DEFAULT_MAX_RETRIES,
        Timestamp::now(),
    )
    .unwrap();
    repo.insert(&old).unwrap();
    pending_item(&repo);

    let removed = orch.cleanup(Duration::from_secs(30 * 24 * 3600)).unwrap();
    assert_eq!(removed, 1);
    assert!(repo.get(old.id).unwrap().is_none());
}
