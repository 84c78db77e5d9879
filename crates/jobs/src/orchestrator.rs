//! The batch workflow: select eligible items, generate/correct, validate,
//! persist, retry or fail.
//!
//! Every item mutation is a read-modify-write through the repository's
//! optimistic status guard, so two differently named jobs racing on the same
//! item cannot both win: the loser's write bounces and the item is skipped.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument, warn};

use corrector::{apply, build, build_generation, extract, parse_corrections, PromptContext};
use pipeline::{
    BatchFilter, Clock, ContentBlock, ContentItem, ContentItemId, ContentItemRepository,
    GenerationCost, GenerationError, GenerationOptions, GenerationProvider, ItemStatus,
    LifecycleError, ModelId, PublishedReference, RetryPolicy, StoreError,
};

/// Orchestrator failures. Guard conflicts and lifecycle violations surface
/// here; generation errors are folded into item state instead.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A persistence call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The item refused a transition (stale selection, operator interference).
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// `publish` was called on an item that is neither validated nor published.
    #[error("item {item}: publish requires a validated item (status {status:?})")]
    NotValidated {
        /// The offending item.
        item: ContentItemId,
        /// Its actual status.
        status: ItemStatus,
    },
}

/// What happened to one item during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Content was produced and the item advanced to `generated`.
    Generated,
    /// The rate-limit window was still open; the item was put back untouched.
    Deferred,
    /// The attempt failed; `terminal` is set when no retries remain.
    Failed {
        /// No further automatic processing will happen.
        terminal: bool,
    },
    /// Another process transitioned the item first; skipped.
    Skipped,
}

/// Counters for one sweep, logged at the end of the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub generated: usize,
    pub deferred: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Tuning for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Retry cap per item.
    pub max_retries: u32,
    /// Model requested from the generation service.
    pub model: ModelId,
    /// Flat cost recorded per service call.
    pub cost_per_call: GenerationCost,
}

/// Drives the generate/correct/persist workflow against the port traits.
pub struct Orchestrator {
    repo: Arc<dyn ContentItemRepository>,
    provider: Arc<dyn GenerationProvider>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        repo: Arc<dyn ContentItemRepository>,
        provider: Arc<dyn GenerationProvider>,
        clock: Arc<dyn Clock>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { repo, provider, clock, config }
    }

    /// Items eligible for this sweep, oldest first.
    pub fn select_batch(
        &self,
        filter: &BatchFilter,
        limit: usize,
    ) -> Result<Vec<ContentItem>, OrchestratorError> {
        Ok(self.repo.select_batch(filter, limit)?)
    }

    /// Runs `process_one` over a whole selection, summarizing outcomes.
    pub async fn run_batch(
        &self,
        filter: &BatchFilter,
        limit: usize,
    ) -> Result<BatchSummary, OrchestratorError> {
        let batch = self.select_batch(filter, limit)?;
        let mut summary = BatchSummary::default();
        for item in batch {
            summary.processed += 1;
            match self.process_one(item).await? {
                ProcessOutcome::Generated => summary.generated += 1,
                ProcessOutcome::Deferred => summary.deferred += 1,
                ProcessOutcome::Failed { .. } => summary.failed += 1,
                ProcessOutcome::Skipped => summary.skipped += 1,
            }
        }
        info!(
            processed = summary.processed,
            generated = summary.generated,
            deferred = summary.deferred,
            failed = summary.failed,
            skipped = summary.skipped,
            "batch complete"
        );
        Ok(summary)
    }

    /// Processes one item end to end.
    #[instrument(skip_all, fields(item = %item.id, category = ?item.category, attempts = item.attempts.len()))]
    pub async fn process_one(
        &self,
        mut item: ContentItem,
    ) -> Result<ProcessOutcome, OrchestratorError> {
        let now = self.clock.now();

        // A failed selection re-enters through `retrying` first.
        if item.status == ItemStatus::Failed {
            item.begin_retry(self.config.max_retries)?;
            match self.repo.update_guarded(&item, ItemStatus::Failed) {
                Ok(()) => {}
                Err(StoreError::GuardFailed { .. }) => return Ok(ProcessOutcome::Skipped),
                Err(e) => return Err(e.into()),
            }
        }

        let prior = item.status;
        // A forced selection re-processes already generated content.
        if prior == ItemStatus::Generated {
            item.begin_regeneration(now)?;
        } else {
            item.begin_generation(now)?;
        }
        match self.repo.update_guarded(&item, prior) {
            Ok(()) => {}
            Err(StoreError::GuardFailed { .. }) => {
                info!("item claimed by another process; skipping");
                return Ok(ProcessOutcome::Skipped);
            }
            Err(e) => return Err(e.into()),
        }

        match self.produce(&item).await {
            Ok(payload) => {
                item.complete_generation(
                    payload,
                    self.config.model.clone(),
                    self.config.cost_per_call,
                    self.clock.now(),
                )?;
                self.repo.update_guarded(&item, ItemStatus::Generating)?;
                info!(retry_count = item.retry_count, "item generated");
                Ok(ProcessOutcome::Generated)
            }
            Err(err) => self.record_failure(item, prior, err),
        }
    }

    /// Routes an item to the flow its source payload calls for: documents
    /// with a block sequence go through correction, block-less input briefs
    /// through fresh generation.
    async fn produce(&self, item: &ContentItem) -> Result<Value, GenerationError> {
        if item.source_payload.get("blocks").is_some() {
            self.correct(item).await
        } else {
            self.generate_from_brief(item).await
        }
    }

    /// The brief → prompt → service pipeline: the response is a single text
    /// blob stored as the generated payload.
    async fn generate_from_brief(&self, item: &ContentItem) -> Result<Value, GenerationError> {
        let context = prompt_context(item);
        let prompt = build_generation(&item.source_payload, &context);
        let options = GenerationOptions::generation(self.config.model.clone());
        let raw = self.provider.generate(&prompt, &options).await?;

        let text = raw.trim();
        if text.is_empty() {
            return Err(GenerationError::MalformedResponse {
                reason: "empty generation response".to_owned(),
                raw,
            });
        }
        Ok(Value::String(text.to_owned()))
    }

    /// The extraction → prompt → service → correction pipeline for one item.
    async fn correct(&self, item: &ContentItem) -> Result<Value, GenerationError> {
        let blocks = source_blocks(&item.source_payload)?;
        let drafts = extract(&blocks);
        if drafts.is_empty() {
            // Nothing eligible: the document is already normalized.
            info!("no eligible drafts; passing document through");
            return Ok(with_blocks(&item.source_payload, blocks));
        }

        let context = prompt_context(item);
        let prompt = build(&drafts, &context);
        let options = GenerationOptions::correction(self.config.model.clone());
        let raw = self.provider.generate(&prompt, &options).await?;

        let records = parse_corrections(&raw);
        if records.iter().all(Option::is_none) {
            return Err(GenerationError::MalformedResponse {
                reason: format!("no usable correction records for {} drafts", drafts.len()),
                raw,
            });
        }

        let corrected = apply(&blocks, &records);
        Ok(with_blocks(&item.source_payload, corrected))
    }

    fn record_failure(
        &self,
        mut item: ContentItem,
        prior: ItemStatus,
        err: GenerationError,
    ) -> Result<ProcessOutcome, OrchestratorError> {
        let now = self.clock.now();
        match err.retry_policy() {
            RetryPolicy::Deferred { after } => {
                // The call never happened; put the item back untouched.
                item.defer(prior)?;
                self.repo.update_guarded(&item, ItemStatus::Generating)?;
                info!(?after, "rate limit window open; item deferred");
                Ok(ProcessOutcome::Deferred)
            }
            RetryPolicy::Retryable => {
                item.fail(
                    err.attempt_record(),
                    self.config.model.clone(),
                    self.config.cost_per_call,
                    now,
                )?;
                self.repo.update_guarded(&item, ItemStatus::Generating)?;
                let terminal = item.is_terminal(self.config.max_retries);
                warn!(
                    retry_count = item.retry_count,
                    terminal,
                    error = %err,
                    "attempt failed"
                );
                Ok(ProcessOutcome::Failed { terminal })
            }
            RetryPolicy::NonRetryable => {
                item.fail_terminally(
                    err.attempt_record(),
                    self.config.model.clone(),
                    self.config.max_retries,
                    now,
                )?;
                self.repo.update_guarded(&item, ItemStatus::Generating)?;
                warn!(error = %err, "item failed terminally");
                Ok(ProcessOutcome::Failed { terminal: true })
            }
        }
    }

    /// Promotes a validated item to the public content store.
    ///
    /// Idempotent: a second call on an already-published item returns the
    /// stored reference and performs no write.
    pub fn publish(
        &self,
        id: ContentItemId,
        reference: PublishedReference,
    ) -> Result<PublishedReference, OrchestratorError> {
        let mut item = self
            .repo
            .get(id)?
            .ok_or(StoreError::NotFound { item: id })?;
        match item.status {
            ItemStatus::Published => Ok(item.published_reference.unwrap_or(reference)),
            ItemStatus::Validated => {
                let reference = item.publish(reference, self.clock.now())?;
                self.repo.update_guarded(&item, ItemStatus::Validated)?;
                info!(item = %id, reference = %reference, "item published");
                Ok(reference)
            }
            status => Err(OrchestratorError::NotValidated { item: id, status }),
        }
    }

    /// Removes terminal items older than the retention window. Maintenance
    /// only; never part of the generation critical path.
    pub fn cleanup(&self, older_than: std::time::Duration) -> Result<usize, OrchestratorError> {
        let cutoff = self.clock.now().minus(older_than);
        let removed = self
            .repo
            .delete_terminal_older_than(cutoff, self.config.max_retries)?;
        info!(removed, cutoff = %cutoff, "cleanup complete");
        Ok(removed)
    }
}

/// Context metadata shared by both prompt shapes.
fn prompt_context(item: &ContentItem) -> PromptContext {
    PromptContext {
        vehicle: item
            .source_payload
            .get("vehicle")
            .and_then(Value::as_str)
            .map(str::to_owned),
        category: item.category.as_ref().map(|c| c.as_str().to_owned()),
    }
}

/// Pulls the block sequence out of a source document.
fn source_blocks(source: &Value) -> Result<Vec<ContentBlock>, GenerationError> {
    let blocks = source
        .get("blocks")
        .ok_or_else(|| GenerationError::ValidationFailed {
            reason: "source document has no blocks".to_owned(),
        })?;
    serde_json::from_value(blocks.clone()).map_err(|e| GenerationError::ValidationFailed {
        reason: format!("source blocks are structurally invalid: {e}"),
    })
}

/// Re-assembles the document around a replaced block sequence.
fn with_blocks(source: &Value, blocks: Vec<ContentBlock>) -> Value {
    let mut doc = source.clone();
    if let Value::Object(map) = &mut doc {
        map.insert(
            "blocks".to_owned(),
            serde_json::to_value(blocks).unwrap_or(Value::Null),
        );
    }
    doc
}
