//! The Anchor Batch Orchestrator (spec §4.1, C7): the `runBatch` pipeline.
//!
//! Grounded on the teacher's `identity_committer::mod` (the
//! claim-then-process-then-persist batch shape, one `#[instrument]`ed
//! entry point, metrics emitted at each stage) and
//! `ethereum::write_provider` (a transaction sent under an
//! `Arc<tokio::sync::Mutex<_>>`, exactly the role the ledger mutex plays
//! here).

pub mod candidate;
pub mod metrics;

use std::collections::BTreeMap;
use std::sync::Arc;

use cid::Cid;
use futures::future::join_all;
use ledger_client::{LedgerAdapter, H256};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::block_store::{AnchorCommit, BlockStore, Proof, RawBlockStore};
use crate::config::OrchestratorConfig;
use crate::database::methods::{DbMethods, MetadataRepository};
use crate::database::types::{Request, RequestId, RequestStatus};
use crate::database::Database;
use crate::error::BatchError;
use crate::merkle;
use crate::orchestrator::candidate::{Candidate, CandidateBuilder};
use crate::orchestrator::metrics::BatchMetrics;

/// The accepted-requests-fail-back bookkeeping message for each
/// non-selected category (spec §4.1 step 4 / §7).
mod messages {
    pub const LOAD_FAILED: &str = "commit could not be loaded";
    pub const ALREADY_ANCHORED: &str = "already anchored";
    pub const CONFLICT_REJECTED: &str = "conflict resolution rejected commit: superseded by a newer request in the same stream";
}

/// Outcome of one `run_batch` invocation, returned for logging/tests; the
/// durable effects are what callers actually rely on.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub claimed: usize,
    pub accepted: usize,
    pub already_anchored: usize,
    pub failed_to_load: usize,
    pub unprocessed: usize,
    pub published: usize,
    pub publish_failed: usize,
}

pub struct Orchestrator<S> {
    db: Database,
    store: BlockStore<S>,
    ledger: Arc<dyn LedgerAdapter>,
    config: OrchestratorConfig,
    metrics: Arc<dyn BatchMetrics>,
    /// One ledger transaction in flight at a time per account (spec §5).
    ledger_mutex: Mutex<()>,
}

impl<S: RawBlockStore> Orchestrator<S> {
    pub fn new(
        db: Database,
        store: BlockStore<S>,
        ledger: Arc<dyn LedgerAdapter>,
        config: OrchestratorConfig,
        metrics: Arc<dyn BatchMetrics>,
    ) -> Self {
        Self {
            db,
            store,
            ledger,
            config,
            metrics,
            ledger_mutex: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &BlockStore<S> {
        &self.store
    }

    /// Runs one anchor batch end to end (spec §4.1). Returns `Ok(None)` for
    /// the empty-batch no-op (scenario 1); `Ok(Some(_))` once all durable
    /// state reflects the outcome.
    #[instrument(skip_all)]
    pub async fn run_batch(&self) -> Result<Option<BatchOutcome>, BatchError> {
        let started = std::time::Instant::now();
        let result = self.run_batch_inner().await;
        self.metrics
            .record_batch_duration(started.elapsed().as_secs_f64());

        if let Err(err) = &result {
            self.metrics.record_error(error_kind(err));
        }

        result
    }

    async fn run_batch_inner(&self) -> Result<Option<BatchOutcome>, BatchError> {
        // Step 1: claim. Claimed up to `maxStreamLimit` (spec §4.1 step 1),
        // a looser bound than the step-3 selection cap so overflow beyond
        // the cap is actually reachable and reclassified to PENDING there.
        let min = self.config.resolved_min_stream_count() as i64;
        let max = self.config.max_stream_limit as i64;

        let claimed = self.db.batch_processing(min, max).await.map_err(BatchError::PersistFailure)?;
        if claimed.is_empty() {
            return Ok(None);
        }
        let claimed_count = claimed.len();

        match self.process_claimed(claimed).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(err) => {
                warn!(error = %err, "batch failed, reverting claimed requests to PENDING");
                self.metrics
                    .record_requests("reverted_to_pending", claimed_count);
                Err(err)
            }
        }
    }

    async fn process_claimed(
        &self,
        claimed: Vec<Request>,
    ) -> Result<BatchOutcome, BatchError> {
        let claimed_ids: Vec<RequestId> = claimed.iter().map(|r| r.id).collect();

        // Step 2: candidate build (group by stream id, load metadata).
        let mut by_stream: BTreeMap<Cid, Vec<Request>> = BTreeMap::new();
        for request in claimed {
            by_stream.entry(request.stream_id).or_default().push(request);
        }

        let mut candidates = Vec::with_capacity(by_stream.len());
        for (stream_id, requests) in by_stream {
            candidates.push(self.build_candidate(stream_id, requests).await);
        }

        // Deterministic order: earliest request date asc, stream id asc
        // (spec §4.6); `BTreeMap` already gave us stream-id order, so a
        // stable sort on date preserves the tie-break.
        candidates.sort_by_key(|c: &Candidate| c.earliest_request_date());

        // Step 3: candidate selection (batch cap + already-anchored check).
        let limit = self.config.stream_count_limit();
        let (selected, overflow) = if candidates.len() > limit {
            let tail = candidates.split_off(limit);
            (candidates, tail)
        } else {
            (candidates, Vec::new())
        };

        let mut accepted = Vec::new();
        let mut already_anchored = Vec::new();
        let mut failed_to_load = Vec::new();
        let mut selected_rejected: Vec<Request> = Vec::new();

        for candidate in selected {
            selected_rejected.extend(candidate.rejected_requests.iter().cloned());

            if candidate.cid.is_none() {
                failed_to_load.push(candidate);
                continue;
            }

            let newest = candidate.newest_accepted_request().expect("cid implies an accepted request");
            let prior = self
                .db
                .find_by_request(newest.id)
                .await
                .map_err(BatchError::PersistFailure)?;

            if prior.is_some() {
                already_anchored.push(candidate);
            } else {
                accepted.push(candidate);
            }
        }

        // Step 4: non-selected bookkeeping.
        self.apply_bookkeeping(&failed_to_load, RequestStatus::Failed, Some(messages::LOAD_FAILED), false)
            .await?;
        self.apply_bookkeeping(&already_anchored, RequestStatus::Completed, Some(messages::ALREADY_ANCHORED), true)
            .await?;
        self.revert_unprocessed(&overflow).await?;

        // Spec §4.1 step 4 / §7 taxonomy: conflicting requests are FAILED
        // with a conflict-resolution message, not returned to PENDING.
        let rejected_ids: Vec<RequestId> = selected_rejected.iter().map(|r| r.id).collect();
        self.apply_id_bookkeeping(&rejected_ids, RequestStatus::Failed, Some(messages::CONFLICT_REJECTED), false)
            .await?;

        self.metrics.record_requests("failed_to_load", failed_to_load.len());
        self.metrics.record_requests("already_anchored", already_anchored.len());
        self.metrics.record_requests("unprocessed", overflow.len());
        self.metrics.record_requests("rejected", rejected_ids.len());

        let mut outcome = BatchOutcome {
            claimed: claimed_ids.len(),
            accepted: accepted.len(),
            already_anchored: already_anchored.len(),
            failed_to_load: failed_to_load.len(),
            unprocessed: overflow.len(),
            published: 0,
            publish_failed: 0,
        };

        // Step 5: empty check.
        if accepted.is_empty() {
            return Ok(outcome);
        }

        // Step 6: merkle build.
        let tree = merkle::build(&self.store, &accepted, self.config.merkle_depth_limit)
            .await
            .map_err(BatchError::MerkleBuildFailure)?;

        // Step 7: ledger commit, serialized by the transaction mutex.
        let root_bytes = tree.root.hash().digest();
        if root_bytes.len() != 32 {
            return Err(BatchError::InvalidRootDigest(root_bytes.len()));
        }
        let root_h256 = H256::from_slice(root_bytes);
        let tx_type = self
            .config
            .use_smart_contract_anchors
            .then_some(Proof::SMART_CONTRACT_TX_TYPE);

        let transaction = {
            let _permit = self.ledger_mutex.lock().await;
            self.ledger
                .send_transaction(root_h256, tx_type)
                .await
                .map_err(BatchError::LedgerFailure)?
        };

        // Step 8: proof publication.
        let proof = Proof {
            block_number: transaction.block_number,
            block_timestamp: transaction.block_timestamp,
            root: tree.root,
            chain_id: transaction.chain_id,
            tx_hash: crate::cidutil::cid_for(transaction.tx_hash.as_bytes()),
            tx_type: tx_type.map(str::to_owned),
        };
        let proof_cid = self
            .store
            .store_record(&proof)
            .await
            .map_err(BatchError::ProofPublishFailure)?;

        // Step 9: per-candidate anchor commit publication (parallel,
        // per-candidate failures stay local per spec §9 REDESIGN FLAGS).
        let publish_results = join_all(accepted.iter().enumerate().map(|(i, candidate)| {
            let path = tree.leaf_paths[i].clone();
            let prev = candidate.anchor_cid();
            let stream_id = candidate.stream_id;
            async move {
                let commit = AnchorCommit {
                    id: stream_id,
                    prev,
                    proof: proof_cid,
                    path,
                };
                let result = self.store.publish_anchor_commit(&commit, &stream_id).await;
                (candidate, commit, result)
            }
        }))
        .await;

        let mut published_records = Vec::new();
        let mut publish_failed_requests = Vec::new();

        for (candidate, commit, result) in publish_results {
            match result {
                Ok(commit_cid) => {
                    for request in &candidate.accepted_requests {
                        published_records.push((
                            request.id,
                            crate::database::types::AnchorRecord {
                                request_id: request.id,
                                proof_cid,
                                path: commit.path.clone(),
                                cid: commit_cid,
                            },
                        ));
                    }
                }
                Err(err) => {
                    warn!(stream_id = %candidate.stream_id, error = %err, "anchor commit publish failed");
                    publish_failed_requests.extend(candidate.accepted_requests.iter().map(|r| r.id));
                }
            }
        }

        self.apply_id_bookkeeping(&publish_failed_requests, RequestStatus::Failed, Some("anchor commit publish failed"), false)
            .await?;

        outcome.published = published_records.len();
        outcome.publish_failed = publish_failed_requests.len();
        self.metrics.record_requests("published", outcome.published);
        self.metrics.record_requests("publish_failed", outcome.publish_failed);

        // Step 10: persist, in one REPEATABLE READ transaction.
        let completed_ids: Vec<RequestId> = published_records.iter().map(|(id, _)| *id).collect();
        let mut tx = self.db.begin_repeatable_read().await.map_err(BatchError::PersistFailure)?;

        for (_, record) in &published_records {
            tx.insert_anchor_record(record).await.map_err(BatchError::PersistFailure)?;
        }
        if !completed_ids.is_empty() {
            tx.update_requests(&completed_ids, RequestStatus::Completed, None, true)
                .await
                .map_err(BatchError::PersistFailure)?;
        }
        tx.commit().await.map_err(|e| BatchError::PersistFailure(e.into()))?;

        info!(?outcome, "batch completed");
        Ok(outcome)
    }

    async fn build_candidate(&self, stream_id: Cid, requests: Vec<Request>) -> Candidate {
        match self.db.pool().load_metadata(&stream_id).await {
            Ok(metadata) => {
                let builder = if self.config.conflict_resolution_enabled {
                    // Spec §9 Open Question 1: only the newest request per
                    // stream is anchored; older ones in the same batch are
                    // superseded and sent back to PENDING (see DESIGN.md).
                    let newest_id = requests.iter().max_by_key(|r| r.created_at).map(|r| r.id);
                    requests
                        .into_iter()
                        .fold(CandidateBuilder::new(stream_id, metadata), |builder, request| {
                            if Some(request.id) == newest_id {
                                builder.accept(request)
                            } else {
                                builder.reject(request)
                            }
                        })
                } else {
                    requests
                        .into_iter()
                        .fold(CandidateBuilder::new(stream_id, metadata), |builder, request| {
                            builder.accept(request)
                        })
                };
                builder.build()
            }
            Err(err) => {
                warn!(%stream_id, error = %err, "failed to load stream metadata");
                requests
                    .into_iter()
                    .fold(
                        CandidateBuilder::new(stream_id, serde_json::Value::Null),
                        |builder, request| builder.fail(request),
                    )
                    .build()
            }
        }
    }

    async fn apply_bookkeeping(
        &self,
        candidates: &[Candidate],
        status: RequestStatus,
        message: Option<&str>,
        pinned: bool,
    ) -> Result<(), BatchError> {
        let ids: Vec<RequestId> = candidates
            .iter()
            .flat_map(|c| c.accepted_requests.iter().chain(&c.failed_requests))
            .map(|r| r.id)
            .collect();

        self.apply_id_bookkeeping(&ids, status, message, pinned).await
    }

    async fn apply_id_bookkeeping(
        &self,
        ids: &[RequestId],
        status: RequestStatus,
        message: Option<&str>,
        pinned: bool,
    ) -> Result<(), BatchError> {
        self.db
            .update_requests(ids, status, message, pinned)
            .await
            .map_err(BatchError::PersistFailure)
    }

    /// Step 11 fallback and the overflow tail of step 4: revert to PENDING
    /// so the next batch retries.
    async fn revert_unprocessed(&self, candidates: &[Candidate]) -> Result<(), BatchError> {
        let ids: Vec<RequestId> = candidates
            .iter()
            .flat_map(|c| c.accepted_requests.iter().chain(&c.rejected_requests))
            .map(|r| r.id)
            .collect();

        self.apply_id_bookkeeping(&ids, RequestStatus::Pending, None, false).await
    }
}

fn error_kind(err: &BatchError) -> &'static str {
    match err {
        BatchError::RequestLoad(_) => "request_load",
        BatchError::ConflictRejection(_) => "conflict_rejection",
        BatchError::MerkleBuildFailure(_) => "merkle_build_failure",
        BatchError::InvalidRootDigest(_) => "invalid_root_digest",
        BatchError::LedgerFailure(_) => "ledger_failure",
        BatchError::ProofPublishFailure(_) => "proof_publish_failure",
        BatchError::AnchorCommitPublishFailure(_) => "anchor_commit_publish_failure",
        BatchError::PersistFailure(_) => "persist_failure",
    }
}
