//! The Anchor Event Emitter (spec §4.4, C9): signals downstream workers
//! that a READY batch exists, with expiry-driven retry.
//!
//! Grounded on the teacher's `task_monitor::mod` (a periodic check that
//! either finds work and notifies a channel, or finds nothing and
//! returns), reworked into the single-invocation shape spec §6 requires
//! (no long-lived loop, one call per process invocation).

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::database::methods::DbMethods;
use crate::database::Database;

/// Where a "batch is ready" signal goes. The scheduler process that reacts
/// to it is out of scope (spec §1); this only owns deciding *whether* to
/// emit and tagging the event with a fresh id.
#[async_trait]
pub trait AnchorEventSink: Send + Sync {
    async fn emit(&self, event_id: Uuid) -> anyhow::Result<()>;
}

/// Logs the event. The default sink when no message broker is configured;
/// emission failures here are not expected, but per spec §4.4 any failure
/// is logged and swallowed regardless of sink.
pub struct LoggingEventSink;

#[async_trait]
impl AnchorEventSink for LoggingEventSink {
    async fn emit(&self, event_id: Uuid) -> anyhow::Result<()> {
        info!(%event_id, "anchor batch ready");
        Ok(())
    }
}

/// Runs `emitIfReady()` once (spec §4.4). Returns whether an event was
/// emitted.
pub async fn emit_if_ready(
    db: &Database,
    config: &OrchestratorConfig,
    sink: &dyn AnchorEventSink,
) -> anyhow::Result<bool> {
    use crate::database::types::RequestStatus;

    let ready_count = db.count_by_status(RequestStatus::Ready).await?;

    let should_emit = if ready_count > 0 {
        db.update_expiring_ready_requests(config.ready_expiry).await? > 0
    } else {
        let min = config.resolved_min_stream_count() as i64;
        let max = config.stream_count_limit() as i64;
        !db.find_and_mark_ready(min, max).await?.is_empty()
    };

    if !should_emit {
        return Ok(false);
    }

    let event_id = Uuid::new_v4();
    if let Err(err) = sink.emit(event_id).await {
        warn!(%event_id, error = %err, "anchor event emission failed, will retry on next invocation");
    }

    Ok(true)
}
