//! Wires the Database, Block Store, and Ledger adapters into one
//! `Orchestrator`, grounded on the teacher's `app::App` (an `Arc<Self>`
//! holding the database plus whichever identity processor the config
//! selected).

use std::sync::Arc;

use cid::Cid;
use ledger_client::LedgerAdapter;

use crate::block_store::http::HttpBlockStore;
use crate::block_store::BlockStore;
use crate::config::Config;
use crate::database::methods::DbMethods;
use crate::database::Database;
use crate::event_emitter::{self, AnchorEventSink, LoggingEventSink};
use crate::orchestrator::metrics::{BatchMetrics, PrometheusMetrics};
use crate::orchestrator::{BatchOutcome, Orchestrator};

pub struct App {
    db: Database,
    config: Config,
    orchestrator: Orchestrator<HttpBlockStore>,
    event_sink: Arc<dyn AnchorEventSink>,
}

impl App {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db = Database::new(
            config.database.database.expose(),
            config.database.max_connections,
        )
        .await?;

        let store = BlockStore::new(HttpBlockStore::new(
            config.block_store.url.clone(),
            config.block_store.timeout,
        )?);

        let ledger = ledger_client::LedgerClient::new(config.ledger.url.clone())
            .with_polling(config.ledger.poll_interval, config.ledger.poll_timeout);
        let ledger: Arc<dyn LedgerAdapter> = Arc::new(ledger);

        let metrics: Arc<dyn BatchMetrics> = Arc::new(PrometheusMetrics);

        let orchestrator = Orchestrator::new(db.clone(), store, ledger, config.app.clone(), metrics);

        Ok(Self {
            db,
            config,
            orchestrator,
            event_sink: Arc::new(LoggingEventSink),
        })
    }

    pub async fn run_batch(&self) -> Result<Option<BatchOutcome>, crate::error::BatchError> {
        self.orchestrator.run_batch().await
    }

    pub async fn emit_anchor_event_if_ready(&self) -> anyhow::Result<bool> {
        event_emitter::emit_if_ready(&self.db, &self.config.app, self.event_sink.as_ref()).await
    }

    /// Finds streams with no remaining live requests and releases their
    /// block-store pins (spec §6 `garbageCollectPinnedStreams`).
    pub async fn garbage_collect_pinned_streams(&self) -> anyhow::Result<Vec<Cid>> {
        let stream_ids = self.db.find_requests_to_garbage_collect().await?;

        for stream_id in &stream_ids {
            self.orchestrator.store().unpin_stream(stream_id).await?;
        }

        Ok(stream_ids)
    }
}
