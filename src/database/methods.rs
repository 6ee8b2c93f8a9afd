//! Request/Anchor repository methods (spec §4.5), as a blanket extension
//! trait over anything `sqlx` can acquire a connection from — a pool, a
//! transaction, or a bare connection — matching the teacher's
//! `DbMethods<'c>: Acquire<'c, Database = Postgres>` shape so the same
//! calls compose inside [`super::Database::in_repeatable_read_transaction`]
//! or standalone.

use std::time::Duration;

use async_trait::async_trait;
use cid::Cid;
use sqlx::{Acquire, Postgres};
use tracing::instrument;

use super::types::{AnchorRecord, Request, RequestId, RequestStatus};
use super::Error;

#[async_trait]
pub trait DbMethods<'c>: Acquire<'c, Database = Postgres> + Send + Sync + Sized {
    #[instrument(skip(self), level = "debug")]
    async fn count_by_status(self, status: RequestStatus) -> Result<i64, Error> {
        let mut conn = self.acquire().await?;

        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM requests WHERE status = $1")
            .bind(status)
            .fetch_one(&mut *conn)
            .await?;

        Ok(count)
    }

    /// Atomically claims up to `max` requests currently READY, provided at
    /// least `min` are available, flipping them to PROCESSING (spec §4.1
    /// step 1). Returns an empty vec without writing anything if fewer
    /// than `min` are READY.
    #[instrument(skip(self), level = "debug")]
    async fn batch_processing(self, min: i64, max: i64) -> Result<Vec<Request>, Error> {
        let mut conn = self.acquire().await?;
        let mut tx = conn.begin().await?;

        let available: i64 =
            sqlx::query_scalar("SELECT count(*) FROM requests WHERE status = $1")
                .bind(RequestStatus::Ready)
                .fetch_one(&mut *tx)
                .await?;

        if available < min {
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let claimed: Vec<Request> = sqlx::query_as(
            r#"
            UPDATE requests
            SET status = $1
            WHERE id IN (
                SELECT id FROM requests
                WHERE status = $2
                ORDER BY created_at ASC, stream_id ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, stream_id, cid, created_at, status, message, pinned
            "#,
        )
        .bind(RequestStatus::Processing)
        .bind(RequestStatus::Ready)
        .bind(max)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(claimed)
    }

    /// Claims up to `max` PENDING requests into READY, provided at least
    /// `min` are available (spec §4.4 `findAndMarkReady`).
    #[instrument(skip(self), level = "debug")]
    async fn find_and_mark_ready(self, min: i64, max: i64) -> Result<Vec<Request>, Error> {
        let mut conn = self.acquire().await?;
        let mut tx = conn.begin().await?;

        let available: i64 =
            sqlx::query_scalar("SELECT count(*) FROM requests WHERE status = $1")
                .bind(RequestStatus::Pending)
                .fetch_one(&mut *tx)
                .await?;

        if available < min {
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let marked: Vec<Request> = sqlx::query_as(
            r#"
            UPDATE requests
            SET status = $1, ready_at = now()
            WHERE id IN (
                SELECT id FROM requests
                WHERE status = $2
                ORDER BY created_at ASC, stream_id ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, stream_id, cid, created_at, status, message, pinned
            "#,
        )
        .bind(RequestStatus::Ready)
        .bind(RequestStatus::Pending)
        .bind(max)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(marked)
    }

    /// Requests whose READY status has outlived `expiry` are swept back to
    /// PENDING (spec §4.4). Returns the number updated.
    #[instrument(skip(self), level = "debug")]
    async fn update_expiring_ready_requests(self, expiry: Duration) -> Result<u64, Error> {
        let mut conn = self.acquire().await?;

        let result = sqlx::query(
            r#"
            UPDATE requests
            SET status = $1
            WHERE status = $2
              AND ready_at < now() - make_interval(secs => $3)
            "#,
        )
        .bind(RequestStatus::Pending)
        .bind(RequestStatus::Ready)
        .bind(expiry.as_secs_f64())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Transitions every request in `ids` to `status`, stamping `message`
    /// and `pinned` (spec §4.1 step 4).
    #[instrument(skip(self, ids), level = "debug")]
    async fn update_requests(
        self,
        ids: &[RequestId],
        status: RequestStatus,
        message: Option<&str>,
        pinned: bool,
    ) -> Result<(), Error> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.acquire().await?;
        let raw_ids: Vec<i64> = ids.iter().map(|id| id.0).collect();

        sqlx::query(
            r#"
            UPDATE requests
            SET status = $1, message = $2, pinned = $3
            WHERE id = ANY($4)
            "#,
        )
        .bind(status)
        .bind(message)
        .bind(pinned)
        .bind(&raw_ids)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Streams to garbage-collect: those with no PENDING/READY/PROCESSING
    /// requests left and no `pinned` completed request (spec §6,
    /// `garbageCollectPinnedStreams`).
    #[instrument(skip(self), level = "debug")]
    async fn find_requests_to_garbage_collect(self) -> Result<Vec<Cid>, Error> {
        let mut conn = self.acquire().await?;

        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT stream_id
            FROM requests r
            WHERE NOT EXISTS (
                SELECT 1 FROM requests other
                WHERE other.stream_id = r.stream_id
                  AND (other.status IN ($1, $2, $3) OR (other.status = $4 AND other.pinned))
            )
            "#,
        )
        .bind(RequestStatus::Pending)
        .bind(RequestStatus::Ready)
        .bind(RequestStatus::Processing)
        .bind(RequestStatus::Completed)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter()
            .map(|(stream_id,)| Ok(Cid::try_from(stream_id)?))
            .collect()
    }

    /// Any prior anchor for the same request (spec §4.1 step 3:
    /// already-anchored detection).
    #[instrument(skip(self), level = "debug")]
    async fn find_by_request(self, request_id: RequestId) -> Result<Option<AnchorRecord>, Error> {
        let mut conn = self.acquire().await?;

        let record = sqlx::query_as(
            r#"
            SELECT request_id, proof_cid, path, cid
            FROM anchors
            WHERE request_id = $1
            "#,
        )
        .bind(request_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(record)
    }

    /// Inserts one anchor record (spec §4.1 step 10).
    #[instrument(skip(self), level = "debug")]
    async fn insert_anchor_record(self, record: &AnchorRecord) -> Result<(), Error> {
        let mut conn = self.acquire().await?;

        sqlx::query(
            r#"
            INSERT INTO anchors (request_id, proof_cid, path, cid)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(record.request_id)
        .bind(record.proof_cid.to_string())
        .bind(&record.path)
        .bind(record.cid.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

impl<'c, T> DbMethods<'c> for T where T: Acquire<'c, Database = Postgres> + Send + Sync + Sized {}

impl sqlx::Type<Postgres> for RequestId {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::Type<Postgres>>::type_info()
    }
}

impl sqlx::Encode<'_, Postgres> for RequestId {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <i64 as sqlx::Encode<Postgres>>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, Postgres> for RequestId {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(<i64 as sqlx::Decode<Postgres>>::decode(value)?))
    }
}

/// Per-stream metadata required to build a leaf (spec §4.5 / C5:
/// Metadata Repository). Stubbed as the identity function over the
/// Ceramic-style commit JSON the content network already returns; the
/// actual stream-document format is out of scope (spec §1).
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    async fn load_metadata(&self, stream_id: &Cid) -> Result<serde_json::Value, Error>;
}

#[async_trait]
impl MetadataRepository for sqlx::Pool<Postgres> {
    async fn load_metadata(&self, stream_id: &Cid) -> Result<serde_json::Value, Error> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT metadata FROM stream_metadata WHERE stream_id = $1")
                .bind(stream_id.to_string())
                .fetch_optional(self)
                .await?;

        Ok(row.map(|(value,)| value).unwrap_or(serde_json::Value::Null))
    }
}
