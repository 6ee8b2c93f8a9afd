//! Wire/row types for the Request and Anchor repositories (spec §3).
//!
//! Grounded on the teacher's `identity_tree/status.rs` (a `sqlx`-backed
//! enum with a `FromStr`/`Display` pair matching the Postgres `TEXT`
//! encoding) and `database/types.rs` (newtype ids deriving `sqlx::Type`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cid::Cid;
use serde::{Deserialize, Serialize};

/// Opaque request id (spec §3: `id` is opaque to the core).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub i64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The request status DAG of spec §3: `PENDING → READY → PROCESSING →
/// {COMPLETED, FAILED}`, with `FAILED→PENDING` and `READY→PENDING` retry
/// edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Ready,
    Processing,
    Completed,
    Failed,
}

impl RequestStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Ready => "READY",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = UnknownRequestStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "READY" => Ok(Self::Ready),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownRequestStatus(other.to_owned())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown request status: {0}")]
pub struct UnknownRequestStatus(String);

impl sqlx::Type<sqlx::Postgres> for RequestStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for RequestStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for RequestStatus {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(s.parse()?)
    }
}

/// An anchor request row (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Request {
    pub id: RequestId,
    #[sqlx(try_from = "String")]
    pub stream_id: Cid,
    #[sqlx(try_from = "String")]
    pub cid: Cid,
    pub created_at: DateTime<Utc>,
    pub status: RequestStatus,
    pub message: Option<String>,
    pub pinned: bool,
}

/// A persisted anchor record (spec §3): one row per successfully published
/// anchor commit.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AnchorRecord {
    pub request_id: RequestId,
    #[sqlx(try_from = "String")]
    pub proof_cid: Cid,
    pub path: String,
    #[sqlx(try_from = "String")]
    pub cid: Cid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_status_round_trips_through_its_wire_string() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Ready,
            RequestStatus::Processing,
            RequestStatus::Completed,
            RequestStatus::Failed,
        ] {
            let parsed: RequestStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn unknown_status_string_is_rejected() {
        assert!("BOGUS".parse::<RequestStatus>().is_err());
    }
}
