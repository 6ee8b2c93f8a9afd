//! The `Candidate` aggregation (spec §3) and its builder.
//!
//! The source mutates a `Candidate` in place via `markAsAnchored`,
//! `failRequest`, `setTipToAnchor` (spec §9 REDESIGN FLAGS). This builds
//! it as an immutable record instead: [`CandidateBuilder`] takes staged
//! inputs and [`CandidateBuilder::build`] produces a `Candidate` the
//! orchestrator only ever reads.

use chrono::{DateTime, Utc};
use cid::Cid;
use serde_json::Value as Metadata;

use crate::database::types::Request;

/// One stream's pending requests grouped for a batch (spec §3).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub stream_id: Cid,
    /// The commit CID chosen as the tip to anchor: the `cid` of
    /// [`Candidate::newest_accepted_request`], or `None` if nothing in
    /// this group was accepted.
    pub cid: Option<Cid>,
    pub metadata: Metadata,
    pub accepted_requests: Vec<Request>,
    pub rejected_requests: Vec<Request>,
    pub failed_requests: Vec<Request>,
    pub already_anchored: bool,
}

impl Candidate {
    /// The accepted request with the greatest `createdAt` (spec §3).
    pub fn newest_accepted_request(&self) -> Option<&Request> {
        self.accepted_requests.iter().max_by_key(|r| r.created_at)
    }

    pub fn earliest_request_date(&self) -> Option<DateTime<Utc>> {
        self.accepted_requests
            .iter()
            .chain(&self.rejected_requests)
            .chain(&self.failed_requests)
            .map(|r| r.created_at)
            .min()
    }

    /// The CID to hand the Merkle tree builder, once the orchestrator has
    /// confirmed this candidate is neither empty nor already anchored.
    ///
    /// # Panics
    ///
    /// Panics if called on a candidate with no accepted requests — the
    /// orchestrator never selects such a candidate for tree construction.
    pub fn anchor_cid(&self) -> Cid {
        self.cid.expect("candidate selected for anchoring has no accepted requests")
    }

    #[cfg(test)]
    pub fn for_test(stream_id: Cid, cid: Cid) -> Self {
        use crate::database::types::RequestStatus;

        let request = Request {
            id: crate::database::types::RequestId(1),
            stream_id,
            cid,
            created_at: Utc::now(),
            status: RequestStatus::Processing,
            message: None,
            pinned: false,
        };

        Self {
            stream_id,
            cid: Some(cid),
            metadata: Metadata::Null,
            accepted_requests: vec![request],
            rejected_requests: Vec::new(),
            failed_requests: Vec::new(),
            already_anchored: false,
        }
    }
}

/// Staged, immutable construction of a [`Candidate`] (spec §9 REDESIGN
/// FLAGS). Each `accept`/`reject`/`fail` call consumes and returns `self`
/// so a classification pass reads as a chain of transformations rather
/// than mutation.
pub struct CandidateBuilder {
    stream_id: Cid,
    metadata: Metadata,
    accepted: Vec<Request>,
    rejected: Vec<Request>,
    failed: Vec<Request>,
    already_anchored: bool,
}

impl CandidateBuilder {
    pub fn new(stream_id: Cid, metadata: Metadata) -> Self {
        Self {
            stream_id,
            metadata,
            accepted: Vec::new(),
            rejected: Vec::new(),
            failed: Vec::new(),
            already_anchored: false,
        }
    }

    #[must_use]
    pub fn accept(mut self, request: Request) -> Self {
        self.accepted.push(request);
        self
    }

    #[must_use]
    pub fn reject(mut self, request: Request) -> Self {
        self.rejected.push(request);
        self
    }

    #[must_use]
    pub fn fail(mut self, request: Request) -> Self {
        self.failed.push(request);
        self
    }

    #[must_use]
    pub fn already_anchored(mut self, already_anchored: bool) -> Self {
        self.already_anchored = already_anchored;
        self
    }

    pub fn build(self) -> Candidate {
        let cid = self
            .accepted
            .iter()
            .max_by_key(|r| r.created_at)
            .map(|r| r.cid);

        Candidate {
            stream_id: self.stream_id,
            cid,
            metadata: self.metadata,
            accepted_requests: self.accepted,
            rejected_requests: self.rejected,
            failed_requests: self.failed,
            already_anchored: self.already_anchored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::types::{RequestId, RequestStatus};
    use std::time::Duration;
    use test_utils::random_cid;

    fn request_at(id: i64, created_at: DateTime<Utc>) -> Request {
        Request {
            id: RequestId(id),
            stream_id: random_cid(),
            cid: random_cid(),
            created_at,
            status: RequestStatus::Processing,
            message: None,
            pinned: false,
        }
    }

    #[test]
    fn newest_accepted_request_is_the_latest_by_created_at() {
        let now = Utc::now();
        let earlier = request_at(1, now - Duration::from_secs(60));
        let later = request_at(2, now);

        let candidate = CandidateBuilder::new(random_cid(), Metadata::Null)
            .accept(earlier)
            .accept(later.clone())
            .build();

        assert_eq!(candidate.newest_accepted_request().unwrap().id, later.id);
        assert_eq!(candidate.cid, Some(later.cid));
    }

    #[test]
    fn candidate_with_no_accepted_requests_has_no_cid() {
        let now = Utc::now();
        let candidate = CandidateBuilder::new(random_cid(), Metadata::Null)
            .fail(request_at(1, now))
            .build();

        assert_eq!(candidate.cid, None);
    }
}
