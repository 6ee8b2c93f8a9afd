//! The Block Store Adapter (spec §4, C1): put/get content-addressed blocks,
//! store a typed record and return its CID, and publish an anchor commit
//! tied to a stream id.
//!
//! Grounded on the teacher's scanning/contract adapters (one narrow
//! `async_trait` per external system, §6 treats this one as a CID-keyed
//! block store) and on the Ceramic/Kubo HTTP client in the example pack
//! (`other_examples/.../ceramic-src-kubo-mod.rs`), which puts and gets
//! blocks from an IPFS-compatible HTTP API keyed by `cid::Cid`.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use cid::Cid;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The raw, object-safe half of the adapter: opaque byte blocks in, CIDs
/// out. Concrete stores (HTTP Kubo client, in-memory double) implement
/// just this.
#[async_trait]
pub trait RawBlockStore: Send + Sync {
    async fn put_bytes(&self, bytes: Vec<u8>) -> anyhow::Result<Cid>;

    async fn get_bytes(&self, cid: &Cid) -> anyhow::Result<Option<Vec<u8>>>;

    /// Tags `cid` as the current head of `stream_id`. Ceramic-style stream
    /// nodes use this to resolve "the latest anchor commit for this
    /// stream"; here it's treated as an opaque oracle (spec §1).
    async fn publish_stream_head(&self, stream_id: &Cid, cid: &Cid) -> anyhow::Result<()>;

    /// Releases the pin held for `stream_id`'s published blocks. The
    /// decision of *which* streams qualify lives in the Request Repository
    /// (spec §4.5 `findRequestsToGarbageCollect`); the store only owns the
    /// single per-stream unpin call (pinning/GC internals beyond that are
    /// out of scope, spec §1).
    async fn unpin_stream(&self, stream_id: &Cid) -> anyhow::Result<()>;
}

/// Typed convenience wrapper over a [`RawBlockStore`]. Generic methods
/// can't live on the trait itself (object safety), so they live here
/// instead, the same split the teacher uses between `Database` (a thin
/// `Pool<Postgres>` wrapper) and the `DbMethods` extension trait.
pub struct BlockStore<S> {
    inner: S,
}

impl<S: RawBlockStore> BlockStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub async fn put(&self, bytes: Vec<u8>) -> anyhow::Result<Cid> {
        self.inner.put_bytes(bytes).await
    }

    pub async fn get(&self, cid: &Cid) -> anyhow::Result<Option<Vec<u8>>> {
        self.inner.get_bytes(cid).await
    }

    /// Serializes `record` and writes it as a single block, returning the
    /// CID the store computed for it.
    pub async fn store_record<T>(&self, record: &T) -> anyhow::Result<Cid>
    where
        T: Serialize + Sync,
    {
        let bytes = serde_json::to_vec(record)?;
        self.put(bytes).await
    }

    /// Reads back a block written by [`Self::store_record`].
    pub async fn get_record<T>(&self, cid: &Cid) -> anyhow::Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.get(cid).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn unpin_stream(&self, stream_id: &Cid) -> anyhow::Result<()> {
        self.inner.unpin_stream(stream_id).await
    }

    /// Writes the anchor commit record and tags it as the stream's head.
    pub async fn publish_anchor_commit(
        &self,
        record: &AnchorCommit,
        stream_id: &Cid,
    ) -> anyhow::Result<Cid> {
        let cid = self.store_record(record).await?;
        self.inner.publish_stream_head(stream_id, &cid).await?;
        Ok(cid)
    }
}

/// A block with fields `{id: streamIdCID, prev: commitCID, proof: proofCID,
/// path}` (spec §3/§6). `path` is the slash-delimited root-to-leaf walk
/// produced by the Merkle Tree Builder (spec §4.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorCommit {
    pub id: Cid,
    pub prev: Cid,
    pub proof: Cid,
    pub path: String,
}

/// `{blockNumber, blockTimestamp, root, chainId, txHash, txType?}` (spec
/// §3/§6). Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub block_number: u64,
    pub block_timestamp: i64,
    pub root: Cid,
    pub chain_id: u64,
    pub tx_hash: Cid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_type: Option<String>,
}

impl Proof {
    /// `txType = "f(bytes32)"` iff smart-contract anchoring is enabled
    /// (spec §6).
    pub const SMART_CONTRACT_TX_TYPE: &'static str = "f(bytes32)";
}
