use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};

use super::RawBlockStore;

const RAW_CODEC: u64 = 0x55;

/// An in-memory block store, used in tests and as the default for the
/// three CLI entry points' dry-run mode. Puts are idempotent by CID (spec
/// §5): writing the same bytes twice is a no-op the second time.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: Mutex<HashMap<Cid, Vec<u8>>>,
    stream_heads: Mutex<HashMap<Cid, Cid>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream_head(&self, stream_id: &Cid) -> Option<Cid> {
        self.stream_heads.lock().unwrap().get(stream_id).cloned()
    }
}

#[async_trait]
impl RawBlockStore for MemoryBlockStore {
    async fn put_bytes(&self, bytes: Vec<u8>) -> anyhow::Result<Cid> {
        let digest = Code::Sha2_256.digest(&bytes);
        let cid = Cid::new_v1(RAW_CODEC, digest);
        self.blocks.lock().unwrap().insert(cid, bytes);
        Ok(cid)
    }

    async fn get_bytes(&self, cid: &Cid) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.blocks.lock().unwrap().get(cid).cloned())
    }

    async fn publish_stream_head(&self, stream_id: &Cid, cid: &Cid) -> anyhow::Result<()> {
        self.stream_heads
            .lock()
            .unwrap()
            .insert(*stream_id, *cid);
        Ok(())
    }

    async fn unpin_stream(&self, stream_id: &Cid) -> anyhow::Result<()> {
        self.stream_heads.lock().unwrap().remove(stream_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_is_idempotent_by_cid() {
        let store = MemoryBlockStore::new();
        let a = store.put_bytes(b"hello".to_vec()).await.unwrap();
        let b = store.put_bytes(b"hello".to_vec()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.blocks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_returns_none_for_unknown_cid() {
        let store = MemoryBlockStore::new();
        let digest = Code::Sha2_256.digest(b"missing");
        let cid = Cid::new_v1(RAW_CODEC, digest);
        assert!(store.get_bytes(&cid).await.unwrap().is_none());
    }
}
