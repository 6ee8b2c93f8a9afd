use std::time::Duration;

use async_trait::async_trait;
use cid::Cid;
use reqwest::multipart::{Form, Part};

use super::RawBlockStore;

/// HTTP client for a Kubo-compatible (IPFS) block store, talking the
/// `/api/v0/block/{put,get}` RPC surface. Grounded on the Ceramic/Kubo
/// client in the example pack, which puts and gets raw blocks keyed by
/// `cid::Cid` over HTTP against the same API family.
pub struct HttpBlockStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBlockStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn validate(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("block store request failed with {status}: {body}");
        }

        Ok(response)
    }
}

#[async_trait]
impl RawBlockStore for HttpBlockStore {
    async fn put_bytes(&self, bytes: Vec<u8>) -> anyhow::Result<Cid> {
        let form = Form::new().part("data", Part::bytes(bytes));

        let response = self
            .client
            .post(format!("{}/api/v0/block/put", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let response = Self::validate(response).await?;

        #[derive(serde::Deserialize)]
        struct BlockPutResponse {
            #[serde(rename = "Key")]
            key: String,
        }

        let parsed: BlockPutResponse = response.json().await?;
        Ok(parsed.key.parse()?)
    }

    async fn get_bytes(&self, cid: &Cid) -> anyhow::Result<Option<Vec<u8>>> {
        let response = self
            .client
            .post(format!("{}/api/v0/block/get", self.base_url))
            .query(&[("arg", cid.to_string())])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::validate(response).await?;
        Ok(Some(response.bytes().await?.to_vec()))
    }

    async fn publish_stream_head(&self, stream_id: &Cid, cid: &Cid) -> anyhow::Result<()> {
        let response = self
            .client
            .post(format!("{}/api/v0/name/publish", self.base_url))
            .query(&[("arg", cid.to_string()), ("key", stream_id.to_string())])
            .send()
            .await?;

        Self::validate(response).await?;
        Ok(())
    }

    async fn unpin_stream(&self, stream_id: &Cid) -> anyhow::Result<()> {
        let response = self
            .client
            .post(format!("{}/api/v0/pin/rm", self.base_url))
            .query(&[("arg", stream_id.to_string())])
            .send()
            .await?;

        Self::validate(response).await?;
        Ok(())
    }
}
