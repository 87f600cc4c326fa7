// Outbound peer RPC. Every request posts `{auth, data}` to
// /node/req/{req_type} on the target's peer address and unwraps the
// response envelope; a false `status` surfaces the envelope code as the
// error. Timeouts are bounded so a dead peer costs one slot in the
// current round, not the whole loop.

use std::time::Duration;

use anyhow::{Context, bail};
use tracing::debug;

use crate::{
    model::{
        common::{DataVersion, Envelope},
        node::NodeInfo,
        replication::{
            FullState, PeerRequest, REQ_CHECK_MASTER, REQ_SYNC_MASTER, REQ_SYNC_SLAVE, SyncPayload,
        },
    },
};

pub struct PeerClient {
    http: reqwest::Client,
    token: String,
}

impl PeerClient {
    pub fn new(secret: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        let token = super::auth::generate_token(secret)?;
        Ok(PeerClient { http, token })
    }

    async fn request(
        &self,
        node_url: &str,
        req_type: &str,
        data: String,
    ) -> anyhow::Result<Option<serde_json::Value>> {
        let url = format!("http://{}/node/req/{}", node_url, req_type);
        debug!(%url, "peer request");

        let body = PeerRequest {
            auth: self.token.clone(),
            data,
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to call [{}]", url))?;

        if !response.status().is_success() {
            bail!("failed to call [{}], status code: {}", url, response.status());
        }

        let envelope: Envelope<serde_json::Value> = response
            .json()
            .await
            .with_context(|| format!("bad response body from [{}]", url))?;

        if !envelope.status {
            bail!("{}", envelope.code);
        }

        Ok(envelope.data)
    }

    // Inner payloads travel as JSON text inside the envelope's data field.
    fn inner_text(data: Option<serde_json::Value>) -> anyhow::Result<String> {
        match data {
            Some(serde_json::Value::String(text)) => Ok(text),
            other => bail!("bad response data format: {:?}", other),
        }
    }

    pub async fn sync_slave(&self, node_url: &str, payload: &SyncPayload) -> anyhow::Result<()> {
        let data = serde_json::to_string(payload)?;
        self.request(node_url, REQ_SYNC_SLAVE, data).await?;
        Ok(())
    }

    pub async fn check_master(
        &self,
        master_node_url: &str,
        local: &NodeInfo,
    ) -> anyhow::Result<DataVersion> {
        let data = serde_json::to_string(local)?;
        let response = self.request(master_node_url, REQ_CHECK_MASTER, data).await?;
        let text = Self::inner_text(response)?;
        let ver: DataVersion = serde_json::from_str(&text)
            .with_context(|| format!("bad response data format: <{}>", text))?;
        Ok(ver)
    }

    pub async fn sync_master(&self, master_node_url: &str) -> anyhow::Result<FullState> {
        let response = self
            .request(master_node_url, REQ_SYNC_MASTER, String::new())
            .await?;
        let text = Self::inner_text(response)?;
        let full: FullState = serde_json::from_str(&text)
            .context("bad response data format for full state")?;
        Ok(full)
    }
}
