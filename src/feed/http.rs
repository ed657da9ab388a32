use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;

use crate::feed::types::{RawSnapshot, SnapshotSource, SourceId};

const USER_AGENT: &str = concat!("stock-rate-relay/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed source wrapping one upstream `getdata` endpoint.
pub struct HttpSource {
    id: SourceId,
    url: String,
    client: reqwest::Client,
}

impl HttpSource {
    /// `timeout` bounds the whole request; there is no retry here.
    pub fn new(id: SourceId, url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("building upstream http client")?;
        Ok(Self {
            id,
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl SnapshotSource for HttpSource {
    async fn fetch(&self) -> Result<RawSnapshot> {
        let resp = self
            .client
            .get(&self.url)
            .header(ACCEPT, "*/*")
            .send()
            .await
            .with_context(|| format!("{} http get", self.id))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("{} returned status {status}", self.id);
        }

        resp.json::<RawSnapshot>()
            .await
            .with_context(|| format!("{} response body", self.id))
    }

    fn id(&self) -> SourceId {
        self.id
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}
