use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    clock::Clock,
    models::{RecentActivity, Snapshot},
};

use super::PresenceSource;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresenceBody {
    #[serde(default)]
    activity_id: Option<String>,
    #[serde(default)]
    activity_name: Option<String>,
}

/// Presence over a small JSON HTTP contract:
///
/// - `GET {base}/presence/{account}` → `{"activityId"?, "activityName"?}`
/// - `GET {base}/recent/{account}` → `[RecentActivity]`
pub struct HttpPresenceSource {
    client: reqwest::Client,
    base_url: String,
    clock: Arc<dyn Clock>,
}

impl HttpPresenceSource {
    pub fn new(base_url: impl Into<String>, clock: Arc<dyn Clock>) -> Result<Self> {
        // Request deadlines come from the engine's fetch timeout.
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build presence HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            clock,
        })
    }

    fn url(&self, resource: &str, account_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, resource, account_id)
    }
}

#[async_trait]
impl PresenceSource for HttpPresenceSource {
    async fn fetch_snapshot(&self, account_id: &str) -> Result<Snapshot> {
        let body: PresenceBody = self
            .client
            .get(self.url("presence", account_id))
            .send()
            .await
            .context("presence request failed")?
            .error_for_status()
            .context("presence endpoint returned an error status")?
            .json()
            .await
            .context("invalid presence response")?;

        Ok(Snapshot {
            activity_id: body.activity_id,
            activity_name: body.activity_name,
            observed_at: self.clock.now(),
        })
    }

    async fn fetch_recent_activity(&self, account_id: &str) -> Result<Vec<RecentActivity>> {
        self.client
            .get(self.url("recent", account_id))
            .send()
            .await
            .context("recent activity request failed")?
            .error_for_status()
            .context("recent activity endpoint returned an error status")?
            .json()
            .await
            .context("invalid recent activity response")
    }
}
