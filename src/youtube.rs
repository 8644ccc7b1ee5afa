#![forbid(unsafe_code)]

//! Upstream client for the YouTube search endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::videos::ListResponse;

/// Fetches the latest videos for one channel. The cache layer talks to this
/// seam so tests can swap the network client for a stub.
#[async_trait]
pub trait VideoListing: Send + Sync {
    async fn latest_videos(&self, channel_id: &str) -> Result<ListResponse>;
}

/// Real client for the search API. One GET per call, first result page only,
/// no retries; a failed or malformed response propagates to the caller.
pub struct SearchApi {
    api_key: String,
    base_url: String,
}

impl SearchApi {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, channel_id: &str) -> String {
        format!(
            "{}/youtube/v3/search?key={}&channelId={}&part=snippet,id&order=date&maxResults=20",
            self.base_url, self.api_key, channel_id
        )
    }
}

#[async_trait]
impl VideoListing for SearchApi {
    async fn latest_videos(&self, channel_id: &str) -> Result<ListResponse> {
        let url = self.search_url(channel_id);
        // ureq is a blocking client, so the request runs on the blocking pool
        // and only suspends the task that asked for it.
        let listing = tokio::task::spawn_blocking(move || -> Result<ListResponse> {
            let response = ureq::get(&url)
                .call()
                .context("requesting channel listing")?;
            response
                .into_json()
                .context("parsing channel listing response")
        })
        .await
        .context("joining channel listing request")??;
        Ok(listing)
    }
}
