#![forbid(unsafe_code)]

//! Per-channel video list cache.
//!
//! Each tracked channel owns one record keyed `channel#<id>` whose value is
//! the serialized upstream listing and whose metadata carries an absolute
//! expiry. A record with missing metadata or a passed expiry is stale no
//! matter what its value holds, and an empty value (the seed written when a
//! channel is first tracked) never counts as a hit.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::store::KeyValueStore;
use crate::videos::{ListResponse, Video};
use crate::youtube::VideoListing;

pub const CHANNEL_PREFIX: &str = "channel#";

/// Cached listings stay fresh for one day.
const CACHE_DURATION_MS: i64 = 24 * 3600 * 1000;

/// Metadata stored next to every channel record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMetadata {
    pub channel_id: String,
    pub expires_at: i64,
}

pub fn channel_key(channel_id: &str) -> String {
    format!("{CHANNEL_PREFIX}{channel_id}")
}

#[derive(Clone)]
pub struct ChannelCache {
    store: Arc<dyn KeyValueStore>,
    listing: Arc<dyn VideoListing>,
}

impl ChannelCache {
    pub fn new(store: Arc<dyn KeyValueStore>, listing: Arc<dyn VideoListing>) -> Self {
        Self { store, listing }
    }

    /// Returns the channel's video list, serving the cached record when it is
    /// fresh and refetching from upstream otherwise. Exactly one upstream
    /// call happens per stale or missing channel; upstream errors propagate.
    pub async fn videos_for_channel(&self, channel_id: &str) -> Result<Vec<Video>> {
        let record = self.store.get_with_metadata(&channel_key(channel_id)).await?;
        let now = Utc::now().timestamp_millis();

        if let Some(record) = record
            && !record.value.is_empty()
            && is_fresh(record.metadata.as_ref(), now)
        {
            println!("kv hit: {channel_id}");
            let listing: ListResponse = serde_json::from_str(&record.value)
                .context("parsing cached channel listing")?;
            return Ok(listing.items);
        }

        println!("kv miss or cache expired: {channel_id}");
        self.refresh_channel(channel_id).await
    }

    /// Forces an upstream fetch and writes the record back with a fresh
    /// expiry, regardless of what is currently cached.
    pub async fn refresh_channel(&self, channel_id: &str) -> Result<Vec<Video>> {
        let listing = self.listing.latest_videos(channel_id).await?;
        let value = serde_json::to_string(&listing).context("serializing channel listing")?;
        let metadata = serde_json::to_value(ChannelMetadata {
            channel_id: channel_id.to_string(),
            expires_at: Utc::now().timestamp_millis() + CACHE_DURATION_MS,
        })
        .context("serializing channel metadata")?;

        self.store
            .put(&channel_key(channel_id), &value, Some(&metadata))
            .await?;
        Ok(listing.items)
    }

    /// Cache-only read: returns the stored list when fresh and an empty list
    /// when the record is stale or missing, without touching upstream. Used
    /// by share resolution so warm channels are served before stale ones are
    /// repaired.
    pub async fn cached_videos(&self, channel_id: &str) -> Result<Vec<Video>> {
        let record = self.store.get_with_metadata(&channel_key(channel_id)).await?;
        let now = Utc::now().timestamp_millis();

        if let Some(record) = record
            && !record.value.is_empty()
            && is_fresh(record.metadata.as_ref(), now)
        {
            let listing: ListResponse = serde_json::from_str(&record.value)
                .context("parsing cached channel listing")?;
            return Ok(listing.items);
        }
        Ok(Vec::new())
    }

    /// Every tracked channel id, from enumerating `channel#` keys.
    pub async fn tracked_channels(&self) -> Result<Vec<String>> {
        let keys = self.store.list(CHANNEL_PREFIX).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(CHANNEL_PREFIX).map(str::to_string))
            .collect())
    }

    /// Fan-out over every tracked channel through `videos_for_channel`,
    /// concatenated in no particular order across channels.
    pub async fn all_tracked_videos(&self) -> Result<Vec<Video>> {
        let mut videos = Vec::new();
        for channel_id in self.tracked_channels().await? {
            videos.extend(self.videos_for_channel(&channel_id).await?);
        }
        Ok(videos)
    }
}

fn is_fresh(metadata: Option<&serde_json::Value>, now_ms: i64) -> bool {
    let Some(metadata) = metadata else {
        return false;
    };
    let Ok(metadata) = serde_json::from_value::<ChannelMetadata>(metadata.clone()) else {
        return false;
    };
    now_ms <= metadata.expires_at
}
