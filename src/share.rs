#![forbid(unsafe_code)]

//! Share link resolution.
//!
//! A share record starts as an empty value keyed `uuid#<uuid>`. The first
//! resolution gathers candidates from every tracked channel, draws one video
//! and freezes it into the record; every later resolution replays the frozen
//! choice without drawing again.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::Rng;
use rand::seq::IndexedRandom;
use uuid::Uuid;

use crate::cache::ChannelCache;
use crate::store::KeyValueStore;
use crate::videos::Video;

pub const SHARE_PREFIX: &str = "uuid#";

pub fn share_key(uuid: &str) -> String {
    format!("{SHARE_PREFIX}{uuid}")
}

/// User-visible outcomes of a resolution, kept separate from the plumbing
/// errors so the HTTP layer can map them to exact responses.
#[derive(Debug)]
pub enum ResolveError {
    /// No record exists for the identifier.
    NotFound,
    /// Resolution produced zero candidates across all tracked channels.
    NoVideos,
    Internal(anyhow::Error),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "share identifier not found"),
            Self::NoVideos => write!(f, "no videos available across tracked channels"),
            Self::Internal(err) => err.fmt(f),
        }
    }
}

impl From<anyhow::Error> for ResolveError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

/// Uniform draw over the candidate list. Returns `None` for an empty input.
pub fn pick_random<'a, R: Rng + ?Sized>(videos: &'a [Video], rng: &mut R) -> Option<&'a Video> {
    videos.choose(rng)
}

#[derive(Clone)]
pub struct ShareResolver {
    store: Arc<dyn KeyValueStore>,
    cache: ChannelCache,
}

impl ShareResolver {
    pub fn new(store: Arc<dyn KeyValueStore>, cache: ChannelCache) -> Self {
        Self { store, cache }
    }

    /// Mints a fresh identifier and writes its unresolved (empty) record.
    /// The identifier space is large enough that collisions are not checked.
    pub async fn create(&self) -> Result<String> {
        let uuid = Uuid::new_v4().to_string();
        self.store.put(&share_key(&uuid), "", None).await?;
        Ok(uuid)
    }

    /// Resolves a share identifier to its video.
    ///
    /// A non-empty record replays the frozen choice. An empty record runs the
    /// first resolution: warm channels are read from cache, stale ones are
    /// refreshed in a follow-up pass, one candidate is drawn and written back.
    /// Two concurrent first resolutions may both reach the freezing write;
    /// the store keeps the last one and every later read replays it.
    ///
    /// A channel whose forced refresh fails contributes nothing and is
    /// reported to stderr; the remaining channels still resolve.
    pub async fn resolve(&self, uuid: &str) -> Result<Video, ResolveError> {
        let key = share_key(uuid);
        let Some(value) = self.store.get(&key).await? else {
            return Err(ResolveError::NotFound);
        };

        if !value.is_empty() {
            let video =
                serde_json::from_str(&value).context("parsing frozen share record")?;
            return Ok(video);
        }

        let mut videos = Vec::new();
        let mut stale = Vec::new();
        for channel_id in self.cache.tracked_channels().await? {
            let cached = self.cache.cached_videos(&channel_id).await?;
            if cached.is_empty() {
                stale.push(channel_id);
            } else {
                videos.extend(cached);
            }
        }

        for channel_id in &stale {
            match self.cache.refresh_channel(channel_id).await {
                Ok(fetched) => videos.extend(fetched),
                Err(err) => eprintln!("refresh failed for channel {channel_id}: {err:#}"),
            }
        }

        let Some(video) = pick_random(&videos, &mut rand::rng()).cloned() else {
            return Err(ResolveError::NoVideos);
        };

        let frozen = serde_json::to_string(&video).context("serializing resolved video")?;
        self.store.put(&key, &frozen, None).await?;
        Ok(video)
    }
}
