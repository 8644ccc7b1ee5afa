#![forbid(unsafe_code)]

//! Wire model for the upstream video listing API.
//!
//! The structs mirror the JSON returned by the YouTube search endpoint and
//! the exact bytes we persist into the key-value store, so field names follow
//! the upstream casing rather than Rust convention.

use serde::{Deserialize, Serialize};

/// One search result. Beyond the video id, the title/description/thumbnail
/// trio used by the preview renderer, the payload is treated as opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    pub snippet: Snippet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoId {
    #[serde(rename = "videoId")]
    pub video_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub title: String,
    pub description: String,
    pub thumbnails: ThumbnailSet,
}

/// The three resolutions the upstream always returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailSet {
    pub default: Thumbnail,
    pub medium: Thumbnail,
    pub high: Thumbnail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Top-level search response. This whole object, not just `items`, is what a
/// Channel Record stores, so re-serializing it must round-trip the upstream
/// bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse {
    pub items: Vec<Video>,
}

/// Canonical watch URL for a resolved video.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

#[cfg(test)]
pub(crate) fn sample_video(id: &str) -> Video {
    fn thumb(id: &str, width: u32, height: u32) -> Thumbnail {
        Thumbnail {
            url: format!("https://i.ytimg.test/{id}/{width}x{height}.jpg"),
            width,
            height,
        }
    }

    Video {
        id: VideoId {
            video_id: id.to_string(),
        },
        snippet: Snippet {
            title: format!("Video {id}"),
            description: format!("Description for {id}"),
            thumbnails: ThumbnailSet {
                default: thumb(id, 120, 90),
                medium: thumb(id, 320, 180),
                high: thumb(id, 480, 360),
            },
        },
    }
}
