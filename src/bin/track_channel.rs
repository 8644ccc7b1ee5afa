#![forbid(unsafe_code)]

//! Operator helper that maintains the set of tracked channels and refreshes
//! their cached listings. `refresh` is meant to run from cron so share
//! resolution rarely lands on a cold channel.

use anyhow::{Context, Result, bail};
use shuffletube::{
    cache::{ChannelCache, channel_key},
    config::{RuntimeOverrides, resolve_config},
    security::ensure_not_root,
    store::{KeyValueStore, LibsqlStore},
    youtube::{SearchApi, VideoListing},
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

const STORE_DB_FILE: &str = "store.db";

#[derive(Debug, Clone)]
enum TrackCommand {
    Add(String),
    List,
    Refresh,
}

#[derive(Debug, Clone)]
struct TrackArgs {
    command: TrackCommand,
    data_root: PathBuf,
    api_key: String,
    api_base: String,
}

impl TrackArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(env::args().skip(1))
    }

    #[cfg(test)]
    fn from_slice(values: &[&str]) -> Result<Self> {
        Self::from_iter(values.iter().map(|value| value.to_string()))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut data_root_override: Option<PathBuf> = None;
        let mut positionals = Vec::new();
        let mut args = iter.into_iter();

        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--data-root=") {
                data_root_override = Some(PathBuf::from(value));
                continue;
            }

            match arg.as_str() {
                "--data-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--data-root requires a value"))?;
                    data_root_override = Some(PathBuf::from(value));
                }
                _ if arg.starts_with("--") => {
                    bail!("unknown argument: {arg}");
                }
                _ => positionals.push(arg),
            }
        }

        let command = match positionals.as_slice() {
            [command] if command == "list" => TrackCommand::List,
            [command] if command == "refresh" => TrackCommand::Refresh,
            [command, channel_id] if command == "add" => TrackCommand::Add(channel_id.clone()),
            [command] if command == "add" => bail!("add requires a channel id"),
            [] => bail!("usage: track_channel <add <channelId> | list | refresh> [--data-root PATH]"),
            _ => bail!("unknown command: {}", positionals.join(" ")),
        };

        let config = resolve_config(RuntimeOverrides {
            data_root: data_root_override,
            ..RuntimeOverrides::default()
        })?;

        Ok(Self {
            command,
            data_root: config.data_root,
            api_key: config.api_key,
            api_base: config.api_base,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    ensure_not_root("track_channel")?;

    let args = TrackArgs::parse()?;

    let store: Arc<dyn KeyValueStore> = Arc::new(
        LibsqlStore::open(&args.data_root.join(STORE_DB_FILE))
            .await
            .context("opening key-value store")?,
    );
    let listing: Arc<dyn VideoListing> =
        Arc::new(SearchApi::new(args.api_key.clone(), args.api_base.clone()));
    let cache = ChannelCache::new(store.clone(), listing);

    match args.command {
        TrackCommand::Add(channel_id) => {
            if register_channel(store.as_ref(), &channel_id).await? {
                println!("Now tracking channel {channel_id}.");
            } else {
                println!("Channel {channel_id} is already tracked.");
            }
        }
        TrackCommand::List => {
            let channels = cache.tracked_channels().await?;
            if channels.is_empty() {
                println!("No channels tracked yet.");
            } else {
                println!("{} tracked channel(s):", channels.len());
                for channel_id in &channels {
                    println!("  - {channel_id}");
                }
            }
        }
        TrackCommand::Refresh => {
            let (updated, failed) = refresh_all(&cache).await?;
            println!();
            println!("Refreshed {updated} channel(s), {failed} failure(s).");
        }
    }

    Ok(())
}

/// Seeds an empty channel record unless one already exists; an existing
/// record may hold a cached listing that must not be wiped.
async fn register_channel(store: &dyn KeyValueStore, channel_id: &str) -> Result<bool> {
    let key = channel_key(channel_id);
    if store.get(&key).await?.is_some() {
        return Ok(false);
    }
    store.put(&key, "", None).await?;
    Ok(true)
}

/// Forces a refresh for every tracked channel. One channel failing does not
/// stop the rest; failures are reported and counted.
async fn refresh_all(cache: &ChannelCache) -> Result<(usize, usize)> {
    let channels = cache.tracked_channels().await?;
    if channels.is_empty() {
        println!("No channels tracked yet.");
        return Ok((0, 0));
    }

    println!("Found {} channel(s) to refresh.", channels.len());
    let mut updated = 0;
    let mut failed = 0;
    for (index, channel_id) in channels.iter().enumerate() {
        println!(
            "[{}/{}] Refreshing channel: {}",
            index + 1,
            channels.len(),
            channel_id
        );
        match cache.refresh_channel(channel_id).await {
            Ok(videos) => {
                println!("  Cached {} video(s) for {}", videos.len(), channel_id);
                updated += 1;
            }
            Err(err) => {
                eprintln!("  Warning: refresh failed for {}: {:#}", channel_id, err);
                failed += 1;
            }
        }
    }

    Ok((updated, failed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use shuffletube::videos::{
        ListResponse, Snippet, Thumbnail, ThumbnailSet, Video, VideoId,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env_file(vars: &[(&str, &str)], f: impl FnOnce()) {
        let _lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let mut contents = String::new();
        for (key, value) in vars {
            contents.push_str(&format!("{key}=\"{value}\"\n"));
        }
        std::fs::write(dir.path().join(".env"), contents).unwrap();
        let cwd = env::current_dir().unwrap();
        env::set_current_dir(dir.path()).unwrap();
        f();
        env::set_current_dir(cwd).unwrap();
    }

    const BASE_ENV: &[(&str, &str)] = &[
        ("SHUFFLETUBE_DATA_ROOT", "/data/shuffletube"),
        ("YOUTUBE_API_KEY", "TEST_API_KEY"),
    ];

    fn parse_args(extra: &[&str]) -> Result<TrackArgs> {
        let mut parsed = None;
        with_env_file(BASE_ENV, || {
            parsed = Some(TrackArgs::from_slice(extra));
        });
        parsed.unwrap()
    }

    #[test]
    fn parses_add_command() {
        let args = parse_args(&["add", "UC123"]).unwrap();
        assert!(matches!(args.command, TrackCommand::Add(ref id) if id == "UC123"));
        assert_eq!(args.data_root, PathBuf::from("/data/shuffletube"));
        assert_eq!(args.api_key, "TEST_API_KEY");
    }

    #[test]
    fn parses_list_and_refresh_commands() {
        assert!(matches!(
            parse_args(&["list"]).unwrap().command,
            TrackCommand::List
        ));
        assert!(matches!(
            parse_args(&["refresh"]).unwrap().command,
            TrackCommand::Refresh
        ));
    }

    #[test]
    fn add_requires_a_channel_id() {
        let err = parse_args(&["add"]).unwrap_err();
        assert!(err.to_string().contains("channel id"));
    }

    #[test]
    fn missing_command_prints_usage() {
        let err = parse_args(&[]).unwrap_err();
        assert!(err.to_string().contains("usage"));
    }

    #[test]
    fn rejects_unknown_flags() {
        let err = parse_args(&["list", "--bogus"]).unwrap_err();
        assert!(err.to_string().contains("unknown argument"));
    }

    #[test]
    fn data_root_flag_overrides_env() {
        let args = parse_args(&["list", "--data-root", "/custom"]).unwrap();
        assert_eq!(args.data_root, PathBuf::from("/custom"));
    }

    /// Listing double for the refresh loop; unstubbed channels fail.
    #[derive(Default)]
    struct StubListing {
        responses: Mutex<HashMap<String, ListResponse>>,
    }

    impl StubListing {
        fn set_items(&self, channel_id: &str, items: Vec<Video>) {
            self.responses
                .lock()
                .unwrap()
                .insert(channel_id.to_string(), ListResponse { items });
        }
    }

    #[async_trait]
    impl VideoListing for StubListing {
        async fn latest_videos(&self, channel_id: &str) -> Result<ListResponse> {
            self.responses
                .lock()
                .unwrap()
                .get(channel_id)
                .cloned()
                .ok_or_else(|| anyhow!("no listing stubbed for {channel_id}"))
        }
    }

    fn sample_video(id: &str) -> Video {
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

    async fn store_in(dir: &tempfile::TempDir) -> Arc<LibsqlStore> {
        Arc::new(
            LibsqlStore::open(&dir.path().join(STORE_DB_FILE))
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn register_channel_seeds_once() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;

        assert!(register_channel(store.as_ref(), "UC123").await.unwrap());
        assert_eq!(
            store.get(&channel_key("UC123")).await.unwrap().as_deref(),
            Some("")
        );

        // A second registration must not wipe whatever is cached by now.
        store
            .put(&channel_key("UC123"), "{\"items\":[]}", None)
            .await
            .unwrap();
        assert!(!register_channel(store.as_ref(), "UC123").await.unwrap());
        assert_eq!(
            store.get(&channel_key("UC123")).await.unwrap().as_deref(),
            Some("{\"items\":[]}")
        );
    }

    #[tokio::test]
    async fn refresh_all_updates_channels_and_counts_failures() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let listing = Arc::new(StubListing::default());
        let cache = ChannelCache::new(store.clone(), listing.clone());

        register_channel(store.as_ref(), "alive").await.unwrap();
        register_channel(store.as_ref(), "dead").await.unwrap();
        listing.set_items("alive", vec![sample_video("a"), sample_video("b")]);

        let (updated, failed) = refresh_all(&cache).await.unwrap();
        assert_eq!(updated, 1);
        assert_eq!(failed, 1);

        let value = store.get(&channel_key("alive")).await.unwrap().unwrap();
        assert!(value.contains("\"videoId\":\"a\""));
        // The failing channel keeps its seed record untouched.
        assert_eq!(
            store.get(&channel_key("dead")).await.unwrap().as_deref(),
            Some("")
        );
    }

    #[tokio::test]
    async fn refresh_all_with_no_channels_is_a_noop() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let listing = Arc::new(StubListing::default());
        let cache = ChannelCache::new(store.clone(), listing);

        let (updated, failed) = refresh_all(&cache).await.unwrap();
        assert_eq!((updated, failed), (0, 0));
    }
}
