#![forbid(unsafe_code)]

//! Axum backend for shuffletube.
//!
//! Four routes: a landing page, share-link creation, the share-link page that
//! performs resolution, and the share target that either redirects a human to
//! the resolved video or hands a crawler a preview document.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use axum::{
    Router,
    extract::{Path as AxumPath, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use shuffletube::cache::ChannelCache;
use shuffletube::config::{RuntimeOverrides, resolve_config};
use shuffletube::render;
use shuffletube::security::ensure_not_root;
use shuffletube::share::{ResolveError, ShareResolver};
use shuffletube::store::{KeyValueStore, LibsqlStore};
use shuffletube::videos::watch_url;
use shuffletube::youtube::{SearchApi, VideoListing};
use tokio::signal;

/// SQLite database file relative to the data root.
const STORE_DB_FILE: &str = "store.db";

#[derive(Debug, Clone)]
struct BackendArgs {
    data_root: PathBuf,
    port: u16,
    listen_host: IpAddr,
    api_key: String,
    api_base: String,
}

impl BackendArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut data_root_override: Option<PathBuf> = None;
        let mut port_override: Option<u16> = None;
        let mut host_override: Option<IpAddr> = None;
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--data-root=") {
                data_root_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--port=") {
                port_override = Some(parse_port_arg(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--host=") {
                host_override = Some(parse_host_arg(value)?);
                continue;
            }

            match arg.as_str() {
                "--data-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--data-root requires a value"))?;
                    data_root_override = Some(PathBuf::from(value));
                }
                "--port" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--port requires a value"))?;
                    port_override = Some(parse_port_arg(&value)?);
                }
                "--host" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--host requires a value"))?;
                    host_override = Some(parse_host_arg(&value)?);
                }
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }

        let config = resolve_config(RuntimeOverrides {
            data_root: data_root_override,
            port: port_override,
            host: host_override.map(|host| host.to_string()),
            ..RuntimeOverrides::default()
        })?;
        let listen_host = parse_host_arg(&config.host)?;

        Ok(Self {
            data_root: config.data_root,
            port: config.port,
            listen_host,
            api_key: config.api_key,
            api_base: config.api_base,
        })
    }
}

fn parse_port_arg(value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .context("expected a numeric port between 0 and 65535")
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/SHUFFLETUBE_HOST")
}

/// Shared state injected into every handler. The resolver carries the store
/// and the upstream client; no other cross-request state exists.
#[derive(Clone)]
struct AppState {
    resolver: ShareResolver,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound => Self::not_found("Not found"),
            ResolveError::NoVideos => Self::not_found("No videos found"),
            ResolveError::Internal(err) => Self::internal(format!("{err:#}")),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{err:#}"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let BackendArgs {
        data_root,
        port,
        listen_host,
        api_key,
        api_base,
    } = BackendArgs::parse()?;

    ensure_not_root("backend")?;

    let store: Arc<dyn KeyValueStore> = Arc::new(
        LibsqlStore::open(&data_root.join(STORE_DB_FILE))
            .await
            .context("opening key-value store")?,
    );
    let listing: Arc<dyn VideoListing> = Arc::new(SearchApi::new(api_key, api_base));
    let cache = ChannelCache::new(store.clone(), listing);
    let resolver = ShareResolver::new(store, cache);
    let state = AppState { resolver };

    let app = Router::new()
        .route("/", get(landing))
        .route("/new", get(create_share))
        .route("/page/{uuid}", get(share_link_page))
        .route("/share/{uuid}", get(share_target))
        .with_state(state);

    let addr = SocketAddr::new(listen_host, port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    println!("shuffletube listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

    Ok(())
}

async fn shutdown_signal() {
    // Only graceful shutdown is affected if the handler cannot be installed;
    // the process still terminates when Ctrl+C fires.
    if let Err(err) = signal::ctrl_c().await {
        eprintln!("Failed to install Ctrl+C handler: {}", err);
    }
}

async fn landing() -> Html<String> {
    Html(render::landing_page())
}

async fn create_share(State(state): State<AppState>) -> Result<Response, ApiError> {
    let uuid = state.resolver.create().await?;
    Ok(found(&format!("/page/{uuid}")))
}

async fn share_link_page(
    State(state): State<AppState>,
    AxumPath(uuid): AxumPath<String>,
    headers: HeaderMap,
) -> Result<Html<String>, ApiError> {
    state.resolver.resolve(&uuid).await?;
    let share_url = absolute_share_url(&headers, &uuid);
    Ok(Html(render::share_page(&share_url)))
}

async fn share_target(
    State(state): State<AppState>,
    AxumPath(uuid): AxumPath<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let video = state.resolver.resolve(&uuid).await?;
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if render::is_bot(user_agent) {
        Ok(Html(render::preview_document(&video)).into_response())
    } else {
        Ok(found(&watch_url(&video.id.video_id)))
    }
}

/// Plain 302; axum's `Redirect` helpers only emit 303/307/308.
fn found(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}

/// Absolute share URL for the link page, derived from the request headers so
/// the page works behind a proxy without extra configuration.
fn absolute_share_url(headers: &HeaderMap, uuid: &str) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    format!("{scheme}://{host}/share/{uuid}")
}
