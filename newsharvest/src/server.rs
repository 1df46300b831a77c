use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rocket::figment::Figment;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{catch, catchers, get, routes, Build, FromForm, Request, Rocket, Shutdown, State};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use common::Config;

use crate::error::{HarvestError, HarvestFailure};
use crate::filter::SearchTarget;
use crate::handler::{HarvestRequest, HarvestResponse, HarvestService};
use crate::model::HarvestResult;
use crate::sources::SourceListing;

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub started_at: DateTime<Utc>,
    pub config: Arc<Config>,
    pub service: Arc<HarvestService>,
}

impl AppState {
    pub fn new(config: Arc<Config>, service: Arc<HarvestService>) -> Self {
        Self {
            started_at: Utc::now(),
            config,
            service,
        }
    }
}

/// Response structure for `/api/v1/status`.
#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    uptime_seconds: i64,
    engine: &'static str,
    default_sources: Vec<String>,
}

/// Body of every non-2xx harvest response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub category: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<HarvestResult>,
}

type ApiResult<T> = std::result::Result<Json<T>, status::Custom<Json<ErrorBody>>>;

/// Query parameters shared by `/crawl/body` and `/crawl/url`.
///
/// List parameters may repeat (`?sources=us&sources=uk`) or carry commas
/// (`?sources=us,uk`).
#[derive(Debug, FromForm)]
struct CrawlParams {
    keywords_include: Vec<String>,
    keywords_exclude: Vec<String>,
    max_articles: Option<usize>,
    days_back: Option<u32>,
    timeout: Option<u64>,
    sources: Vec<String>,
}

fn status_for(error: &HarvestError) -> Status {
    match error {
        HarvestError::Configuration(_) | HarvestError::InvalidSource { .. } => Status::BadRequest,
        HarvestError::RetriesExhausted { .. } => Status::ServiceUnavailable,
        HarvestError::Fatal(_) => Status::InternalServerError,
    }
}

fn error_response(failure: HarvestFailure) -> status::Custom<Json<ErrorBody>> {
    let status = status_for(&failure.error);
    tracing::warn!(category = failure.error.category(), error = %failure.error, "harvest request failed");
    status::Custom(
        status,
        Json(ErrorBody {
            error: failure.error.to_string(),
            category: failure.error.category(),
            partial: failure.partial,
        }),
    )
}

/// Run a harvest for one request.
///
/// The harvest is cancelled when the server shuts down or when this future
/// is dropped (client gone); either way the partial result is what remains.
async fn run_harvest(state: &AppState, mut req: HarvestRequest, shutdown: Shutdown) -> ApiResult<HarvestResponse> {
    if req.timeout_seconds.is_none() {
        req.timeout_seconds = Some(state.config.harvest.server_timeout_seconds);
    }

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let harvest = state.service.respond(req, cancel.clone());
    tokio::pin!(harvest);
    let outcome = tokio::select! {
        res = &mut harvest => res,
        _ = shutdown => {
            tracing::info!("server shutting down, cancelling harvest");
            cancel.cancel();
            harvest.await
        }
    };

    outcome.map(Json).map_err(error_response)
}

fn terms_request(state: &AppState, target: SearchTarget, params: CrawlParams) -> HarvestRequest {
    let presets = &state.config.presets;
    let mut include = common::split_terms(&params.keywords_include);
    let mut exclude = common::split_terms(&params.keywords_exclude);
    match target {
        SearchTarget::Body if include.is_empty() => include = presets.body_terms.clone(),
        SearchTarget::Url => {
            if include.is_empty() {
                include = presets.url_include.clone();
            }
            if exclude.is_empty() {
                exclude = presets.url_exclude.clone();
            }
        }
        _ => {}
    }

    let mut req = HarvestRequest::new(target);
    req.include_terms = include;
    req.exclude_terms = exclude;
    req.sources = common::split_terms(&params.sources);
    req.max_articles = params.max_articles;
    req.days_back = params.days_back;
    req.timeout_seconds = params.timeout;
    req
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

/// Status endpoint returning simple JSON with uptime and engine info.
#[get("/api/v1/status")]
async fn api_status(state: &State<AppState>) -> Json<StatusResponse> {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    Json(StatusResponse {
        status: "ok",
        uptime_seconds: uptime,
        engine: state.service.engine_kind(),
        default_sources: state.service.defaults().default_sources.clone(),
    })
}

#[get("/api/v1/sources")]
async fn list_sources(state: &State<AppState>) -> Json<SourceListing> {
    Json(state.service.registry().listing())
}

/// Keyword search over title and body text.
#[get("/crawl/body?<params..>")]
async fn crawl_body(state: &State<AppState>, params: CrawlParams, shutdown: Shutdown) -> ApiResult<HarvestResponse> {
    let req = terms_request(state, SearchTarget::Body, params);
    run_harvest(state, req, shutdown).await
}

/// Regex search over article URLs.
#[get("/crawl/url?<params..>")]
async fn crawl_url(state: &State<AppState>, params: CrawlParams, shutdown: Shutdown) -> ApiResult<HarvestResponse> {
    let req = terms_request(state, SearchTarget::Url, params);
    run_harvest(state, req, shutdown).await
}

/// Everything recent from a single publisher.
#[get("/crawl/source/<name>?<max_articles>&<days_back>&<timeout>")]
async fn crawl_source(
    state: &State<AppState>,
    name: &str,
    max_articles: Option<usize>,
    days_back: Option<u32>,
    timeout: Option<u64>,
    shutdown: Shutdown,
) -> ApiResult<HarvestResponse> {
    let mut req = HarvestRequest::single_source(name);
    req.max_articles = max_articles;
    req.days_back = days_back;
    req.timeout_seconds = timeout;
    run_harvest(state, req, shutdown).await
}

#[get("/crawl/ny?<max_articles>&<days_back>&<timeout>")]
async fn crawl_ny(
    state: &State<AppState>,
    max_articles: Option<usize>,
    days_back: Option<u32>,
    timeout: Option<u64>,
    shutdown: Shutdown,
) -> ApiResult<HarvestResponse> {
    crawl_source(state, "The New Yorker", max_articles, days_back, timeout, shutdown).await
}

#[get("/crawl/guardian?<max_articles>&<days_back>&<timeout>")]
async fn crawl_guardian(
    state: &State<AppState>,
    max_articles: Option<usize>,
    days_back: Option<u32>,
    timeout: Option<u64>,
    shutdown: Shutdown,
) -> ApiResult<HarvestResponse> {
    crawl_source(state, "The Guardian", max_articles, days_back, timeout, shutdown).await
}

/// Malformed query values (e.g. `max_articles=abc`) are input errors.
#[catch(422)]
fn unprocessable(req: &Request) -> status::Custom<Json<ErrorBody>> {
    status::Custom(
        Status::BadRequest,
        Json(ErrorBody {
            error: format!("invalid query parameters for {}", req.uri()),
            category: "configuration",
            partial: None,
        }),
    )
}

#[catch(404)]
fn not_found(req: &Request) -> status::Custom<Json<ErrorBody>> {
    status::Custom(
        Status::NotFound,
        Json(ErrorBody {
            error: format!("no route for {}", req.uri()),
            category: "not-found",
            partial: None,
        }),
    )
}

/// Assemble the Rocket instance without launching it.
pub fn build_rocket(state: AppState, figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .manage(state)
        .mount(
            "/",
            routes![
                health,
                api_status,
                list_sources,
                crawl_body,
                crawl_url,
                crawl_source,
                crawl_ny,
                crawl_guardian,
            ],
        )
        .register("/", catchers![unprocessable, not_found])
}

/// Launch the HTTP server, applying `[server] bind` and `port` on top of
/// Rocket's own configuration. Returns when Rocket shuts down.
pub async fn launch_rocket(config: Arc<Config>, service: Arc<HarvestService>) -> Result<()> {
    let mut fig = rocket::Config::figment();
    if let Some(server) = &config.server {
        if let Some(bind) = &server.bind {
            fig = fig.merge(("address", bind.clone()));
        }
        if let Some(port) = server.port {
            fig = fig.merge(("port", port));
        }
    }

    let rocket = build_rocket(AppState::new(config, service), fig);

    tracing::info!("Starting Rocket HTTP server");
    rocket
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Rocket HTTP server has shut down");
    Ok(())
}
