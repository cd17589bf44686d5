use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use bsky_client::BskyClient;
use suggest_common::{Config, Handle, SortMode};
use suggest_engine::{
    EngineError, FollowAction, FollowError, PageRegistry, PageSession, ProfileLoader, RowGeometry,
    ToggleOutcome, Viewport,
};
use suggest_stream::SuggestionStreamClient;

mod templates;
use templates::*;

const PAGE_COOKIE: &str = "fs_page";

// --- App State ---

struct AppState {
    pages: PageRegistry,
    handle_suffix: String,
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(log_filter()?).init();

    let config = Config::from_env()?;
    config.log_settings();

    let bsky = Arc::new(BskyClient::new(
        &config.public_api_url,
        &config.service_url,
        config.http_timeout,
    )?);
    let stream = Arc::new(SuggestionStreamClient::new(
        &config.stream_url,
        config.http_timeout,
    )?);

    let state = Arc::new(AppState {
        pages: PageRegistry::new(
            Arc::new(ProfileLoader::new(bsky.clone())),
            stream,
            FollowAction::new(bsky),
        ),
        handle_suffix: config.handle_suffix.clone(),
    });

    tokio::spawn(reap_idle_pages(state.clone(), config.page_idle));

    let app = Router::new()
        .route("/", get(index_page))
        .route("/analyze", post(analyze))
        .route("/results", get(results_fragment))
        .route("/viewport", post(report_viewport))
        .route("/follow/{handle}", post(toggle_follow))
        .route("/close", post(close_page))
        .with_state(state)
        // Nothing here is cacheable: every response reflects live session state
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // Path only: query strings and form bodies can carry handles
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Follow suggestions web server starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn log_filter() -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive("suggest=info".parse()?)
        .add_directive("bsky_client=info".parse()?))
}

async fn reap_idle_pages(state: Arc<AppState>, max_idle: Duration) {
    let period = (max_idle / 4).clamp(Duration::from_secs(1), Duration::from_secs(300));
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        state.pages.reap_idle(max_idle);
    }
}

// --- Handlers ---

async fn index_page(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let page = state.pages.get_or_create(page_id(&headers));
    let view = page.view(SortMode::Count);
    let form = FormView {
        handle: view.handle.as_ref().map(|h| h.to_string()).unwrap_or_default(),
        error: None,
    };
    let document = page.open_document();
    with_page_cookie(Html(render_index(&form, &view, document)), &page)
}

#[derive(Deserialize)]
struct AnalyzeForm {
    handle: String,
    #[serde(default)]
    secret: String,
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<AnalyzeForm>,
) -> Response {
    let page = state.pages.get_or_create(page_id(&headers));

    match page.submit(&form.handle, &form.secret, &state.handle_suffix) {
        Ok(_) => with_page_cookie(Redirect::to("/"), &page),
        Err(e) => {
            let view = page.view(SortMode::Count);
            let form = FormView {
                handle: form.handle,
                error: Some(e.to_string()),
            };
            let document = page.open_document();
            with_page_cookie(
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Html(render_index(&form, &view, document)),
                ),
                &page,
            )
        }
    }
}

#[derive(Deserialize)]
struct ResultsQuery {
    #[serde(default)]
    weighted: u8,
}

async fn results_fragment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ResultsQuery>,
) -> Response {
    let Some(page) = existing_page(&state, &headers) else {
        return Html(render_no_session()).into_response();
    };
    page.touch();

    let sort = if query.weighted != 0 {
        SortMode::Weighted
    } else {
        SortMode::Count
    };
    Html(render_results(&page.view(sort))).into_response()
}

#[derive(Deserialize)]
struct ViewportReport {
    viewport: Viewport,
    #[serde(default)]
    rows: Vec<RowGeometry<Handle>>,
}

async fn report_viewport(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(report): Json<ViewportReport>,
) -> Response {
    let Some(page) = existing_page(&state, &headers) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let fired = page.report_viewport(report.viewport, &report.rows);
    Json(json!({ "fired": fired })).into_response()
}

async fn toggle_follow(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(handle): Path<String>,
) -> Response {
    let Some(page) = existing_page(&state, &headers) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Ok(target) = Handle::parse(&handle) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match page.toggle_follow(&target).await {
        Ok(outcome) => Json(json!({
            "following": outcome == ToggleOutcome::Followed,
            "ignored": outcome == ToggleOutcome::Ignored,
        }))
        .into_response(),
        Err(EngineError::UnknownRow(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(EngineError::Follow(e)) => {
            let status = match e {
                FollowError::NotOffered => StatusCode::FORBIDDEN,
                _ => StatusCode::BAD_GATEWAY,
            };
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Unexpected follow error");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize)]
struct CloseQuery {
    document: Uuid,
}

async fn close_page(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CloseQuery>,
) -> StatusCode {
    if let Some(id) = page_id(&headers) {
        state.pages.close_document(id, query.document);
    }
    StatusCode::NO_CONTENT
}

// --- Sessions ---

fn existing_page(state: &AppState, headers: &HeaderMap) -> Option<Arc<PageSession>> {
    page_id(headers).and_then(|id| state.pages.get(id))
}

fn page_id(headers: &HeaderMap) -> Option<Uuid> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    parse_cookie(cookies, PAGE_COOKIE).and_then(|v| Uuid::parse_str(v).ok())
}

fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    for part in header.split(';') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix(name) {
            if let Some(value) = value.strip_prefix('=') {
                return Some(value);
            }
        }
    }
    None
}

fn with_page_cookie(response: impl IntoResponse, page: &PageSession) -> Response {
    let cookie = format!(
        "{PAGE_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
        page.id()
    );
    let mut response = response.into_response();
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
        Err(e) => warn!(error = %e, "Invalid page cookie"),
    }
    response
}
