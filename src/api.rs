// HTTP API and embedded frontend.
//
// Handlers are generic over the key-value store and the geocoder so the whole
// surface can be exercised against in-memory collaborators.

use crate::catalog::Catalog;
use crate::error::DaladalaError;
use crate::favorites::{self, FavoritesStore};
use crate::geocoder::Geocoder;
use crate::matcher;
use crate::models::{Route, RouteSummary};
use crate::resolver::Resolver;
use crate::store::{KeyValueStore, run_blocking};
use actix_web::{HttpResponse, web};
use chrono::{TimeZone, Utc};
use chrono_tz::Africa::Dar_es_Salaam;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

// Embed static files at compile time
const INDEX_HTML: &str = include_str!("../static/index.html");
const APP_JS: &str = include_str!("../static/daladala.js");

pub struct AppState<S, G> {
    pub catalog: Arc<Catalog>,
    // one plot at a time: the lock is held for the whole resolution
    pub resolver: Arc<Mutex<Resolver<S, G>>>,
    pub favorites: FavoritesStore<S>,
}

impl<S, G> Clone for AppState<S, G>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        AppState {
            catalog: self.catalog.clone(),
            resolver: self.resolver.clone(),
            favorites: self.favorites.clone(),
        }
    }
}

impl<S: KeyValueStore + Clone, G: Geocoder> AppState<S, G> {
    pub fn new(catalog: Catalog, resolver: Resolver<S, G>, store: S) -> Self {
        AppState {
            catalog: Arc::new(catalog),
            resolver: Arc::new(Mutex::new(resolver)),
            favorites: FavoritesStore::new(store),
        }
    }
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    message: Option<String>,
    timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            timestamp: current_timestamp(),
        }
    }

    fn with_message(mut self, message: String) -> Self {
        self.message = Some(message);
        self
    }

    fn error(message: String) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            message: None,
            timestamp: current_timestamp(),
        }
    }
}

pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

pub fn format_timestamp_full(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(dt) => dt
            .with_timezone(&Dar_es_Salaam)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => format!("Invalid timestamp: {}", timestamp),
    }
}

fn error_response(e: DaladalaError) -> HttpResponse {
    let body = ApiResponse::<()>::error(e.to_string());
    match e {
        DaladalaError::InvalidInput(_) => HttpResponse::BadRequest().json(body),
        DaladalaError::NotFound(_) => HttpResponse::NotFound().json(body),
        _ => {
            log::error!("❌ {}", e);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

// ============================================================================
// Frontend Routes
// ============================================================================

async fn serve_index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

async fn serve_js() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/javascript; charset=utf-8")
        .body(APP_JS)
}

async fn health_check<S, G>(state: web::Data<AppState<S, G>>) -> HttpResponse {
    let now = current_timestamp();
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "Daladala Guide",
        "version": env!("CARGO_PKG_VERSION"),
        "routes": state.catalog.len(),
        "timestamp": now,
        "local_time": format_timestamp_full(now),
    }))
}

// ============================================================================
// Routes
// ============================================================================

#[derive(Serialize)]
struct RouteDetail<'a> {
    #[serde(flatten)]
    route: &'a Route,
    total_stops: usize,
    is_favorite: bool,
}

async fn list_routes<S, G>(state: web::Data<AppState<S, G>>) -> HttpResponse {
    let routes: Vec<RouteSummary> = state.catalog.routes().iter().map(Route::summary).collect();
    log::debug!("routes requested: {} total", routes.len());
    HttpResponse::Ok().json(ApiResponse::success(routes))
}

async fn get_route<S: KeyValueStore, G>(
    state: web::Data<AppState<S, G>>,
    path: web::Path<String>,
) -> HttpResponse {
    let route_id = path.into_inner();
    match state.catalog.get(&route_id) {
        Some(route) => HttpResponse::Ok().json(ApiResponse::success(RouteDetail {
            route,
            total_stops: route.stops.len(),
            is_favorite: state.favorites.contains(&route.route_id),
        })),
        None => error_response(DaladalaError::NotFound(format!("Route '{}' not found", route_id))),
    }
}

async fn plot_route<S, G>(state: web::Data<AppState<S, G>>, path: web::Path<String>) -> HttpResponse
where
    S: KeyValueStore + Clone + Send + 'static,
    G: Geocoder,
{
    let route_id = path.into_inner();
    let catalog = state.catalog.clone();

    let mut resolver = state.resolver.lock().await;
    match resolver.plot_route(&catalog, &route_id).await {
        Ok(plot) => HttpResponse::Ok().json(ApiResponse::success(plot)),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Route finder
// ============================================================================

#[derive(Deserialize)]
struct SuggestQuery {
    #[serde(default)]
    start: String,
    #[serde(default)]
    end: String,
}

#[derive(Serialize)]
struct Suggestion {
    route_id: String,
    route_name: String,
    color: String,
    score: usize,
    start_stop: String,
    end_stop: String,
}

#[derive(Serialize)]
struct Suggestions {
    best_route_id: Option<String>,
    matches: Vec<Suggestion>,
}

async fn suggest_routes<S, G>(
    state: web::Data<AppState<S, G>>,
    query: web::Query<SuggestQuery>,
) -> HttpResponse {
    let candidates = match matcher::find_routes(&state.catalog, &query.start, &query.end) {
        Ok(candidates) => candidates,
        Err(e) => return error_response(e),
    };

    let matches: Vec<Suggestion> = candidates
        .iter()
        .map(|m| Suggestion {
            route_id: m.route.route_id.clone(),
            route_name: m.route.name.clone(),
            color: m.route.color.clone(),
            score: m.score,
            start_stop: m.start_stop_name.to_string(),
            end_stop: m.end_stop_name.to_string(),
        })
        .collect();

    let message = if matches.is_empty() {
        "No routes found connecting these stops. Try different stop names.".to_string()
    } else {
        format!("Found {} route(s)", matches.len())
    };
    log::info!("🔎 '{}' → '{}': {}", query.start.trim(), query.end.trim(), message);

    let suggestions = Suggestions {
        best_route_id: matches.first().map(|m| m.route_id.clone()),
        matches,
    };
    HttpResponse::Ok().json(ApiResponse::success(suggestions).with_message(message))
}

// ============================================================================
// Favorites & export
// ============================================================================

async fn list_favorites<S: KeyValueStore, G>(state: web::Data<AppState<S, G>>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(state.favorites.list()))
}

// Favorites writes hit the disk, so they run on the blocking pool.
async fn add_favorite<S, G>(
    state: web::Data<AppState<S, G>>,
    path: web::Path<String>,
) -> HttpResponse
where
    S: KeyValueStore + Clone + Send + 'static,
{
    let favorites = state.favorites.clone();
    let catalog = state.catalog.clone();
    let route_id = path.into_inner();

    match run_blocking(move || favorites.add(&catalog, &route_id)).await {
        Ok(_) => HttpResponse::Ok().json(ApiResponse::success(state.favorites.list())),
        Err(e) => error_response(e),
    }
}

async fn remove_favorite<S, G>(
    state: web::Data<AppState<S, G>>,
    path: web::Path<String>,
) -> HttpResponse
where
    S: KeyValueStore + Clone + Send + 'static,
{
    let favorites = state.favorites.clone();
    let route_id = path.into_inner();

    match run_blocking(move || favorites.remove(&route_id)).await {
        Ok(_) => HttpResponse::Ok().json(ApiResponse::success(state.favorites.list())),
        Err(e) => error_response(e),
    }
}

async fn export_data<S: KeyValueStore, G>(state: web::Data<AppState<S, G>>) -> HttpResponse {
    let snapshot = favorites::export(&state.catalog, &state.favorites);
    HttpResponse::Ok()
        .insert_header(("Content-Disposition", "attachment; filename=\"daladala-data.json\""))
        .json(snapshot)
}

// ============================================================================
// Contributions (logged for review, never applied to the catalog)
// ============================================================================

#[derive(Debug, Deserialize)]
struct NewRouteSubmission {
    #[serde(default)]
    route_id: String,
    #[serde(default)]
    route_name: String,
    #[serde(default)]
    color: String,
    #[serde(default)]
    notes: String,
}

#[derive(Debug, Deserialize)]
struct NewStopSubmission {
    #[serde(default)]
    route_id: String,
    #[serde(default)]
    stop_name: String,
    stop_order: Option<i64>,
}

fn require(field: &str, value: &str) -> Result<(), DaladalaError> {
    if value.trim().is_empty() {
        return Err(DaladalaError::InvalidInput(format!("{} is required", field)));
    }
    Ok(())
}

async fn contribute_route(submission: web::Json<NewRouteSubmission>) -> HttpResponse {
    let checked = require("route_id", &submission.route_id)
        .and_then(|_| require("route_name", &submission.route_name));
    if let Err(e) = checked {
        return error_response(e);
    }

    log::info!(
        "📝 New route submitted: id={} name={} color={} notes={}",
        submission.route_id,
        submission.route_name,
        submission.color,
        submission.notes
    );
    HttpResponse::Accepted().json(ApiResponse::success("Route submitted for review"))
}

async fn contribute_stop<S, G>(
    state: web::Data<AppState<S, G>>,
    submission: web::Json<NewStopSubmission>,
) -> HttpResponse {
    let checked = require("route_id", &submission.route_id)
        .and_then(|_| require("stop_name", &submission.stop_name));
    if let Err(e) = checked {
        return error_response(e);
    }
    if state.catalog.get(&submission.route_id).is_none() {
        let message = format!("Route '{}' not found", submission.route_id);
        return error_response(DaladalaError::NotFound(message));
    }

    log::info!(
        "📝 New stop submitted: route={} stop={} order={:?}",
        submission.route_id,
        submission.stop_name,
        submission.stop_order
    );
    HttpResponse::Accepted().json(ApiResponse::success("Stop submitted for review"))
}

// ============================================================================
// Wiring
// ============================================================================

pub fn configure<S, G>(cfg: &mut web::ServiceConfig)
where
    S: KeyValueStore + Clone + Send + 'static,
    G: Geocoder + 'static,
{
    cfg.route("/", web::get().to(serve_index))
        .route("/daladala.js", web::get().to(serve_js))
        .route("/health", web::get().to(health_check::<S, G>))
        .service(
            web::scope("/api")
                .route("/routes", web::get().to(list_routes::<S, G>))
                .route("/routes/{id}", web::get().to(get_route::<S, G>))
                .route("/routes/{id}/plot", web::get().to(plot_route::<S, G>))
                .route("/suggest", web::get().to(suggest_routes::<S, G>))
                .route("/favorites", web::get().to(list_favorites::<S, G>))
                .route("/favorites/{id}", web::post().to(add_favorite::<S, G>))
                .route("/favorites/{id}", web::delete().to(remove_favorite::<S, G>))
                .route("/export", web::get().to(export_data::<S, G>))
                .route("/contribute/route", web::post().to(contribute_route))
                .route("/contribute/stop", web::post().to(contribute_stop::<S, G>)),
        );
}
