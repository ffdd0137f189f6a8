// Daladala Guide server: route map, stop geocoding and route finder
// with an embedded web UI.

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use clap::Parser;
use daladala_guide::api::{self, AppState};
use daladala_guide::config::Settings;
use daladala_guide::geocode_cache::GeocodeCache;
use daladala_guide::geocoder::NominatimGeocoder;
use daladala_guide::resolver::Resolver;
use daladala_guide::store::JsonFileStore;
use daladala_guide::{Catalog, DaladalaError};

type ServerState = AppState<JsonFileStore, NominatimGeocoder>;

// ============================================================================
// Startup
// ============================================================================

fn build_state(settings: &Settings) -> Result<ServerState, DaladalaError> {
    log::info!("📍 Loading routes from {:?}...", settings.routes_csv);
    let build = Catalog::from_paths(&settings.routes_csv, &settings.meta_csv)?;

    for skip in &build.skipped {
        log::debug!("skipped {:?} row {}: {}", skip.table, skip.row, skip.reason);
    }
    if !build.skipped.is_empty() {
        log::warn!("⚠️  Skipped {} malformed rows", build.skipped.len());
    }
    log::info!(
        "   ✓ Loaded {} routes, {} stops",
        build.catalog.len(),
        build.catalog.stop_count()
    );

    let store = JsonFileStore::open(settings.store_path());
    log::info!("💾 Geocode cache: {:?} ({} entries)", store.path(), store.len());

    let geocoder = NominatimGeocoder::new(
        &settings.geocoder_url,
        &settings.contact_email,
        settings.request_timeout(),
    )?;

    let resolver = Resolver::new(GeocodeCache::new(store.clone()), geocoder)
        .with_place(&settings.city, &settings.country)
        .with_delay(settings.polite_delay());

    Ok(AppState::new(build.catalog, resolver, store))
}

// ============================================================================
// Server Setup
// ============================================================================

async fn run_server(state: ServerState, settings: Settings) -> std::io::Result<()> {
    log::info!("🌐 Server running on: http://{}:{}", settings.host, settings.port);
    log::info!("📱 Web UI available at: http://localhost:{}", settings.port);
    log::info!("📡 API available at: http://localhost:{}/api", settings.port);
    if let Some(first) = state.catalog.first() {
        log::info!("🚌 Default route: {} - {}", first.route_id, first.name);
    }

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(api::configure::<JsonFileStore, NominatimGeocoder>)
    })
    .bind((settings.host.as_str(), settings.port))?
    .run()
    .await
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let settings = Settings::parse();

    log::info!("🚀 Daladala Guide v{}", env!("CARGO_PKG_VERSION"));

    let state = match build_state(&settings) {
        Ok(state) => state,
        Err(e) => {
            log::error!("❌ Failed to initialize: {}", e);
            log::error!(
                "💡 Check --routes-csv / --meta-csv (or DALADALA_ROUTES_CSV / DALADALA_META_CSV)"
            );
            std::process::exit(1);
        }
    };

    actix_web::rt::System::new().block_on(run_server(state, settings))
}
