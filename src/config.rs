use crate::geocoder::NominatimGeocoder;
use crate::normalize::{DEFAULT_CITY, DEFAULT_COUNTRY};
use crate::store::JsonFileStore;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Daladala route browser: serves the route map and the route finder API.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Settings {
    /// Address to bind the HTTP server to
    #[arg(long, env = "DALADALA_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "DALADALA_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Stop table: route_id,route_name,stop_order,stop_name
    #[arg(long, env = "DALADALA_ROUTES_CSV", default_value = "data/routes.csv")]
    pub routes_csv: PathBuf,

    /// Route metadata table: route_id,color,notes
    #[arg(long, env = "DALADALA_META_CSV", default_value = "data/routes_meta.csv")]
    pub meta_csv: PathBuf,

    /// Directory for the geocode cache and favorites (defaults to the user cache dir)
    #[arg(long, env = "DALADALA_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    #[arg(long, env = "DALADALA_GEOCODER_URL", default_value = NominatimGeocoder::DEFAULT_BASE_URL)]
    pub geocoder_url: String,

    /// Contact address sent with every geocoding request
    #[arg(long, env = "DALADALA_CONTACT_EMAIL", default_value = "demo@example.com")]
    pub contact_email: String,

    #[arg(long, env = "DALADALA_CITY", default_value = DEFAULT_CITY)]
    pub city: String,

    #[arg(long, env = "DALADALA_COUNTRY", default_value = DEFAULT_COUNTRY)]
    pub country: String,

    /// Pause after each remote geocoding request, in milliseconds (minimum 300)
    #[arg(long, env = "DALADALA_POLITE_DELAY_MS", default_value_t = 300)]
    pub polite_delay_ms: u64,

    #[arg(long, env = "DALADALA_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
}

impl Settings {
    pub fn store_path(&self) -> PathBuf {
        JsonFileStore::default_path(self.cache_dir.as_deref())
    }

    pub fn polite_delay(&self) -> Duration {
        Duration::from_millis(self.polite_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
