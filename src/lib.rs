// Daladala Guide: route catalog, stop geocoding and route finder for
// Dar es Salaam minibus routes.
//
// Geocoding goes through Nominatim (https://nominatim.openstreetmap.org),
// cached locally and rate limited to one sequential request stream.

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod favorites;
pub mod geocode_cache;
pub mod geocoder;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod resolver;
pub mod store;

pub use catalog::{Catalog, CatalogBuild};
pub use error::{DaladalaError, Result};
pub use matcher::{MatchCandidate, find_routes};
pub use resolver::{Resolver, RouteResolution};
