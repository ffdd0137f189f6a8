use crate::catalog::Catalog;
use crate::error::{DaladalaError, Result};
use crate::models::{Favorite, Route};
use crate::store::KeyValueStore;
use chrono::Utc;
use serde::Serialize;

pub const FAVORITES_KEY: &str = "daladala-favorites";

/// Saved routes, persisted as a JSON array in the key-value store.
#[derive(Debug, Clone)]
pub struct FavoritesStore<S> {
    store: S,
}

impl<S: KeyValueStore> FavoritesStore<S> {
    pub fn new(store: S) -> Self {
        FavoritesStore { store }
    }

    pub fn list(&self) -> Vec<Favorite> {
        parse_list(self.store.get(FAVORITES_KEY).as_deref())
    }

    pub fn contains(&self, route_id: &str) -> bool {
        self.list().iter().any(|f| f.route_id == route_id)
    }

    /// Returns `false` when the route was already a favorite.
    pub fn add(&self, catalog: &Catalog, route_id: &str) -> Result<bool> {
        let route = catalog
            .get(route_id)
            .ok_or_else(|| DaladalaError::NotFound(format!("Route '{}' not found", route_id)))?;

        let added = self.store.update(FAVORITES_KEY, |raw| {
            let mut favorites = parse_list(raw);
            if favorites.iter().any(|f| f.route_id == route_id) {
                return Ok((None, false));
            }
            favorites.push(Favorite {
                route_id: route.route_id.clone(),
                name: route.name.clone(),
            });
            Ok((Some(to_json(&favorites)?), true))
        })?;

        if added {
            log::info!("⭐ Added {} to favorites", route_id);
        }
        Ok(added)
    }

    pub fn remove(&self, route_id: &str) -> Result<bool> {
        let removed = self.store.update(FAVORITES_KEY, |raw| {
            let mut favorites = parse_list(raw);
            let before = favorites.len();
            favorites.retain(|f| f.route_id != route_id);
            if favorites.len() == before {
                return Ok((None, false));
            }
            Ok((Some(to_json(&favorites)?), true))
        })?;

        if removed {
            log::info!("⭐ Removed {} from favorites", route_id);
        }
        Ok(removed)
    }
}

fn parse_list(raw: Option<&str>) -> Vec<Favorite> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    serde_json::from_str(raw).unwrap_or_else(|e| {
        log::warn!("⚠️  Ignoring unreadable favorites list: {}", e);
        Vec::new()
    })
}

fn to_json(favorites: &[Favorite]) -> Result<String> {
    serde_json::to_string(favorites)
        .map_err(|e| DaladalaError::ParseError(format!("Failed to serialize favorites: {}", e)))
}

/// Everything a user would want to carry to another device.
#[derive(Debug, Serialize)]
pub struct ExportSnapshot<'a> {
    pub routes: Vec<&'a Route>,
    pub favorites: Vec<Favorite>,
    pub timestamp: String,
}

pub fn export<'a, S: KeyValueStore>(
    catalog: &'a Catalog,
    favorites: &FavoritesStore<S>,
) -> ExportSnapshot<'a> {
    ExportSnapshot {
        routes: catalog.routes().iter().collect(),
        favorites: favorites.list(),
        timestamp: Utc::now().to_rfc3339(),
    }
}
