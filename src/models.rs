use serde::{Deserialize, Serialize};

// ============================================================================
// Data Structures
// ============================================================================

pub const DEFAULT_ROUTE_COLOR: &str = "#2563eb";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stop {
    pub order: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub route_id: String,
    pub name: String,
    pub color: String,
    pub notes: String,
    pub stops: Vec<Stop>, // sorted by order, stable
}

impl Route {
    pub fn summary(&self) -> RouteSummary {
        RouteSummary {
            route_id: self.route_id.clone(),
            name: self.name.clone(),
            color: self.color.clone(),
            stop_count: self.stops.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub route_id: String,
    pub name: String,
    pub color: String,
    pub stop_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub route_id: String,
    pub name: String,
}
