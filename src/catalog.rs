// Route/stop catalog built once from the two CSV tables:
//
//   routes.csv       route_id,route_name,stop_order,stop_name
//   routes_meta.csv  route_id,color,notes
//
// Malformed rows never fail the load. They are dropped and reported back in
// `CatalogBuild::skipped` so the caller can log how much was lost.

use crate::error::{DaladalaError, Result};
use crate::models::{DEFAULT_ROUTE_COLOR, Route, Stop};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteRow {
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub route_name: Option<String>,
    #[serde(default)]
    pub stop_order: Option<String>,
    #[serde(default)]
    pub stop_name: Option<String>,
}

impl RouteRow {
    pub fn new(route_id: &str, route_name: &str, stop_order: i64, stop_name: &str) -> Self {
        RouteRow {
            route_id: Some(route_id.to_string()),
            route_name: Some(route_name.to_string()),
            stop_order: Some(stop_order.to_string()),
            stop_name: Some(stop_name.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetaRow {
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl MetaRow {
    pub fn new(route_id: &str, color: &str, notes: &str) -> Self {
        MetaRow {
            route_id: Some(route_id.to_string()),
            color: Some(color.to_string()),
            notes: Some(notes.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTable {
    Routes,
    Meta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRow {
    pub table: SourceTable,
    pub row: usize, // 1-based, header excluded
    pub reason: String,
}

#[derive(Debug)]
pub struct CatalogBuild {
    pub catalog: Catalog,
    pub skipped: Vec<SkippedRow>,
}

/// Routes keyed by id, iterated in order of first appearance in the stop table.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    routes: Vec<Route>,
    index: HashMap<String, usize>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

// An empty or unreadable order sorts as 0.
fn parse_order(raw: Option<&str>) -> i64 {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return 0;
    };
    if let Ok(order) = raw.parse::<i64>() {
        return order;
    }
    match raw.parse::<f64>() {
        Ok(order) if order.is_finite() => order as i64,
        _ => {
            log::debug!("unreadable stop_order '{}', using 0", raw);
            0
        }
    }
}

impl Catalog {
    pub fn build(
        route_rows: impl IntoIterator<Item = RouteRow>,
        meta_rows: impl IntoIterator<Item = MetaRow>,
    ) -> CatalogBuild {
        Self::build_with_skips(
            route_rows.into_iter().map(Some),
            meta_rows.into_iter().map(Some),
            Vec::new(),
        )
    }

    // `None` rows already failed to parse and are in `skipped`; they only
    // keep the row numbering aligned with the source.
    fn build_with_skips(
        route_rows: impl IntoIterator<Item = Option<RouteRow>>,
        meta_rows: impl IntoIterator<Item = Option<MetaRow>>,
        mut skipped: Vec<SkippedRow>,
    ) -> CatalogBuild {
        let mut routes: Vec<Route> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for (i, row) in route_rows.into_iter().enumerate() {
            let Some(row) = row else { continue };
            let (route_id, stop_name) = match (present(&row.route_id), present(&row.stop_name)) {
                (Some(id), Some(name)) => (id, name),
                (None, _) => {
                    skipped.push(SkippedRow {
                        table: SourceTable::Routes,
                        row: i + 1,
                        reason: "missing route_id".to_string(),
                    });
                    continue;
                }
                (Some(_), None) => {
                    skipped.push(SkippedRow {
                        table: SourceTable::Routes,
                        row: i + 1,
                        reason: "missing stop_name".to_string(),
                    });
                    continue;
                }
            };

            let slot = *index.entry(route_id.to_string()).or_insert_with(|| {
                routes.push(Route {
                    route_id: route_id.to_string(),
                    name: present(&row.route_name).unwrap_or(route_id).to_string(),
                    color: DEFAULT_ROUTE_COLOR.to_string(),
                    notes: String::new(),
                    stops: Vec::new(),
                });
                routes.len() - 1
            });

            routes[slot].stops.push(Stop {
                order: parse_order(row.stop_order.as_deref()),
                name: stop_name.to_string(),
            });
        }

        for route in &mut routes {
            route.stops.sort_by_key(|s| s.order);
        }

        // later rows for the same route win
        let mut meta_by_id: HashMap<String, MetaRow> = HashMap::new();
        for (i, row) in meta_rows.into_iter().enumerate() {
            let Some(row) = row else { continue };
            match present(&row.route_id) {
                Some(id) => {
                    meta_by_id.insert(id.to_string(), row);
                }
                None => skipped.push(SkippedRow {
                    table: SourceTable::Meta,
                    row: i + 1,
                    reason: "missing route_id".to_string(),
                }),
            }
        }

        for route in &mut routes {
            if let Some(meta) = meta_by_id.get(&route.route_id) {
                if let Some(color) = present(&meta.color) {
                    route.color = color.to_string();
                }
                if let Some(notes) = present(&meta.notes) {
                    route.notes = notes.to_string();
                }
            }
        }

        CatalogBuild {
            catalog: Catalog { routes, index },
            skipped,
        }
    }

    pub fn from_csv_readers<R: Read, M: Read>(routes: R, meta: Option<M>) -> Result<CatalogBuild> {
        let mut skipped = Vec::new();

        let route_rows = read_rows::<RouteRow, _>(routes, SourceTable::Routes, &mut skipped)?;
        let meta_rows = match meta {
            Some(meta) => read_rows::<MetaRow, _>(meta, SourceTable::Meta, &mut skipped)?,
            None => Vec::new(),
        };

        Ok(Self::build_with_skips(route_rows, meta_rows, skipped))
    }

    /// Loads both tables from disk. The route table is required; a missing
    /// metadata table leaves every route with the default color.
    pub fn from_paths(routes_csv: &Path, meta_csv: &Path) -> Result<CatalogBuild> {
        let routes = File::open(routes_csv)
            .map_err(|e| {
                DaladalaError::FileError(format!("Failed to open {:?}: {}", routes_csv, e))
            })?;

        let meta = match File::open(meta_csv) {
            Ok(file) => Some(file),
            Err(e) => {
                log::warn!("⚠️  Could not open {:?} ({}), using default route colors", meta_csv, e);
                None
            }
        };

        Self::from_csv_readers(routes, meta)
    }

    pub fn get(&self, route_id: &str) -> Option<&Route> {
        self.index.get(route_id).map(|&i| &self.routes[i])
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn first(&self) -> Option<&Route> {
        self.routes.first()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn stop_count(&self) -> usize {
        self.routes.iter().map(|r| r.stops.len()).sum()
    }
}

fn read_rows<T, R>(
    reader: R,
    table: SourceTable,
    skipped: &mut Vec<SkippedRow>,
) -> Result<Vec<Option<T>>>
where
    T: for<'de> Deserialize<'de>,
    R: Read,
{
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    rdr.headers()
        .map_err(|e| {
            DaladalaError::ParseError(format!("Failed to read {:?} header: {}", table, e))
        })?;

    let mut rows = Vec::new();
    for (i, result) in rdr.deserialize::<T>().enumerate() {
        match result {
            Ok(row) => rows.push(Some(row)),
            Err(e) => {
                skipped.push(SkippedRow {
                    table,
                    row: i + 1,
                    reason: e.to_string(),
                });
                rows.push(None);
            }
        }
    }
    Ok(rows)
}
