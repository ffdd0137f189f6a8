use crate::catalog::Catalog;
use crate::error::{DaladalaError, Result};
use crate::models::Route;
use serde::Serialize;

/// A route connecting the two requested places.
///
/// `score` is the number of stops between the matched start and end stop;
/// lower means a more direct ride.
#[derive(Debug, Clone, Serialize)]
pub struct MatchCandidate<'a> {
    pub route: &'a Route,
    pub score: usize,
    pub start_stop_name: &'a str,
    pub end_stop_name: &'a str,
}

fn fold(fragment: &str) -> String {
    fragment.trim().to_lowercase()
}

/// Ranks every route that has a stop containing `start` and a stop
/// containing `end` (case-insensitive substring match), best first.
///
/// Fails with `InvalidInput` when either fragment is blank. An empty list
/// means no route connects the two places.
pub fn find_routes<'a>(
    catalog: &'a Catalog,
    start: &str,
    end: &str,
) -> Result<Vec<MatchCandidate<'a>>> {
    let start = fold(start);
    let end = fold(end);
    if start.is_empty() || end.is_empty() {
        return Err(DaladalaError::InvalidInput(
            "Please enter both starting and destination stops".to_string(),
        ));
    }

    let mut matches: Vec<MatchCandidate<'a>> = catalog
        .routes()
        .iter()
        .filter_map(|route| score_route(route, &start, &end))
        .collect();

    // stable: equal scores keep catalog order
    matches.sort_by_key(|m| m.score);
    Ok(matches)
}

fn score_route<'a>(route: &'a Route, start: &str, end: &str) -> Option<MatchCandidate<'a>> {
    let names: Vec<String> = route.stops.iter().map(|s| s.name.to_lowercase()).collect();

    // a single stop may satisfy both fragments, giving score 0
    let start_index = names.iter().position(|n| n.contains(start))?;
    let end_index = names.iter().position(|n| n.contains(end))?;

    Some(MatchCandidate {
        route,
        score: start_index.abs_diff(end_index),
        start_stop_name: &route.stops[start_index].name,
        end_stop_name: &route.stops[end_index].name,
    })
}
