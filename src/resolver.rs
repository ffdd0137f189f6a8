// Sequential, rate-limited stop resolution.
//
// Every stop is looked up in the geocode cache first. Only a miss reaches the
// remote geocoder, and every remote request is followed by the polite delay
// whatever its outcome. Cache hits never wait. One stop failing never stops
// the rest of the route from resolving.

use crate::catalog::Catalog;
use crate::error::{DaladalaError, Result};
use crate::geocode_cache::GeocodeCache;
use crate::geocoder::Geocoder;
use crate::models::{GeocodeResult, Route, Stop};
use crate::normalize::{DEFAULT_CITY, DEFAULT_COUNTRY, normalize};
use crate::store::{KeyValueStore, run_blocking};
use serde::Serialize;
use std::time::Duration;

pub const MIN_POLITE_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedStop {
    pub stop: Stop,
    pub location: Option<GeocodeResult>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteResolution {
    pub stops: Vec<ResolvedStop>, // same order as the input stops
    pub cache_hits: usize,
    pub remote_lookups: usize,
    pub unresolved: Vec<String>,
    pub progress: Vec<String>,
}

impl RouteResolution {
    pub fn resolved_count(&self) -> usize {
        self.stops.iter().filter(|s| s.location.is_some()).count()
    }

    fn log(&mut self, message: String) {
        self.progress.push(message);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutePlot<'a> {
    pub route: &'a Route,
    pub resolution: RouteResolution,
    /// `[lat, lon]` of every resolved stop, in route order.
    pub path: Vec<[f64; 2]>,
}

pub struct Resolver<S, G> {
    cache: GeocodeCache<S>,
    geocoder: G,
    city: String,
    country: String,
    delay: Duration,
}

impl<S, G> Resolver<S, G>
where
    S: KeyValueStore + Clone + Send + 'static,
    G: Geocoder,
{
    pub fn new(cache: GeocodeCache<S>, geocoder: G) -> Self {
        Resolver {
            cache,
            geocoder,
            city: DEFAULT_CITY.to_string(),
            country: DEFAULT_COUNTRY.to_string(),
            delay: MIN_POLITE_DELAY,
        }
    }

    pub fn with_place(mut self, city: &str, country: &str) -> Self {
        self.city = city.to_string();
        self.country = country.to_string();
        self
    }

    /// Delays below [`MIN_POLITE_DELAY`] are raised to it.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        if delay < MIN_POLITE_DELAY {
            log::warn!(
                "⚠️  Polite delay {:?} is below the minimum, using {:?}",
                delay,
                MIN_POLITE_DELAY
            );
        }
        self.delay = delay.max(MIN_POLITE_DELAY);
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn cache(&self) -> &GeocodeCache<S> {
        &self.cache
    }

    pub fn geocoder(&self) -> &G {
        &self.geocoder
    }

    /// Resolves `stops` one at a time, in order.
    ///
    /// Takes `&mut self` so a resolver can only run one resolution at a time.
    pub async fn resolve_route(&mut self, stops: &[Stop]) -> RouteResolution {
        let mut resolution = RouteResolution::default();

        for stop in stops {
            let location = self.resolve_stop(stop, &mut resolution).await;
            if location.is_none() {
                log::warn!("⚠️  Could not geocode: {}", stop.name);
                resolution.log(format!("Could not geocode: {}", stop.name));
                resolution.unresolved.push(stop.name.clone());
            }
            resolution.stops.push(ResolvedStop {
                stop: stop.clone(),
                location,
            });
        }

        resolution
    }

    async fn resolve_stop(
        &mut self,
        stop: &Stop,
        resolution: &mut RouteResolution,
    ) -> Option<GeocodeResult> {
        let normalized = normalize(&stop.name, &self.city, &self.country);

        if let Some(hit) = self.cache.get(&normalized.cache_key) {
            log::debug!("cache hit for '{}'", normalized.query);
            resolution.cache_hits += 1;
            return Some(hit);
        }

        log::debug!("cache miss for '{}', asking geocoder", normalized.query);
        resolution.remote_lookups += 1;
        let outcome = self.geocoder.lookup(&normalized.query).await;

        let location = match outcome {
            Ok(Some(found)) => {
                let cache = self.cache.clone();
                let key = normalized.cache_key.clone();
                if let Err(e) = run_blocking(move || cache.put(&key, &found)).await {
                    log::warn!("⚠️  Could not cache '{}': {}", normalized.query, e);
                }
                Some(found)
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("⚠️  Geocoding error for \"{}\": {}", normalized.query, e);
                resolution.log(format!("Geocoding error for \"{}\": {}", normalized.query, e));
                None
            }
        };

        tokio::time::sleep(self.delay).await;
        location
    }

    /// Resolves every stop of `route_id` and builds the polyline for it.
    pub async fn plot_route<'a>(
        &mut self,
        catalog: &'a Catalog,
        route_id: &str,
    ) -> Result<RoutePlot<'a>> {
        let route = catalog
            .get(route_id)
            .ok_or_else(|| DaladalaError::NotFound(format!("Route '{}' not found", route_id)))?;

        log::info!("🗺️  Plotting route {} with {} stops...", route.route_id, route.stops.len());
        let mut resolution = RouteResolution::default();
        resolution.log(format!(
            "Plotting route {} with {} stops...",
            route.route_id,
            route.stops.len()
        ));

        let run = self.resolve_route(&route.stops).await;
        resolution.stops = run.stops;
        resolution.cache_hits = run.cache_hits;
        resolution.remote_lookups = run.remote_lookups;
        resolution.unresolved = run.unresolved;
        resolution.progress.extend(run.progress);

        let path: Vec<[f64; 2]> = resolution
            .stops
            .iter()
            .filter_map(|s| s.location.map(|c| [c.lat, c.lon]))
            .collect();

        if path.len() > 1 {
            resolution.log(format!("Route plotted successfully! {} stops mapped.", path.len()));
        }
        log::info!(
            "✓ Route {}: {}/{} stops mapped ({} cached, {} remote)",
            route.route_id,
            path.len(),
            route.stops.len(),
            resolution.cache_hits,
            resolution.remote_lookups
        );

        Ok(RoutePlot {
            route,
            resolution,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RouteRow;
    use crate::geocoder::LookupFuture;
    use crate::store::{JsonFileStore, MemoryStore};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    enum Answer {
        Found(GeocodeResult),
        Empty,
        Fail,
    }

    #[derive(Default)]
    struct FakeGeocoder {
        answers: HashMap<String, Answer>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeGeocoder {
        fn answer(mut self, stop: &str, answer: Answer) -> Self {
            self.answers
                .insert(normalize(stop, DEFAULT_CITY, DEFAULT_COUNTRY).query, answer);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Geocoder for FakeGeocoder {
        fn lookup<'a>(&'a self, query: &'a str) -> LookupFuture<'a> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(query.to_string());
                match self.answers.get(query) {
                    Some(Answer::Found(c)) => Ok(Some(*c)),
                    Some(Answer::Empty) => Ok(None),
                    Some(Answer::Fail) | None => {
                        Err(DaladalaError::NetworkError("connection reset".to_string()))
                    }
                }
            })
        }
    }

    const KARIAKOO: GeocodeResult = GeocodeResult { lat: -6.8194, lon: 39.2720 };
    const POSTA: GeocodeResult = GeocodeResult { lat: -6.8161, lon: 39.2894 };
    const MWENGE: GeocodeResult = GeocodeResult { lat: -6.7700, lon: 39.2290 };

    fn stops() -> Vec<Stop> {
        ["Kariakoo", "Posta", "Mwenge"]
            .iter()
            .enumerate()
            .map(|(i, name)| Stop {
                order: i as i64 + 1,
                name: name.to_string(),
            })
            .collect()
    }

    fn all_found() -> FakeGeocoder {
        FakeGeocoder::default()
            .answer("Kariakoo", Answer::Found(KARIAKOO))
            .answer("Posta", Answer::Found(POSTA))
            .answer("Mwenge", Answer::Found(MWENGE))
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_preserves_order() {
        let mut resolver = Resolver::new(GeocodeCache::new(MemoryStore::new()), all_found());
        let result = resolver.resolve_route(&stops()).await;

        let names: Vec<_> = result.stops.iter().map(|s| s.stop.name.as_str()).collect();
        assert_eq!(names, vec!["Kariakoo", "Posta", "Mwenge"]);
        assert_eq!(result.stops[0].location, Some(KARIAKOO));
        assert_eq!(result.stops[1].location, Some(POSTA));
        assert_eq!(result.stops[2].location, Some(MWENGE));
        assert_eq!(result.remote_lookups, 3);
        assert!(result.unresolved.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_cache_issues_no_remote_calls() {
        let store = MemoryStore::new();
        let mut resolver = Resolver::new(GeocodeCache::new(store.clone()), all_found());

        let first = resolver.resolve_route(&stops()).await;
        assert_eq!(resolver.geocoder().calls().len(), 3);

        let started = Instant::now();
        let second = resolver.resolve_route(&stops()).await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(resolver.geocoder().calls().len(), 3);
        assert_eq!(second.remote_lookups, 0);
        assert_eq!(second.cache_hits, 3);

        let first_coords: Vec<_> = first.stops.iter().map(|s| s.location).collect();
        let second_coords: Vec<_> = second.stops.iter().map(|s| s.location).collect();
        assert_eq!(first_coords, second_coords);

        // a fresh resolver over the same store is warm too
        let mut fresh = Resolver::new(GeocodeCache::new(store), FakeGeocoder::default());
        let third = fresh.resolve_route(&stops()).await;
        assert!(fresh.geocoder().calls().is_empty());
        assert_eq!(third.resolved_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_follows_remote_calls_only() {
        let store = MemoryStore::new();
        let cache = GeocodeCache::new(store.clone());
        cache
            .put(&normalize("Posta", DEFAULT_CITY, DEFAULT_COUNTRY).cache_key, &POSTA)
            .unwrap();

        let mut resolver = Resolver::new(cache, all_found());
        let started = Instant::now();
        let result = resolver.resolve_route(&stops()).await;
        let elapsed = started.elapsed();

        assert_eq!(result.cache_hits, 1);
        assert_eq!(result.remote_lookups, 2);
        assert!(elapsed >= MIN_POLITE_DELAY * 2, "elapsed {:?}", elapsed);
        assert!(elapsed < MIN_POLITE_DELAY * 3, "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_lookups_still_wait() {
        let cache = GeocodeCache::new(MemoryStore::new());
        let mut resolver =
            Resolver::new(cache, FakeGeocoder::default()).with_delay(Duration::from_secs(1));
        let started = Instant::now();
        let result = resolver.resolve_route(&stops()).await;

        assert_eq!(result.resolved_count(), 0);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_fault_is_isolated() {
        let geocoder = all_found().answer("Posta", Answer::Fail);
        let store = MemoryStore::new();
        let mut resolver = Resolver::new(GeocodeCache::new(store.clone()), geocoder);
        let result = resolver.resolve_route(&stops()).await;

        assert_eq!(result.stops.len(), 3);
        assert_eq!(result.stops[0].location, Some(KARIAKOO));
        assert_eq!(result.stops[1].location, None);
        assert_eq!(result.stops[2].location, Some(MWENGE));
        assert_eq!(result.unresolved, vec!["Posta".to_string()]);
        assert!(!result.progress.is_empty());
        assert!(result.progress.iter().all(|line| line.contains("Posta")));

        // failures are not cached
        let key = normalize("Posta", DEFAULT_CITY, DEFAULT_COUNTRY).cache_key;
        assert_eq!(store.get(&key), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_set_is_unresolved() {
        let geocoder = all_found().answer("Mwenge", Answer::Empty);
        let mut resolver = Resolver::new(GeocodeCache::new(MemoryStore::new()), geocoder);
        let result = resolver.resolve_route(&stops()).await;

        assert_eq!(result.stops[2].location, None);
        assert_eq!(result.progress, vec!["Could not geocode: Mwenge".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_cache_entry_is_refetched() {
        let store = MemoryStore::new();
        let key = normalize("Kariakoo", DEFAULT_CITY, DEFAULT_COUNTRY).cache_key;
        store.set(&key, "garbage").unwrap();

        let mut resolver = Resolver::new(GeocodeCache::new(store.clone()), all_found());
        let result = resolver.resolve_route(&stops()[..1]).await;

        assert_eq!(result.remote_lookups, 1);
        assert_eq!(result.stops[0].location, Some(KARIAKOO));
        assert_eq!(resolver.cache().get(&key), Some(KARIAKOO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queries_use_configured_place() {
        let cache = GeocodeCache::new(MemoryStore::new());
        let mut resolver =
            Resolver::new(cache, FakeGeocoder::default()).with_place("Arusha", "Tanzania");
        resolver.resolve_route(&stops()[..1]).await;
        assert_eq!(resolver.geocoder().calls(), vec!["Kariakoo, Arusha, Tanzania".to_string()]);
    }

    #[test]
    fn test_delay_has_a_floor() {
        let cache = GeocodeCache::new(MemoryStore::new());
        let resolver =
            Resolver::new(cache, FakeGeocoder::default()).with_delay(Duration::from_millis(10));
        assert_eq!(resolver.delay(), MIN_POLITE_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_hits_reach_the_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let cache = GeocodeCache::new(JsonFileStore::open(&path));
        let mut resolver = Resolver::new(cache, all_found());

        let result = resolver.resolve_route(&stops()).await;
        assert_eq!(result.remote_lookups, 3);

        let reopened = GeocodeCache::new(JsonFileStore::open(&path));
        let key = normalize("Mwenge", DEFAULT_CITY, DEFAULT_COUNTRY).cache_key;
        assert_eq!(reopened.get(&key), Some(MWENGE));
        assert_eq!(reopened.store().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plot_route() {
        let catalog = Catalog::build(
            vec![
                RouteRow::new("R1", "Kariakoo Stand", 1, "Kariakoo"),
                RouteRow::new("R1", "Kariakoo Stand", 2, "Posta"),
                RouteRow::new("R1", "Kariakoo Stand", 3, "Mwenge"),
            ],
            Vec::new(),
        )
        .catalog;
        let mut resolver = Resolver::new(
            GeocodeCache::new(MemoryStore::new()),
            all_found().answer("Posta", Answer::Fail),
        );

        let plot = resolver.plot_route(&catalog, "R1").await.unwrap();
        assert_eq!(plot.route.route_id, "R1");
        assert_eq!(plot.path, vec![[KARIAKOO.lat, KARIAKOO.lon], [MWENGE.lat, MWENGE.lon]]);
        assert_eq!(plot.resolution.progress.first().unwrap(), "Plotting route R1 with 3 stops...");
        assert_eq!(
            plot.resolution.progress.last().unwrap(),
            "Route plotted successfully! 2 stops mapped."
        );

        assert!(matches!(
            resolver.plot_route(&catalog, "R404").await,
            Err(DaladalaError::NotFound(_))
        ));
    }
}
