/// Namespace prefix for geocode entries in the shared key-value store.
pub const GEOCODE_KEY_PREFIX: &str = "geocode:";

pub const DEFAULT_CITY: &str = "Dar es Salaam";
pub const DEFAULT_COUNTRY: &str = "Tanzania";

/// A stop name expanded with its city/country context.
///
/// `query` is sent verbatim to the geocoder and `cache_key` is derived from
/// the exact same text, so a cached entry always belongs to one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub cache_key: String,
    pub query: String,
}

pub fn normalize(stop_name: &str, city: &str, country: &str) -> NormalizedQuery {
    let query = format!("{}, {}, {}", stop_name, city, country);
    NormalizedQuery {
        cache_key: format!("{}{}", GEOCODE_KEY_PREFIX, query),
        query,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_builds_query_and_key() {
        let q = normalize("Kariakoo", DEFAULT_CITY, DEFAULT_COUNTRY);
        assert_eq!(q.query, "Kariakoo, Dar es Salaam, Tanzania");
        assert_eq!(q.cache_key, "geocode:Kariakoo, Dar es Salaam, Tanzania");
    }

    #[test]
    fn test_normalize_is_case_and_whitespace_sensitive() {
        let a = normalize("Posta", DEFAULT_CITY, DEFAULT_COUNTRY);
        let b = normalize("posta ", DEFAULT_CITY, DEFAULT_COUNTRY);
        assert_ne!(a.cache_key, b.cache_key);
        assert_eq!(b.query, "posta , Dar es Salaam, Tanzania");
    }

    #[test]
    fn test_normalize_empty_name() {
        let q = normalize("", "Arusha", "Tanzania");
        assert_eq!(q.query, ", Arusha, Tanzania");
        assert!(q.cache_key.starts_with(GEOCODE_KEY_PREFIX));
    }
}
