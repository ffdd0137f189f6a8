// Remote geocoding collaborator.
//
// Nominatim usage policy: https://operations.osmfoundation.org/policies/nominatim/
// - one client, one request at a time; spacing is enforced by the resolver
// - requests carry an identifying User-Agent and a contact address

use crate::error::{DaladalaError, Result};
use crate::models::GeocodeResult;
use reqwest::header::ACCEPT_LANGUAGE;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub type LookupFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<GeocodeResult>>> + Send + 'a>>;

/// A remote service resolving a free-text query to its best match.
///
/// `Ok(None)` means the service answered but found nothing.
pub trait Geocoder: Send + Sync {
    fn lookup<'a>(&'a self, query: &'a str) -> LookupFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    search_url: String,
    contact_email: String,
}

impl NominatimGeocoder {
    pub const DEFAULT_BASE_URL: &'static str = "https://nominatim.openstreetmap.org";
    pub const USER_AGENT: &'static str = concat!("daladala-guide/", env!("CARGO_PKG_VERSION"));

    pub fn new(base_url: &str, contact_email: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(Self::USER_AGENT)
            .build()
            .map_err(|e| {
                DaladalaError::NetworkError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self::with_client(client, base_url, contact_email))
    }

    /// Uses a caller-built client as is; it should already carry a User-Agent.
    pub fn with_client(client: reqwest::Client, base_url: &str, contact_email: &str) -> Self {
        NominatimGeocoder {
            client,
            search_url: format!("{}/search", base_url.trim_end_matches('/')),
            contact_email: contact_email.to_string(),
        }
    }

    async fn search(&self, query: &str) -> Result<Option<GeocodeResult>> {
        let response = self
            .client
            .get(&self.search_url)
            .query(&[
                ("format", "json"),
                ("limit", "1"),
                ("q", query),
                ("email", self.contact_email.as_str()),
            ])
            .header(ACCEPT_LANGUAGE, "en")
            .send()
            .await
            .map_err(|e| DaladalaError::NetworkError(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DaladalaError::NetworkError(format!("HTTP {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DaladalaError::NetworkError(format!("Failed to read response: {}", e)))?;

        parse_search_response(&body)
    }
}

impl Geocoder for NominatimGeocoder {
    fn lookup<'a>(&'a self, query: &'a str) -> LookupFuture<'a> {
        Box::pin(self.search(query))
    }
}

#[derive(Deserialize)]
struct Place {
    lat: CoordinateField,
    lon: CoordinateField,
}

// Nominatim sends decimal strings, other providers send numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum CoordinateField {
    Number(f64),
    Text(String),
}

impl CoordinateField {
    fn value(&self, field: &str) -> Result<f64> {
        let value = match self {
            CoordinateField::Number(n) => *n,
            CoordinateField::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| {
                    DaladalaError::ParseError(format!("Invalid {} '{}': {}", field, s, e))
                })?,
        };
        if !value.is_finite() {
            return Err(DaladalaError::ParseError(format!("Non-finite {}", field)));
        }
        Ok(value)
    }
}

/// Takes the first candidate of a search response, `None` on an empty array.
pub fn parse_search_response(body: &str) -> Result<Option<GeocodeResult>> {
    let places: Vec<Place> = serde_json::from_str(body)
        .map_err(|e| DaladalaError::ParseError(format!("Invalid JSON response: {}", e)))?;

    match places.first() {
        Some(first) => Ok(Some(GeocodeResult {
            lat: first.lat.value("lat")?,
            lon: first.lon.value("lon")?,
        })),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    #[test]
    fn test_parse_string_coordinates() {
        let body = r#"[{"place_id":1,"lat":"-6.8161","lon":"39.2803","display_name":"Posta"}]"#;
        let result = parse_search_response(body).unwrap();
        assert_eq!(result, Some(GeocodeResult { lat: -6.8161, lon: 39.2803 }));
    }

    #[test]
    fn test_parse_numeric_coordinates_takes_first() {
        let body = r#"[{"lat":-6.77,"lon":39.22},{"lat":1.0,"lon":2.0}]"#;
        let result = parse_search_response(body).unwrap();
        assert_eq!(result, Some(GeocodeResult { lat: -6.77, lon: 39.22 }));
    }

    #[test]
    fn test_parse_empty_array() {
        assert_eq!(parse_search_response("[]").unwrap(), None);
    }

    #[test]
    fn test_parse_malformed_payloads() {
        assert!(parse_search_response("{\"error\":\"rate limited\"}").is_err());
        assert!(parse_search_response("<html>").is_err());
        assert!(parse_search_response(r#"[{"lat":"north","lon":"39.2"}]"#).is_err());
        assert!(parse_search_response(r#"[{"lon":"39.2"}]"#).is_err());
    }

    #[test]
    fn test_search_url_trims_trailing_slash() {
        let timeout = Duration::from_secs(5);
        let geocoder =
            NominatimGeocoder::new("http://localhost:7070/", "ops@example.com", timeout).unwrap();
        assert_eq!(geocoder.search_url, "http://localhost:7070/search");
    }

    // One-shot HTTP server on a loopback port. Returns the base URL and the raw
    // request it received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\n\
                 content-type: application/json\r\n\
                 content-length: {}\r\n\
                 connection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_lowercase()
        });

        (base_url, handle)
    }

    fn geocoder_at(base_url: &str) -> NominatimGeocoder {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .user_agent(NominatimGeocoder::USER_AGENT)
            .build()
            .unwrap();
        NominatimGeocoder::with_client(client, base_url, "ops@example.com")
    }

    #[tokio::test]
    async fn test_unavailable_service_is_a_network_error() {
        let (base_url, server) = serve_once("503 Service Unavailable", "").await;
        let result = geocoder_at(&base_url).lookup("Posta").await;

        match result {
            Err(DaladalaError::NetworkError(message)) => {
                assert!(message.contains("503"), "{}", message)
            }
            other => panic!("expected a network error, got {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_result_list_is_not_found() {
        let (base_url, server) = serve_once("200 OK", "[]").await;
        let result = geocoder_at(&base_url).lookup("Nowhere").await;
        assert!(matches!(result, Ok(None)));

        let request = server.await.unwrap();
        assert!(request.starts_with("get /search?"), "{}", request);
        assert!(request.contains("format=json"));
        assert!(request.contains("limit=1"));
        assert!(request.contains("q=nowhere"));
        assert!(request.contains("accept-language: en"));
        assert!(request.contains("user-agent: daladala-guide/"));
    }

    #[tokio::test]
    async fn test_found_place_is_parsed() {
        let body = r#"[{"lat":"-6.8161","lon":"39.2803"}]"#;
        let (base_url, server) = serve_once("200 OK", body).await;
        let result = geocoder_at(&base_url).lookup("Posta").await.unwrap();
        assert_eq!(result, Some(GeocodeResult { lat: -6.8161, lon: 39.2803 }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let result = geocoder_at(&base_url).lookup("Posta").await;
        assert!(matches!(result, Err(DaladalaError::NetworkError(_))));
    }
}
