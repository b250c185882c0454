use std::collections::BTreeSet;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, ORIGIN, REFERER};
use reqwest::{StatusCode, redirect};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Hits kept from one upstream response.
pub const MAX_RESULTS: usize = 10;
/// Characters of `content` kept before the ellipsis.
pub const CONTENT_LIMIT: usize = 200;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const ELLIPSIS: &str = "...";
const UNTITLED: &str = "No Title";
const UNKNOWN_ENGINE: &str = "unknown";
const USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Connection error to search backend: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Search backend returned {0}")]
    Status(StatusCode),
    #[error("Invalid response from search backend: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Raw response body of the search backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPayload {
    #[serde(default)]
    pub results: Vec<RawHit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawHit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub pretty_url: Option<String>,
    #[serde(default)]
    pub engine: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    /// 1-based rank within the kept hits.
    pub position: usize,
    pub title: String,
    pub url: String,
    pub content: String,
    pub engine: String,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchOutcome {
    pub success: bool,
    pub query: String,
    pub error: Option<String>,
    pub results: Vec<SearchHit>,
    /// Number of upstream hits before truncation.
    pub total_results: usize,
    pub engines: Vec<String>,
}

impl SearchOutcome {
    pub fn failure(query: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            query: query.into(),
            error: Some(error.into()),
            results: Vec::new(),
            total_results: 0,
            engines: Vec::new(),
        }
    }

    pub fn from_payload(query: impl Into<String>, payload: SearchPayload) -> Self {
        let total_results = payload.results.len();
        let engines: BTreeSet<String> = payload
            .results
            .iter()
            .filter_map(|hit| hit.engine.clone())
            .filter(|engine| !engine.is_empty())
            .collect();

        let results = payload
            .results
            .into_iter()
            .take(MAX_RESULTS)
            .enumerate()
            .map(|(index, hit)| normalize_hit(index + 1, hit))
            .collect();

        Self {
            success: true,
            query: query.into(),
            error: None,
            results,
            total_results,
            engines: engines.into_iter().collect(),
        }
    }
}

fn normalize_hit(position: usize, hit: RawHit) -> SearchHit {
    let url = hit.url.unwrap_or_else(|| "#".to_string());
    let content = hit.content.or(hit.pretty_url).unwrap_or_default();
    SearchHit {
        position,
        title: hit.title.unwrap_or_else(|| UNTITLED.to_string()),
        domain: domain_of(&url),
        content: truncate(content),
        engine: hit.engine.unwrap_or_else(|| UNKNOWN_ENGINE.to_string()),
        url,
    }
}

fn truncate(content: String) -> String {
    if content.chars().count() <= CONTENT_LIMIT {
        return content;
    }
    let mut cut: String = content.chars().take(CONTENT_LIMIT).collect();
    cut.push_str(ELLIPSIS);
    cut
}

fn domain_of(url: &str) -> String {
    if let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) {
        return host;
    }
    url.split('/').nth(2).unwrap_or(url).to_string()
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub base_url: String,
    pub safesearch: String,
    pub categories: String,
    pub timeout: Duration,
}

impl SearchSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            safesearch: "1".to_string(),
            categories: "general".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Client for the general web-search backend used when no responder matches.
#[derive(Debug, Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    base: String,
    safesearch: String,
    categories: String,
}

impl SearchClient {
    pub fn new(settings: SearchSettings) -> Result<Self, SearchError> {
        let base = settings.base_url.trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Ok(origin) = HeaderValue::from_str(&base) {
            headers.insert(ORIGIN, origin);
        }
        if let Ok(referer) = HeaderValue::from_str(&format!("{base}/")) {
            headers.insert(REFERER, referer);
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(settings.timeout)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            base,
            safesearch: settings.safesearch,
            categories: settings.categories,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Runs the query against the backend. Never fails: transport and
    /// protocol problems come back as a failed outcome.
    pub async fn search(&self, query: &str) -> SearchOutcome {
        match self.fetch(query).await {
            Ok(payload) => {
                let outcome = SearchOutcome::from_payload(query, payload);
                debug!(query, total = outcome.total_results, "fallback search finished");
                outcome
            }
            Err(err) => {
                warn!(query, %err, "fallback search failed");
                SearchOutcome::failure(query, err.to_string())
            }
        }
    }

    async fn fetch(&self, query: &str) -> Result<SearchPayload, SearchError> {
        let endpoint = format!("{}/search", self.base);
        let fields = [
            ("q", query),
            ("format", "json"),
            ("safesearch", self.safesearch.as_str()),
            ("categories", self.categories.as_str()),
        ];

        let mut response = self.http.post(&endpoint).form(&fields).send().await?;
        if response.status() == StatusCode::FORBIDDEN {
            debug!("search backend rejected POST, retrying with GET");
            response = self.http.get(&endpoint).query(&fields).send().await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status));
        }
        response
            .json::<SearchPayload>()
            .await
            .map_err(SearchError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn payload(value: serde_json::Value) -> SearchPayload {
        serde_json::from_value(value).unwrap()
    }

    fn client(base: &str) -> SearchClient {
        SearchClient::new(SearchSettings::new(base)).unwrap()
    }

    fn form_fields(query: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), query.into()),
            Matcher::UrlEncoded("format".into(), "json".into()),
            Matcher::UrlEncoded("safesearch".into(), "1".into()),
            Matcher::UrlEncoded("categories".into(), "general".into()),
        ])
    }

    fn body(count: usize) -> String {
        let results: Vec<_> = (1..=count)
            .map(|i| {
                json!({
                    "title": format!("Result {i}"),
                    "url": format!("https://site{i}.example.org/page"),
                    "content": "snippet",
                    "engine": if i % 2 == 0 { "duckduckgo" } else { "brave" },
                })
            })
            .collect();
        json!({ "results": results }).to_string()
    }

    #[test]
    fn keeps_ten_hits_but_counts_all() {
        let outcome = SearchOutcome::from_payload("rust", payload(serde_json::from_str(&body(15)).unwrap()));
        assert!(outcome.success);
        assert_eq!(outcome.total_results, 15);
        assert_eq!(outcome.results.len(), 10);
        let positions: Vec<usize> = outcome.results.iter().map(|hit| hit.position).collect();
        assert_eq!(positions, (1..=10).collect::<Vec<_>>());
        assert_eq!(outcome.engines, vec!["brave", "duckduckgo"]);
        assert_eq!(outcome.results[0].domain, "site1.example.org");
    }

    #[test]
    fn long_content_is_cut_with_ellipsis() {
        let long = "x".repeat(250);
        let outcome = SearchOutcome::from_payload(
            "q",
            payload(json!({ "results": [{ "content": long }, { "content": "y".repeat(200) }] })),
        );
        assert_eq!(outcome.results[0].content, format!("{}...", "x".repeat(200)));
        assert_eq!(outcome.results[1].content, "y".repeat(200));
    }

    #[test]
    fn truncation_counts_characters() {
        let outcome =
            SearchOutcome::from_payload("q", payload(json!({ "results": [{ "content": "ä".repeat(201) }] })));
        assert_eq!(outcome.results[0].content.chars().count(), 203);
    }

    #[test]
    fn missing_fields_get_defaults() {
        let outcome = SearchOutcome::from_payload("q", payload(json!({ "results": [{}] })));
        let hit = &outcome.results[0];
        assert_eq!(hit.title, "No Title");
        assert_eq!(hit.url, "#");
        assert_eq!(hit.domain, "#");
        assert_eq!(hit.content, "");
        assert_eq!(hit.engine, "unknown");
        assert!(outcome.engines.is_empty());
    }

    #[test]
    fn pretty_url_stands_in_for_content() {
        let outcome = SearchOutcome::from_payload(
            "q",
            payload(json!({ "results": [{ "pretty_url": "example.org › docs", "url": "http://example.org:8080/docs" }] })),
        );
        assert_eq!(outcome.results[0].content, "example.org › docs");
        assert_eq!(outcome.results[0].domain, "example.org");
    }

    #[test]
    fn payload_without_results_is_empty_success() {
        let outcome = SearchOutcome::from_payload("q", payload(json!({ "query": "q" })));
        assert!(outcome.success);
        assert_eq!(outcome.total_results, 0);
    }

    #[tokio::test]
    async fn posts_form_fields() {
        let mut server = Server::new_async().await;
        let post = server
            .mock("POST", "/search")
            .match_body(form_fields("rust lang"))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body(3))
            .create_async()
            .await;

        let outcome = client(&server.url()).search("rust lang").await;
        post.assert_async().await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(outcome.total_results, 3);
        assert_eq!(outcome.query, "rust lang");
    }

    #[tokio::test]
    async fn forbidden_post_retries_with_get() {
        let mut server = Server::new_async().await;
        let post = server
            .mock("POST", "/search")
            .with_status(403)
            .create_async()
            .await;
        let get = server
            .mock("GET", "/search")
            .match_query(form_fields("rust"))
            .with_status(200)
            .with_body(body(12))
            .create_async()
            .await;

        let outcome = client(&format!("{}/", server.url())).search("rust").await;
        post.assert_async().await;
        get.assert_async().await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(outcome.results.len(), 10);
        assert_eq!(outcome.total_results, 12);
    }

    #[tokio::test]
    async fn server_error_becomes_failure_outcome() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/search")
            .with_status(500)
            .create_async()
            .await;

        let outcome = client(&server.url()).search("rust").await;
        assert!(!outcome.success);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.total_results, 0);
        assert!(outcome.error.unwrap().contains("500"));
    }

    #[tokio::test]
    async fn redirects_are_not_followed() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/search")
            .with_status(302)
            .with_header("location", "/login")
            .create_async()
            .await;
        let login = server.mock("GET", "/login").expect(0).create_async().await;

        let outcome = client(&server.url()).search("rust").await;
        login.assert_async().await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn garbage_body_becomes_failure_outcome() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/search")
            .with_status(200)
            .with_body("<html>captcha</html>")
            .create_async()
            .await;

        let outcome = client(&server.url()).search("rust").await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().starts_with("Invalid response"));
    }

    #[tokio::test]
    async fn unreachable_backend_becomes_failure_outcome() {
        let outcome = client("http://127.0.0.1:9").search("rust").await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().starts_with("Connection error"));
    }
}
