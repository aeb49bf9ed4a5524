//! Remote plugin repository client.
//!
//! Queries an ordered list of repository base URLs for discoverable plugins.
//! Every repository answers the conventional endpoints:
//!
//! - `GET {base}/search?q=&category=&limit=`
//! - `GET {base}/categories`
//! - `GET {base}/featured`
//! - `GET {base}/plugin/{id}`
//!
//! A repository that fails is logged and skipped; the client aggregates what
//! it could fetch. The aggregate result set is ranked once at the end:
//! verified entries first, then higher rating, then higher download count,
//! with ties kept in original order.

use std::cmp::Ordering;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use scribe_core::{PluginError, PluginResult};

/// Request deadline for repository calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ─── RemoteEntry ─────────────────────────────────────────────────────────────

/// One discoverable plugin as advertised by a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    /// Repository-scoped plugin id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Version string.
    pub version: String,
    #[serde(default)]
    pub author: String,
    /// HTTPS bundle download URL.
    pub download_url: String,
    /// Hex SHA-256 the bundle should hash to.
    #[serde(default)]
    pub checksum: String,
    /// Declared bundle size in bytes.
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub license: String,
    /// Catalog permissions the plugin will request at install.
    #[serde(default)]
    pub required_permissions: Vec<String>,
    /// First publication timestamp, repository-formatted.
    #[serde(default)]
    pub published_at: String,
    /// Last update timestamp, repository-formatted.
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub rating: f64,
    /// Set by repositories that have reviewed the publisher.
    #[serde(default)]
    pub verified: bool,
}

// ─── RepositoryClient ────────────────────────────────────────────────────────

/// Client over the configured repository list.
pub struct RepositoryClient {
    repositories: RwLock<Vec<String>>,
    client: reqwest::Client,
}

impl RepositoryClient {
    /// Creates a client seeded with `default_repositories`.
    pub fn new(default_repositories: Vec<String>) -> PluginResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PluginError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            repositories: RwLock::new(
                default_repositories
                    .into_iter()
                    .map(|url| url.trim_end_matches('/').to_string())
                    .collect(),
            ),
            client,
        })
    }

    /// The configured repository base URLs, in query order.
    pub fn repositories(&self) -> Vec<String> {
        self.repositories.read().clone()
    }

    /// Appends a repository. Adding a present URL is a no-op.
    pub fn add_repository(&self, url: impl Into<String>) {
        let url = url.into().trim_end_matches('/').to_string();
        let mut repos = self.repositories.write();
        if !repos.contains(&url) {
            repos.push(url);
        }
    }

    /// Removes a repository. Removing an absent URL is a no-op.
    pub fn remove_repository(&self, url: &str) {
        let url = url.trim_end_matches('/');
        self.repositories.write().retain(|r| r != url);
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    /// Searches the configured repositories in order until `max` results have
    /// been gathered, then ranks the aggregate.
    pub async fn search(
        &self,
        query: &str,
        category: Option<&str>,
        max: usize,
    ) -> Vec<RemoteEntry> {
        let mut aggregate: Vec<RemoteEntry> = Vec::new();
        for base in self.repositories() {
            if aggregate.len() >= max {
                break;
            }
            let mut request = self.client.get(format!("{base}/search")).query(&[
                ("q", query),
                ("limit", &(max - aggregate.len()).to_string()),
            ]);
            if let Some(category) = category {
                request = request.query(&[("category", category)]);
            }
            match fetch_entries(request).await {
                Ok(entries) => {
                    debug!(repository = %base, results = entries.len(), "Search results");
                    aggregate.extend(entries);
                }
                Err(e) => warn!(repository = %base, error = %e, "Repository search failed; skipping"),
            }
        }
        rank(&mut aggregate);
        aggregate.truncate(max);
        aggregate
    }

    /// Union of categories across repositories, deduplicated and sorted.
    pub async fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = Vec::new();
        for base in self.repositories() {
            let request = self.client.get(format!("{base}/categories"));
            match send_json::<Vec<String>>(request).await {
                Ok(mut list) => categories.append(&mut list),
                Err(e) => {
                    warn!(repository = %base, error = %e, "Repository categories failed; skipping")
                }
            }
        }
        categories.sort();
        categories.dedup();
        categories
    }

    /// Featured entries across repositories, ranked, at most `max`.
    pub async fn featured(&self, max: usize) -> Vec<RemoteEntry> {
        let mut aggregate: Vec<RemoteEntry> = Vec::new();
        for base in self.repositories() {
            if aggregate.len() >= max {
                break;
            }
            let request = self.client.get(format!("{base}/featured"));
            match fetch_entries(request).await {
                Ok(entries) => aggregate.extend(entries),
                Err(e) => {
                    warn!(repository = %base, error = %e, "Repository featured failed; skipping")
                }
            }
        }
        rank(&mut aggregate);
        aggregate.truncate(max);
        aggregate
    }

    /// Details for `plugin_id` from the first repository that knows it.
    pub async fn details(&self, plugin_id: &str) -> Option<RemoteEntry> {
        for base in self.repositories() {
            let request = self.client.get(format!("{base}/plugin/{plugin_id}"));
            match send_json::<RemoteEntry>(request).await {
                Ok(entry) => return Some(entry),
                Err(e) => {
                    debug!(repository = %base, plugin = %plugin_id, error = %e, "No details from repository")
                }
            }
        }
        None
    }
}

async fn fetch_entries(request: reqwest::RequestBuilder) -> PluginResult<Vec<RemoteEntry>> {
    send_json::<Vec<RemoteEntry>>(request).await
}

async fn send_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> PluginResult<T> {
    let response = request
        .send()
        .await
        .map_err(|e| PluginError::network(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(PluginError::network(format!("HTTP {}", status.as_u16())));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| PluginError::network(format!("bad response body: {e}")))
}

/// Ranks entries in place: verified first, then rating, then downloads.
/// The sort is stable, so ties keep their original order.
fn rank(entries: &mut [RemoteEntry]) {
    entries.sort_by(|a, b| {
        b.verified
            .cmp(&a.verified)
            .then_with(|| b.rating.partial_cmp(&a.rating).unwrap_or(Ordering::Equal))
            .then_with(|| b.downloads.cmp(&a.downloads))
    });
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(id: &str, verified: bool, rating: f64, downloads: u64) -> RemoteEntry {
        RemoteEntry {
            id: id.into(),
            name: id.into(),
            version: "1.0.0".into(),
            author: String::new(),
            download_url: format!("https://plugins.example.com/{id}.qpk"),
            checksum: String::new(),
            size: 0,
            category: String::new(),
            tags: vec![],
            license: String::new(),
            required_permissions: vec![],
            published_at: String::new(),
            updated_at: String::new(),
            downloads,
            rating,
            verified,
        }
    }

    #[test]
    fn ranking_prefers_verified_then_rating_then_downloads() {
        let mut entries = vec![
            entry("unverified-high", false, 5.0, 1000),
            entry("verified-low", true, 2.0, 10),
            entry("verified-high", true, 4.5, 10),
            entry("verified-popular", true, 4.5, 500),
        ];
        rank(&mut entries);
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "verified-popular",
                "verified-high",
                "verified-low",
                "unverified-high"
            ]
        );
    }

    #[test]
    fn ranking_ties_keep_original_order() {
        let mut entries = vec![
            entry("first", false, 3.0, 10),
            entry("second", false, 3.0, 10),
        ];
        rank(&mut entries);
        assert_eq!(entries[0].id, "first");
        assert_eq!(entries[1].id, "second");
    }

    #[test]
    fn add_and_remove_are_idempotent() {
        let client = RepositoryClient::new(vec!["https://repo.example.com".into()]).unwrap();
        client.add_repository("https://repo.example.com/");
        assert_eq!(client.repositories().len(), 1);

        client.add_repository("https://other.example.com");
        assert_eq!(client.repositories().len(), 2);

        client.remove_repository("https://other.example.com/");
        client.remove_repository("https://other.example.com");
        assert_eq!(client.repositories().len(), 1);
    }

    #[tokio::test]
    async fn search_aggregates_and_skips_failing_repositories() {
        let good = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "logging"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": "audit-log",
                    "name": "Audit Log",
                    "version": "1.2.0",
                    "downloadUrl": "https://plugins.example.com/audit-log.qpk",
                    "verified": true,
                    "rating": 4.0,
                    "downloads": 10
                }
            ])))
            .mount(&good)
            .await;

        let client = RepositoryClient::new(vec![
            "https://unreachable.example.invalid".into(),
            good.uri(),
        ])
        .unwrap();

        let results = client.search("logging", None, 10).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "audit-log");
        assert!(results[0].verified);
    }

    #[tokio::test]
    async fn search_stops_once_max_is_reached() {
        let first = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": "a",
                    "name": "a",
                    "version": "1.0.0",
                    "downloadUrl": "https://plugins.example.com/a.qpk"
                }
            ])))
            .expect(1)
            .mount(&first)
            .await;

        // Never queried: max is already satisfied by the first repository.
        let second = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&second)
            .await;

        let client = RepositoryClient::new(vec![first.uri(), second.uri()]).unwrap();
        let results = client.search("x", None, 1).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn categories_deduplicate_across_repositories() {
        let first = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/categories"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!(["productivity", "sync"])),
            )
            .mount(&first)
            .await;

        let second = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/categories"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!(["sync", "automation"])),
            )
            .mount(&second)
            .await;

        let client = RepositoryClient::new(vec![first.uri(), second.uri()]).unwrap();
        let categories = client.categories().await;
        assert_eq!(categories, vec!["automation", "productivity", "sync"]);
    }

    #[tokio::test]
    async fn details_come_from_first_repository_that_answers() {
        let missing = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plugin/audit-log"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&missing)
            .await;

        let has_it = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plugin/audit-log"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "audit-log",
                "name": "Audit Log",
                "version": "1.2.0",
                "downloadUrl": "https://plugins.example.com/audit-log.qpk"
            })))
            .mount(&has_it)
            .await;

        let client = RepositoryClient::new(vec![missing.uri(), has_it.uri()]).unwrap();
        let entry = client.details("audit-log").await.unwrap();
        assert_eq!(entry.version, "1.2.0");

        let absent = client.details("ghost").await;
        assert!(absent.is_none());
    }
}
