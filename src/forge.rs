//! Forge API client - paginated enumeration of accessible repositories
//!
//! Talks to a GitHub-compatible REST API: repositories are listed page by
//! page until an empty page is returned. Rate-limit responses are retried
//! with capped exponential backoff instead of failing the whole pass.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;

/// One remote repository as reported by the forge listing endpoint.
///
/// Created fresh on every enumeration pass and never persisted.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RepoDescriptor {
    /// Globally unique "owner/name" identifier
    pub full_name: String,

    /// HTTPS clone URL
    pub clone_url: String,

    /// Default branch name, when the forge reports one
    #[serde(default)]
    pub default_branch: Option<String>,
}

impl RepoDescriptor {
    pub fn new(full_name: &str, clone_url: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            clone_url: clone_url.to_string(),
            default_branch: None,
        }
    }
}

/// A non-2xx answer from the forge API. Fatal to the current pass.
#[derive(Debug)]
pub struct ForgeApiError {
    pub status: StatusCode,
    pub body: String,
}

impl fmt::Display for ForgeApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "forge API error: HTTP {} - {}", self.status, self.body)
    }
}

impl std::error::Error for ForgeApiError {}

/// Source of repository descriptors
///
/// Production uses the HTTP [`ForgeClient`]; tests substitute fixtures.
#[async_trait]
pub trait RepoSource: Send + Sync {
    /// Enumerate every repository the configured credential can access
    async fn list_repositories(&self) -> Result<Vec<RepoDescriptor>>;
}

/// HTTP client for the forge listing endpoint
pub struct ForgeClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    page_size: usize,
    request_delay: Duration,
    max_retries: u32,
}

impl ForgeClient {
    /// Create a client from the given configuration
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("forgemirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_base: config.forge.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            page_size: config.forge.page_size,
            request_delay: config.request_delay(),
            max_retries: config.forge.max_retries,
        })
    }

    async fn fetch_page(&self, page: usize) -> Result<Response> {
        let url = format!(
            "{}/user/repos?page={}&per_page={}&affiliation=owner,collaborator,organization_member",
            self.api_base, page, self.page_size
        );

        debug!("Requesting repository listing page {}", page);

        self.http
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/vnd.github.v3+json")
            .send()
            .await
            .with_context(|| format!("Failed to fetch repository listing page {}", page))
    }
}

#[async_trait]
impl RepoSource for ForgeClient {
    async fn list_repositories(&self) -> Result<Vec<RepoDescriptor>> {
        let mut repositories = Vec::new();
        let mut page = 1usize;
        let mut retries = 0u32;

        loop {
            let response = self.fetch_page(page).await?;
            let status = response.status();

            if is_rate_limited(&response) {
                retries += 1;
                if retries > self.max_retries {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ForgeApiError { status, body }).with_context(|| {
                        format!("Rate limit persisted after {} retries", self.max_retries)
                    });
                }

                let delay = backoff_delay(retries, retry_after(&response));
                warn!(
                    "Rate limited on page {} (HTTP {}), backing off for {:?} (retry {}/{})",
                    page, status, delay, retries, self.max_retries
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ForgeApiError { status, body })
                    .with_context(|| format!("Repository listing failed on page {}", page));
            }

            let page_repos: Vec<RepoDescriptor> = response
                .json()
                .await
                .with_context(|| format!("Failed to decode repository listing page {}", page))?;

            // An empty page terminates enumeration successfully
            if page_repos.is_empty() {
                debug!("Page {} is empty, enumeration complete", page);
                break;
            }

            repositories.extend(page_repos);
            debug!("{} repositories enumerated so far", repositories.len());

            page += 1;
            retries = 0;

            if !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
        }

        info!("Enumerated {} repositories", repositories.len());
        Ok(repositories)
    }
}

/// Rate-limit detection: explicit 429, or the GitHub-style 403 with an
/// exhausted quota header.
fn is_rate_limited(response: &Response) -> bool {
    if response.status() == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }

    response.status() == StatusCode::FORBIDDEN
        && response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "0")
            .unwrap_or(false)
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Exponential backoff: 1s, 2s, 4s, ... capped at 60s. A server-provided
/// retry-after hint wins when present.
fn backoff_delay(retry: u32, server_hint: Option<Duration>) -> Duration {
    if let Some(hint) = server_hint {
        return hint.min(Duration::from_secs(60));
    }

    let exp = retry.saturating_sub(1).min(6);
    Duration::from_secs(1 << exp).min(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo_page(count: usize, offset: usize) -> serde_json::Value {
        let repos: Vec<_> = (0..count)
            .map(|i| {
                json!({
                    "full_name": format!("owner/repo-{}", offset + i),
                    "clone_url": format!("https://forge.test/owner/repo-{}.git", offset + i),
                    "default_branch": "main",
                })
            })
            .collect();
        json!(repos)
    }

    fn test_client(api_base: &str) -> ForgeClient {
        let mut config = Config::default();
        config.forge.api_base = api_base.to_string();
        config.forge.request_delay_ms = 0;
        config.token = "test-token".to_string();
        ForgeClient::new(&config).expect("Failed to build client")
    }

    #[tokio::test]
    async fn test_pagination_stops_after_short_page() {
        let server = MockServer::start().await;

        for (page, count, offset) in [(1, 100, 0), (2, 100, 100), (3, 37, 200)] {
            Mock::given(method("GET"))
                .and(path("/user/repos"))
                .and(query_param("page", page.to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_json(repo_page(count, offset)))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let repos = client.list_repositories().await.expect("listing failed");

        assert_eq!(repos.len(), 237);
        assert_eq!(repos[0].full_name, "owner/repo-0");
        assert_eq!(repos[236].full_name, "owner/repo-236");
        assert_eq!(repos[0].default_branch.as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn test_empty_first_page_is_success() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let repos = client.list_repositories().await.expect("listing failed");
        assert!(repos.is_empty());
    }

    #[tokio::test]
    async fn test_non_success_aborts_enumeration() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.list_repositories().await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("500"), "unexpected error: {}", message);
        assert!(message.contains("boom"), "unexpected error: {}", message);
    }

    #[tokio::test]
    async fn test_rate_limit_backs_off_then_succeeds() {
        let server = MockServer::start().await;

        // First request is throttled, the retry goes through
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(repo_page(2, 0)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let repos = client.list_repositories().await.expect("listing failed");
        assert_eq!(repos.len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up_after_max_retries() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.forge.api_base = server.uri();
        config.forge.request_delay_ms = 0;
        config.forge.max_retries = 2;
        config.token = "test-token".to_string();
        let client = ForgeClient::new(&config).unwrap();

        let err = client.list_repositories().await.unwrap_err();
        assert!(format!("{:#}", err).contains("Rate limit persisted"));
    }

    #[tokio::test]
    async fn test_token_sent_as_bearer_header() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client.list_repositories().await.expect("listing failed");
    }

    #[test]
    fn test_backoff_delay_progression() {
        assert_eq!(backoff_delay(1, None), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, None), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, None), Duration::from_secs(4));
        // Capped at 60s no matter how many retries
        assert_eq!(backoff_delay(20, None), Duration::from_secs(60));
        // Server hint wins, but is also capped
        assert_eq!(
            backoff_delay(1, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert_eq!(
            backoff_delay(1, Some(Duration::from_secs(600))),
            Duration::from_secs(60)
        );
    }
}
