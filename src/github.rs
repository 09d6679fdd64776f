//! GitHub profile fetching.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, RoastError};

const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";

/// Repositories included in the roast prompt, newest activity first.
const TOP_REPO_COUNT: u8 = 5;

/// A repository summary as embedded in the roast prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoSummary {
    pub name: String,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub language: Option<String>,
}

/// Everything the generator gets to see about a user.
///
/// Serialized to camelCase JSON inside the user prompt, so field names are
/// part of the generator-facing contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub username: String,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub followers: u64,
    pub following: u64,
    pub public_repos: u64,
    pub account_created_at: String,
    pub company: Option<String>,
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub top_repos: Vec<RepoSummary>,
}

/// Source of GitHub profile data. Implemented by [`GitHubClient`]; tests
/// substitute counting fakes.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Fetch the user document plus their most recently updated repos.
    async fn fetch_profile(&self, username: &str) -> Result<Profile>;

    /// Fetch just the avatar URL, if the user has one.
    async fn fetch_avatar(&self, username: &str) -> Result<Option<String>>;
}

// ── REST API response shapes ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
    name: Option<String>,
    bio: Option<String>,
    followers: u64,
    following: u64,
    public_repos: u64,
    created_at: String,
    company: Option<String>,
    location: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiRepo {
    name: String,
    description: Option<String>,
    stargazers_count: u64,
    forks_count: u64,
    language: Option<String>,
}

/// Thin reqwest wrapper for the GitHub REST API.
pub struct GitHubClient {
    client: Client,
    base_url: String,
}

impl GitHubClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_GITHUB_API_BASE)
    }

    /// Point the client at a different base URL (tests use a mock server).
    pub fn with_base_url(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn user_url(&self, username: &str) -> String {
        format!("{}/users/{}", self.base_url, username)
    }

    fn repos_url(&self, username: &str) -> String {
        format!(
            "{}/users/{}/repos?sort=updated&per_page={}",
            self.base_url, username, TOP_REPO_COUNT
        )
    }

    async fn get_user(&self, username: &str) -> Result<ApiUser> {
        let response = self
            .client
            .get(self.user_url(username))
            .header("User-Agent", "gitroast")
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RoastError::UserNotFound(username.to_string()));
        }
        if !response.status().is_success() {
            return Err(RoastError::Upstream(format!(
                "github user lookup returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileSource for GitHubClient {
    async fn fetch_profile(&self, username: &str) -> Result<Profile> {
        debug!(username, "fetching github profile");
        let user = self.get_user(username).await?;

        let response = self
            .client
            .get(self.repos_url(username))
            .header("User-Agent", "gitroast")
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await?;

        // A user with no listable repos still gets roasted on the profile
        // alone; only treat hard failures as fatal.
        let repos: Vec<ApiRepo> = if response.status().is_success() {
            response.json().await?
        } else {
            warn!(
                username,
                status = %response.status(),
                "repo listing failed, roasting the profile alone"
            );
            Vec::new()
        };

        Ok(Profile {
            username: user.login,
            name: user.name,
            bio: user.bio,
            followers: user.followers,
            following: user.following,
            public_repos: user.public_repos,
            account_created_at: user.created_at,
            company: user.company,
            location: user.location,
            avatar_url: user.avatar_url,
            top_repos: repos
                .into_iter()
                .map(|r| RepoSummary {
                    name: r.name,
                    description: r.description,
                    stars: r.stargazers_count,
                    forks: r.forks_count,
                    language: r.language,
                })
                .collect(),
        })
    }

    async fn fetch_avatar(&self, username: &str) -> Result<Option<String>> {
        let user = self.get_user(username).await?;
        Ok(user.avatar_url)
    }
}
