use super::types::{GitHubComment, GitHubPull, GitHubPullFile};
use super::{PullRequestSource, FILES_PER_PAGE};
use crate::config::SourceConfig;
use crate::error::{PrStatError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

const USER_AGENT: &str = concat!("prstat/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    base_api: String,
    token: Option<String>,
    owner: String,
    repo: String,
}

impl GitHubClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;

        debug!(base_api = %config.api_url, owner = %config.owner, repo = %config.repo, "creating GitHub client");

        Ok(Self {
            http,
            base_api: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
        })
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.base_api, self.owner, self.repo, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        debug!(%url, ?query, "GET");

        let mut request = self
            .http
            .get(url)
            .query(query)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PrStatError::Api {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.json().await?)
    }

    /// Follows `page` until a short page comes back.
    async fn get_all_pages<T: DeserializeOwned>(&self, url: &str, per_page: u32) -> Result<Vec<T>> {
        let mut page = 1u32;
        let mut items = Vec::new();
        loop {
            let batch: Vec<T> = self
                .get_json(url, &[("per_page", per_page.to_string()), ("page", page.to_string())])
                .await?;
            let len = batch.len();
            items.extend(batch);
            if len < per_page as usize {
                break;
            }
            page += 1;
        }
        Ok(items)
    }
}

#[async_trait]
impl PullRequestSource for GitHubClient {
    async fn list_closed(&self, page: u32, per_page: u32) -> Result<Vec<GitHubPull>> {
        let url = self.repo_url("pulls");
        self.get_json(
            &url,
            &[
                ("state", "closed".to_string()),
                ("sort", "updated".to_string()),
                ("direction", "desc".to_string()),
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
            ],
        )
        .await
    }

    async fn get_pull(&self, number: u64) -> Result<GitHubPull> {
        let url = self.repo_url(&format!("pulls/{number}"));
        self.get_json(&url, &[]).await
    }

    async fn list_files(&self, number: u64) -> Result<Vec<GitHubPullFile>> {
        let url = self.repo_url(&format!("pulls/{number}/files"));
        self.get_all_pages(&url, FILES_PER_PAGE).await
    }

    async fn list_comments(&self, number: u64) -> Result<Vec<GitHubComment>> {
        let url = self.repo_url(&format!("issues/{number}/comments"));
        self.get_all_pages(&url, FILES_PER_PAGE).await
    }
}
