use anyhow::{Context, Result};
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

/// Client for the lifecycle endpoints of a private gem source.
///
/// `base_url` is the source itself, prefix included
/// (e.g. `http://127.0.0.1:9292/private`).
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    key: String,
}

impl ApiClient {
    pub fn new(base_url: &str, key: &str) -> Result<Self> {
        // Without the trailing slash, joining would replace the prefix.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).context("invalid server URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            key: key.to_string(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    /// Gem clients send the raw key as the whole header value.
    async fn send_text(&self, req: reqwest::RequestBuilder) -> Result<String> {
        let response = req.header(AUTHORIZATION, &self.key).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(body)
    }

    /// Push a `.gem` archive. Returns the server's confirmation message.
    pub async fn push(&self, gem: Vec<u8>) -> Result<String> {
        let url = self.url("api/v1/gems")?;
        self.send_text(
            self.http
                .post(url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(gem),
        )
        .await
    }

    pub async fn yank(&self, req: &YankRequest) -> Result<String> {
        let url = self.url("api/v1/gems/yank")?;
        self.send_text(self.http.delete(url).form(&req.form())).await
    }

    pub async fn unyank(&self, req: &YankRequest) -> Result<String> {
        let url = self.url("api/v1/gems/unyank")?;
        self.send_text(self.http.put(url).form(&req.form())).await
    }
}

/// The version addressed by a yank or unyank.
#[derive(Debug, Clone)]
pub struct YankRequest {
    pub gem_name: String,
    pub version: String,
    pub platform: Option<String>,
}

impl YankRequest {
    fn form(&self) -> Vec<(&'static str, &str)> {
        let mut form = vec![
            ("gem_name", self.gem_name.as_str()),
            ("version", self.version.as_str()),
        ];
        if let Some(platform) = &self.platform {
            form.push(("platform", platform.as_str()));
        }
        form
    }
}
