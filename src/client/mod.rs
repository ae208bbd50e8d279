use anyhow::{bail, Context, Result};
use reqwest::{header, Client, StatusCode};

use crate::{
    config::Config,
    execution::CanonicalResponse,
    server::{ResetResponse, SESSION_COOKIE},
};

pub struct NbexecClient {
    client: Client,
    base: String,
    session: Option<String>,
}

impl NbexecClient {
    pub fn from_config(cfg: &Config, base: Option<&str>, session: Option<String>) -> Result<Self> {
        let base = base.map(str::to_string).unwrap_or_else(|| cfg.server_url());
        let client = Client::builder().timeout(cfg.request_timeout()).build()?;
        Ok(Self { client, base, session })
    }

    /// Session id in use, either given up front or issued by the server.
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.trim_end_matches('/'), path)
    }

    fn with_cookie(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.session {
            Some(id) => req.header(header::COOKIE, format!("{SESSION_COOKIE}={id}")),
            None => req,
        }
    }

    pub async fn execute(&mut self, code: &str) -> Result<CanonicalResponse> {
        let req = self
            .client
            .post(self.url("/api/execute-code"))
            .json(&serde_json::json!({ "code": code }));
        let resp = self
            .with_cookie(req)
            .send()
            .await
            .with_context(|| format!("posting to {}", self.base))?;

        if let Some(id) = issued_session(resp.headers()) {
            self.session = Some(id);
        }

        match resp.status() {
            StatusCode::OK | StatusCode::BAD_REQUEST | StatusCode::INTERNAL_SERVER_ERROR => {
                Ok(resp.json::<CanonicalResponse>().await?)
            }
            status => {
                let text = resp.text().await.unwrap_or_default();
                bail!("execute-code failed: {} - {}", status, text)
            }
        }
    }

    pub async fn reset(&self) -> Result<ResetResponse> {
        let req = self.client.post(self.url("/api/reset-session"));
        let resp = self.with_cookie(req).send().await?;
        match resp.status() {
            StatusCode::OK => Ok(resp.json::<ResetResponse>().await?),
            status => {
                let text = resp.text().await.unwrap_or_default();
                bail!("reset-session failed: {} - {}", status, text)
            }
        }
    }
}

fn issued_session(headers: &header::HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| raw.split(';').next())
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}
