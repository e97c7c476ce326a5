use anyhow::{anyhow, Context};
use reqwest::Method;
use serde_json::Value;
use url::Url;

/// Thin HTTP client for the API envelope `{success, data, error}`.
pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(server: &str) -> anyhow::Result<Self> {
        let base = Url::parse(server).with_context(|| format!("invalid server URL: {}", server))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("invalid server URL: {}", server));
        }
        Ok(Self {
            base,
            http: reqwest::Client::new(),
        })
    }

    pub fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> anyhow::Result<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| anyhow!("server URL cannot carry a path"))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    pub async fn get(&self, segments: &[&str], query: &[(&str, &str)]) -> anyhow::Result<Value> {
        self.send(Method::GET, segments, query).await
    }

    pub async fn post(&self, segments: &[&str], query: &[(&str, &str)]) -> anyhow::Result<Value> {
        self.send(Method::POST, segments, query).await
    }

    async fn send(&self, method: Method, segments: &[&str], query: &[(&str, &str)]) -> anyhow::Result<Value> {
        let url = self.url(segments, query)?;
        tracing::debug!("{} {}", method, url);

        let response = self
            .http
            .request(method, url.clone())
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .with_context(|| format!("{} returned a non-JSON body", url))?;

        unwrap_envelope(status.as_u16(), body)
    }
}

fn unwrap_envelope(status: u16, mut body: Value) -> anyhow::Result<Value> {
    let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);
    if success {
        return Ok(body.get_mut("data").map(Value::take).unwrap_or(Value::Null));
    }
    let message = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("request failed")
        .to_string();
    Err(anyhow!("HTTP {}: {}", status, message))
}
