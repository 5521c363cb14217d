//! API client for communicating with the probe server

use anyhow::{Context, Result};
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Headroom on top of the capture duration for fetching and rendering every kind
const CAPTURE_HEADROOM: Duration = Duration::from_secs(90);

/// API client for the probe server
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        // A base without a trailing slash would lose its last path segment on join
        let mut base_url = Url::parse(base_url).context("Invalid API URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    fn request(&self, path: &str, query: &[(&str, String)]) -> Result<RequestBuilder> {
        let url = self.base_url.join(path).context("Invalid path")?;
        Ok(self.client.get(url).query(query).timeout(DEFAULT_TIMEOUT))
    }

    /// GET an enveloped endpoint and return its `data`
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        Self::send_enveloped(self.request(path, query)?).await
    }

    /// Trigger a capture; the timeout grows with the CPU capture duration
    pub async fn capture(
        &self,
        query: &[(&str, String)],
        seconds: u32,
    ) -> Result<Vec<ArtifactDescriptor>> {
        let timeout = Duration::from_secs(u64::from(seconds)) + CAPTURE_HEADROOM;
        let request = self.request("api/v1/capture", query)?.timeout(timeout);
        Self::send_enveloped(request).await
    }

    /// Fetch a raw body, such as a rendered SVG
    ///
    /// The server answers failed lookups with a JSON envelope rather than
    /// an error status, so a JSON content type is treated as failure.
    pub async fn get_bytes(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<u8>> {
        let response = self
            .request(path, query)?
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if is_json {
            let envelope: Envelope<serde_json::Value> =
                response.json().await.context("Failed to parse response")?;
            anyhow::bail!("API error: {}", envelope.msg);
        }

        let bytes = response.bytes().await.context("Failed to read response")?;
        Ok(bytes.to_vec())
    }

    async fn send_enveloped<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = request.send().await.context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        let envelope: Envelope<T> = response.json().await.context("Failed to parse response")?;
        envelope.into_data()
    }
}

// API response types

/// `{code, msg, data}` wrapper around every business response
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: i32,
    pub msg: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn into_data(self) -> Result<T> {
        if self.code != 0 {
            anyhow::bail!("API error: {}", self.msg);
        }
        self.data.context("API response carried no data")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    pub sample_kind: String,
    pub render_kind: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCapture {
    pub key: String,
    pub subject_name: String,
    pub ctime: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_get_unwraps_envelope() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/captures")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("clusterName".into(), "prod".into()),
                Matcher::UrlEncoded("namespace".into(), "default".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"code":0,"msg":"success","data":[{"key":"prod/default/api-0_1700000000000","subjectName":"api-0","ctime":1700000000}]}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let entries: Vec<StoredCapture> = client
            .get(
                "api/v1/captures",
                &[
                    ("clusterName", "prod".to_string()),
                    ("namespace", "default".to_string()),
                ],
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].subject_name, "api-0");
        assert_eq!(entries[0].ctime, 1_700_000_000);
    }

    #[tokio::test]
    async fn test_error_envelope_becomes_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/capture")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":1,"msg":"invalid token","data":null}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .capture(&[("mode", "pod".to_string())], 0)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("invalid token"));
    }

    #[tokio::test]
    async fn test_base_path_is_kept() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/probe/api/v1/graph")
            .match_query(Matcher::Any)
            .with_header("content-type", "image/svg+xml")
            .with_body("<svg/>")
            .create_async()
            .await;

        let client = ApiClient::new(&format!("{}/probe", server.url())).unwrap();
        let body = client
            .get_bytes("api/v1/graph", &[("kind", "heap".to_string())])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(body, b"<svg/>");
    }

    #[tokio::test]
    async fn test_graph_lookup_failure_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/graph")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":1,"msg":"graph lookup failed: not found","data":null}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.get_bytes("api/v1/graph", &[]).await.unwrap_err();

        assert!(err.to_string().contains("graph lookup failed"));
    }
}
