// src/catalog/client.rs

//! Forge catalog client
//!
//! Implements `CatalogApi` over HTTP. Every call is routed through the
//! gateway, which owns throttling and retry; this module only builds requests
//! and classifies responses into `RequestOutcome`s.

use crate::catalog::api::{
    ApiEnvelope, CatalogApi, CatalogEntry, DependencyListing, DependencyQuery, SptVersionInfo,
    UpdateQuery, UpdateReport,
};
use crate::catalog::gateway::{Gateway, GatewayConfig, RequestOutcome};
use crate::error::{Error, Result};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default catalog endpoint
pub const DEFAULT_BASE_URL: &str = "https://forge.sp-tarkov.com/api/v1";

/// Machine-readable failure codes the catalog embeds in envelopes
const CODE_NO_COMPATIBLE_VERSION: &str = "no_compatible_version";
const CODE_INVALID_SPT_VERSION: &str = "invalid_spt_version";

#[derive(Debug, Deserialize)]
struct AuthCheck {
    #[serde(default, rename = "hasReadScope")]
    has_read_scope: bool,
}

/// Envelope variant carrying a failure code alongside the payload
///
/// Fields stay bare `Option`s so the payload type needs no `Default`.
#[derive(Debug, Deserialize)]
struct CodedEnvelope<T> {
    success: Option<bool>,
    data: Option<T>,
    code: Option<String>,
}

/// HTTP implementation of the catalog surface
pub struct ForgeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    gateway: Gateway,
}

impl ForgeClient {
    /// Create a client for one catalog endpoint
    ///
    /// Only one `ForgeClient` (and thus one gateway) should exist per
    /// endpoint; the backoff coordination in the gateway depends on it.
    pub fn new(base_url: &str, api_key: &str, cancel: CancellationToken) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Init(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            gateway: Gateway::new(GatewayConfig::default(), cancel),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Classify an HTTP response before decoding its body
    ///
    /// Statuses that will never improve on retry come back as `Failed`;
    /// 429 and transport errors are the gateway's to retry.
    async fn classify<T, F>(response: Response, decode: F) -> RequestOutcome<T>
    where
        F: FnOnce(serde_json::Value) -> RequestOutcome<T>,
    {
        let status = response.status();
        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                RequestOutcome::RateLimited { retry_after }
            }
            StatusCode::UNAUTHORIZED => RequestOutcome::Failed(Error::InvalidApiKey {
                should_delete_key: true,
            }),
            StatusCode::FORBIDDEN => RequestOutcome::Failed(Error::InvalidApiKey {
                should_delete_key: false,
            }),
            StatusCode::NOT_FOUND => RequestOutcome::Failed(Error::NotFound),
            StatusCode::BAD_REQUEST => RequestOutcome::Failed(Error::InvalidInput(format!(
                "Catalog rejected the request (HTTP {})",
                status.as_u16()
            ))),
            s if !s.is_success() => {
                RequestOutcome::Failed(Error::api_status("Unexpected catalog response", s.as_u16()))
            }
            _ => match response.json::<serde_json::Value>().await {
                Ok(body) => decode(body),
                Err(e) => RequestOutcome::Transport(format!("Failed to decode response: {}", e)),
            },
        }
    }

    /// GET a JSON envelope through the gateway
    async fn get_envelope<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let url = self.endpoint(path);
        debug!("GET {}", url);
        self.gateway
            .execute(|| async {
                let request = self
                    .http
                    .get(&url)
                    .bearer_auth(&self.api_key)
                    .query(query)
                    .send();
                match request.await {
                    Ok(response) => {
                        Self::classify(response, |body| {
                            match serde_json::from_value::<ApiEnvelope<T>>(body) {
                                Ok(envelope) => RequestOutcome::Success(envelope.into_data()),
                                Err(e) => RequestOutcome::Transport(format!(
                                    "Malformed envelope: {}",
                                    e
                                )),
                            }
                        })
                        .await
                    }
                    Err(e) => RequestOutcome::Transport(e.to_string()),
                }
            })
            .await
    }

    /// POST a JSON body, expecting a JSON envelope back
    async fn post_envelope<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Option<T>> {
        let url = self.endpoint(path);
        debug!("POST {}", url);
        self.gateway
            .execute(|| async {
                let request = self
                    .http
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&body)
                    .send();
                match request.await {
                    Ok(response) => {
                        Self::classify(response, |body| {
                            match serde_json::from_value::<ApiEnvelope<T>>(body) {
                                Ok(envelope) => RequestOutcome::Success(envelope.into_data()),
                                Err(e) => RequestOutcome::Transport(format!(
                                    "Malformed envelope: {}",
                                    e
                                )),
                            }
                        })
                        .await
                    }
                    Err(e) => RequestOutcome::Transport(e.to_string()),
                }
            })
            .await
    }
}

impl CatalogApi for ForgeClient {
    async fn check_auth(&self) -> Result<bool> {
        let data: Option<AuthCheck> = self.get_envelope("auth/check", &[]).await?;
        Ok(data.map(|a| a.has_read_scope).unwrap_or(false))
    }

    async fn list_versions(&self, filter: Option<&str>) -> Result<Vec<SptVersionInfo>> {
        let mut query = Vec::new();
        if let Some(filter) = filter {
            query.push(("filter", filter.to_string()));
        }
        let data: Option<Vec<SptVersionInfo>> = self.get_envelope("spt/versions", &query).await?;
        Ok(data.unwrap_or_default())
    }

    async fn search(&self, query: &str, spt_version: &str) -> Result<Vec<CatalogEntry>> {
        let params = [
            ("query", query.to_string()),
            ("spt_version", spt_version.to_string()),
        ];
        let data: Option<Vec<CatalogEntry>> = self.get_envelope("mods/search", &params).await?;
        Ok(data.unwrap_or_default())
    }

    async fn get_by_guid(&self, guid: &str, spt_version: &str) -> Result<CatalogEntry> {
        if guid.is_empty() {
            return Err(Error::InvalidInput("empty GUID".to_string()));
        }
        let url = self.endpoint(&format!("mods/guid/{}", guid));
        let params = [("spt_version", spt_version.to_string())];
        debug!("GET {}", url);
        let spt = spt_version.to_string();
        self.gateway
            .execute(|| {
                let url = url.clone();
                let params = params.clone();
                let spt = spt.clone();
                async move {
                    let request = self
                        .http
                        .get(&url)
                        .bearer_auth(&self.api_key)
                        .query(&params)
                        .send();
                    match request.await {
                        Ok(response) => {
                            Self::classify(response, move |body| {
                                match serde_json::from_value::<CodedEnvelope<CatalogEntry>>(body) {
                                    Ok(envelope) => match envelope {
                                        CodedEnvelope {
                                            data: Some(entry),
                                            success,
                                            ..
                                        } if success != Some(false) => {
                                            RequestOutcome::Success(entry)
                                        }
                                        CodedEnvelope { code: Some(code), .. }
                                            if code == CODE_NO_COMPATIBLE_VERSION =>
                                        {
                                            RequestOutcome::Failed(Error::NoCompatibleVersion(spt))
                                        }
                                        CodedEnvelope { code: Some(code), .. }
                                            if code == CODE_INVALID_SPT_VERSION =>
                                        {
                                            RequestOutcome::Failed(Error::InvalidSptVersion(spt))
                                        }
                                        _ => RequestOutcome::Failed(Error::NotFound),
                                    },
                                    Err(e) => RequestOutcome::Transport(format!(
                                        "Malformed envelope: {}",
                                        e
                                    )),
                                }
                            })
                            .await
                        }
                        Err(e) => RequestOutcome::Transport(e.to_string()),
                    }
                }
            })
            .await
    }

    async fn batch_updates(
        &self,
        queries: &[UpdateQuery],
        spt_version: &str,
    ) -> Result<UpdateReport> {
        if queries.is_empty() {
            return Ok(UpdateReport::default());
        }
        let body = json!({ "mods": queries, "sptVersion": spt_version });
        let data: Option<UpdateReport> = self.post_envelope("mods/updates", body).await?;
        Ok(data.unwrap_or_default())
    }

    async fn batch_dependencies(
        &self,
        queries: &[DependencyQuery],
    ) -> Result<Vec<DependencyListing>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({ "mods": queries });
        let data: Option<Vec<DependencyListing>> =
            self.post_envelope("mods/dependencies", body).await?;
        Ok(data.unwrap_or_default())
    }
}
