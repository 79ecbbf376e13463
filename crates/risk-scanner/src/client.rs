use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::AUTHORIZATION;
use serde::Serialize;

use sockwarden_core::config::ApiConfig;
use sockwarden_core::error::SockwardenError;
use sockwarden_core::pkgid::pkgid_parts;

use crate::ndjson::{decode_verdicts, VerdictStream};
use crate::{basic_auth, PackageScanner};

#[derive(Debug, Serialize)]
pub struct ScanRequest {
    pub packages: Vec<ScanPackage>,
}

#[derive(Debug, Serialize)]
pub struct ScanPackage {
    pub eco: &'static str,
    pub pkg: String,
    pub ver: String,
    pub top: bool,
}

impl ScanRequest {
    /// Duplicate ids are collapsed so the response carries one verdict per package.
    pub fn for_pkgids(pkgids: &[String]) -> Self {
        let unique: BTreeSet<&str> = pkgids.iter().map(String::as_str).collect();
        let packages = unique
            .into_iter()
            .map(|pkgid| {
                let parts = pkgid_parts(pkgid);
                ScanPackage {
                    eco: "npm",
                    pkg: parts.name,
                    ver: parts.version,
                    top: true,
                }
            })
            .collect();
        Self { packages }
    }
}

/// Client for the batch scanning endpoint.
#[derive(Debug, Clone)]
pub struct ScanClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ScanClient {
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or(SockwardenError::MissingApiKey)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("sockwarden/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build HTTP client")?;
        Ok(Self::new(http, config.scan_endpoint(), api_key))
    }

    pub fn new(http: reqwest::Client, endpoint: String, api_key: String) -> Self {
        Self {
            http,
            endpoint,
            api_key,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PackageScanner for ScanClient {
    async fn batch_scan(&self, pkgids: &[String]) -> Result<VerdictStream> {
        let request = ScanRequest::for_pkgids(pkgids);
        let expected = request.packages.len();
        tracing::debug!(endpoint = %self.endpoint, packages = expected, "starting batch scan");

        let response = self
            .http
            .post(&self.endpoint)
            .header(AUTHORIZATION, basic_auth(&self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|err| transport_error(&self.endpoint, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SockwardenError::ScanStatus {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let endpoint = self.endpoint.clone();
        let chunks = Box::pin(
            response
                .bytes_stream()
                .map(move |chunk| chunk.map_err(|err| transport_error(&endpoint, err))),
        );
        Ok(decode_verdicts(chunks, Some(expected)))
    }
}

/// DNS and connection failures get connectivity guidance instead of a raw error.
pub(crate) fn transport_error(endpoint: &str, err: reqwest::Error) -> anyhow::Error {
    if err.is_connect() || err.is_timeout() {
        let host = reqwest::Url::parse(endpoint)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| endpoint.to_string());
        return SockwardenError::Connectivity {
            host,
            reason: err.to_string(),
        }
        .into();
    }
    anyhow::Error::new(err).context(format!("request to {endpoint} failed"))
}
