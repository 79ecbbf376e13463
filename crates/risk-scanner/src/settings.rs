//! Organization settings: the policy rules configured on the Socket side.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use sockwarden_core::config::ApiConfig;
use sockwarden_core::error::SockwardenError;
use sockwarden_core::rules::PolicySettings;

use crate::basic_auth;
use crate::client::transport_error;

#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn fetch(&self) -> Result<PolicySettings>;
}

#[derive(Debug, Deserialize)]
struct OrganizationsResponse {
    #[serde(default)]
    organizations: BTreeMap<String, Organization>,
}

#[derive(Debug, Deserialize)]
struct Organization {
    id: String,
}

#[derive(Debug, Serialize)]
struct SettingsQuery<'a> {
    organization: &'a str,
}

#[derive(Debug, Clone)]
pub struct SettingsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SettingsClient {
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or(SockwardenError::MissingApiKey)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn organization_ids(&self) -> Result<Vec<String>> {
        let url = format!("{}/organizations", self.base_url);
        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, basic_auth(&self.api_key))
            .send()
            .await
            .map_err(|err| transport_error(&url, err))?;
        let response = check_status(response).await?;
        let body: OrganizationsResponse =
            response.json().await.context("parse organizations response")?;
        Ok(body.organizations.into_values().map(|org| org.id).collect())
    }
}

#[async_trait]
impl SettingsSource for SettingsClient {
    async fn fetch(&self) -> Result<PolicySettings> {
        let ids = self.organization_ids().await?;
        let query: Vec<SettingsQuery<'_>> = ids
            .iter()
            .map(|id| SettingsQuery { organization: id })
            .collect();
        let url = format!("{}/settings", self.base_url);
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, basic_auth(&self.api_key))
            .json(&query)
            .send()
            .await
            .map_err(|err| transport_error(&url, err))?;
        let response = check_status(response).await?;
        let settings: PolicySettings = response.json().await.context("parse settings response")?;
        tracing::debug!(entries = settings.entries.len(), "fetched organization settings");
        Ok(settings)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SockwardenError::ScanStatus {
        status: status.as_u16(),
        body,
    }
    .into())
}

/// Settings that never leave the machine: the local overlay alone.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub PolicySettings);

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn fetch(&self) -> Result<PolicySettings> {
        Ok(self.0.clone())
    }
}
