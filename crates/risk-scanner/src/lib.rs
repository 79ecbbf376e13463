use anyhow::Result;
use async_trait::async_trait;
use base64::Engine as _;

pub mod client;
pub mod ndjson;
pub mod settings;
pub mod verdict;

pub use client::{ScanClient, ScanRequest};
pub use ndjson::{decode_verdicts, VerdictStream};
pub use settings::{SettingsClient, SettingsSource, StaticSettings};
pub use verdict::{Finding, PackageReport, PackageVerdict, MISSING_ISSUE};

/// Streams verdicts for a batch of `name@version` ids, in arrival order.
#[async_trait]
pub trait PackageScanner: Send + Sync {
    async fn batch_scan(&self, pkgids: &[String]) -> Result<VerdictStream>;
}

/// The API key is sent as the basic-auth user with an empty password.
pub fn basic_auth(api_key: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{api_key}:"));
    format!("Basic {token}")
}

#[cfg(test)]
mod tests {
    use super::basic_auth;

    #[test]
    fn basic_auth_has_empty_password() {
        // base64("key:")
        assert_eq!(basic_auth("key"), "Basic a2V5Og==");
    }
}
