//! ClinVar access through NCBI E-utilities.
//!
//! Endpoints used:
//!   esearch:  https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi
//!   esummary: https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esummary.fcgi

use std::time::Duration;

use async_trait::async_trait;
use pathoid_common::{PathoidError, Result, SandboxClient};
use reqwest::Url;
use tracing::{debug, instrument, warn};

use super::LookupService;
use crate::query::QueryDescriptor;

pub const EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

pub struct EutilsClient {
    client: SandboxClient,
    base_url: String,
    api_key: Option<String>,
}

impl EutilsClient {
    /// Client against the public E-utilities host.
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Self::with_base_url(EUTILS_BASE_URL, api_key, timeout)
    }

    /// Client against a custom base URL (a mirror or a local stub). Its host
    /// is added to the sandbox allowlist.
    pub fn with_base_url(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let mut client = SandboxClient::new(timeout)?;
        if !client.is_allowed(base_url) {
            let parsed = Url::parse(base_url)
                .map_err(|e| PathoidError::Config(format!("invalid base_url {base_url}: {e}")))?;
            let host = parsed
                .host_str()
                .ok_or_else(|| PathoidError::Config(format!("base_url {base_url} has no host")))?;
            warn!(host, "Allowing non-default E-utilities host");
            client.allow_domain(host);
        }

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    fn endpoint_url(&self, query: &QueryDescriptor) -> String {
        format!("{}/{}", self.base_url, query.endpoint.path())
    }

    fn params(&self, query: &QueryDescriptor) -> Vec<(&'static str, String)> {
        let mut params = query.params.clone();
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }
}

#[async_trait]
impl LookupService for EutilsClient {
    #[instrument(skip(self), fields(endpoint = query.endpoint.path()))]
    async fn execute(&self, query: &QueryDescriptor) -> Result<String> {
        let url = self.endpoint_url(query);
        let resp = self.client
            .get(&url)?
            .query(&self.params(query))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PathoidError::HttpStatus { status: status.as_u16(), url });
        }

        let body = resp.text().await?;
        debug!(bytes = body.len(), "E-utilities response received");
        Ok(body)
    }
}
