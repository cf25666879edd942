use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;
use crate::error::PathoidError;

/// Hosts PathoID talks to out of the box.
const DEFAULT_ALLOWLIST: &[&str] = &[
    "eutils.ncbi.nlm.nih.gov", // ClinVar esearch / esummary
];

/// An HTTP client that only issues requests to approved hosts.
///
/// Every outbound call made by the search pipeline goes through this type,
/// so a misconfigured `base_url` fails loudly instead of leaking queries.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a client with the default allowlist and the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, PathoidError> {
        let allowlist = DEFAULT_ALLOWLIST.iter().map(|d| d.to_string()).collect();

        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("pathoid/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PathoidError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Validates if a URL is permitted under the current policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                // Exact match or a subdomain of an allowed host
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{}", allowed)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Starts a GET request if the URL's host is allowlisted.
    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, PathoidError> {
        if !self.is_allowed(url) {
            tracing::warn!(url, "Refusing request to host outside the allowlist");
            return Err(PathoidError::SecurityError(format!(
                "domain not in allowlist for URL {}",
                url
            )));
        }

        Ok(self.client.get(url))
    }
}
