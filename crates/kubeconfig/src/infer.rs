//! Provider and region inference from cluster names and server URLs.
//!
//! Managed clusters rarely announce where they run; the API server
//! address is usually the only hint. The rules here are ordered from
//! most to least specific and fall back to a fixed default.

use url::Url;

use crate::parser::KubeconfigParser;

/// Known provider IP prefixes mapped to regions.
const IP_REGION_RULES: &[(&str, &str)] = &[
    ("51.79.", "eu-west-1"),
    ("139.99.", "ap-southeast-1"),
    ("15.235.", "ca-east-1"),
];

/// Provider keyword table, checked in order against name + host.
const PROVIDER_RULES: &[(&str, &[&str])] = &[
    ("ovh", &["ovh", "ovhcloud"]),
    ("aws", &["eks", "amazonaws", "aws"]),
    ("gcp", &["gke", "googleapis", "gcp"]),
    ("azure", &["aks", "azmk8s", "azure"]),
    ("digitalocean", &["digitalocean", "ondigitalocean"]),
    ("linode", &["linode", "lke"]),
];

impl KubeconfigParser {
    /// Infer the region from an API server URL.
    ///
    /// Ordered heuristic: provider-specific IP prefixes, then an
    /// AWS-style `xx-xxxx-#` token, then a bare `letters+digits`
    /// datacenter label, then an embedded `.xx-xxxx.` label, then the
    /// configured default.
    #[must_use]
    pub fn extract_region(&self, server_url: &str) -> String {
        let host = host_of(server_url);

        for (prefix, region) in IP_REGION_RULES {
            if host.starts_with(prefix) {
                return (*region).to_string();
            }
        }

        if let Some(caps) = self.aws_region.captures(&host) {
            return caps[1].to_string();
        }

        if let Some(label) = host.split('.').next() {
            if self.bare_label.is_match(label) {
                return label.to_string();
            }
        }

        if let Some(caps) = self.embedded_region.captures(&host) {
            return caps[1].to_string();
        }

        self.config.default_region.clone()
    }

    /// Infer the hosting provider from a cluster name and server URL.
    #[must_use]
    pub fn extract_provider(&self, cluster_name: &str, server_url: &str) -> String {
        let haystack = format!("{} {}", cluster_name, host_of(server_url)).to_lowercase();

        for (provider, keywords) in PROVIDER_RULES {
            if keywords.iter().any(|kw| haystack.contains(kw)) {
                return (*provider).to_string();
            }
        }

        self.config.default_provider.clone()
    }
}

/// Best-effort host extraction; falls back to the raw string with any
/// scheme prefix stripped.
fn host_of(server_url: &str) -> String {
    if let Ok(url) = Url::parse(server_url) {
        if let Some(host) = url.host_str() {
            return host.to_lowercase();
        }
    }
    server_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split([':', '/'])
        .next()
        .unwrap_or(server_url)
        .to_lowercase()
}
