//! Source URL validation, applied before a URL reaches the cache

use url::Url;

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// Checks a URL's scheme and host against allow-lists
#[derive(Debug, Clone)]
pub struct UrlValidator {
    protocols: Vec<String>,
    hosts: Vec<String>,
}

impl UrlValidator {
    pub fn new(protocols: &[String], hosts: &[String]) -> Self {
        Self {
            protocols: protocols.iter().map(|p| p.to_ascii_lowercase()).collect(),
            hosts: hosts.iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(&config.valid_protocols, &config.file_host_whitelist)
    }

    /// Parse `raw` and accept it only if scheme and host are allowed
    pub fn validate(&self, raw: &str) -> Result<Url> {
        let url = Url::parse(raw)
            .map_err(|e| CacheError::InvalidInput(format!("malformed URL {:?}: {}", raw, e)))?;

        // `Url` already lowercases the scheme
        if !self.protocols.iter().any(|p| p == url.scheme()) {
            return Err(CacheError::InvalidInput(format!(
                "protocol {:?} is not allowed (allowed: {})",
                url.scheme(),
                self.protocols.join(", ")
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| CacheError::InvalidInput(format!("URL {:?} has no host", raw)))?
            .to_ascii_lowercase();

        if !self.hosts.is_empty() && !self.hosts.contains(&host) {
            return Err(CacheError::InvalidInput(format!(
                "host {:?} is not whitelisted",
                host
            )));
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_allows_any_https_host() {
        let validator = UrlValidator::from_config(&CacheConfig::default());

        assert!(validator.validate("https://cdn.example.com/a.png").is_ok());
        assert!(validator.validate("HTTPS://Example.COM/a.png").is_ok());
    }

    #[test]
    fn test_rejects_disallowed_protocol() {
        let validator = UrlValidator::from_config(&CacheConfig::default());

        let err = validator.validate("http://example.com/a.png").unwrap_err();
        assert!(matches!(err, CacheError::InvalidInput(_)));
        assert!(err.to_string().contains("\"http\""));
    }

    #[test]
    fn test_rejects_malformed_and_relative() {
        let validator = UrlValidator::from_config(&CacheConfig::default());

        for raw in ["", "example.com/a.png", "/images/a.png", "https://"] {
            assert!(
                matches!(validator.validate(raw), Err(CacheError::InvalidInput(_))),
                "{:?}",
                raw
            );
        }
    }

    #[test]
    fn test_host_whitelist() {
        let validator = UrlValidator::new(
            &strings(&["https", "http"]),
            &strings(&["images.example.com", "CDN.example.net"]),
        );

        assert!(validator.validate("https://images.example.com/a.png").is_ok());
        assert!(validator.validate("http://cdn.example.net/b.jpg").is_ok());

        let err = validator.validate("https://evil.example.org/a.png").unwrap_err();
        assert!(err.to_string().contains("not whitelisted"));
    }

    #[test]
    fn test_hostless_scheme_is_rejected() {
        let validator = UrlValidator::new(&strings(&["file"]), &[]);
        let err = validator.validate("file:///tmp/a.png").unwrap_err();
        assert!(err.to_string().contains("has no host"));
    }
}
