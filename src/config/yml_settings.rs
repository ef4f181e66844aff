use anyhow::{bail, Context, Result};
use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::domain::{InjectionRule, Position, ProxyConfig, TagSource};

const DEFAULT_LISTEN: &str = "127.0.0.1:8787";
const DEFAULT_MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Replaced by the inbound request's `Host` in tag sources and rewrite targets
pub const HOST_PLACEHOLDER: &str = "{host}";

/// A `from` prefix that the client-side script rewrites to `to` in links
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UrlRewritePair {
    pub from: String,
    pub to: String,
}

/// Static proxy policy as read from the YAML settings file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxySettings {
    #[serde(default = "default_listen")]
    pub listen: String,
    pub origin: String,
    #[serde(default)]
    pub trusted_script_src: Vec<String>,
    #[serde(default)]
    pub trusted_style_src: Vec<String>,
    #[serde(default)]
    pub trusted_media_src: Vec<String>,
    #[serde(default)]
    pub script_src: Vec<TagSource>,
    #[serde(default)]
    pub style_src: Vec<TagSource>,
    #[serde(default)]
    pub html_injection: Vec<InjectionRule>,
    #[serde(default)]
    pub clientside_url_rewrite: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub url_rewrite: Vec<UrlRewritePair>,
    #[serde(default = "default_max_request_body_bytes")]
    pub max_request_body_bytes: usize,
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_max_request_body_bytes() -> usize {
    DEFAULT_MAX_REQUEST_BODY_BYTES
}

fn with_host(value: &str, host: &str) -> String {
    value.replace(HOST_PLACEHOLDER, host)
}

fn tags_for_host(sources: &[TagSource], host: &str) -> Vec<TagSource> {
    sources
        .iter()
        .map(|tag| TagSource {
            src: with_host(&tag.src, host),
            target: tag.target.clone(),
        })
        .collect()
}

impl ProxySettings {
    /// Settings proxying everything to `origin` without any rewriting
    pub fn for_origin(origin: &str) -> Self {
        Self {
            listen: default_listen(),
            origin: origin.to_string(),
            trusted_script_src: Vec::new(),
            trusted_style_src: Vec::new(),
            trusted_media_src: Vec::new(),
            script_src: Vec::new(),
            style_src: Vec::new(),
            html_injection: Vec::new(),
            clientside_url_rewrite: false,
            url_rewrite: Vec::new(),
            max_request_body_bytes: default_max_request_body_bytes(),
        }
    }

    pub fn from_yaml(yml: &str) -> Result<Self> {
        serde_yaml::from_str(yml).context("Invalid yaml configuration")
    }

    /// Read settings from `path` without validating them
    pub fn read(path: &Path) -> Result<Self> {
        let yml = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read settings file {}", path.display()))?;
        Self::from_yaml(&yml).with_context(|| format!("Could not parse {}", path.display()))
    }

    pub fn origin_url(&self) -> Result<Url> {
        let url = Url::parse(&self.origin).with_context(|| format!("Invalid origin URL '{}'", self.origin))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Origin must be an http or https URL, got '{}'", self.origin);
        }
        if url.query().is_some() || url.fragment().is_some() {
            bail!("Origin must not carry a query or fragment: '{}'", self.origin);
        }
        Ok(url)
    }

    /// Check everything that would otherwise only fail per request.
    ///
    /// Rules with an unknown position are accepted but never applied, so they
    /// only produce a warning.
    pub fn validate(&self) -> Result<()> {
        self.origin_url()?;

        for source in self
            .trusted_script_src
            .iter()
            .chain(&self.trusted_style_src)
            .chain(&self.trusted_media_src)
        {
            if source.contains(';') || source.contains(',') || HeaderValue::from_str(source).is_err() {
                bail!("Trusted source '{}' cannot be placed in a CSP directive", source);
            }
        }

        let selectors = self
            .script_src
            .iter()
            .chain(&self.style_src)
            .map(|tag| tag.target.as_str())
            .chain(self.html_injection.iter().map(|rule| rule.selector.as_str()));
        for selector in selectors {
            selector
                .parse::<lol_html::Selector>()
                .map_err(|e| anyhow::anyhow!("Invalid selector '{}': {}", selector, e))?;
        }

        for (index, rule) in self.html_injection.iter().enumerate() {
            if rule.position == Position::Unknown {
                tracing::warn!(
                    index,
                    selector = %rule.selector,
                    "htmlInjection rule has no known position and will never be applied"
                );
            }
        }

        Ok(())
    }

    /// Build the per-request rewriting policy for a request to `host`
    pub fn proxy_config(&self, host: &str) -> ProxyConfig {
        ProxyConfig {
            trusted_script_src: self.trusted_script_src.clone(),
            trusted_style_src: self.trusted_style_src.clone(),
            trusted_media_src: self.trusted_media_src.clone(),
            script_src: tags_for_host(&self.script_src, host),
            style_src: tags_for_host(&self.style_src, host),
            html_injection: self.html_injection.clone(),
            clientside_url_rewrite: self.clientside_url_rewrite,
        }
    }

    /// Rewrite pairs for the client-side script served to `host`
    pub fn url_rewrite_pairs(&self, host: &str) -> Vec<UrlRewritePair> {
        self.url_rewrite
            .iter()
            .map(|pair| UrlRewritePair {
                from: with_host(&pair.from, host),
                to: with_host(&pair.to, host),
            })
            .collect()
    }
}
