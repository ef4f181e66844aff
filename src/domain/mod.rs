// Domain model for the response rewriting rules
// A ProxyConfig is built fresh for every request and never mutated afterwards

pub mod csp;
pub mod pattern;
pub mod rule_selector;

use serde::{Deserialize, Serialize};

/// Where an injected fragment lands relative to its anchor element.
///
/// Missing or unrecognized values deserialize to `Unknown`, which makes the
/// rule a no-op instead of a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    /// Right after the element's start tag
    InsideBefore,
    /// Right before the element's end tag
    InsideAfter,
    /// Right before the element's start tag
    OutsideBefore,
    /// Right after the element's end tag
    OutsideAfter,
    #[default]
    #[serde(other)]
    Unknown,
}

/// A `<script>` or `<link>` tag appended to every element matching `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSource {
    pub src: String,
    pub target: String,
}

/// One HTML fragment insertion, filtered by route and response status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionRule {
    pub selector: String,
    #[serde(default)]
    pub position: Position,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_status_code: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_status_code: Vec<u16>,
}

impl InjectionRule {
    pub fn new(selector: &str, position: Position, content: &str) -> Self {
        Self {
            selector: selector.to_string(),
            position,
            content: content.to_string(),
            routes: Vec::new(),
            exclude_status_code: Vec::new(),
            include_status_code: Vec::new(),
        }
    }

    pub fn with_routes(mut self, routes: &[&str]) -> Self {
        self.routes = routes.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_excluded_status(mut self, codes: &[u16]) -> Self {
        self.exclude_status_code = codes.to_vec();
        self
    }

    pub fn with_included_status(mut self, codes: &[u16]) -> Self {
        self.include_status_code = codes.to_vec();
        self
    }
}

/// Per-request rewriting policy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxyConfig {
    pub trusted_script_src: Vec<String>,
    pub trusted_style_src: Vec<String>,
    pub trusted_media_src: Vec<String>,
    pub script_src: Vec<TagSource>,
    pub style_src: Vec<TagSource>,
    pub html_injection: Vec<InjectionRule>,
    pub clientside_url_rewrite: bool,
}

impl ProxyConfig {
    /// Sources to append to the script-src, style-src and media-src directives
    pub fn csp_additions(&self) -> csp::CspAdditions<'_> {
        csp::CspAdditions {
            script: &self.trusted_script_src,
            style: &self.trusted_style_src,
            media: &self.trusted_media_src,
        }
    }
}
