pub mod yml_settings;

pub use yml_settings::{ProxySettings, UrlRewritePair};

pub const DEFAULT_CONFIG_FILE: &str = "edgegraft.yml";
