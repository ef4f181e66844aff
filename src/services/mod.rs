pub mod fetch;
pub mod proxy_service;
pub mod transform;
pub mod url_rewrite;
