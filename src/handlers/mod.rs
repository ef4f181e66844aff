pub mod common;
pub mod proxy;
pub mod url_rewrite;
