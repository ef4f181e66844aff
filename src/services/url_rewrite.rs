// Client-side link rewriting script

use askama::Template;

use crate::{config::UrlRewritePair, error::AppError};

/// Path the script is served from
pub const URL_REWRITE_SCRIPT_PATH: &str = "/src/urlRewrite.js";

/// One rewrite with both sides encoded as JavaScript string literals
struct RewriteLiteral {
    from: String,
    to: String,
}

#[derive(Template)]
#[template(path = "url_rewrite.js", escape = "none")]
struct UrlRewriteScript {
    rewrites: Vec<RewriteLiteral>,
}

fn js_string(value: &str) -> Result<String, AppError> {
    // JSON strings are valid JavaScript literals; `</` is split so the
    // script can also be inlined into a <script> element.
    serde_json::to_string(value)
        .map(|literal| literal.replace("</", "<\\/"))
        .map_err(|e| AppError::Internal(format!("Cannot encode rewrite value: {}", e)))
}

/// Render the script that rewrites link prefixes `from` to `to` in the browser
pub fn render_script(pairs: &[UrlRewritePair]) -> Result<String, AppError> {
    let rewrites = pairs
        .iter()
        .map(|pair| {
            Ok(RewriteLiteral {
                from: js_string(&pair.from)?,
                to: js_string(&pair.to)?,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    Ok(UrlRewriteScript { rewrites }.render()?)
}
