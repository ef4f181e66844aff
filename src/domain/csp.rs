// Content-Security-Policy directive augmentation
//
// The header value is split into its `;`-separated directives. Only the
// first directive with a matching name is widened; every other directive is
// written back exactly as it was received.

use axum::http::{header, HeaderMap, HeaderValue};

const SCRIPT_SRC: &str = "script-src";
const STYLE_SRC: &str = "style-src";
const MEDIA_SRC: &str = "media-src";

/// Trusted sources to append per directive
#[derive(Debug, Clone, Copy, Default)]
pub struct CspAdditions<'a> {
    pub script: &'a [String],
    pub style: &'a [String],
    pub media: &'a [String],
}

impl<'a> CspAdditions<'a> {
    pub fn is_empty(&self) -> bool {
        self.script.is_empty() && self.style.is_empty() && self.media.is_empty()
    }

    fn by_directive(&self) -> [(&'static str, &'a [String]); 3] {
        [
            (STYLE_SRC, self.style),
            (SCRIPT_SRC, self.script),
            (MEDIA_SRC, self.media),
        ]
    }
}

/// Augment an optional CSP header value. An absent header stays absent.
pub fn augment(csp: Option<&str>, additions: &CspAdditions<'_>) -> Option<String> {
    csp.map(|value| augment_value(value, additions))
}

/// Append the trusted sources to the matching directives of `csp`.
///
/// Additions for directives that are not present in the policy are dropped;
/// no directive is ever created.
pub fn augment_value(csp: &str, additions: &CspAdditions<'_>) -> String {
    if additions.is_empty() {
        return csp.to_string();
    }

    let mut directives: Vec<String> = csp.split(';').map(str::to_string).collect();

    for (name, sources) in additions.by_directive() {
        if sources.is_empty() {
            continue;
        }

        let Some(directive) = directives
            .iter_mut()
            .find(|directive| directive_name(directive).is_some_and(|n| n.eq_ignore_ascii_case(name)))
        else {
            continue;
        };

        let value_end = directive.trim_end().len();
        directive.insert_str(value_end, &format!(" {}", sources.join(" ")));
    }

    directives.join(";")
}

/// Name of a directive that is followed by whitespace, e.g. `script-src` in
/// ` script-src 'self'`. Bare names without any whitespace after them are
/// not considered augmentable.
fn directive_name(directive: &str) -> Option<&str> {
    let body = directive.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let name_end = body.find(|c: char| c.is_ascii_whitespace())?;
    Some(&body[..name_end])
}

/// Rewrite every `Content-Security-Policy` value in `headers` in place.
///
/// Values that are not valid UTF-8, or that would not form a valid header
/// after augmentation, are left untouched.
pub fn augment_header_map(headers: &mut HeaderMap, additions: &CspAdditions<'_>) {
    if additions.is_empty() || !headers.contains_key(header::CONTENT_SECURITY_POLICY) {
        return;
    }

    let original: Vec<HeaderValue> = headers
        .get_all(header::CONTENT_SECURITY_POLICY)
        .iter()
        .cloned()
        .collect();

    headers.remove(header::CONTENT_SECURITY_POLICY);

    for value in original {
        let augmented = value
            .to_str()
            .ok()
            .map(|csp| augment_value(csp, additions))
            .and_then(|csp| match HeaderValue::from_str(&csp) {
                Ok(header_value) => Some(header_value),
                Err(e) => {
                    tracing::warn!("Augmented CSP is not a valid header value, keeping original: {}", e);
                    None
                }
            });

        headers.append(header::CONTENT_SECURITY_POLICY, augmented.unwrap_or(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_appends_to_script_src() {
        let script = sources(&["a.com"]);
        let additions = CspAdditions { script: &script, ..Default::default() };

        let result = augment_value("default-src 'self'; script-src 'self'", &additions);

        assert!(result.contains("script-src 'self' a.com"));
        assert!(result.starts_with("default-src 'self';"));
        assert_eq!(result, "default-src 'self'; script-src 'self' a.com");
    }

    #[test]
    fn test_absent_header_stays_absent() {
        let script = sources(&["a.com"]);
        let additions = CspAdditions { script: &script, ..Default::default() };
        assert_eq!(augment(None, &additions), None);
    }

    #[test]
    fn test_missing_directive_drops_additions() {
        let media = sources(&["media.example"]);
        let additions = CspAdditions { media: &media, ..Default::default() };

        let csp = "default-src 'self'; script-src 'self'";
        assert_eq!(augment_value(csp, &additions), csp);
    }

    #[test]
    fn test_empty_additions_are_byte_identical() {
        let csp = "default-src 'self' ;  script-src   'self'  ; ";
        assert_eq!(augment(Some(csp), &CspAdditions::default()).as_deref(), Some(csp));
    }

    #[test]
    fn test_does_not_match_inside_other_directive() {
        let script = sources(&["a.com"]);
        let additions = CspAdditions { script: &script, ..Default::default() };

        let csp = "x-script-src 'none'; default-src 'self'";
        assert_eq!(augment_value(csp, &additions), csp);
    }

    #[test]
    fn test_directive_name_is_case_insensitive() {
        let style = sources(&["cdn.example", "fonts.example"]);
        let additions = CspAdditions { style: &style, ..Default::default() };

        let result = augment_value("Style-Src 'self'; img-src *", &additions);
        assert_eq!(result, "Style-Src 'self' cdn.example fonts.example; img-src *");
    }

    #[test]
    fn test_all_three_directives() {
        let script = sources(&["s.example"]);
        let style = sources(&["c.example"]);
        let media = sources(&["m.example"]);
        let additions = CspAdditions { script: &script, style: &style, media: &media };

        let result = augment_value(
            "script-src 'self'; style-src 'self' 'unsafe-inline'; media-src 'none'",
            &additions,
        );
        assert_eq!(
            result,
            "script-src 'self' s.example; style-src 'self' 'unsafe-inline' c.example; media-src 'none' m.example"
        );
    }

    #[test]
    fn test_only_first_duplicate_directive_is_widened() {
        let script = sources(&["a.com"]);
        let additions = CspAdditions { script: &script, ..Default::default() };

        let result = augment_value("script-src 'self'; script-src 'none'", &additions);
        assert_eq!(result, "script-src 'self' a.com; script-src 'none'");
    }

    #[test]
    fn test_whitespace_before_separator_is_kept() {
        let script = sources(&["a.com"]);
        let additions = CspAdditions { script: &script, ..Default::default() };

        let result = augment_value("script-src 'self'  ; img-src *", &additions);
        assert_eq!(result, "script-src 'self' a.com  ; img-src *");
    }

    #[test]
    fn test_bare_directive_name_is_not_widened() {
        let script = sources(&["a.com"]);
        let additions = CspAdditions { script: &script, ..Default::default() };

        let csp = "default-src 'self'; script-src";
        assert_eq!(augment_value(csp, &additions), csp);
    }

    #[test]
    fn test_header_map_multiple_values() {
        let script = sources(&["a.com"]);
        let additions = CspAdditions { script: &script, ..Default::default() };

        let mut headers = HeaderMap::new();
        headers.append(header::CONTENT_SECURITY_POLICY, HeaderValue::from_static("script-src 'self'"));
        headers.append(header::CONTENT_SECURITY_POLICY, HeaderValue::from_static("default-src 'none'"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));

        augment_header_map(&mut headers, &additions);

        let values: Vec<&str> = headers
            .get_all(header::CONTENT_SECURITY_POLICY)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["script-src 'self' a.com", "default-src 'none'"]);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/html");
    }

    #[test]
    fn test_header_map_without_csp_is_untouched() {
        let script = sources(&["a.com"]);
        let additions = CspAdditions { script: &script, ..Default::default() };

        let mut headers = HeaderMap::new();
        augment_header_map(&mut headers, &additions);
        assert!(headers.get(header::CONTENT_SECURITY_POLICY).is_none());
    }
}
