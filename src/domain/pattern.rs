// Segment-wise glob matching for route patterns

/// Match `path` against `pattern`, segment by segment.
///
/// A `*` segment matches any single segment; every other segment must be
/// equal. Paths with a different number of segments never match, so
/// `/posts/` does not match `/posts`.
pub fn matches(path: &str, pattern: &str) -> bool {
    let path_segments: Vec<&str> = path.split('/').collect();
    let pattern_segments: Vec<&str> = pattern.split('/').collect();

    if path_segments.len() != pattern_segments.len() {
        return false;
    }

    path_segments
        .iter()
        .zip(pattern_segments.iter())
        .all(|(segment, pattern_segment)| *pattern_segment == "*" || segment == pattern_segment)
}

/// True if `path` matches at least one of `patterns`
pub fn matches_any<S: AsRef<str>>(path: &str, patterns: &[S]) -> bool {
    patterns.iter().any(|pattern| matches(path, pattern.as_ref()))
}
