// Selects the injection rules that apply to one response

use super::{pattern, InjectionRule};

/// Filter `rules` down to those that apply to `path` and `status`.
///
/// A rule applies when its route filter, exclude filter and include filter
/// all pass. The output keeps the input order.
pub fn select_rules<'a>(path: &str, status: u16, rules: &'a [InjectionRule]) -> Vec<&'a InjectionRule> {
    rules.iter().filter(|rule| rule_applies(rule, path, status)).collect()
}

pub fn rule_applies(rule: &InjectionRule, path: &str, status: u16) -> bool {
    let matches_route = rule.routes.is_empty() || pattern::matches_any(path, &rule.routes);
    let passes_exclude = !rule.exclude_status_code.contains(&status);
    let passes_include = rule.include_status_code.is_empty() || rule.include_status_code.contains(&status);

    matches_route && passes_exclude && passes_include
}
