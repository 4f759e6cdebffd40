//! Best-effort line lookup for configuration elements.
//!
//! serde drops positions once a document is deserialized, so the loader
//! scans the raw text for each element's `name` attribute and remembers the
//! line it appeared on. Works for block-style YAML and for TOML arrays of
//! tables.

use crate::error::ConfigLocation;
use std::collections::HashMap;

/// Collections whose elements are keyed by `name`
pub const COLLECTIONS: [&str; 4] = ["eventMappings", "providers", "profiles", "rules"];

#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    lines: HashMap<(String, String), usize>,
}

impl SourceMap {
    /// Scan configuration text, recording the first line of every `name`
    pub fn scan(text: &str) -> Self {
        let mut lines = HashMap::new();
        let mut section: Option<&str> = None;

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if let Some(found) = section_header(line, raw) {
                section = Some(found);
                continue;
            }
            // Any other table header or top-level YAML key ends the collection
            if line.starts_with('[') || is_top_level_yaml_key(raw) {
                section = None;
                continue;
            }

            let Some(current) = section else { continue };
            if let Some(name) = name_value(line) {
                lines.entry((current.to_string(), name)).or_insert(index + 1);
            }
        }

        Self { lines }
    }

    /// Line of the element a location points at
    pub fn line_of(&self, location: &ConfigLocation) -> Option<usize> {
        let (collection, name) = split_element(&location.element)?;
        self.lines.get(&(collection.to_string(), name.to_string())).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Element path used in locations, e.g. `rules["R1"]`
pub fn element_path(collection: &str, name: &str) -> String {
    format!("{collection}[\"{name}\"]")
}

fn split_element(element: &str) -> Option<(&str, &str)> {
    let (collection, rest) = element.split_once("[\"")?;
    let name = rest.strip_suffix("\"]")?;
    Some((collection, name))
}

fn section_header(line: &str, raw: &str) -> Option<&'static str> {
    for collection in COLLECTIONS {
        // TOML: [[rules]]
        if line == format!("[[{collection}]]") {
            return Some(collection);
        }
        // YAML: top-level `rules:`
        if !raw.starts_with(char::is_whitespace)
            && line.strip_prefix(collection).is_some_and(|rest| rest.trim_start().starts_with(':'))
        {
            return Some(collection);
        }
    }
    None
}

fn is_top_level_yaml_key(raw: &str) -> bool {
    if raw.starts_with(|c: char| c.is_whitespace() || c == '-' || c == '#') {
        return false;
    }
    match (raw.find(':'), raw.find('=')) {
        (Some(colon), Some(equals)) => colon < equals,
        (Some(_), None) => true,
        _ => false,
    }
}

fn name_value(line: &str) -> Option<String> {
    let line = line.strip_prefix("- ").unwrap_or(line).trim_start();
    let rest = line.strip_prefix("name")?.trim_start();
    let rest = rest.strip_prefix(':').or_else(|| rest.strip_prefix('='))?.trim();
    let value = rest.trim_matches(|c| c == '"' || c == '\'');
    if value.is_empty() { None } else { Some(value.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_yaml_elements() {
        let text = "\
enabled: true
eventMappings:
  - name: Errors
    type: WebBaseErrorEvent
rules:
  - name: \"R1\"
    eventName: Errors
";
        let map = SourceMap::scan(text);
        assert_eq!(map.line_of(&ConfigLocation::element(element_path("eventMappings", "Errors"))), Some(3));
        assert_eq!(map.line_of(&ConfigLocation::element(element_path("rules", "R1"))), Some(6));
        assert_eq!(map.line_of(&ConfigLocation::element(element_path("rules", "Errors"))), None);
    }

    #[test]
    fn finds_toml_elements() {
        let text = "\
enabled = true

[[providers]]
type = \"TraceEventProvider\"
name = \"Log\"

[[rules]]
name = \"R1\"
eventName = \"Errors\"
";
        let map = SourceMap::scan(text);
        assert_eq!(map.line_of(&ConfigLocation::element(element_path("providers", "Log"))), Some(5));
        assert_eq!(map.line_of(&ConfigLocation::element(element_path("rules", "R1"))), Some(8));
    }

    #[test]
    fn unrelated_locations_have_no_line() {
        let map = SourceMap::scan("rules:\n  - name: R1\n");
        assert_eq!(map.line_of(&ConfigLocation::element("healthMonitoring")), None);
    }
}
