//! Parsing helpers for provider manifest and descriptor files.
//!
//! A provider advertises capabilities in two places:
//!
//! - `CAPABILITY.md` with a `Provides: a, b, c` line, and per-method sections of the form
//!   `### method` that may carry a `**How to fulfill:**` paragraph.
//! - `SKILL.md` whose YAML front matter lists `provides:` entries, either as
//!   `- capability: name` maps or bare names.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value as YamlValue;
use tracing::debug;

static PROVIDES_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^Provides:\s*(.+)$").expect("valid regex"));
static CAPABILITY_ENTRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"capability:\s*([^\s#]+)").expect("valid regex"));

const FULFILL_MARKER: &str = "**How to fulfill:**";

/// Capability names from the first `Provides:` line of a manifest.
pub fn parse_provides(content: &str) -> Vec<String> {
    let Some(captures) = PROVIDES_LINE.captures(content) else {
        return Vec::new();
    };
    captures[1]
        .split(',')
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Capability names declared by a descriptor's front matter.
///
/// Front matter that is not valid YAML is scanned line by line for `capability:` entries
/// under `provides:` instead.
pub fn parse_front_matter_provides(content: &str) -> Vec<String> {
    let Some(block) = front_matter(content) else {
        return Vec::new();
    };

    match serde_yaml::from_str::<YamlValue>(block) {
        Ok(document) => provides_from_yaml(&document),
        Err(error) => {
            debug!(%error, "front matter is not valid YAML; scanning lines");
            scan_provides_lines(block)
        }
    }
}

fn front_matter(content: &str) -> Option<&str> {
    let normalized = content.strip_prefix('\u{feff}').unwrap_or(content);
    let rest = normalized
        .strip_prefix("---\n")
        .or_else(|| normalized.strip_prefix("---\r\n"))?;
    let end = rest.find("\n---")?;
    Some(&rest[..end])
}

fn provides_from_yaml(document: &YamlValue) -> Vec<String> {
    let Some(entries) = document.get("provides").and_then(YamlValue::as_sequence) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            YamlValue::String(name) => Some(name.trim().to_string()),
            YamlValue::Mapping(_) => entry.get("capability").and_then(YamlValue::as_str).map(|name| name.trim().to_string()),
            _ => None,
        })
        .filter(|name| !name.is_empty())
        .collect()
}

fn scan_provides_lines(block: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut inside = false;
    for line in block.lines() {
        let trimmed = line.trim_start();
        if !line.starts_with([' ', '\t', '-']) && !trimmed.is_empty() {
            inside = trimmed.starts_with("provides:");
            continue;
        }
        if inside && let Some(captures) = CAPABILITY_ENTRY.captures(trimmed) {
            names.push(captures[1].trim_matches(['"', '\'']).to_string());
        }
    }
    names
}

/// Operator-facing instructions for `method`, taken from a capability manifest.
///
/// Looks for the first `###` heading that starts with `method` (case-insensitive, so
/// `### get_videos(channel, limit)` matches `get_videos`) and returns the text after its
/// `**How to fulfill:**` marker up to the next `**`, or the whole section when the marker is absent.
pub fn extract_method_instructions(manifest: &str, method: &str) -> String {
    let Some(section) = method_section(manifest, method) else {
        return format!("Method {method} not found in CAPABILITY.md");
    };

    if let Some(start) = section.to_ascii_lowercase().find(&FULFILL_MARKER.to_ascii_lowercase()) {
        let after = &section[start + FULFILL_MARKER.len()..];
        let end = after.find("**").unwrap_or(after.len());
        return after[..end].trim().to_string();
    }
    section.trim().to_string()
}

fn method_section<'a>(manifest: &'a str, method: &str) -> Option<&'a str> {
    let wanted = method.trim().to_lowercase();
    let mut offset = 0;
    let mut start = None;
    for line in manifest.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let Some(heading) = line.trim_end().strip_prefix("###") else {
            continue;
        };
        if start.is_some() {
            return start.map(|begin| &manifest[begin..line_start]);
        }
        if heading.starts_with('#') {
            continue;
        }
        if heading.trim().to_lowercase().starts_with(&wanted) {
            start = Some(offset);
        }
    }
    start.map(|begin| &manifest[begin..])
}
