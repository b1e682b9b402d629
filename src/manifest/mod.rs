//! Dependency manifest parsing for the three recognized ecosystems.
//! Parse failures are never fatal: an unparseable manifest yields an
//! empty dependency list and is logged at `debug`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDependency {
    pub ecosystem: &'static str,
    pub name: String,
    pub version: String,
}

const SPECIAL_MANIFEST_FILES: &[&str] = &[
    "requirements.txt",
    "requirements-dev.txt",
    "pyproject.toml",
    "package.json",
];

/// Whether `filename` (basename only) is one of the recognized manifests,
/// or the broader set of supply-chain files tracked for `File.is_code`
/// classification even when not parsed for dependencies.
pub fn is_manifest_filename(filename: &str) -> bool {
    SPECIAL_MANIFEST_FILES.contains(&filename)
}

fn dep_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z0-9_.\-]+)\s*([=~!<>]{1,2})\s*([A-Za-z0-9_.\-+]+)").unwrap()
    })
}

fn bare_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap())
}

pub fn parse_requirements_txt(blob: &[u8]) -> Vec<ManifestDependency> {
    let text = String::from_utf8_lossy(blob);
    let mut out = Vec::new();
    for raw in text.lines() {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }
        if let Some(caps) = dep_line_re().captures(raw) {
            out.push(ManifestDependency {
                ecosystem: "pypi",
                name: caps[1].to_ascii_lowercase(),
                version: caps[3].to_string(),
            });
        } else if bare_name_re().is_match(raw) {
            out.push(ManifestDependency {
                ecosystem: "pypi",
                name: raw.to_ascii_lowercase(),
                version: String::new(),
            });
        }
    }
    out
}

pub fn parse_package_json(blob: &[u8]) -> Vec<ManifestDependency> {
    let text = String::from_utf8_lossy(blob);
    let Ok(pkg) = serde_json::from_str::<Value>(&text) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for section in [
        "dependencies",
        "devDependencies",
        "peerDependencies",
        "optionalDependencies",
    ] {
        let Some(Value::Object(map)) = pkg.get(section) else {
            continue;
        };
        for (name, version) in map {
            let version = match version {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push(ManifestDependency {
                ecosystem: "npm",
                name: name.to_ascii_lowercase(),
                version,
            });
        }
    }
    out
}

/// The package name a `package.json` declares for itself, if any,
/// lowercased to match `parse_package_json`'s normalization.
pub fn package_json_self_name(blob: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(blob);
    let pkg: Value = serde_json::from_str(&text).ok()?;
    pkg.get("name")?.as_str().map(|s| s.to_ascii_lowercase())
}

pub fn parse_pyproject_toml(blob: &[u8]) -> Vec<ManifestDependency> {
    let text = String::from_utf8_lossy(blob);
    let Ok(data) = text.parse::<toml::Table>() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let Some(tool) = data.get("tool").and_then(|v| v.as_table()) else {
        return out;
    };
    let Some(poetry) = tool.get("poetry").and_then(|v| v.as_table()) else {
        return out;
    };
    for section in ["dependencies", "dev-dependencies"] {
        let Some(deps) = poetry.get(section).and_then(|v| v.as_table()) else {
            continue;
        };
        for (name, value) in deps {
            let version = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Table(t) => t
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                other => other.to_string(),
            };
            out.push(ManifestDependency {
                ecosystem: "pypi",
                name: name.to_ascii_lowercase(),
                version,
            });
        }
    }
    out
}

pub fn parse_manifest(filename: &str, blob: &[u8]) -> Vec<ManifestDependency> {
    match filename {
        "requirements.txt" | "requirements-dev.txt" => parse_requirements_txt(blob),
        "package.json" => parse_package_json(blob),
        "pyproject.toml" => parse_pyproject_toml(blob),
        _ => Vec::new(),
    }
}

/// Returns `Some(true)`/`Some(false)` when both versions carry a numeric
/// major component, `None` when undecidable (per invariant 6, treated as
/// "not a major bump" by the caller).
pub fn semver_major_bump(prev: &str, new: &str) -> Option<bool> {
    fn norm(v: &str) -> Option<u64> {
        static STRIP: OnceLock<Regex> = OnceLock::new();
        static NUM: OnceLock<Regex> = OnceLock::new();
        let strip = STRIP.get_or_init(|| Regex::new(r"^[\^~<>=\s]*v?").unwrap());
        let num = NUM.get_or_init(|| Regex::new(r"(\d+)").unwrap());
        if v.trim().is_empty() {
            return None;
        }
        let stripped = strip.replace(v.trim(), "");
        num.captures(&stripped)?.get(1)?.as_str().parse().ok()
    }
    let p = norm(prev)?;
    let n = norm(new)?;
    Some(n > p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requirements_parses_pinned_and_bare() {
        let blob = b"# comment\nrequests==2.31.0\nflask\n";
        let deps = parse_requirements_txt(blob);
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].name, "requests");
        assert_eq!(deps[0].version, "2.31.0");
        assert_eq!(deps[1].name, "flask");
        assert_eq!(deps[1].version, "");
    }

    #[test]
    fn package_json_merges_all_dependency_sections() {
        let blob = br#"{"dependencies":{"react":"^17.0.2"},"devDependencies":{"jest":"^29.0.0"}}"#;
        let deps = parse_package_json(blob);
        assert_eq!(deps.len(), 2);
        assert!(deps.iter().any(|d| d.name == "react" && d.version == "^17.0.2"));
    }

    #[test]
    fn react_major_bump_detected() {
        assert_eq!(semver_major_bump("^17.0.2", "^18.1.0"), Some(true));
        assert_eq!(semver_major_bump("^17.0.2", "^17.2.0"), Some(false));
        assert_eq!(semver_major_bump("", "^18.1.0"), None);
    }

    #[test]
    fn pyproject_poetry_dependencies() {
        let blob = b"[tool.poetry.dependencies]\nrequests = \"^2.31.0\"\n";
        let deps = parse_pyproject_toml(blob);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name, "requests");
    }
}
