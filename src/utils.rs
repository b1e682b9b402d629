//! Small shared helpers used across the git driver, extractors, and graph
//! projector: path normalization and lossy text decoding.

/// Normalize a path to forward slashes, the form every stored `File.path`
/// and import spec uses regardless of the host OS.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Decode subprocess output or blob bytes as UTF-8, replacing invalid
/// sequences rather than failing; binary blobs are common and must not
/// abort ingestion of the surrounding commit.
pub fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Split a repo-relative path into its extension, lowercased, without the
/// leading dot. Returns an empty string for extensionless files.
pub fn extension_of(path: &str) -> String {
    path.rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_backslashes() {
        assert_eq!(normalize_path("src\\a\\b.py"), "src/a/b.py");
    }

    #[test]
    fn extension_of_nested_path() {
        assert_eq!(extension_of("src/pkg/mod.rs"), "rs");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of("a/b.tar.gz"), "gz");
    }
}
