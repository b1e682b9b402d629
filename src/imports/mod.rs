//! Best-effort resolution of an import spec to a repository-local file at
//! a specific commit. Unresolved specs are left to be recorded against an
//! opaque `Module` node by the graph projector.

use crate::git::GitDriver;
use crate::lang::Language;

pub fn is_relative_spec(module: &str) -> bool {
    module.starts_with("./") || module.starts_with("../") || module.starts_with(".\\")
}

pub fn is_local_import(lang: Language, module: &str) -> bool {
    match lang {
        Language::Python => module.starts_with('.'),
        Language::JavaScript | Language::TypeScript => is_relative_spec(module),
        _ => false,
    }
}

/// Resolve `module` as imported from `importer_path` at `sha`, returning
/// the first candidate that exists in the object database, or `None` if
/// none do (or the language/spec isn't locally resolvable).
pub fn resolve_local_module_path(
    git: &GitDriver,
    importer_path: &str,
    module: &str,
    lang: Language,
    sha: &str,
) -> Option<String> {
    if !is_local_import(lang, module) {
        return None;
    }

    let base_dir = parent_dir(importer_path);
    let candidates = match lang {
        Language::JavaScript | Language::TypeScript => {
            js_candidates(&base_dir, module)
        }
        Language::Python => python_candidates(&base_dir, module),
        _ => return None,
    };

    candidates
        .into_iter()
        .find(|cand| git.file_exists_at(sha, cand))
}

fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

fn join(base: &str, rest: &str) -> String {
    if base.is_empty() {
        rest.to_string()
    } else {
        format!("{base}/{rest}")
    }
}

/// Normalizes `./`, `../` segments against `base` without touching the
/// filesystem; used before candidate extensions are appended.
fn normalize_relative(base: &str, spec: &str) -> String {
    let mut parts: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for segment in spec.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn js_candidates(base_dir: &str, module: &str) -> Vec<String> {
    let joined = normalize_relative(base_dir, module);
    let extensions = [".js", ".jsx", ".ts", ".tsx"];
    let mut candidates = Vec::new();
    for ext in extensions {
        candidates.push(format!("{joined}{ext}"));
    }
    for ext in extensions {
        candidates.push(join(&joined, &format!("index{ext}")));
    }
    candidates
}

fn python_candidates(base_dir: &str, module: &str) -> Vec<String> {
    let dots = module.chars().take_while(|c| *c == '.').count();
    let tail = &module[dots..];

    let mut parts: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for _ in 0..dots.saturating_sub(1) {
        parts.pop();
    }
    let anchor = parts.join("/");

    let spec = if tail.is_empty() {
        anchor
    } else {
        join(&anchor, &tail.replace('.', "/"))
    };

    vec![format!("{spec}.py"), join(&spec, "__init__.py")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_dotted_relative_one_dot_stays_in_package() {
        let candidates = python_candidates("src/pkg", ".b");
        assert_eq!(candidates[0], "src/pkg/b.py");
        assert_eq!(candidates[1], "src/pkg/b/__init__.py");
    }

    #[test]
    fn python_dotted_relative_two_dots_ascends_one_level() {
        let candidates = python_candidates("src/pkg/sub", "..util");
        assert_eq!(candidates[0], "src/pkg/util.py");
    }

    #[test]
    fn js_relative_expands_extensions_and_index() {
        let candidates = js_candidates("src", "./helpers");
        assert!(candidates.contains(&"src/helpers.js".to_string()));
        assert!(candidates.contains(&"src/helpers/index.ts".to_string()));
    }

    #[test]
    fn non_relative_module_is_not_local() {
        assert!(!is_local_import(Language::Python, "numpy"));
        assert!(!is_local_import(Language::JavaScript, "react"));
    }
}
