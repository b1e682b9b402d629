//! Reflective fallback for Python: a grammar-free, indentation-aware line
//! scanner used when the tree-sitter grammar is absent or parses a file
//! down to zero named functions/classes/calls. It recovers the same
//! coarse shape tree-sitter would (definitions with line spans, and
//! bare/member call names) from text alone.

use std::sync::OnceLock;

use regex::Regex;

use super::{Call, ImportSpec, ParseOutcome, Symbol, SymbolKind};
use crate::utils::decode_lossy;

fn def_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\s*)(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap())
}

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> =
        OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\s*)class\s+([A-Za-z_][A-Za-z0-9_]*)\s*[(:]").unwrap()
    })
}

fn call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*\(").unwrap())
}

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:from\s+(?P<mod1>[.\w]+)\s+import\s+(?P<names>.+)|import\s+(?P<mod2>[.\w]+)(?:\s+as\s+(?P<alias>\w+))?)")
            .unwrap()
    })
}

const PY_KEYWORDS: &[&str] = &[
    "if", "for", "while", "with", "elif", "except", "return", "def", "class", "lambda", "print",
    "yield", "assert", "not", "and", "or", "in", "is",
];

fn indent_of(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

/// Recover `def`/`class` spans via indentation: a block ends at the last
/// line whose indentation is strictly greater than the header's, or EOF.
pub fn python_symbols_and_calls(code: &[u8]) -> ParseOutcome {
    let text = decode_lossy(code);
    let lines: Vec<&str> = text.lines().collect();

    let mut symbols = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let (kind, indent, name) = if let Some(caps) = def_re().captures(line) {
            (SymbolKind::Function, caps[1].len(), caps[2].to_string())
        } else if let Some(caps) = class_re().captures(line) {
            (SymbolKind::Class, caps[1].len(), caps[2].to_string())
        } else {
            continue;
        };

        let start_line = (idx + 1) as u32;
        let mut end_line = start_line;
        for (j, later) in lines.iter().enumerate().skip(idx + 1) {
            if later.trim().is_empty() {
                continue;
            }
            if indent_of(later) <= indent {
                break;
            }
            end_line = (j + 1) as u32;
        }
        symbols.push(Symbol {
            kind,
            name,
            start_line,
            end_line,
        });
    }

    let mut calls = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if def_re().is_match(line) || class_re().is_match(line) {
            continue;
        }
        for caps in call_re().captures_iter(line) {
            let full = &caps[1];
            let leaf = full.rsplit('.').next().unwrap_or(full);
            if PY_KEYWORDS.contains(&leaf) {
                continue;
            }
            calls.push(Call {
                name: leaf.to_string(),
                start_line: (idx + 1) as u32,
                end_line: (idx + 1) as u32,
            });
        }
    }

    ParseOutcome { symbols, calls }
}

pub fn python_imports(code: &[u8]) -> Vec<ImportSpec> {
    let text = decode_lossy(code);
    let mut out = Vec::new();
    for line in text.lines() {
        let Some(caps) = import_re().captures(line) else {
            continue;
        };
        if let Some(m) = caps.name("mod1") {
            let module = m.as_str().to_string();
            for part in caps["names"].split(',') {
                let part = part.trim();
                if part.is_empty() || part == "*" {
                    if part == "*" {
                        out.push(ImportSpec {
                            module: module.clone(),
                            member: None,
                            alias: None,
                        });
                    }
                    continue;
                }
                if let Some((name, alias)) = part.split_once(" as ") {
                    out.push(ImportSpec {
                        module: module.clone(),
                        member: Some(name.trim().to_string()),
                        alias: Some(alias.trim().to_string()),
                    });
                } else {
                    out.push(ImportSpec {
                        module: module.clone(),
                        member: Some(part.to_string()),
                        alias: None,
                    });
                }
            }
        } else if let Some(m) = caps.name("mod2") {
            out.push(ImportSpec {
                module: m.as_str().to_string(),
                member: None,
                alias: caps.name("alias").map(|a| a.as_str().to_string()),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_function_span() {
        let code = b"def foo():\n    x = 1\n    return x\n\ndef bar():\n    pass\n";
        let out = python_symbols_and_calls(code);
        assert_eq!(out.symbols.len(), 2);
        assert_eq!(out.symbols[0].name, "foo");
        assert_eq!(out.symbols[0].start_line, 1);
        assert_eq!(out.symbols[0].end_line, 3);
    }

    #[test]
    fn recovers_member_call_leaf_name() {
        let code = b"def foo():\n    obj.bar(1, 2)\n    baz()\n";
        let out = python_symbols_and_calls(code);
        let names: Vec<&str> = out.calls.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"bar"));
        assert!(names.contains(&"baz"));
    }

    #[test]
    fn parses_from_import_with_alias() {
        let imports = python_imports(b"from pkg.sub import a as b, c\nimport os\n");
        assert!(imports.iter().any(|i| i.module == "pkg.sub" && i.alias.as_deref() == Some("b")));
        assert!(imports.iter().any(|i| i.module == "os" && i.member.is_none()));
    }

    #[test]
    fn parses_relative_import() {
        let imports = python_imports(b"from .b import foo\n");
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].module, ".b");
        assert_eq!(imports[0].member.as_deref(), Some("foo"));
    }
}
