//! Tree-sitter backed `ParserFacade`. Compiles one query per
//! functions/classes/calls/imports concern per registered language at
//! construction time and evaluates them per file.

use std::collections::HashMap;

use streaming_iterator::StreamingIterator;
use tree_sitter::{Language as TsLanguage, Node, Parser, Query, QueryCursor};

use super::{Call, ImportSpec, ParseOutcome, ParserFacade, Symbol, SymbolKind};
use crate::lang::Language;

struct CompiledLanguage {
    ts_language: TsLanguage,
    functions: Option<Query>,
    classes: Option<Query>,
    calls: Option<Query>,
    imports: Option<Query>,
}

pub struct TreeSitterFacade {
    languages: HashMap<Language, CompiledLanguage>,
}

impl Default for TreeSitterFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeSitterFacade {
    pub fn new() -> Self {
        let mut languages = HashMap::new();

        insert_lang(
            &mut languages,
            Language::Python,
            tree_sitter_python::LANGUAGE.into(),
            &["function_definition"],
            &["class_definition"],
            &["call"],
            Some(PYTHON_IMPORTS_QUERY),
        );
        insert_lang(
            &mut languages,
            Language::JavaScript,
            tree_sitter_javascript::LANGUAGE.into(),
            &["function_declaration", "arrow_function", "method_definition"],
            &["class_declaration"],
            &["call_expression", "new_expression"],
            Some(JS_IMPORTS_QUERY),
        );
        insert_lang(
            &mut languages,
            Language::TypeScript,
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            &["function_declaration", "arrow_function", "method_definition"],
            &["class_declaration"],
            &["call_expression", "new_expression"],
            Some(JS_IMPORTS_QUERY),
        );
        insert_lang(
            &mut languages,
            Language::Rust,
            tree_sitter_rust::LANGUAGE.into(),
            &["function_item"],
            &["struct_item", "enum_item", "impl_item"],
            &["call_expression"],
            None,
        );
        insert_lang(
            &mut languages,
            Language::Go,
            tree_sitter_go::LANGUAGE.into(),
            &["function_declaration", "method_declaration"],
            &["type_declaration"],
            &["call_expression"],
            None,
        );
        insert_lang(
            &mut languages,
            Language::Java,
            tree_sitter_java::LANGUAGE.into(),
            &["method_declaration", "constructor_declaration"],
            &["class_declaration", "interface_declaration", "enum_declaration"],
            &["method_invocation", "object_creation_expression"],
            None,
        );

        Self { languages }
    }

    fn parse_tree<'a>(
        &self,
        ts_language: &TsLanguage,
        code: &'a [u8],
    ) -> Option<tree_sitter::Tree> {
        let mut parser = Parser::new();
        parser.set_language(ts_language).ok()?;
        parser.parse(code, None)
    }
}

const PYTHON_IMPORTS_QUERY: &str = r#"
(import_statement name: (dotted_name) @module)
(import_statement name: (dotted_name) @module (aliased_import (identifier) @alias))
(import_from_statement module_name: (dotted_name) @module)
(import_from_statement module_name: (dotted_name) @module (import_list (aliased_import (identifier) @member)))
(import_from_statement module_name: (dotted_name) @module (import_list (dotted_name (identifier) @member)))
(import_from_statement (relative_import) @module)
(import_from_statement (relative_import) @module (import_list (aliased_import (identifier) @member)))
"#;

const JS_IMPORTS_QUERY: &str = r#"
(import_statement source: (string) @module)
(import_statement (import_clause (named_imports (import_specifier (identifier) @member))) source: (string) @module)
(import_statement (import_clause (namespace_import (identifier) @alias)) source: (string) @module)
"#;

fn insert_lang(
    map: &mut HashMap<Language, CompiledLanguage>,
    lang: Language,
    ts_language: TsLanguage,
    function_kinds: &[&str],
    class_kinds: &[&str],
    call_kinds: &[&str],
    imports_src: Option<&str>,
) {
    let func_pattern = function_kinds
        .iter()
        .map(|k| format!("({k}) @function"))
        .collect::<Vec<_>>()
        .join(" ");
    let class_pattern = class_kinds
        .iter()
        .map(|k| format!("({k}) @class"))
        .collect::<Vec<_>>()
        .join(" ");
    let call_pattern = call_kinds
        .iter()
        .map(|k| format!("({k}) @call"))
        .collect::<Vec<_>>()
        .join(" ");

    let functions = Query::new(&ts_language, &func_pattern).ok();
    let classes = Query::new(&ts_language, &class_pattern).ok();
    let calls = Query::new(&ts_language, &call_pattern).ok();
    let imports = imports_src.and_then(|src| Query::new(&ts_language, src).ok());

    map.insert(
        lang,
        CompiledLanguage {
            ts_language,
            functions,
            classes,
            calls,
            imports,
        },
    );
}

fn node_text<'a>(node: Node, code: &'a [u8]) -> &'a str {
    node.utf8_text(code).unwrap_or("")
}

/// Promote a bare `identifier` capture to its parent definition node so the
/// line span and name extraction below see a full def/class node.
fn promote_if_identifier<'tree>(node: Node<'tree>) -> (Node<'tree>, bool) {
    if node.kind() == "identifier" {
        if let Some(parent) = node.parent() {
            return (parent, true);
        }
    }
    (node, false)
}

fn extract_name(node: Node, code: &[u8]) -> String {
    node.child_by_field_name("name")
        .map(|n| node_text(n, code).to_string())
        .unwrap_or_default()
}

fn callee_name(lang: Language, node: Node, code: &[u8]) -> String {
    match lang {
        Language::Python if node.kind() == "call" => {
            let Some(func) = node.child_by_field_name("function") else {
                return String::new();
            };
            match func.kind() {
                "identifier" => node_text(func, code).to_string(),
                "attribute" => func
                    .child_by_field_name("attribute")
                    .map(|a| node_text(a, code).to_string())
                    .unwrap_or_else(|| node_text(func, code).to_string()),
                _ => String::new(),
            }
        }
        Language::JavaScript | Language::TypeScript if node.kind() == "call_expression" => {
            let Some(func) = node.child_by_field_name("function") else {
                return String::new();
            };
            match func.kind() {
                "identifier" | "property_identifier" => node_text(func, code).to_string(),
                "member_expression" => func
                    .child_by_field_name("property")
                    .map(|p| node_text(p, code).to_string())
                    .unwrap_or_else(|| node_text(func, code).to_string()),
                _ => String::new(),
            }
        }
        _ => {
            // Generic fallback: rightmost identifier-like child.
            let mut cursor = node.walk();
            node.children(&mut cursor)
                .filter(|c| c.kind().contains("identifier"))
                .last()
                .map(|c| node_text(c, code).to_string())
                .unwrap_or_default()
        }
    }
}

fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' && bytes[s.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[s.len() - 1] == b'\'')
        {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

impl ParserFacade for TreeSitterFacade {
    fn parse_symbols(&self, lang: Language, code: &[u8]) -> ParseOutcome {
        let Some(compiled) = self.languages.get(&lang) else {
            return ParseOutcome::default();
        };
        let Some(tree) = self.parse_tree(&compiled.ts_language, code) else {
            return ParseOutcome::default();
        };
        let root = tree.root_node();

        let mut symbols = Vec::new();
        let mut calls = Vec::new();

        if let Some(q) = &compiled.functions {
            run_def_query(q, root, code, SymbolKind::Function, &mut symbols);
        }
        if let Some(q) = &compiled.classes {
            run_def_query(q, root, code, SymbolKind::Class, &mut symbols);
        }
        if let Some(q) = &compiled.calls {
            run_call_query(q, root, code, lang, &mut calls);
        }

        ParseOutcome { symbols, calls }
    }

    fn parse_imports(&self, lang: Language, code: &[u8]) -> Vec<ImportSpec> {
        let Some(compiled) = self.languages.get(&lang) else {
            return Vec::new();
        };
        let Some(query) = &compiled.imports else {
            return Vec::new();
        };
        let Some(tree) = self.parse_tree(&compiled.ts_language, code) else {
            return Vec::new();
        };
        let root = tree.root_node();

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(query, root, code);
        let names = query.capture_names();

        let mut out = Vec::new();
        let mut current_module: Option<String> = None;
        while let Some(m) = matches.next() {
            for cap in m.captures {
                let cap_name = names[cap.index as usize];
                let text = node_text(cap.node, code).to_string();
                match cap_name {
                    "module" => {
                        current_module = Some(strip_quotes(&text));
                        if let Some(module) = &current_module {
                            out.push(ImportSpec {
                                module: module.clone(),
                                member: None,
                                alias: None,
                            });
                        }
                    }
                    "member" => {
                        if let Some(module) = &current_module {
                            out.push(ImportSpec {
                                module: module.clone(),
                                member: Some(text),
                                alias: None,
                            });
                        }
                    }
                    "alias" => {
                        if let Some(module) = &current_module {
                            out.push(ImportSpec {
                                module: module.clone(),
                                member: None,
                                alias: Some(text),
                            });
                        }
                    }
                    _ => {}
                }
            }
        }
        out
    }
}

fn run_def_query(
    query: &Query,
    root: Node,
    code: &[u8],
    kind: SymbolKind,
    out: &mut Vec<Symbol>,
) {
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, root, code);
    while let Some(m) = matches.next() {
        for cap in m.captures {
            let (node, _promoted) = promote_if_identifier(cap.node);
            let name = extract_name(node, code);
            if name.is_empty() {
                continue;
            }
            out.push(Symbol {
                kind,
                name,
                start_line: node.start_position().row as u32 + 1,
                end_line: node.end_position().row as u32 + 1,
            });
        }
    }
}

fn run_call_query(query: &Query, root: Node, code: &[u8], lang: Language, out: &mut Vec<Call>) {
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, root, code);
    while let Some(m) = matches.next() {
        for cap in m.captures {
            let node = cap.node;
            let name = callee_name(lang, node, code);
            if name.is_empty() {
                continue;
            }
            out.push(Call {
                name,
                start_line: node.start_position().row as u32 + 1,
                end_line: node.end_position().row as u32 + 1,
            });
        }
    }
}
