//! Per-language AST node-kind tables used by the parser facade and the
//! symbol/call extractor. Mirrors the node-type mappings a tree-sitter
//! based pipeline needs per language, plus a markdown entry used only for
//! `File.is_code` classification.

use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Rust,
    Go,
    Java,
    Markdown,
}

impl Language {
    pub fn name(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::Markdown => "markdown",
        }
    }

    /// The reflective-fallback language: the dynamic language for which a
    /// grammar-free scanner backs up tree-sitter when it is absent or
    /// produces nothing.
    pub fn is_fallback_language(self) -> bool {
        matches!(self, Language::Python)
    }
}

#[derive(Debug, Clone)]
pub struct LanguageConfig {
    pub lang: Language,
    pub file_extensions: &'static [&'static str],
    pub function_node_types: &'static [&'static str],
    pub class_node_types: &'static [&'static str],
    pub call_node_types: &'static [&'static str],
    pub name_field: &'static str,
    /// True for languages that materialize symbols/calls at all. Markdown
    /// is tracked only to classify files as non-code.
    pub is_code: bool,
}

pub struct LanguageRegistry {
    by_name: HashMap<&'static str, LanguageConfig>,
    by_extension: HashMap<&'static str, &'static str>,
}

fn table() -> &'static LanguageRegistry {
    static TABLE: OnceLock<LanguageRegistry> = OnceLock::new();
    TABLE.get_or_init(LanguageRegistry::build)
}

impl LanguageRegistry {
    fn build() -> Self {
        let configs = vec![
            LanguageConfig {
                lang: Language::Python,
                file_extensions: &["py"],
                function_node_types: &["function_definition"],
                class_node_types: &["class_definition"],
                call_node_types: &["call"],
                name_field: "name",
                is_code: true,
            },
            LanguageConfig {
                lang: Language::JavaScript,
                file_extensions: &["js", "jsx"],
                function_node_types: &[
                    "function_declaration",
                    "arrow_function",
                    "method_definition",
                ],
                class_node_types: &["class_declaration"],
                call_node_types: &["call_expression", "new_expression"],
                name_field: "name",
                is_code: true,
            },
            LanguageConfig {
                lang: Language::TypeScript,
                file_extensions: &["ts", "tsx"],
                function_node_types: &[
                    "function_declaration",
                    "arrow_function",
                    "method_definition",
                ],
                class_node_types: &["class_declaration"],
                call_node_types: &["call_expression", "new_expression"],
                name_field: "name",
                is_code: true,
            },
            LanguageConfig {
                lang: Language::Rust,
                file_extensions: &["rs"],
                function_node_types: &["function_item"],
                class_node_types: &["struct_item", "enum_item", "impl_item"],
                call_node_types: &["call_expression"],
                name_field: "name",
                is_code: true,
            },
            LanguageConfig {
                lang: Language::Go,
                file_extensions: &["go"],
                function_node_types: &["function_declaration", "method_declaration"],
                class_node_types: &["type_declaration"],
                call_node_types: &["call_expression"],
                name_field: "name",
                is_code: true,
            },
            LanguageConfig {
                lang: Language::Java,
                file_extensions: &["java"],
                function_node_types: &["method_declaration", "constructor_declaration"],
                class_node_types: &[
                    "class_declaration",
                    "interface_declaration",
                    "enum_declaration",
                ],
                call_node_types: &["method_invocation", "object_creation_expression"],
                name_field: "name",
                is_code: true,
            },
            LanguageConfig {
                lang: Language::Markdown,
                file_extensions: &["md", "markdown", "mdx"],
                function_node_types: &[],
                class_node_types: &[],
                call_node_types: &[],
                name_field: "name",
                is_code: false,
            },
        ];

        let mut by_name = HashMap::new();
        let mut by_extension = HashMap::new();
        for cfg in configs {
            for ext in cfg.file_extensions {
                by_extension.insert(*ext, cfg.lang.name());
            }
            by_name.insert(cfg.lang.name(), cfg);
        }
        Self { by_name, by_extension }
    }

    pub fn by_extension(ext: &str) -> Option<&'static LanguageConfig> {
        let name = *table().by_extension.get(ext)?;
        table().by_name.get(name)
    }

    pub fn by_language(lang: Language) -> Option<&'static LanguageConfig> {
        table().by_name.get(lang.name())
    }

    /// Whether a repo-relative path is considered code-bearing (has a
    /// registered, non-markdown language for its extension).
    pub fn is_code_path(path: &str) -> bool {
        let ext = crate::utils::extension_of(path);
        Self::by_extension(&ext).is_some_and(|c| c.is_code)
    }

    pub fn language_for_path(path: &str) -> Option<Language> {
        let ext = crate::utils::extension_of(path);
        Self::by_extension(&ext).map(|c| c.lang)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_python_by_extension() {
        assert_eq!(LanguageRegistry::language_for_path("src/a.py"), Some(Language::Python));
    }

    #[test]
    fn markdown_is_not_code() {
        assert!(!LanguageRegistry::is_code_path("README.md"));
        assert!(LanguageRegistry::is_code_path("src/a.rs"));
    }

    #[test]
    fn unknown_extension_has_no_language() {
        assert_eq!(LanguageRegistry::language_for_path("Makefile"), None);
    }
}
