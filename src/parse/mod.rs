//! Coarse symbol/call extraction facade. A primary tree-sitter-backed
//! implementation handles the registered grammars; Python additionally
//! carries a grammar-free reflective fallback used whenever the primary
//! parser is unavailable or yields nothing named.

mod fallback;
mod treesitter;

pub use treesitter::TreeSitterFacade;

use crate::lang::Language;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Class,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Function => "Function",
            SymbolKind::Class => "Class",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub symbols: Vec<Symbol>,
    pub calls: Vec<Call>,
}

impl ParseOutcome {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.calls.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub module: String,
    pub member: Option<String>,
    pub alias: Option<String>,
}

/// The parser facade contract: extract coarse symbols/calls and import
/// specs from source bytes. Implementations must report a missing grammar
/// as an empty `ParseOutcome` rather than erroring, so the orchestrator can
/// always fall through to a language-specific fallback.
pub trait ParserFacade: Send + Sync {
    fn parse_symbols(&self, lang: Language, code: &[u8]) -> ParseOutcome;
    fn parse_imports(&self, lang: Language, code: &[u8]) -> Vec<ImportSpec>;
}

/// Runs the primary facade and, for the fallback language, transparently
/// substitutes or merges in the reflective fallback when the primary
/// parser is absent or unproductive. Holds the facade behind an `Arc` so
/// the engine can be cheaply cloned across orchestrator/server task
/// boundaries without requiring the facade itself to be `Clone`.
#[derive(Clone)]
pub struct ExtractionEngine {
    facade: std::sync::Arc<dyn ParserFacade>,
}

impl ExtractionEngine {
    pub fn new(facade: impl ParserFacade + 'static) -> Self {
        Self {
            facade: std::sync::Arc::new(facade),
        }
    }

    pub fn extract_symbols(&self, lang: Language, code: &[u8]) -> ParseOutcome {
        let primary = self.facade.parse_symbols(lang, code);
        if lang.is_fallback_language() && primary.is_empty() {
            let fb = fallback::python_symbols_and_calls(code);
            if !fb.is_empty() {
                return fb;
            }
        }
        primary
    }

    pub fn extract_imports(&self, lang: Language, code: &[u8]) -> Vec<ImportSpec> {
        let primary = self.facade.parse_imports(lang, code);
        if lang.is_fallback_language() && primary.is_empty() {
            return fallback::python_imports(code);
        }
        primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyFacade;
    impl ParserFacade for EmptyFacade {
        fn parse_symbols(&self, _lang: Language, _code: &[u8]) -> ParseOutcome {
            ParseOutcome::default()
        }
        fn parse_imports(&self, _lang: Language, _code: &[u8]) -> Vec<ImportSpec> {
            Vec::new()
        }
    }

    #[test]
    fn falls_back_to_python_scanner_when_primary_empty() {
        let engine = ExtractionEngine::new(EmptyFacade);
        let code = b"def foo():\n    bar()\n";
        let out = engine.extract_symbols(Language::Python, code);
        assert!(!out.is_empty());
        assert_eq!(out.symbols[0].name, "foo");
    }

    #[test]
    fn non_fallback_language_stays_empty() {
        let engine = ExtractionEngine::new(EmptyFacade);
        let out = engine.extract_symbols(Language::Rust, b"fn foo() {}\n");
        assert!(out.is_empty());
    }
}
