//! Java grammar support.
//!
//! The crate consumes abstract syntax trees produced by tree-sitter with the
//! Java grammar. This module owns parser construction and source parsing;
//! everything downstream works on the resulting [`tree_sitter::Tree`].

use tree_sitter::{Parser, Tree};

use crate::error::{PropgraphError, Result};

/// Create a fresh parser configured for the Java grammar.
///
/// Each call returns a new parser instance; parsers are stateful and cheap
/// to construct.
pub fn parser() -> Result<Parser> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_java::LANGUAGE.into())
        .map_err(|e| PropgraphError::TreeSitter(format!("failed to load Java grammar: {e}")))?;
    Ok(parser)
}

/// Parse source text into a syntax tree.
///
/// `origin` is used only for error messages (a file path or `"<string>"`).
pub fn parse(source: &str, origin: &str) -> Result<Tree> {
    let mut parser = parser()?;
    parser
        .parse(source.as_bytes(), None)
        .ok_or_else(|| PropgraphError::Parse {
            file: origin.to_string(),
            message: "failed to parse source".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_loads_grammar() {
        assert!(parser().is_ok());
    }

    #[test]
    fn test_parse_simple_class() {
        let tree = parse("class A { void f() {} }", "<string>").unwrap();
        assert_eq!(tree.root_node().kind(), "program");
        assert!(!tree.root_node().has_error());
    }

    #[test]
    fn test_parse_is_error_tolerant() {
        // tree-sitter produces a tree even for broken input; downstream
        // construction skips what it does not recognize.
        let tree = parse("class { {{", "<string>").unwrap();
        assert_eq!(tree.root_node().kind(), "program");
    }
}
