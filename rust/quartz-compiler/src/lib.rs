//! Quartz compiler
//!
//! Transforms Quartz source text into the AST the runtime executes: a UTF-8
//! validating reader, a strict tokenizer, and a recursive-descent parser
//! whose expression engine lowers straight into flat RPN unit streams.

pub mod compiler;

pub use compiler::ast;
pub use compiler::errors::{ParseError, ParseErrorCode};
pub use compiler::lexer::Lexer;
pub use compiler::parser::Parser;
pub use compiler::tokens::{Keyword, Punct, Span, Token, TokenKind};

use compiler::ast::Block;

/// Lex and parse a source buffer into a top-level statement block.
///
/// `filename` is recorded in source locations (backtraces, `__file`); errors
/// carry positions only, as the caller knows which file it handed over.
pub fn parse_source(source: &[u8], filename: &str) -> Result<Block, ParseError> {
    let tokens = Lexer::new(source)?.tokenize()?;
    Parser::new(tokens, filename).parse_program()
}
