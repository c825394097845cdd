//! The frontend owns the tree handed to us by the external parser: the
//! annotated AST and the identifier interner it refers to. Lexing and parsing
//! source text happens elsewhere.

pub mod ast;
pub mod intern;
