//! Everything between the annotated AST and machine code: the type model,
//! the type checker and RTL together with its lowering from the AST.

pub mod rtl;
pub mod ty;
pub mod type_checking;
