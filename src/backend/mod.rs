//! The backend turns RTL into x86-64 assembly. Every RTL instruction expands
//! to a fixed idiom over two scratch registers, and every pseudo gets its own
//! stack slot for the lifetime of its callable.

pub mod assemblers;
pub mod targets;

/// Knobs for assembly output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Echo every RTL instruction as a comment above its expansion
    pub emit_comments: bool,
}
