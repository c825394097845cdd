//! Diagnostics produced by the compiler.
//!
//! User programs that break a static rule produce a [`CompileError`]. There is
//! no recovery: the first error aborts the pipeline and is handed back to the
//! caller. Defects in the compiler itself are not user errors and are reported
//! with [`ice!`] instead, which panics.

use std::path::PathBuf;

use colored::Colorize;

use crate::{frontend::intern::InternedSymbol, middle::ty::Type};

/// Reports an internal compiler error. Only used for states that a correct
/// compiler can never reach, e.g. registering the same RTL label twice.
macro_rules! ice {
    ($($arg:tt)*) => {
        ::std::panic!("internal compiler error: {}", ::std::format_args!($($arg)*))
    };
}

pub(crate) use ice;

/// Broad category of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorClass {
    #[strum(serialize = "scope")]
    Scope,
    #[strum(serialize = "type")]
    Type,
    #[strum(serialize = "control flow")]
    ControlFlow,
    #[strum(serialize = "driver")]
    Driver,
}

/// A kind of place in the program where two types are required to agree
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum TypeBoundary {
    /// Initializer of a `var` declaration must have the declared type
    #[strum(serialize = "declaration")]
    Declaration,
    /// Initializer of a global variable must have the declared type
    #[strum(serialize = "global initializer")]
    GlobalInitializer,
    /// Both sides of an assignment must have the same type
    #[strum(serialize = "assignment")]
    Assignment,
    /// Call argument type must match the parameter type
    #[strum(serialize = "function argument")]
    FunctionArgument,
    /// Returned value must match the callable's return type
    #[strum(serialize = "return")]
    Return,
    /// If conditions must be bool
    #[strum(serialize = "if condition")]
    IfCondition,
    /// While conditions must be bool
    #[strum(serialize = "while condition")]
    WhileCondition,
    /// Operands of unary and binary operators
    #[strum(serialize = "operand")]
    Operand,
    /// Sizes of allocations and list indices must be int64
    #[strum(serialize = "index")]
    Index,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /* Scope errors */
    /// The same name is used twice among the program's globals and callables
    DuplicateDefinition { name: InternedSymbol },
    /// A variable is declared twice in the same scope
    Redeclaration { name: InternedSymbol },
    UnknownVariable { name: InternedSymbol },
    UnknownFunction { name: InternedSymbol },
    UninitializedRead { name: InternedSymbol },

    /* Type errors */
    Mismatch {
        boundary: TypeBoundary,
        expected: Type,
        actual: Type,
        expression: String,
    },
    NotAssignable { expression: String },
    NotAPointer { expression: String, actual: Type },
    NotAList { expression: String, actual: Type },
    ArityMismatch {
        function: InternedSymbol,
        expected: usize,
        actual: usize,
    },
    NotPrintable { expression: String, actual: Type },
    /// Lists and procedure results cannot be copied around as values
    NotAValue { expression: String, actual: Type },
    NonConstantGlobal { name: InternedSymbol },

    /* Control-flow errors */
    MissingReturn { function: InternedSymbol },
    MissingMain,
    MalformedMain { reason: &'static str },

    /* Driver errors */
    BadSourcePath { path: PathBuf },
    Io { path: PathBuf, message: String },
    ToolFailed { tool: String, status: String },
}

impl CompileError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CompileError::DuplicateDefinition { .. }
            | CompileError::Redeclaration { .. }
            | CompileError::UnknownVariable { .. }
            | CompileError::UnknownFunction { .. }
            | CompileError::UninitializedRead { .. } => ErrorClass::Scope,
            CompileError::Mismatch { .. }
            | CompileError::NotAssignable { .. }
            | CompileError::NotAPointer { .. }
            | CompileError::NotAList { .. }
            | CompileError::ArityMismatch { .. }
            | CompileError::NotPrintable { .. }
            | CompileError::NotAValue { .. }
            | CompileError::NonConstantGlobal { .. } => ErrorClass::Type,
            CompileError::MissingReturn { .. }
            | CompileError::MissingMain
            | CompileError::MalformedMain { .. } => ErrorClass::ControlFlow,
            CompileError::BadSourcePath { .. }
            | CompileError::Io { .. }
            | CompileError::ToolFailed { .. } => ErrorClass::Driver,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        CompileError::Io {
            path: path.into(),
            message: error.to_string(),
        }
    }
}

impl core::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: ", self.class(), "error".red())?;

        match self {
            CompileError::DuplicateDefinition { name } => {
                write!(f, "`{name}` is defined more than once")
            }
            CompileError::Redeclaration { name } => {
                write!(f, "variable `{name}` already declared in this scope")
            }
            CompileError::UnknownVariable { name } => write!(f, "unknown variable `{name}`"),
            CompileError::UnknownFunction { name } => {
                write!(f, "unknown function or procedure `{name}`")
            }
            CompileError::UninitializedRead { name } => {
                write!(f, "read from uninitialized variable `{name}`")
            }
            CompileError::Mismatch {
                boundary,
                expected,
                actual,
                expression,
            } => write!(
                f,
                "type mismatch in {boundary} on \"{expression}\": expected {}, got {}",
                expected.colored(),
                actual.colored()
            ),
            CompileError::NotAssignable { expression } => {
                write!(f, "cannot assign to \"{expression}\"")
            }
            CompileError::NotAPointer { expression, actual } => write!(
                f,
                "cannot dereference \"{expression}\" of non-pointer type {}",
                actual.colored()
            ),
            CompileError::NotAList { expression, actual } => write!(
                f,
                "cannot index \"{expression}\" of non-list type {}",
                actual.colored()
            ),
            CompileError::ArityMismatch {
                function,
                expected,
                actual,
            } => write!(
                f,
                "`{function}` expects {expected} argument(s), got {actual}"
            ),
            CompileError::NotPrintable { expression, actual } => write!(
                f,
                "cannot print \"{expression}\" of type {}",
                actual.colored()
            ),
            CompileError::NotAValue { expression, actual } => write!(
                f,
                "\"{expression}\" of type {} cannot be used as a value",
                actual.colored()
            ),
            CompileError::NonConstantGlobal { name } => {
                write!(f, "global variable `{name}` must be initialized with a constant")
            }
            CompileError::MissingReturn { function } => {
                write!(f, "function `{function}` does not return in every code path")
            }
            CompileError::MissingMain => write!(f, "cannot find main() procedure"),
            CompileError::MalformedMain { reason } => write!(f, "main() {reason}"),
            CompileError::BadSourcePath { path } => write!(
                f,
                "bad file name `{}`: expected a `.bx` source file",
                path.display()
            ),
            CompileError::Io { path, message } => {
                write!(f, "could not access `{}`: {message}", path.display())
            }
            CompileError::ToolFailed { tool, status } => {
                write!(f, "`{tool}` did not run successfully ({status})")
            }
        }
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_classified() {
        let scope = CompileError::UnknownVariable {
            name: InternedSymbol::new("x"),
        };
        let ty = CompileError::NotAssignable {
            expression: "1 + 2".into(),
        };
        let flow = CompileError::MissingReturn {
            function: InternedSymbol::new("f"),
        };

        assert_eq!(scope.class(), ErrorClass::Scope);
        assert_eq!(ty.class(), ErrorClass::Type);
        assert_eq!(flow.class(), ErrorClass::ControlFlow);
        assert_eq!(CompileError::MissingMain.class(), ErrorClass::ControlFlow);
    }

    #[test]
    fn messages_name_the_offender() {
        let error = CompileError::Mismatch {
            boundary: TypeBoundary::Assignment,
            expected: Type::Int64,
            actual: Type::Bool,
            expression: "true".into(),
        };
        let message = strip_ansi_escapes::strip_str(error.to_string());

        assert!(message.starts_with("type error: "), "{message}");
        assert!(message.contains("expected int64, got bool"), "{message}");
        assert!(message.contains("\"true\""), "{message}");
    }

    #[test]
    #[should_panic(expected = "internal compiler error: broken invariant 7")]
    fn ice_panics_with_prefix() {
        ice!("broken invariant {}", 7);
    }
}
