//! Annotated AST
//!
//! The tree is produced by the external parser (or by the constructors below)
//! with every [`Meta`] slot left at its default. The type checker fills in each
//! slot exactly once and everything after it reads the annotations.

use hashbrown::{HashMap, HashSet};

use super::intern::InternedSymbol;
use crate::{error::CompileError, middle::ty::Type};

pub mod pretty_print;

/// Annotation attached to every expression node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    pub ty: Type,
    pub is_assignable: bool,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            ty: Type::Unknown,
            is_assignable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    globals: Vec<GlobalVariable>,
    callables: Vec<Callable>,
    callable_indices: HashMap<InternedSymbol, usize>,
}

impl Program {
    /// Builds a program from its top level definitions, in source order. Fails
    /// if a name is defined twice, whether as two globals, two callables, or
    /// one of each.
    pub fn new(
        globals: Vec<GlobalVariable>,
        callables: Vec<Callable>,
    ) -> Result<Self, CompileError> {
        let mut global_names = HashSet::new();
        let mut callable_indices = HashMap::new();

        for global in &globals {
            if !global_names.insert(global.name) {
                return Err(CompileError::DuplicateDefinition { name: global.name });
            }
        }

        for (i, callable) in callables.iter().enumerate() {
            if global_names.contains(&callable.name)
                || callable_indices.insert(callable.name, i).is_some()
            {
                return Err(CompileError::DuplicateDefinition {
                    name: callable.name,
                });
            }
        }

        Ok(Self {
            globals,
            callables,
            callable_indices,
        })
    }

    pub fn globals(&self) -> &[GlobalVariable] {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut [GlobalVariable] {
        &mut self.globals
    }

    pub fn callables(&self) -> &[Callable] {
        &self.callables
    }

    pub fn callables_mut(&mut self) -> &mut [Callable] {
        &mut self.callables
    }

    pub fn callable(&self, name: InternedSymbol) -> Option<&Callable> {
        self.callable_indices.get(&name).map(|&i| &self.callables[i])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVariable {
    pub name: InternedSymbol,
    pub ty: Type,
    /// Must be a constant. For list globals this is an integer which is
    /// ignored, list storage always starts zeroed.
    pub initializer: Expression,
}

impl GlobalVariable {
    pub fn new(name: &str, ty: Type, initializer: Expression) -> Self {
        Self {
            name: name.into(),
            ty,
            initializer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: InternedSymbol,
    pub ty: Type,
}

impl Parameter {
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A function or a procedure. Procedures are callables whose return type is
/// [`Type::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callable {
    pub name: InternedSymbol,
    pub parameters: Vec<Parameter>,
    pub return_type: Type,
    pub body: Block,
}

impl Callable {
    pub fn procedure(name: &str, parameters: Vec<Parameter>, body: Block) -> Self {
        Self::function(name, parameters, Type::Unknown, body)
    }

    pub fn function(
        name: &str,
        parameters: Vec<Parameter>,
        return_type: Type,
        body: Block,
    ) -> Self {
        Self {
            name: name.into(),
            parameters,
            return_type,
            body,
        }
    }

    pub fn is_procedure(&self) -> bool {
        self.return_type.is_unknown()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub statements: Vec<Statement>,
}

impl Block {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    pub fn always_returns(&self) -> bool {
        self.statements.iter().rev().any(Statement::always_returns)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `place = value;`
    Assign { lhs: Expression, rhs: Expression },
    /// `e;` (only useful for calls)
    Eval(Expression),
    Print(Expression),
    Block(Block),
    IfElse {
        condition: Expression,
        positive: Block,
        negative: Option<Block>,
    },
    While { condition: Expression, body: Block },
    /// `var name = initializer : ty;`
    Declare {
        name: InternedSymbol,
        ty: Type,
        initializer: Option<Expression>,
    },
    Return(Option<Expression>),
}

impl Statement {
    pub fn assign(lhs: Expression, rhs: Expression) -> Self {
        Self::Assign { lhs, rhs }
    }

    pub fn declare(name: &str, ty: Type, initializer: Option<Expression>) -> Self {
        Self::Declare {
            name: name.into(),
            ty,
            initializer,
        }
    }

    pub fn if_else(condition: Expression, positive: Block, negative: Option<Block>) -> Self {
        Self::IfElse {
            condition,
            positive,
            negative,
        }
    }

    pub fn while_loop(condition: Expression, body: Block) -> Self {
        Self::While { condition, body }
    }

    /// Structural return coverage: a `return` covers its path, an if/else
    /// covers it when both branches do, and a block when any of its statements
    /// does.
    pub fn always_returns(&self) -> bool {
        match self {
            Statement::Return(_) => true,
            Statement::IfElse {
                positive,
                negative: Some(negative),
                ..
            } => positive.always_returns() && negative.always_returns(),
            Statement::Block(block) => block.always_returns(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionKind {
    Variable(InternedSymbol),
    IntConstant(i64),
    BoolConstant(bool),
    Null,
    Unary {
        operator: UnaryOperatorKind,
        operand: Box<Expression>,
    },
    Binary {
        lhs: Box<Expression>,
        operator: BinaryOperatorKind,
        rhs: Box<Expression>,
    },
    Call {
        function: InternedSymbol,
        arguments: Vec<Expression>,
    },
    AddressOf(Box<Expression>),
    Dereference(Box<Expression>),
    Index {
        list: Box<Expression>,
        index: Box<Expression>,
    },
    /// `alloc ty[size]`
    Alloc { ty: Type, size: Box<Expression> },
}

impl Expression {
    pub fn new(kind: ExpressionKind) -> Self {
        Self {
            kind,
            meta: Meta::default(),
        }
    }

    pub fn variable(name: &str) -> Self {
        Self::new(ExpressionKind::Variable(name.into()))
    }

    pub fn int(value: i64) -> Self {
        Self::new(ExpressionKind::IntConstant(value))
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ExpressionKind::BoolConstant(value))
    }

    pub fn null() -> Self {
        Self::new(ExpressionKind::Null)
    }

    pub fn unary(operator: UnaryOperatorKind, operand: Expression) -> Self {
        Self::new(ExpressionKind::Unary {
            operator,
            operand: Box::new(operand),
        })
    }

    pub fn binary(lhs: Expression, operator: BinaryOperatorKind, rhs: Expression) -> Self {
        Self::new(ExpressionKind::Binary {
            lhs: Box::new(lhs),
            operator,
            rhs: Box::new(rhs),
        })
    }

    pub fn call(function: &str, arguments: Vec<Expression>) -> Self {
        Self::new(ExpressionKind::Call {
            function: function.into(),
            arguments,
        })
    }

    pub fn address_of(operand: Expression) -> Self {
        Self::new(ExpressionKind::AddressOf(Box::new(operand)))
    }

    pub fn dereference(operand: Expression) -> Self {
        Self::new(ExpressionKind::Dereference(Box::new(operand)))
    }

    pub fn index(list: Expression, index: Expression) -> Self {
        Self::new(ExpressionKind::Index {
            list: Box::new(list),
            index: Box::new(index),
        })
    }

    pub fn alloc(ty: Type, size: Expression) -> Self {
        Self::new(ExpressionKind::Alloc {
            ty,
            size: Box::new(size),
        })
    }

    pub fn ty(&self) -> &Type {
        &self.meta.ty
    }

    /// Literal values allowed as global initializers
    pub fn constant_value(&self) -> Option<i64> {
        match &self.kind {
            ExpressionKind::IntConstant(value) => Some(*value),
            ExpressionKind::BoolConstant(value) => Some(*value as i64),
            ExpressionKind::Null => Some(0),
            ExpressionKind::Unary {
                operator: UnaryOperatorKind::Negate,
                operand,
            } => match operand.kind {
                ExpressionKind::IntConstant(value) => Some(value.wrapping_neg()),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorKind {
    Add,                  // +
    Subtract,             // -
    Multiply,             // *
    Divide,               // /
    Modulus,              // %
    Equals,               // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=
    LogicalAnd,           // &&
    LogicalOr,            // ||
    BitwiseAnd,           // &
    BitwiseOr,            // |
    BitwiseXor,           // ^
    ShiftLeft,            // <<
    ShiftRight,           // >>
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorClass {
    /// int64 x int64 -> int64
    Arithmetic,
    /// int64 x int64 -> bool
    Relational,
    /// bool x bool -> bool
    Logical,
    /// T x T -> bool
    Equality,
}

impl BinaryOperatorKind {
    pub fn class(self) -> BinaryOperatorClass {
        match self {
            Self::Add
            | Self::Subtract
            | Self::Multiply
            | Self::Divide
            | Self::Modulus
            | Self::BitwiseAnd
            | Self::BitwiseOr
            | Self::BitwiseXor
            | Self::ShiftLeft
            | Self::ShiftRight => BinaryOperatorClass::Arithmetic,
            Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo => BinaryOperatorClass::Relational,
            Self::LogicalAnd | Self::LogicalOr => BinaryOperatorClass::Logical,
            Self::Equals | Self::NotEquals => BinaryOperatorClass::Equality,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperatorKind {
    LogicalNot, // !
    BitwiseNot, // ~
    Negate,     // -
}
