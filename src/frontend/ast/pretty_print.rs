//! Renders the AST back to source text. Binary operators are parenthesized
//! only where their binding priority requires it, so the output of a parsed
//! program reads like the program itself.

use core::fmt::{self, Write};

use itertools::Itertools;

use super::{
    BinaryOperatorClass, BinaryOperatorKind, Block, Callable, Expression, ExpressionKind,
    GlobalVariable, Program, Statement, UnaryOperatorKind,
};

const INDENT: &str = "    ";

const UNARY_PRIORITY: u8 = 70;
const POSTFIX_PRIORITY: u8 = 90;
const ATOM_PRIORITY: u8 = 100;

impl BinaryOperatorKind {
    pub fn binding_priority(self) -> u8 {
        match self {
            Self::LogicalOr => 3,
            Self::LogicalAnd => 6,
            Self::BitwiseOr => 10,
            Self::BitwiseXor => 20,
            Self::BitwiseAnd => 30,
            Self::Equals | Self::NotEquals => 33,
            Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo => 36,
            Self::ShiftLeft | Self::ShiftRight => 40,
            Self::Add | Self::Subtract => 50,
            Self::Multiply | Self::Divide | Self::Modulus => 60,
        }
    }
}

impl core::fmt::Display for BinaryOperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulus => "%",
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqualTo => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqualTo => ">=",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
            Self::BitwiseAnd => "&",
            Self::BitwiseOr => "|",
            Self::BitwiseXor => "^",
            Self::ShiftLeft => "<<",
            Self::ShiftRight => ">>",
        })
    }
}

impl core::fmt::Display for UnaryOperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LogicalNot => write!(f, "!"),
            Self::BitwiseNot => write!(f, "~"),
            Self::Negate => write!(f, "-"),
        }
    }
}

fn priority(expression: &Expression) -> u8 {
    match &expression.kind {
        ExpressionKind::IntConstant(value) if *value < 0 => UNARY_PRIORITY,
        ExpressionKind::Variable(_)
        | ExpressionKind::IntConstant(_)
        | ExpressionKind::BoolConstant(_)
        | ExpressionKind::Null
        | ExpressionKind::Call { .. } => ATOM_PRIORITY,
        ExpressionKind::Index { .. } => POSTFIX_PRIORITY,
        ExpressionKind::Unary { .. }
        | ExpressionKind::AddressOf(_)
        | ExpressionKind::Dereference(_)
        | ExpressionKind::Alloc { .. } => UNARY_PRIORITY,
        ExpressionKind::Binary { operator, .. } => operator.binding_priority(),
    }
}

fn write_expression(
    f: &mut impl Write,
    expression: &Expression,
    min_priority: u8,
) -> fmt::Result {
    let parenthesize = priority(expression) < min_priority;

    if parenthesize {
        f.write_char('(')?;
    }

    match &expression.kind {
        ExpressionKind::Variable(name) => write!(f, "{name}")?,
        ExpressionKind::IntConstant(value) => write!(f, "{value}")?,
        ExpressionKind::BoolConstant(value) => write!(f, "{value}")?,
        ExpressionKind::Null => f.write_str("null")?,
        ExpressionKind::Unary { operator, operand } => {
            write!(f, "{operator}")?;
            write_expression(f, operand, UNARY_PRIORITY + 1)?;
        }
        ExpressionKind::Binary { lhs, operator, rhs } => {
            let priority = operator.binding_priority();

            // Comparisons do not chain
            let lhs_priority = match operator.class() {
                BinaryOperatorClass::Relational | BinaryOperatorClass::Equality => priority + 1,
                BinaryOperatorClass::Arithmetic | BinaryOperatorClass::Logical => priority,
            };

            write_expression(f, lhs, lhs_priority)?;
            write!(f, " {operator} ")?;
            write_expression(f, rhs, priority + 1)?;
        }
        ExpressionKind::Call {
            function,
            arguments,
        } => {
            write!(f, "{function}(")?;
            for (i, argument) in arguments.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_expression(f, argument, 0)?;
            }
            f.write_char(')')?;
        }
        ExpressionKind::AddressOf(operand) => {
            f.write_char('&')?;
            write_expression(f, operand, UNARY_PRIORITY + 1)?;
        }
        ExpressionKind::Dereference(operand) => {
            f.write_char('*')?;
            write_expression(f, operand, UNARY_PRIORITY + 1)?;
        }
        ExpressionKind::Index { list, index } => {
            write_expression(f, list, POSTFIX_PRIORITY)?;
            f.write_char('[')?;
            write_expression(f, index, 0)?;
            f.write_char(']')?;
        }
        ExpressionKind::Alloc { ty, size } => {
            write!(f, "alloc {ty}[")?;
            write_expression(f, size, 0)?;
            f.write_char(']')?;
        }
    }

    if parenthesize {
        f.write_char(')')?;
    }

    Ok(())
}

impl core::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_expression(f, self, 0)
    }
}

fn write_block(f: &mut impl Write, block: &Block, depth: usize) -> fmt::Result {
    f.write_str("{\n")?;

    for statement in &block.statements {
        write_statement(f, statement, depth + 1)?;
    }

    write!(f, "{}}}", INDENT.repeat(depth))
}

fn write_statement(f: &mut impl Write, statement: &Statement, depth: usize) -> fmt::Result {
    f.write_str(&INDENT.repeat(depth))?;

    match statement {
        Statement::Assign { lhs, rhs } => writeln!(f, "{lhs} = {rhs};"),
        Statement::Eval(expression) => writeln!(f, "{expression};"),
        Statement::Print(expression) => writeln!(f, "print {expression};"),
        Statement::Block(block) => {
            write_block(f, block, depth)?;
            f.write_char('\n')
        }
        Statement::IfElse {
            condition,
            positive,
            negative,
        } => {
            write!(f, "if ({condition}) ")?;
            write_block(f, positive, depth)?;

            if let Some(negative) = negative {
                f.write_str(" else ")?;
                write_block(f, negative, depth)?;
            }

            f.write_char('\n')
        }
        Statement::While { condition, body } => {
            write!(f, "while ({condition}) ")?;
            write_block(f, body, depth)?;
            f.write_char('\n')
        }
        Statement::Declare {
            name,
            ty,
            initializer: Some(initializer),
        } => writeln!(f, "var {name} = {initializer} : {ty};"),
        Statement::Declare {
            name,
            ty,
            initializer: None,
        } => writeln!(f, "var {name} : {ty};"),
        Statement::Return(Some(value)) => writeln!(f, "return {value};"),
        Statement::Return(None) => writeln!(f, "return;"),
    }
}

impl core::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_statement(f, self, 0)
    }
}

impl core::fmt::Display for GlobalVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "var {} = {} : {};", self.name, self.initializer, self.ty)
    }
}

impl core::fmt::Display for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parameters = self
            .parameters
            .iter()
            .map(|parameter| format!("{} : {}", parameter.name, parameter.ty))
            .join(", ");

        if self.is_procedure() {
            write!(f, "proc {}({parameters}) ", self.name)?;
        } else {
            write!(f, "def {}({parameters}) : {} ", self.name, self.return_type)?;
        }

        write_block(f, &self.body, 0)?;
        f.write_char('\n')
    }
}

impl core::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for global in self.globals() {
            write!(f, "{global}")?;
        }

        for (i, callable) in self.callables().iter().enumerate() {
            if i > 0 || !self.globals().is_empty() {
                f.write_char('\n')?;
            }
            write!(f, "{callable}")?;
        }

        Ok(())
    }
}
