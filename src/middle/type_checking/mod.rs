//! Type Checker
//!
//! A single traversal over the program that annotates every expression with
//! its type and assignability and rejects programs which break a static rule.
//! Names are resolved against a stack of scopes: the globals, then the
//! parameters of the callable being checked (which the top level statements
//! of its body share), then one scope per nested block.
//!
//! The first error aborts the whole check. Once a program passes, later stages
//! never report user errors.

use hashbrown::HashMap;
use log::{debug, info, trace};

use crate::{
    error::{CompileError, TypeBoundary},
    frontend::{
        ast::{
            BinaryOperatorClass, Block, Callable, Expression, ExpressionKind, GlobalVariable,
            Program, Statement, UnaryOperatorKind,
        },
        intern::InternedSymbol,
    },
    middle::ty::Type,
};


macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .unwrap_or("<unknown>")
    }};
}

/// Returns the error from the enclosing function. With `error-backtrace`
/// enabled the location in the checker which raised it is logged as well.
macro_rules! report_error {
    ($error:expr $(,)?) => {{
        let error: CompileError = $error;

        #[cfg(feature = "error-backtrace")]
        debug!(
            "{} error raised by {}::{} (at {}:{}:{})",
            error.class(),
            module_path!(),
            function!(),
            file!(),
            line!(),
            column!()
        );

        return Err(error);
    }};
}

#[derive(Debug, Clone)]
struct Signature {
    parameters: Vec<Type>,
    return_type: Type,
}

#[derive(Debug, Clone)]
struct VariableInfo {
    ty: Type,
    initialized: bool,
}

type Scope = HashMap<InternedSymbol, VariableInfo>;

#[derive(Debug, Default)]
struct TypeChecker {
    signatures: HashMap<InternedSymbol, Signature>,
    /// Innermost scope last
    scopes: Vec<Scope>,
    /// Return type of the callable currently being checked
    return_type: Option<Type>,
}

/// A program which passed type checking. Only [`type_check_program`] hands
/// these out, so lowering never sees an unannotated tree.
#[derive(Debug, Clone, Copy)]
pub struct CheckedProgram<'a>(&'a Program);

impl<'a> CheckedProgram<'a> {
    pub fn program(self) -> &'a Program {
        self.0
    }
}

/// Type checks the whole program, annotating it in place
pub fn type_check_program(program: &mut Program) -> Result<CheckedProgram<'_>, CompileError> {
    info!(
        "type checking {} global(s) and {} callable(s)",
        program.globals().len(),
        program.callables().len()
    );

    let mut checker = TypeChecker::default();

    for callable in program.callables() {
        let signature = checker.compute_signature(callable)?;
        checker.signatures.insert(callable.name, signature);
    }

    let mut globals = Scope::new();
    for global in program.globals_mut() {
        checker.check_global(global)?;
        globals.insert(
            global.name,
            VariableInfo {
                ty: global.ty.clone(),
                initialized: true,
            },
        );
    }
    checker.scopes.push(globals);

    for callable in program.callables_mut() {
        checker.check_callable(callable)?;
    }

    match checker.signatures.get(&InternedSymbol::new("main")) {
        None => report_error!(CompileError::MissingMain),
        Some(signature) if !signature.return_type.is_unknown() => {
            report_error!(CompileError::MalformedMain {
                reason: "must be a procedure, not a function",
            })
        }
        Some(signature) if !signature.parameters.is_empty() => {
            report_error!(CompileError::MalformedMain {
                reason: "must not take any parameters",
            })
        }
        Some(_) => {}
    }

    Ok(CheckedProgram(program))
}

impl TypeChecker {
    fn compute_signature(&self, callable: &Callable) -> Result<Signature, CompileError> {
        for parameter in &callable.parameters {
            if matches!(parameter.ty, Type::List { .. } | Type::Unknown) {
                report_error!(CompileError::NotAValue {
                    expression: format!("{} : {}", parameter.name, parameter.ty),
                    actual: parameter.ty.clone(),
                });
            }
        }

        if let Type::List { .. } = callable.return_type {
            report_error!(CompileError::NotAValue {
                expression: format!("{}(...)", callable.name),
                actual: callable.return_type.clone(),
            });
        }

        Ok(Signature {
            parameters: callable.parameters.iter().map(|p| p.ty.clone()).collect(),
            return_type: callable.return_type.clone(),
        })
    }

    fn check_global(&mut self, global: &mut GlobalVariable) -> Result<(), CompileError> {
        if global.initializer.constant_value().is_none() {
            report_error!(CompileError::NonConstantGlobal { name: global.name });
        }

        // Constants never look anything up so no scope is needed yet
        self.check_expression(&mut global.initializer)?;

        let expected = match &global.ty {
            Type::List { .. } => Type::Int64,
            ty => ty.clone(),
        };

        if !expected.matches(global.initializer.ty()) {
            report_error!(CompileError::Mismatch {
                boundary: TypeBoundary::GlobalInitializer,
                expected,
                actual: global.initializer.ty().clone(),
                expression: global.initializer.to_string(),
            });
        }

        Ok(())
    }

    fn check_callable(&mut self, callable: &mut Callable) -> Result<(), CompileError> {
        debug!("type checking `{}`", callable.name);

        let mut parameters = Scope::new();
        for parameter in &callable.parameters {
            let info = VariableInfo {
                ty: parameter.ty.clone(),
                initialized: true,
            };

            if parameters.insert(parameter.name, info).is_some() {
                report_error!(CompileError::Redeclaration {
                    name: parameter.name,
                });
            }
        }

        self.scopes.push(parameters);
        self.return_type = Some(callable.return_type.clone());

        let result = callable
            .body
            .statements
            .iter_mut()
            .try_for_each(|statement| self.check_statement(statement));

        self.return_type = None;
        self.scopes.pop();
        result?;

        if !callable.is_procedure() && !callable.body.always_returns() {
            report_error!(CompileError::MissingReturn {
                function: callable.name,
            });
        }

        Ok(())
    }

    fn lookup(&mut self, name: InternedSymbol) -> Option<&mut VariableInfo> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(&name))
    }

    fn check_block(&mut self, block: &mut Block) -> Result<(), CompileError> {
        self.scopes.push(Scope::new());

        let result = block
            .statements
            .iter_mut()
            .try_for_each(|statement| self.check_statement(statement));

        self.scopes.pop();
        result
    }

    fn check_statement(&mut self, statement: &mut Statement) -> Result<(), CompileError> {
        match statement {
            Statement::Assign { lhs, rhs } => {
                self.check_place(lhs)?;
                self.require_value(lhs)?;
                self.check_expression_of_type(rhs, lhs.ty(), TypeBoundary::Assignment)?;

                if let ExpressionKind::Variable(name) = lhs.kind {
                    if let Some(info) = self.lookup(name) {
                        info.initialized = true;
                    }
                }
            }
            Statement::Eval(expression) => self.check_expression(expression)?,
            Statement::Print(expression) => {
                self.check_expression(expression)?;

                if !matches!(expression.ty(), Type::Int64 | Type::Bool) {
                    report_error!(CompileError::NotPrintable {
                        expression: expression.to_string(),
                        actual: expression.ty().clone(),
                    });
                }
            }
            Statement::Block(block) => self.check_block(block)?,
            Statement::IfElse {
                condition,
                positive,
                negative,
            } => {
                self.check_expression_of_type(condition, &Type::Bool, TypeBoundary::IfCondition)?;
                self.check_block(positive)?;

                if let Some(negative) = negative {
                    self.check_block(negative)?;
                }
            }
            Statement::While { condition, body } => {
                self.check_expression_of_type(
                    condition,
                    &Type::Bool,
                    TypeBoundary::WhileCondition,
                )?;
                self.check_block(body)?;
            }
            Statement::Declare {
                name,
                ty,
                initializer,
            } => {
                let name = *name;
                let is_declared_here = self
                    .scopes
                    .last()
                    .is_some_and(|scope| scope.contains_key(&name));

                if is_declared_here {
                    report_error!(CompileError::Redeclaration { name });
                }

                // A list initializer is the number of bytes to clear, never a
                // list value
                let expected = match &*ty {
                    Type::List { .. } => Type::Int64,
                    other => other.clone(),
                };

                if let Some(initializer) = initializer.as_mut() {
                    self.check_expression_of_type(
                        initializer,
                        &expected,
                        TypeBoundary::Declaration,
                    )?;
                }

                let info = VariableInfo {
                    ty: ty.clone(),
                    initialized: initializer.is_some() || matches!(ty, Type::List { .. }),
                };

                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name, info);
                }
            }
            Statement::Return(value) => {
                let expected = self.return_type.clone().unwrap_or(Type::Unknown);

                match value {
                    Some(value) if expected.is_unknown() => {
                        self.check_expression(value)?;

                        report_error!(CompileError::Mismatch {
                            boundary: TypeBoundary::Return,
                            expected,
                            actual: value.ty().clone(),
                            expression: value.to_string(),
                        });
                    }
                    Some(value) => {
                        self.check_expression_of_type(value, &expected, TypeBoundary::Return)?
                    }
                    None if !expected.is_unknown() => {
                        report_error!(CompileError::Mismatch {
                            boundary: TypeBoundary::Return,
                            expected,
                            actual: Type::Unknown,
                            expression: "return".into(),
                        });
                    }
                    None => {}
                }
            }
        }

        Ok(())
    }

    /// Checks an expression whose type must match `expected`. `null` matches
    /// every pointer type.
    fn check_expression_of_type(
        &mut self,
        expression: &mut Expression,
        expected: &Type,
        boundary: TypeBoundary,
    ) -> Result<(), CompileError> {
        self.check_expression(expression)?;

        if !expected.matches(expression.ty()) {
            report_error!(CompileError::Mismatch {
                boundary,
                expected: expected.clone(),
                actual: expression.ty().clone(),
                expression: expression.to_string(),
            });
        }

        self.require_value(expression)
    }

    /// Lists and procedure calls have no value that fits in a register
    fn require_value(&self, expression: &Expression) -> Result<(), CompileError> {
        if matches!(expression.ty(), Type::List { .. } | Type::Unknown) {
            report_error!(CompileError::NotAValue {
                expression: expression.to_string(),
                actual: expression.ty().clone(),
            });
        }

        Ok(())
    }

    /// Checks an expression which denotes a memory location: the left hand
    /// side of an assignment or the operand of `&`. A bare variable used as a
    /// place does not need to be initialized.
    fn check_place(&mut self, expression: &mut Expression) -> Result<(), CompileError> {
        let ty = match &mut expression.kind {
            ExpressionKind::Variable(name) => {
                let name = *name;
                match self.lookup(name) {
                    Some(info) => Some(info.ty.clone()),
                    None => report_error!(CompileError::UnknownVariable { name }),
                }
            }
            ExpressionKind::Dereference(operand) => Some(self.check_dereference(operand)?),
            ExpressionKind::Index { list, index } => Some(self.check_index(list, index)?),
            _ => None,
        };

        let Some(ty) = ty else {
            report_error!(CompileError::NotAssignable {
                expression: expression.to_string(),
            });
        };

        trace!("place `{expression}` has type {ty}");

        expression.meta.ty = ty;
        expression.meta.is_assignable = true;

        Ok(())
    }

    fn check_dereference(&mut self, operand: &mut Expression) -> Result<Type, CompileError> {
        self.check_expression(operand)?;

        match operand.ty().pointee_type() {
            Some(pointee) if !pointee.is_unknown() => Ok(pointee.clone()),
            _ => report_error!(CompileError::NotAPointer {
                expression: operand.to_string(),
                actual: operand.ty().clone(),
            }),
        }
    }

    fn check_index(
        &mut self,
        list: &mut Expression,
        index: &mut Expression,
    ) -> Result<Type, CompileError> {
        self.check_place(list)?;

        let Some(element) = list.ty().element_type().cloned() else {
            report_error!(CompileError::NotAList {
                expression: list.to_string(),
                actual: list.ty().clone(),
            });
        };

        self.check_expression_of_type(index, &Type::Int64, TypeBoundary::Index)?;

        Ok(element)
    }

    fn check_expression(&mut self, expression: &mut Expression) -> Result<(), CompileError> {
        let mut is_assignable = false;

        let ty = match &mut expression.kind {
            ExpressionKind::Variable(name) => {
                let name = *name;
                is_assignable = true;

                match self.lookup(name) {
                    Some(info) if info.initialized => info.ty.clone(),
                    Some(_) => report_error!(CompileError::UninitializedRead { name }),
                    None => report_error!(CompileError::UnknownVariable { name }),
                }
            }
            ExpressionKind::IntConstant(_) => Type::Int64,
            ExpressionKind::BoolConstant(_) => Type::Bool,
            ExpressionKind::Null => Type::null(),
            ExpressionKind::Unary { operator, operand } => {
                let ty = match operator {
                    UnaryOperatorKind::Negate | UnaryOperatorKind::BitwiseNot => Type::Int64,
                    UnaryOperatorKind::LogicalNot => Type::Bool,
                };

                self.check_expression_of_type(operand, &ty, TypeBoundary::Operand)?;
                ty
            }
            ExpressionKind::Binary { lhs, operator, rhs } => match operator.class() {
                BinaryOperatorClass::Arithmetic => {
                    self.check_expression_of_type(lhs, &Type::Int64, TypeBoundary::Operand)?;
                    self.check_expression_of_type(rhs, &Type::Int64, TypeBoundary::Operand)?;
                    Type::Int64
                }
                BinaryOperatorClass::Relational => {
                    self.check_expression_of_type(lhs, &Type::Int64, TypeBoundary::Operand)?;
                    self.check_expression_of_type(rhs, &Type::Int64, TypeBoundary::Operand)?;
                    Type::Bool
                }
                BinaryOperatorClass::Logical => {
                    self.check_expression_of_type(lhs, &Type::Bool, TypeBoundary::Operand)?;
                    self.check_expression_of_type(rhs, &Type::Bool, TypeBoundary::Operand)?;
                    Type::Bool
                }
                BinaryOperatorClass::Equality => {
                    self.check_expression(lhs)?;
                    self.require_value(lhs)?;
                    let expected = lhs.ty().clone();
                    self.check_expression_of_type(rhs, &expected, TypeBoundary::Operand)?;
                    Type::Bool
                }
            },
            ExpressionKind::Call {
                function,
                arguments,
            } => {
                let function = *function;
                let Some(signature) = self.signatures.get(&function).cloned() else {
                    report_error!(CompileError::UnknownFunction { name: function });
                };

                if signature.parameters.len() != arguments.len() {
                    report_error!(CompileError::ArityMismatch {
                        function,
                        expected: signature.parameters.len(),
                        actual: arguments.len(),
                    });
                }

                for (argument, parameter) in arguments.iter_mut().zip(&signature.parameters) {
                    self.check_expression_of_type(
                        argument,
                        parameter,
                        TypeBoundary::FunctionArgument,
                    )?;
                }

                signature.return_type
            }
            ExpressionKind::AddressOf(operand) => {
                self.check_place(operand)?;
                Type::pointer_to(operand.ty().clone())
            }
            ExpressionKind::Dereference(operand) => {
                is_assignable = true;
                self.check_dereference(operand)?
            }
            ExpressionKind::Index { list, index } => {
                is_assignable = true;
                self.check_index(list, index)?
            }
            ExpressionKind::Alloc { ty, size } => {
                let ty = ty.clone();
                self.check_expression_of_type(size, &Type::Int64, TypeBoundary::Index)?;
                Type::pointer_to(ty)
            }
        };

        trace!("expression `{expression}` has type {ty}");

        expression.meta.ty = ty;
        expression.meta.is_assignable = is_assignable;

        Ok(())
    }
}
