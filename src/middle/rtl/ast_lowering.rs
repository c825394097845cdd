//! Lowers a type checked AST to RTL.
//!
//! Control flow is encoded by threading labels. `in_label` is where the next
//! instruction gets attached. Boolean expressions are lowered as jumps: they
//! fall through to `in_label` when true and jump to `false_label` when false.
//! Every straight line instruction goes through [`CallableLowering::add_sequential`].
//!
//! Locals live in pseudos unless they are lists or have their address taken,
//! in which case they get a slot in the frame below the frame pointer. Lists
//! grow upward from their base: element `i` is at `base + i * size_of(T)`.

use hashbrown::{HashMap, HashSet};
use log::{debug, info};

use super::{
    Address, BinaryCondition, BinaryOperator, Instruction, Label, Pseudo, UnaryCondition,
    UnaryOperator,
};
use crate::{
    backend::assemblers::x86_64::{ARGUMENT_REGISTERS, CALLEE_SAVED_REGISTERS, X86FullRegister},
    error::ice,
    frontend::{
        ast::{
            self, BinaryOperatorClass, BinaryOperatorKind, Block, Expression, ExpressionKind,
            Statement, UnaryOperatorKind,
        },
        intern::InternedSymbol,
    },
    index::Index,
    middle::{rtl, ty::Type, type_checking::CheckedProgram},
};

const BX_PRINT_INT: &str = "bx_print_int";
const BX_PRINT_BOOL: &str = "bx_print_bool";
const BX_PANIC: &str = "bx_panic";
const MEMSET: &str = "memset";
const CALLOC: &str = "calloc";

/// Whole-program state of the lowering pass. Pseudos and labels are numbered
/// monotonically across every callable so no two callables share an id.
#[derive(Debug)]
pub struct GenerationContext {
    next_pseudo: Pseudo,
    next_label: Label,
}

impl Default for GenerationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationContext {
    pub fn new() -> Self {
        Self {
            next_pseudo: Pseudo::new(0),
            next_label: Label::new(0),
        }
    }

    pub fn fresh_pseudo(&mut self) -> Pseudo {
        self.next_pseudo.post_increment()
    }

    pub fn fresh_label(&mut self) -> Label {
        self.next_label.post_increment()
    }
}

/// Lowers every callable of a checked program. The global table is computed
/// once up front.
pub fn lower_program(
    context: &mut GenerationContext,
    program: CheckedProgram<'_>,
) -> rtl::Program {
    let program = program.program();
    let globals = compute_globals(program);
    let global_names: HashSet<InternedSymbol> = globals.iter().map(|g| g.name).collect();

    info!(
        "lowering {} callable(s) to RTL ({} bytes of globals)",
        program.callables().len(),
        globals.iter().map(|g| g.ty.size_of()).sum::<usize>()
    );

    let callables = program
        .callables()
        .iter()
        .map(|callable| CallableLowering::lower(context, &global_names, callable))
        .collect();

    rtl::Program { globals, callables }
}

fn compute_globals(program: &ast::Program) -> Vec<rtl::Global> {
    let mut offset = 0;

    program
        .globals()
        .iter()
        .map(|global| {
            let initial_value = match global.ty {
                Type::List { .. } => 0,
                _ => global.initializer.constant_value().unwrap_or_else(|| {
                    ice!("global `{}` has a non-constant initializer", global.name)
                }),
            };

            let entry = rtl::Global {
                name: global.name,
                ty: global.ty.clone(),
                initial_value,
                offset,
            };

            offset += global.ty.size_of();
            entry
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum Location {
    Pseudo(Pseudo),
    /// Offset from the frame pointer of the lowest byte
    Frame(i64),
    Global(InternedSymbol),
}

struct CallableLowering<'a> {
    context: &'a mut GenerationContext,
    globals: &'a HashSet<InternedSymbol>,
    callable: rtl::Callable,

    in_label: Label,
    false_label: Label,

    /// Innermost scope last
    scopes: Vec<HashMap<InternedSymbol, Location>>,
    /// Names used under `&` anywhere in the callable
    escaping: HashSet<InternedSymbol>,
    /// Bytes of frame storage handed out so far
    frame_size: usize,
    /// Shared out of bounds handler, created on first use
    panic_label: Option<Label>,
}

impl<'a> CallableLowering<'a> {
    fn lower(
        context: &'a mut GenerationContext,
        globals: &'a HashSet<InternedSymbol>,
        source: &ast::Callable,
    ) -> rtl::Callable {
        debug!("lowering `{}` to RTL", source.name);

        let enter = context.fresh_label();
        let leave = context.fresh_label();
        let first = context.fresh_label();

        let mut escaping = HashSet::new();
        collect_escaping_block(&source.body, &mut escaping);

        let mut this = Self {
            context,
            globals,
            callable: rtl::Callable::new(source.name, enter, leave),
            in_label: first,
            false_label: first,
            scopes: vec![HashMap::new()],
            escaping,
            frame_size: 0,
            panic_label: None,
        };

        this.callable.input_pseudos = source
            .parameters
            .iter()
            .map(|_| this.context.fresh_pseudo())
            .collect();

        if !source.is_procedure() {
            this.callable.output_pseudo = Some(this.context.fresh_pseudo());
        }

        let saved: Vec<(X86FullRegister, Pseudo)> = CALLEE_SAVED_REGISTERS
            .iter()
            .map(|&register| {
                let pseudo = this.context.fresh_pseudo();
                this.add_sequential(|successor| Instruction::CopyFromMachine {
                    source: register,
                    destination: pseudo,
                    successor,
                });
                (register, pseudo)
            })
            .collect();

        for (i, parameter) in source.parameters.iter().enumerate() {
            let destination = this.callable.input_pseudos[i];

            match ARGUMENT_REGISTERS.get(i) {
                Some(&register) => this.add_sequential(|successor| Instruction::CopyFromMachine {
                    source: register,
                    destination,
                    successor,
                }),
                None => this.add_sequential(|successor| Instruction::LoadParameter {
                    slot: i - ARGUMENT_REGISTERS.len(),
                    destination,
                    successor,
                }),
            }

            let location = if this.escaping.contains(&parameter.name) {
                let offset = this.allocate_frame(parameter.ty.size_of());
                this.add_sequential(|successor| Instruction::Store {
                    source: destination,
                    address: Address::Frame(offset),
                    successor,
                });
                Location::Frame(offset)
            } else {
                Location::Pseudo(destination)
            };

            this.bind(parameter.name, location);
        }

        // Top level statements share the parameter scope
        for statement in &source.body.statements {
            this.lower_statement(statement);
        }

        let leave = this.callable.leave;
        this.callable
            .add_instruction(this.in_label, Instruction::Goto { successor: leave });

        this.in_label = leave;

        if let Some(output) = this.callable.output_pseudo {
            this.add_sequential(|successor| Instruction::CopyToMachine {
                source: output,
                destination: X86FullRegister::Rax,
                successor,
            });
        }

        for &(register, pseudo) in saved.iter().rev() {
            this.add_sequential(|successor| Instruction::CopyToMachine {
                source: pseudo,
                destination: register,
                successor,
            });
        }

        this.add_sequential(|successor| Instruction::DeleteFrame { successor });
        this.callable
            .add_instruction(this.in_label, Instruction::Return);

        this.callable.add_entry_instruction(Instruction::NewFrame {
            size: this.frame_size,
            successor: first,
        });

        debug!(
            "`{}` lowered to {} instruction(s) with {} byte(s) of frame",
            source.name,
            this.callable.scheduled().count(),
            this.frame_size
        );

        this.callable
    }

    /// Attaches the instruction built by `make` at `in_label` and moves
    /// `in_label` to its fresh successor
    fn add_sequential(&mut self, make: impl FnOnce(Label) -> Instruction) {
        let next = self.context.fresh_label();
        self.callable.add_instruction(self.in_label, make(next));
        self.in_label = next;
    }

    fn allocate_frame(&mut self, size: usize) -> i64 {
        self.frame_size += size;
        -(self.frame_size as i64)
    }

    fn bind(&mut self, name: InternedSymbol, location: Location) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name, location);
            }
            None => ice!("no scope to bind `{name}` in"),
        }
    }

    fn locate(&self, name: InternedSymbol) -> Location {
        if let Some(location) = self.scopes.iter().rev().find_map(|scope| scope.get(&name)) {
            return *location;
        }

        if self.globals.contains(&name) {
            return Location::Global(name);
        }

        ice!("unresolved variable `{name}` survived type checking")
    }

    fn constant(&mut self, value: i64) -> Pseudo {
        let destination = self.context.fresh_pseudo();
        self.add_sequential(|successor| Instruction::Move {
            value,
            destination,
            successor,
        });
        destination
    }

    fn load(&mut self, address: Address) -> Pseudo {
        let destination = self.context.fresh_pseudo();
        self.add_sequential(|successor| Instruction::Load {
            address,
            destination,
            successor,
        });
        destination
    }

    fn load_address(&mut self, address: Address) -> Pseudo {
        let destination = self.context.fresh_pseudo();
        self.add_sequential(|successor| Instruction::LoadAddress {
            address,
            destination,
            successor,
        });
        destination
    }

    fn copy_of(&mut self, source: Pseudo) -> Pseudo {
        let destination = self.context.fresh_pseudo();
        self.add_sequential(|successor| Instruction::Copy {
            source,
            destination,
            successor,
        });
        destination
    }

    fn binary(&mut self, operator: BinaryOperator, source: Pseudo, destination: Pseudo) {
        self.add_sequential(|successor| Instruction::Binary {
            operator,
            source,
            destination,
            successor,
        });
    }

    /// Turns the current true/false edge pair into a 0/1 value
    fn intify(&mut self) -> Pseudo {
        let result = self.context.fresh_pseudo();
        let next = self.context.fresh_label();

        self.callable.add_instruction(
            self.in_label,
            Instruction::Move {
                value: 1,
                destination: result,
                successor: next,
            },
        );
        self.callable.add_instruction(
            self.false_label,
            Instruction::Move {
                value: 0,
                destination: result,
                successor: next,
            },
        );

        self.in_label = next;
        result
    }

    fn lower_block(&mut self, block: &Block) {
        self.scopes.push(HashMap::new());

        for statement in &block.statements {
            self.lower_statement(statement);
        }

        self.scopes.pop();
    }

    fn lower_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Assign { lhs, rhs } => match &lhs.kind {
                ExpressionKind::Variable(name) => {
                    let location = self.locate(*name);
                    let value = self.lower_value(rhs);

                    match location {
                        Location::Pseudo(destination) => {
                            self.add_sequential(|successor| Instruction::Copy {
                                source: value,
                                destination,
                                successor,
                            })
                        }
                        Location::Frame(offset) => self.store(value, Address::Frame(offset)),
                        Location::Global(name) => self.store(value, Address::Global(name)),
                    }
                }
                _ => {
                    let address = self.lower_address(lhs);
                    let value = self.lower_value(rhs);
                    self.store(value, Address::Indirect(address));
                }
            },
            Statement::Eval(expression) => match &expression.kind {
                ExpressionKind::Call {
                    function,
                    arguments,
                } => {
                    self.lower_call(*function, arguments, expression.ty());
                }
                _ => {
                    self.lower_value(expression);
                }
            },
            Statement::Print(expression) => {
                let value = self.lower_value(expression);
                let function = match expression.ty() {
                    Type::Bool => BX_PRINT_BOOL,
                    _ => BX_PRINT_INT,
                };

                self.call_runtime(function, &[value], None);
            }
            Statement::Block(block) => self.lower_block(block),
            Statement::IfElse {
                condition,
                positive,
                negative,
            } => {
                self.lower_bool(condition);

                let (then_label, else_label) = (self.in_label, self.false_label);
                let join = self.context.fresh_label();

                self.in_label = then_label;
                self.lower_block(positive);
                self.callable
                    .add_instruction(self.in_label, Instruction::Goto { successor: join });

                self.in_label = else_label;
                if let Some(negative) = negative {
                    self.lower_block(negative);
                }
                self.callable
                    .add_instruction(self.in_label, Instruction::Goto { successor: join });

                self.in_label = join;
            }
            Statement::While { condition, body } => {
                let head = self.in_label;

                self.lower_bool(condition);
                let exit = self.false_label;

                self.lower_block(body);
                self.callable
                    .add_instruction(self.in_label, Instruction::Goto { successor: head });

                self.in_label = exit;
            }
            Statement::Declare {
                name,
                ty,
                initializer,
            } => self.lower_declaration(*name, ty, initializer.as_ref()),
            Statement::Return(value) => {
                if let Some(value) = value {
                    let result = self.lower_value(value);

                    let Some(output) = self.callable.output_pseudo else {
                        ice!("procedure `{}` returns a value", self.callable.name)
                    };

                    self.add_sequential(|successor| Instruction::Copy {
                        source: result,
                        destination: output,
                        successor,
                    });
                }

                let leave = self.callable.leave;
                self.add_sequential(|_| Instruction::Goto { successor: leave });
            }
        }
    }

    fn store(&mut self, source: Pseudo, address: Address) {
        self.add_sequential(|successor| Instruction::Store {
            source,
            address,
            successor,
        });
    }

    fn lower_declaration(
        &mut self,
        name: InternedSymbol,
        ty: &Type,
        initializer: Option<&Expression>,
    ) {
        // The initializer cannot see the variable it initializes
        let value = initializer.map(|initializer| self.lower_value(initializer));

        match ty {
            Type::List { .. } => {
                let size = ty.size_of();
                let offset = self.allocate_frame(size);
                self.bind(name, Location::Frame(offset));

                let base = self.load_address(Address::Frame(offset));
                let zero = self.constant(0);
                let length = self.constant(size as i64);
                self.call_runtime(MEMSET, &[base, zero, length], None);
            }
            _ if self.escaping.contains(&name) => {
                let offset = self.allocate_frame(ty.size_of());
                self.bind(name, Location::Frame(offset));

                if let Some(value) = value {
                    self.store(value, Address::Frame(offset));
                }
            }
            _ => {
                let destination = self.context.fresh_pseudo();
                self.bind(name, Location::Pseudo(destination));

                if let Some(source) = value {
                    self.add_sequential(|successor| Instruction::Copy {
                        source,
                        destination,
                        successor,
                    });
                }
            }
        }
    }

    /// Lowers an expression whose value is needed in a pseudo. Booleans end
    /// up as 0 or 1.
    fn lower_value(&mut self, expression: &Expression) -> Pseudo {
        match &expression.kind {
            ExpressionKind::Variable(name) => match self.locate(*name) {
                Location::Pseudo(pseudo) => pseudo,
                Location::Frame(offset) => self.load(Address::Frame(offset)),
                Location::Global(name) => self.load(Address::Global(name)),
            },
            ExpressionKind::IntConstant(value) => self.constant(*value),
            ExpressionKind::BoolConstant(value) => self.constant(*value as i64),
            ExpressionKind::Null => self.constant(0),
            ExpressionKind::Unary {
                operator: operator @ (UnaryOperatorKind::Negate | UnaryOperatorKind::BitwiseNot),
                operand,
            } => {
                let value = self.lower_value(operand);
                let result = self.copy_of(value);
                let operator = match operator {
                    UnaryOperatorKind::BitwiseNot => UnaryOperator::Not,
                    _ => UnaryOperator::Neg,
                };

                self.add_sequential(|successor| Instruction::Unary {
                    operator,
                    operand: result,
                    successor,
                });
                result
            }
            ExpressionKind::Binary { lhs, operator, rhs }
                if operator.class() == BinaryOperatorClass::Arithmetic =>
            {
                let left = self.lower_value(lhs);
                let result = self.copy_of(left);
                let right = self.lower_value(rhs);

                self.binary(arithmetic_operator(*operator), right, result);
                result
            }
            ExpressionKind::Call {
                function,
                arguments,
            } => self
                .lower_call(*function, arguments, expression.ty())
                .unwrap_or_else(|| ice!("procedure `{function}` used as a value")),
            ExpressionKind::AddressOf(operand) => self.lower_address(operand),
            ExpressionKind::Dereference(_) | ExpressionKind::Index { .. } => {
                let address = self.lower_address(expression);
                self.load(Address::Indirect(address))
            }
            ExpressionKind::Alloc { ty, size } => {
                let count = self.lower_value(size);
                let element_size = self.constant(ty.size_of() as i64);
                let result = self.context.fresh_pseudo();

                self.call_runtime(CALLOC, &[count, element_size], Some(result));
                result
            }
            ExpressionKind::Unary { .. } | ExpressionKind::Binary { .. } => {
                self.lower_bool(expression);
                self.intify()
            }
        }
    }

    /// Lowers a boolean expression as control flow. Afterwards `in_label` is
    /// the true continuation and `false_label` the false one.
    fn lower_bool(&mut self, expression: &Expression) {
        match &expression.kind {
            ExpressionKind::BoolConstant(true) => {
                self.false_label = self.context.fresh_label();
            }
            ExpressionKind::BoolConstant(false) => {
                self.false_label = self.in_label;
                self.in_label = self.context.fresh_label();
            }
            ExpressionKind::Unary {
                operator: UnaryOperatorKind::LogicalNot,
                operand,
            } => {
                self.lower_bool(operand);
                core::mem::swap(&mut self.in_label, &mut self.false_label);
            }
            ExpressionKind::Binary {
                lhs,
                operator: BinaryOperatorKind::LogicalAnd,
                rhs,
            } => {
                self.lower_bool(lhs);
                let left_false = self.false_label;

                self.lower_bool(rhs);
                self.callable.add_instruction(
                    self.false_label,
                    Instruction::Goto {
                        successor: left_false,
                    },
                );

                self.false_label = left_false;
            }
            ExpressionKind::Binary {
                lhs,
                operator: BinaryOperatorKind::LogicalOr,
                rhs,
            } => {
                self.lower_bool(lhs);
                let left_true = self.in_label;

                self.in_label = self.false_label;
                self.lower_bool(rhs);
                self.callable.add_instruction(
                    self.in_label,
                    Instruction::Goto {
                        successor: left_true,
                    },
                );

                self.in_label = left_true;
            }
            ExpressionKind::Binary { lhs, operator, rhs }
                if matches!(
                    operator.class(),
                    BinaryOperatorClass::Relational | BinaryOperatorClass::Equality
                ) =>
            {
                let left = self.lower_value(lhs);
                let right = self.lower_value(rhs);
                let condition = comparison_condition(*operator);
                let failure = self.context.fresh_label();

                self.false_label = failure;
                self.add_sequential(|success| Instruction::BinaryBranch {
                    condition,
                    lhs: left,
                    rhs: right,
                    success,
                    failure,
                });
            }
            ExpressionKind::Variable(_)
            | ExpressionKind::Call { .. }
            | ExpressionKind::Dereference(_)
            | ExpressionKind::Index { .. } => {
                let value = self.lower_value(expression);
                let failure = self.context.fresh_label();

                self.false_label = failure;
                self.add_sequential(|success| Instruction::UnaryBranch {
                    condition: UnaryCondition::Jnz,
                    operand: value,
                    success,
                    failure,
                });
            }
            _ => ice!("`{expression}` is not a boolean expression"),
        }
    }

    /// Computes the address of a place into a pseudo
    fn lower_address(&mut self, expression: &Expression) -> Pseudo {
        match &expression.kind {
            ExpressionKind::Variable(name) => match self.locate(*name) {
                Location::Frame(offset) => self.load_address(Address::Frame(offset)),
                Location::Global(name) => self.load_address(Address::Global(name)),
                Location::Pseudo(_) => {
                    ice!("address of register resident variable `{name}` requested")
                }
            },
            ExpressionKind::Dereference(pointer) => self.lower_value(pointer),
            ExpressionKind::Index { list, index } => {
                let Type::List { length, .. } = *list.ty() else {
                    ice!("indexing `{list}` which is not a list")
                };

                let base = self.lower_address(list);
                let index = self.lower_value(index);

                self.check_bounds(index, length);

                let offset = self.copy_of(index);
                let element_size = self.constant(expression.ty().size_of() as i64);
                self.binary(BinaryOperator::Mul, element_size, offset);

                let address = self.copy_of(base);
                self.binary(BinaryOperator::Add, offset, address);
                address
            }
            _ => ice!("`{expression}` is not a place"),
        }
    }

    /// Continues only when `0 <= index < length`, otherwise calls the runtime
    /// panic handler
    fn check_bounds(&mut self, index: Pseudo, length: usize) {
        let failure = self.panic_label();

        let zero = self.constant(0);
        self.add_sequential(|success| Instruction::BinaryBranch {
            condition: BinaryCondition::Jge,
            lhs: index,
            rhs: zero,
            success,
            failure,
        });

        let length = self.constant(length as i64);
        self.add_sequential(|success| Instruction::BinaryBranch {
            condition: BinaryCondition::Jl,
            lhs: index,
            rhs: length,
            success,
            failure,
        });
    }

    fn panic_label(&mut self) -> Label {
        if let Some(label) = self.panic_label {
            return label;
        }

        let label = self.context.fresh_label();
        self.callable.add_instruction(
            label,
            Instruction::Call {
                function: InternedSymbol::new(BX_PANIC),
                argument_count: 0,
                result: None,
                successor: self.callable.leave,
            },
        );

        self.panic_label = Some(label);
        label
    }

    /// Marshals already evaluated arguments following the calling convention
    /// and emits the call
    fn emit_call(
        &mut self,
        function: InternedSymbol,
        arguments: &[Pseudo],
        result: Option<Pseudo>,
    ) {
        let stack_arguments = arguments.get(ARGUMENT_REGISTERS.len()..).unwrap_or_default();

        // Keeps the stack 16 byte aligned at the call
        if stack_arguments.len() % 2 == 1 {
            let padding = self.constant(0);
            self.add_sequential(|successor| Instruction::Push {
                source: padding,
                successor,
            });
        }

        for &source in stack_arguments.iter().rev() {
            self.add_sequential(|successor| Instruction::Push { source, successor });
        }

        for (&source, &destination) in arguments.iter().zip(ARGUMENT_REGISTERS.iter()) {
            self.add_sequential(|successor| Instruction::CopyToMachine {
                source,
                destination,
                successor,
            });
        }

        self.add_sequential(|successor| Instruction::Call {
            function,
            argument_count: arguments.len(),
            result,
            successor,
        });
    }

    fn call_runtime(&mut self, function: &str, arguments: &[Pseudo], result: Option<Pseudo>) {
        self.emit_call(InternedSymbol::new(function), arguments, result);
    }

    fn lower_call(
        &mut self,
        function: InternedSymbol,
        arguments: &[Expression],
        return_type: &Type,
    ) -> Option<Pseudo> {
        let values: Vec<Pseudo> = arguments
            .iter()
            .map(|argument| self.lower_value(argument))
            .collect();

        let result = (!return_type.is_unknown()).then(|| self.context.fresh_pseudo());

        self.emit_call(function, &values, result);
        result
    }
}

fn arithmetic_operator(operator: BinaryOperatorKind) -> BinaryOperator {
    match operator {
        BinaryOperatorKind::Add => BinaryOperator::Add,
        BinaryOperatorKind::Subtract => BinaryOperator::Sub,
        BinaryOperatorKind::Multiply => BinaryOperator::Mul,
        BinaryOperatorKind::Divide => BinaryOperator::Div,
        BinaryOperatorKind::Modulus => BinaryOperator::Rem,
        BinaryOperatorKind::BitwiseAnd => BinaryOperator::And,
        BinaryOperatorKind::BitwiseOr => BinaryOperator::Or,
        BinaryOperatorKind::BitwiseXor => BinaryOperator::Xor,
        BinaryOperatorKind::ShiftLeft => BinaryOperator::Sal,
        BinaryOperatorKind::ShiftRight => BinaryOperator::Sar,
        operator => ice!("{operator:?} is not an arithmetic operator"),
    }
}

fn comparison_condition(operator: BinaryOperatorKind) -> BinaryCondition {
    match operator {
        BinaryOperatorKind::Equals => BinaryCondition::Je,
        BinaryOperatorKind::NotEquals => BinaryCondition::Jne,
        BinaryOperatorKind::LessThan => BinaryCondition::Jl,
        BinaryOperatorKind::LessThanOrEqualTo => BinaryCondition::Jle,
        BinaryOperatorKind::GreaterThan => BinaryCondition::Jg,
        BinaryOperatorKind::GreaterThanOrEqualTo => BinaryCondition::Jge,
        operator => ice!("{operator:?} is not a comparison"),
    }
}

fn collect_escaping_block(block: &Block, escaping: &mut HashSet<InternedSymbol>) {
    for statement in &block.statements {
        match statement {
            Statement::Assign { lhs, rhs } => {
                collect_escaping(lhs, escaping);
                collect_escaping(rhs, escaping);
            }
            Statement::Eval(expression) | Statement::Print(expression) => {
                collect_escaping(expression, escaping)
            }
            Statement::Block(block) => collect_escaping_block(block, escaping),
            Statement::IfElse {
                condition,
                positive,
                negative,
            } => {
                collect_escaping(condition, escaping);
                collect_escaping_block(positive, escaping);
                if let Some(negative) = negative {
                    collect_escaping_block(negative, escaping);
                }
            }
            Statement::While { condition, body } => {
                collect_escaping(condition, escaping);
                collect_escaping_block(body, escaping);
            }
            Statement::Declare { initializer, .. } | Statement::Return(initializer) => {
                if let Some(expression) = initializer {
                    collect_escaping(expression, escaping);
                }
            }
        }
    }
}

fn collect_escaping(expression: &Expression, escaping: &mut HashSet<InternedSymbol>) {
    match &expression.kind {
        ExpressionKind::AddressOf(operand) => {
            if let ExpressionKind::Variable(name) = operand.kind {
                escaping.insert(name);
            }
            collect_escaping(operand, escaping);
        }
        ExpressionKind::Unary { operand, .. } | ExpressionKind::Dereference(operand) => {
            collect_escaping(operand, escaping)
        }
        ExpressionKind::Binary { lhs, rhs, .. } => {
            collect_escaping(lhs, escaping);
            collect_escaping(rhs, escaping);
        }
        ExpressionKind::Call { arguments, .. } => {
            for argument in arguments {
                collect_escaping(argument, escaping);
            }
        }
        ExpressionKind::Index { list, index } => {
            collect_escaping(list, escaping);
            collect_escaping(index, escaping);
        }
        ExpressionKind::Alloc { size, .. } => collect_escaping(size, escaping),
        ExpressionKind::Variable(_)
        | ExpressionKind::IntConstant(_)
        | ExpressionKind::BoolConstant(_)
        | ExpressionKind::Null => {}
    }
}

#[cfg(test)]
mod tests;
