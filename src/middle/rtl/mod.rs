//! RTL (Register Transfer Language). Every callable is a graph of labeled
//! instructions operating on an unlimited supply of pseudo-registers. An
//! instruction names each of its successors explicitly, there is no implicit
//! fall-through. The schedule only records the order in which labels were
//! created and is used for rendering and linearization, never for control
//! semantics.

use hashbrown::HashMap;

use crate::{
    backend::assemblers::x86_64::X86FullRegister,
    error::ice,
    frontend::intern::InternedSymbol,
    index::simple_index,
    middle::ty::Type,
};

pub mod ast_lowering;
pub mod pretty_print;

#[cfg(test)]
pub mod interpreter;

simple_index! {
    /// A symbolic, untyped 64-bit storage location
    pub struct Pseudo;
}

simple_index! {
    /// Identifies a program point within a callable
    pub struct Label;
}

/// Where a memory operand lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    /// PC-relative address of a global variable
    Global(InternedSymbol),
    /// Signed byte offset from the frame pointer
    Frame(i64),
    /// Address held in a pseudo
    Indirect(Pseudo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum UnaryOperator {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Sal,
    Sar,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum UnaryCondition {
    /// Taken when the operand is not zero
    Jnz,
}

/// Signed comparison of `lhs` against `rhs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryCondition {
    Je,
    Jne,
    Jl,
    Jle,
    Jg,
    Jge,
}

impl BinaryCondition {
    /// The condition which holds exactly when `self` does not
    pub fn complement(self) -> Self {
        match self {
            Self::Je => Self::Jne,
            Self::Jne => Self::Je,
            Self::Jl => Self::Jge,
            Self::Jle => Self::Jg,
            Self::Jg => Self::Jle,
            Self::Jge => Self::Jl,
        }
    }

    pub fn evaluate(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Self::Je => lhs == rhs,
            Self::Jne => lhs != rhs,
            Self::Jl => lhs < rhs,
            Self::Jle => lhs <= rhs,
            Self::Jg => lhs > rhs,
            Self::Jge => lhs >= rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// destination = value
    Move {
        value: i64,
        destination: Pseudo,
        successor: Label,
    },
    /// destination = source
    Copy {
        source: Pseudo,
        destination: Pseudo,
        successor: Label,
    },
    /// Reads a pinned hardware register (calling convention edges)
    CopyFromMachine {
        source: X86FullRegister,
        destination: Pseudo,
        successor: Label,
    },
    /// Writes a pinned hardware register (calling convention edges)
    CopyToMachine {
        source: Pseudo,
        destination: X86FullRegister,
        successor: Label,
    },
    /// destination = &address
    LoadAddress {
        address: Address,
        destination: Pseudo,
        successor: Label,
    },
    /// destination = *address
    Load {
        address: Address,
        destination: Pseudo,
        successor: Label,
    },
    /// *address = source
    Store {
        source: Pseudo,
        address: Address,
        successor: Label,
    },
    /// operand = operator operand
    Unary {
        operator: UnaryOperator,
        operand: Pseudo,
        successor: Label,
    },
    /// destination = destination operator source
    Binary {
        operator: BinaryOperator,
        source: Pseudo,
        destination: Pseudo,
        successor: Label,
    },
    UnaryBranch {
        condition: UnaryCondition,
        operand: Pseudo,
        success: Label,
        failure: Label,
    },
    BinaryBranch {
        condition: BinaryCondition,
        lhs: Pseudo,
        rhs: Pseudo,
        success: Label,
        failure: Label,
    },
    Goto {
        successor: Label,
    },
    /// Calls `function` with its arguments already pinned to the argument
    /// registers and pushed on the stack. The caller's stack arguments are
    /// popped again before `result` receives the return value.
    Call {
        function: InternedSymbol,
        argument_count: usize,
        result: Option<Pseudo>,
        successor: Label,
    },
    Return,
    /// Allocates `size` bytes of frame storage for frame-resident locals
    NewFrame {
        size: usize,
        successor: Label,
    },
    DeleteFrame {
        successor: Label,
    },
    /// Reads stack argument `slot` (0 is the seventh argument)
    LoadParameter {
        slot: usize,
        destination: Pseudo,
        successor: Label,
    },
    Push {
        source: Pseudo,
        successor: Label,
    },
}

impl Instruction {
    pub fn successors(&self) -> Vec<Label> {
        match self {
            Instruction::Move { successor, .. }
            | Instruction::Copy { successor, .. }
            | Instruction::CopyFromMachine { successor, .. }
            | Instruction::CopyToMachine { successor, .. }
            | Instruction::LoadAddress { successor, .. }
            | Instruction::Load { successor, .. }
            | Instruction::Store { successor, .. }
            | Instruction::Unary { successor, .. }
            | Instruction::Binary { successor, .. }
            | Instruction::Goto { successor }
            | Instruction::Call { successor, .. }
            | Instruction::NewFrame { successor, .. }
            | Instruction::DeleteFrame { successor }
            | Instruction::LoadParameter { successor, .. }
            | Instruction::Push { successor, .. } => vec![*successor],
            Instruction::UnaryBranch {
                success, failure, ..
            }
            | Instruction::BinaryBranch {
                success, failure, ..
            } => vec![*success, *failure],
            Instruction::Return => vec![],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Callable {
    pub name: InternedSymbol,
    pub enter: Label,
    pub leave: Label,
    pub input_pseudos: Vec<Pseudo>,
    /// `None` for procedures
    pub output_pseudo: Option<Pseudo>,
    body: HashMap<Label, Instruction>,
    schedule: Vec<Label>,
}

impl Callable {
    pub fn new(name: InternedSymbol, enter: Label, leave: Label) -> Self {
        Self {
            name,
            enter,
            leave,
            input_pseudos: Vec::new(),
            output_pseudo: None,
            body: HashMap::new(),
            schedule: Vec::new(),
        }
    }

    /// Attaches `instruction` at `label`. Every label holds exactly one
    /// instruction.
    pub fn add_instruction(&mut self, label: Label, instruction: Instruction) {
        if self.body.contains_key(&label) {
            ice!("repeated in-label {label} in `{}`", self.name);
        }

        self.body.insert(label, instruction);
        self.schedule.push(label);
    }

    /// Attaches the (patched) frame setup at `enter` and schedules it before
    /// everything else
    pub fn add_entry_instruction(&mut self, instruction: Instruction) {
        if self.body.contains_key(&self.enter) {
            ice!("entry of `{}` was already filled", self.name);
        }

        self.body.insert(self.enter, instruction);
        self.schedule.insert(0, self.enter);
    }

    pub fn instruction(&self, label: Label) -> Option<&Instruction> {
        self.body.get(&label)
    }

    /// Instructions in emission order
    pub fn scheduled(&self) -> impl Iterator<Item = (Label, &Instruction)> {
        self.schedule.iter().map(|label| (*label, &self.body[label]))
    }

    /// Bytes of frame storage reserved by the entry instruction
    pub fn frame_size(&self) -> usize {
        match self.body.get(&self.enter) {
            Some(Instruction::NewFrame { size, .. }) => *size,
            _ => 0,
        }
    }
}

/// A global variable with its statically known contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub name: InternedSymbol,
    pub ty: Type,
    pub initial_value: i64,
    /// Byte offset inside the data section
    pub offset: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub globals: Vec<Global>,
    pub callables: Vec<Callable>,
}

impl Program {
    pub fn callable(&self, name: InternedSymbol) -> Option<&Callable> {
        self.callables.iter().find(|callable| callable.name == name)
    }
}
