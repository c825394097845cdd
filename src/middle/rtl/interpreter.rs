//! Executes RTL directly. Machine registers, the stack, globals and the heap
//! are modelled closely enough that the calling convention and frame layout
//! produced by lowering are exercised for real.

use hashbrown::HashMap;

use super::{Address, BinaryOperator, Instruction, Program, Pseudo, UnaryCondition, UnaryOperator};
use crate::{
    backend::assemblers::x86_64::{ARGUMENT_REGISTERS, CALLEE_SAVED_REGISTERS, X86FullRegister},
    frontend::intern::InternedSymbol,
    middle::ty::WORD_SIZE,
};

const WORD: i64 = WORD_SIZE as i64;
const STACK_BASE: i64 = 0x7fff_0000;
const GLOBAL_BASE: i64 = 0x1000;
const HEAP_BASE: i64 = 0x1000_0000;
const FUEL: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub output: Vec<String>,
    pub panicked: bool,
}

/// Raised by `bx_panic`, unwinds every activation
struct Panicked;

pub struct Interpreter<'a> {
    program: &'a Program,
    registers: HashMap<X86FullRegister, i64>,
    memory: HashMap<i64, i64>,
    globals: HashMap<InternedSymbol, i64>,
    stack_pointer: i64,
    frame_pointer: i64,
    heap_top: i64,
    output: Vec<String>,
    fuel: usize,
}

/// Runs `main` and collects everything it printed
pub fn run(program: &Program) -> Execution {
    let mut interpreter = Interpreter::new(program);
    let panicked = interpreter.call(InternedSymbol::new("main")).is_err();

    for (i, register) in CALLEE_SAVED_REGISTERS.iter().enumerate() {
        assert_eq!(
            interpreter.register(*register),
            sentinel(i),
            "callee-saved %{register} was clobbered"
        );
    }

    Execution {
        output: interpreter.output,
        panicked,
    }
}

fn sentinel(i: usize) -> i64 {
    0x5eed_0000 + i as i64
}

impl<'a> Interpreter<'a> {
    pub fn new(program: &'a Program) -> Self {
        let mut memory = HashMap::new();
        let mut globals = HashMap::new();

        for global in &program.globals {
            let address = GLOBAL_BASE + global.offset as i64;
            globals.insert(global.name, address);
            memory.insert(address, global.initial_value);
        }

        let registers = CALLEE_SAVED_REGISTERS
            .iter()
            .enumerate()
            .map(|(i, register)| (*register, sentinel(i)))
            .collect();

        Self {
            program,
            registers,
            memory,
            globals,
            stack_pointer: STACK_BASE,
            frame_pointer: 0,
            heap_top: HEAP_BASE,
            output: Vec::new(),
            fuel: FUEL,
        }
    }

    fn register(&self, register: X86FullRegister) -> i64 {
        self.registers.get(&register).copied().unwrap_or_default()
    }

    fn read(&self, address: i64) -> i64 {
        assert_eq!(address % WORD, 0, "misaligned read at {address:#x}");
        self.memory.get(&address).copied().unwrap_or_default()
    }

    fn write(&mut self, address: i64, value: i64) {
        assert_eq!(address % WORD, 0, "misaligned write at {address:#x}");
        self.memory.insert(address, value);
    }

    fn push(&mut self, value: i64) {
        self.stack_pointer -= WORD;
        self.write(self.stack_pointer, value);
    }

    fn resolve(&self, address: Address, pseudos: &HashMap<Pseudo, i64>) -> i64 {
        match address {
            Address::Global(name) => *self
                .globals
                .get(&name)
                .unwrap_or_else(|| panic!("unknown global `{name}`")),
            Address::Frame(offset) => self.frame_pointer + offset,
            Address::Indirect(pseudo) => value_of(pseudos, pseudo),
        }
    }

    fn call(&mut self, function: InternedSymbol) -> Result<(), Panicked> {
        assert_eq!(
            self.stack_pointer % 16,
            0,
            "stack misaligned when calling `{function}`"
        );

        let arguments: Vec<i64> = ARGUMENT_REGISTERS
            .iter()
            .map(|register| self.register(*register))
            .collect();

        match function.value() {
            "bx_print_int" => self.output.push(arguments[0].to_string()),
            "bx_print_bool" => self
                .output
                .push(if arguments[0] != 0 { "true" } else { "false" }.to_string()),
            "bx_panic" => return Err(Panicked),
            "memset" => {
                for offset in (0..arguments[2]).step_by(WORD_SIZE) {
                    self.write(arguments[0] + offset, arguments[1]);
                }
            }
            "calloc" => {
                let address = self.heap_top;
                self.heap_top += (arguments[0] * arguments[1] + WORD - 1) / WORD * WORD;
                for offset in (address..self.heap_top).step_by(WORD_SIZE) {
                    self.write(offset, 0);
                }
                self.registers.insert(X86FullRegister::Rax, address);
            }
            _ => {
                // Return address
                self.push(0);
                self.execute(function)?;
                self.stack_pointer += WORD;
            }
        }

        Ok(())
    }

    fn execute(&mut self, function: InternedSymbol) -> Result<(), Panicked> {
        let program = self.program;
        let callable = program
            .callable(function)
            .unwrap_or_else(|| panic!("call to unknown callable `{function}`"));

        let mut pseudos: HashMap<Pseudo, i64> = HashMap::new();
        let mut label = callable.enter;

        loop {
            self.fuel = self
                .fuel
                .checked_sub(1)
                .unwrap_or_else(|| panic!("out of fuel in `{function}`"));

            let instruction = callable
                .instruction(label)
                .unwrap_or_else(|| panic!("no instruction at {label} in `{function}`"));

            label = match *instruction {
                Instruction::Move {
                    value,
                    destination,
                    successor,
                } => {
                    pseudos.insert(destination, value);
                    successor
                }
                Instruction::Copy {
                    source,
                    destination,
                    successor,
                } => {
                    pseudos.insert(destination, value_of(&pseudos, source));
                    successor
                }
                Instruction::CopyFromMachine {
                    source,
                    destination,
                    successor,
                } => {
                    pseudos.insert(destination, self.register(source));
                    successor
                }
                Instruction::CopyToMachine {
                    source,
                    destination,
                    successor,
                } => {
                    self.registers
                        .insert(destination, value_of(&pseudos, source));
                    successor
                }
                Instruction::LoadAddress {
                    address,
                    destination,
                    successor,
                } => {
                    pseudos.insert(destination, self.resolve(address, &pseudos));
                    successor
                }
                Instruction::Load {
                    address,
                    destination,
                    successor,
                } => {
                    let value = self.read(self.resolve(address, &pseudos));
                    pseudos.insert(destination, value);
                    successor
                }
                Instruction::Store {
                    source,
                    address,
                    successor,
                } => {
                    let address = self.resolve(address, &pseudos);
                    self.write(address, value_of(&pseudos, source));
                    successor
                }
                Instruction::Unary {
                    operator,
                    operand,
                    successor,
                } => {
                    let value = value_of(&pseudos, operand);
                    let result = match operator {
                        UnaryOperator::Neg => value.wrapping_neg(),
                        UnaryOperator::Not => !value,
                    };
                    pseudos.insert(operand, result);
                    successor
                }
                Instruction::Binary {
                    operator,
                    source,
                    destination,
                    successor,
                } => {
                    let lhs = value_of(&pseudos, destination);
                    let rhs = value_of(&pseudos, source);
                    pseudos.insert(destination, evaluate(operator, lhs, rhs));
                    successor
                }
                Instruction::UnaryBranch {
                    condition,
                    operand,
                    success,
                    failure,
                } => {
                    let value = value_of(&pseudos, operand);
                    let taken = match condition {
                        UnaryCondition::Jnz => value != 0,
                    };
                    if taken { success } else { failure }
                }
                Instruction::BinaryBranch {
                    condition,
                    lhs,
                    rhs,
                    success,
                    failure,
                } => {
                    if condition.evaluate(value_of(&pseudos, lhs), value_of(&pseudos, rhs)) {
                        success
                    } else {
                        failure
                    }
                }
                Instruction::Goto { successor } => successor,
                Instruction::Call {
                    function,
                    argument_count,
                    result,
                    successor,
                } => {
                    self.call(function)?;

                    let stack_arguments = argument_count.saturating_sub(ARGUMENT_REGISTERS.len());
                    self.stack_pointer += WORD * (stack_arguments + stack_arguments % 2) as i64;

                    if let Some(result) = result {
                        pseudos.insert(result, self.register(X86FullRegister::Rax));
                    }
                    successor
                }
                Instruction::Return => return Ok(()),
                Instruction::NewFrame { size, successor } => {
                    self.push(self.frame_pointer);
                    self.frame_pointer = self.stack_pointer;
                    self.stack_pointer -= (size as i64 + 15) / 16 * 16;
                    successor
                }
                Instruction::DeleteFrame { successor } => {
                    self.stack_pointer = self.frame_pointer;
                    self.frame_pointer = self.read(self.stack_pointer);
                    self.stack_pointer += WORD;
                    successor
                }
                Instruction::LoadParameter {
                    slot,
                    destination,
                    successor,
                } => {
                    let value = self.read(self.frame_pointer + 2 * WORD + WORD * slot as i64);
                    pseudos.insert(destination, value);
                    successor
                }
                Instruction::Push { source, successor } => {
                    self.push(value_of(&pseudos, source));
                    successor
                }
            };
        }
    }
}

fn value_of(pseudos: &HashMap<Pseudo, i64>, pseudo: Pseudo) -> i64 {
    *pseudos
        .get(&pseudo)
        .unwrap_or_else(|| panic!("read of undefined pseudo {pseudo}"))
}

fn evaluate(operator: BinaryOperator, lhs: i64, rhs: i64) -> i64 {
    match operator {
        BinaryOperator::Add => lhs.wrapping_add(rhs),
        BinaryOperator::Sub => lhs.wrapping_sub(rhs),
        BinaryOperator::Mul => lhs.wrapping_mul(rhs),
        BinaryOperator::Div => lhs.wrapping_div(rhs),
        BinaryOperator::Rem => lhs.wrapping_rem(rhs),
        BinaryOperator::Sal => lhs.wrapping_shl(rhs as u32),
        BinaryOperator::Sar => lhs.wrapping_shr(rhs as u32),
        BinaryOperator::And => lhs & rhs,
        BinaryOperator::Or => lhs | rhs,
        BinaryOperator::Xor => lhs ^ rhs,
    }
}
