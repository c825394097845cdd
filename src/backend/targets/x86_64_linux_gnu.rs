use std::{path::Path, process::Command};

use hashbrown::HashMap;
use itertools::Itertools;
use log::{debug, trace};

use crate::{
    backend::{
        CodegenOptions,
        assemblers::x86_64::{ARGUMENT_REGISTERS, Asm, Assembler, Line, Operand, X86FullRegister},
        targets::CodeGenerator,
    },
    index::Index,
    middle::{
        rtl::{
            self, Address, BinaryCondition, BinaryOperator, Instruction, Label, Pseudo,
            UnaryCondition, UnaryOperator,
        },
        ty::{Type, WORD_SIZE},
    },
};

const WORD: i64 = WORD_SIZE as i64;

pub struct CodeGeneratorX86_64LinuxGnu;

impl CodeGenerator for CodeGeneratorX86_64LinuxGnu {
    fn translate_to_asm(&self, program: &rtl::Program, options: &CodegenOptions) -> String {
        let function_bodies = program
            .callables
            .iter()
            .map(|callable| select_callable(callable, options).iter().join("\n"))
            .join("\n\n");

        format!(
            indoc::indoc! {"
                # user code
                {0}

                # global variables
                {1}

                {2}
            "},
            function_bodies,
            data_section(&program.globals),
            Line::Directive(r#".section .note.GNU-stack,"",@progbits"#.to_string())
        )
    }

    fn create_assembler_command(&self, input_file: &Path, output_file: &Path) -> Command {
        let mut cmd = Command::new("as");

        cmd.arg("--64").arg("-o").arg(output_file).arg(input_file);

        cmd
    }

    /// Links against the `bxrt` runtime, which provides `bx_print_int`,
    /// `bx_print_bool` and `bx_panic`
    fn create_linker_command(
        &self,
        input_file: &Path,
        output_file: &Path,
        runtime_directory: &Path,
    ) -> Command {
        let mut cmd = Command::new("gcc");

        cmd.arg("-no-pie")
            .arg("-o")
            .arg(output_file)
            .arg(input_file)
            .arg("-L")
            .arg(runtime_directory)
            .arg("-lbxrt");

        cmd
    }
}

/// One 8-byte aligned entry per global, lists start zeroed
fn data_section(globals: &[rtl::Global]) -> String {
    let mut lines = vec![
        Line::Directive(".section .data".to_string()),
        Line::Directive(".balign 8".to_string()),
    ];

    for global in globals {
        lines.push(Line::Label(global.name.to_string()));
        lines.push(Line::Directive(match global.ty {
            Type::List { .. } => format!(".zero {}", global.ty.size_of()),
            _ => format!(".quad {}", global.initial_value),
        }));
    }

    lines.iter().join("\n")
}

/// Translates one callable, following its schedule, into a linear sequence of
/// assembly lines framed by a prologue and an epilogue
pub fn select_callable(callable: &rtl::Callable, options: &CodegenOptions) -> Vec<Line> {
    let mut selector = Selector {
        callable,
        assembler: Assembler::new(),
        slots: HashMap::new(),
        frame_size: callable.frame_size() as i64,
    };

    for (label, instruction) in callable.scheduled() {
        let name = selector.label(label);
        selector.assembler.label(name);

        if options.emit_comments {
            selector
                .assembler
                .comment(strip_ansi_escapes::strip_str(instruction.to_string()));
        }

        selector.select(instruction);
    }

    let stack_frame_size = align_to(
        (selector.frame_size + WORD * selector.slots.len() as i64) as usize,
        16,
    );

    debug!(
        "`{}` uses {} stack slot(s), {} byte frame",
        callable.name,
        selector.slots.len(),
        stack_frame_size
    );

    let exit_label = selector.exit_label();

    let mut output = Assembler::new();
    output.function_prologue(callable.name.value(), stack_frame_size);
    output.append(selector.assembler.into_lines());
    output.function_epilogue(exit_label, stack_frame_size);

    output.into_lines()
}

fn align_to(size: usize, alignment: usize) -> usize {
    size.div_ceil(alignment) * alignment
}

struct Selector<'a> {
    callable: &'a rtl::Callable,
    assembler: Assembler,
    /// Frame-pointer offset of every pseudo seen so far
    slots: HashMap<Pseudo, i64>,
    /// Bytes reserved for frame-resident locals, below which the slots start
    frame_size: i64,
}

impl Selector<'_> {
    fn label(&self, label: Label) -> String {
        format!(".L{}.{}", self.callable.name, label.index())
    }

    fn exit_label(&self) -> String {
        format!(".L{}.exit", self.callable.name)
    }

    /// Binds `pseudo` to a fresh slot on its first reference
    fn slot(&mut self, pseudo: Pseudo) -> Operand {
        let next = self.slots.len() as i64 + 1;
        let frame_size = self.frame_size;
        let offset = *self
            .slots
            .entry(pseudo)
            .or_insert_with(|| -(frame_size + WORD * next));

        Operand::Stack(offset)
    }

    fn emit(&mut self, asm: Asm) {
        self.assembler.emit(asm);
    }

    fn jump(&mut self, label: Label) {
        let target = self.label(label);
        self.emit(Asm::jmp(target));
    }

    fn address(&mut self, address: Address) -> Operand {
        match address {
            Address::Global(name) => Operand::Global(name),
            Address::Frame(offset) => Operand::Stack(offset),
            Address::Indirect(pseudo) => {
                let slot = self.slot(pseudo);
                self.emit(Asm::movq(slot, X86FullRegister::Rcx));
                Operand::Indirect(X86FullRegister::Rcx)
            }
        }
    }

    fn select(&mut self, instruction: &Instruction) {
        trace!("selecting `{}`", strip_ansi_escapes::strip_str(instruction.to_string()));

        match *instruction {
            Instruction::Move {
                value,
                destination,
                successor,
            } => {
                let destination = self.slot(destination);

                if i32::try_from(value).is_ok() {
                    self.emit(Asm::movq(Operand::Immediate(value), destination));
                } else {
                    self.emit(Asm::movabsq(Operand::Immediate(value), X86FullRegister::Rax));
                    self.emit(Asm::movq(X86FullRegister::Rax, destination));
                }

                self.jump(successor);
            }
            Instruction::Copy {
                source,
                destination,
                successor,
            } => {
                let source = self.slot(source);
                let destination = self.slot(destination);

                self.emit(Asm::movq(source, X86FullRegister::Rax));
                self.emit(Asm::movq(X86FullRegister::Rax, destination));
                self.jump(successor);
            }
            Instruction::CopyFromMachine {
                source,
                destination,
                successor,
            } => {
                let destination = self.slot(destination);

                self.emit(Asm::movq(source, destination));
                self.jump(successor);
            }
            Instruction::CopyToMachine {
                source,
                destination,
                successor,
            } => {
                let source = self.slot(source);

                self.emit(Asm::movq(source, destination));
                self.jump(successor);
            }
            Instruction::LoadAddress {
                address,
                destination,
                successor,
            } => {
                match address {
                    Address::Indirect(pointer) => {
                        let pointer = self.slot(pointer);
                        self.emit(Asm::movq(pointer, X86FullRegister::Rax));
                    }
                    address => {
                        let address = self.address(address);
                        self.emit(Asm::leaq(address, X86FullRegister::Rax));
                    }
                }

                let destination = self.slot(destination);
                self.emit(Asm::movq(X86FullRegister::Rax, destination));
                self.jump(successor);
            }
            Instruction::Load {
                address,
                destination,
                successor,
            } => {
                let address = self.address(address);
                let destination = self.slot(destination);

                self.emit(Asm::movq(address, X86FullRegister::Rax));
                self.emit(Asm::movq(X86FullRegister::Rax, destination));
                self.jump(successor);
            }
            Instruction::Store {
                source,
                address,
                successor,
            } => {
                let source = self.slot(source);
                self.emit(Asm::movq(source, X86FullRegister::Rax));

                let address = self.address(address);
                self.emit(Asm::movq(X86FullRegister::Rax, address));
                self.jump(successor);
            }
            Instruction::Unary {
                operator,
                operand,
                successor,
            } => {
                let operand = self.slot(operand);

                self.emit(match operator {
                    UnaryOperator::Neg => Asm::negq(operand),
                    UnaryOperator::Not => Asm::notq(operand),
                });
                self.jump(successor);
            }
            Instruction::Binary {
                operator,
                source,
                destination,
                successor,
            } => {
                let source = self.slot(source);
                let destination = self.slot(destination);
                self.select_binary(operator, source, destination);
                self.jump(successor);
            }
            Instruction::UnaryBranch {
                condition,
                operand,
                success,
                failure,
            } => {
                let operand = self.slot(operand);
                let failure = self.label(failure);

                self.emit(Asm::cmpq(Operand::Immediate(0), operand));
                self.emit(match condition {
                    UnaryCondition::Jnz => Asm::je(failure),
                });
                self.jump(success);
            }
            Instruction::BinaryBranch {
                condition,
                lhs,
                rhs,
                success,
                failure,
            } => {
                let lhs = self.slot(lhs);
                let rhs = self.slot(rhs);
                let failure = self.label(failure);

                self.emit(Asm::movq(lhs, X86FullRegister::Rax));
                self.emit(Asm::movq(rhs, X86FullRegister::Rcx));
                self.emit(Asm::cmpq(X86FullRegister::Rcx, X86FullRegister::Rax));
                self.emit(conditional_jump(condition.complement(), failure));
                self.jump(success);
            }
            Instruction::Goto { successor } => self.jump(successor),
            Instruction::Call {
                function,
                argument_count,
                result,
                successor,
            } => {
                self.emit(Asm::call(function));

                let stack_arguments = argument_count.saturating_sub(ARGUMENT_REGISTERS.len());
                let padded = stack_arguments + stack_arguments % 2;
                if padded > 0 {
                    self.emit(Asm::addq(
                        Operand::Immediate(WORD * padded as i64),
                        X86FullRegister::Rsp,
                    ));
                }

                if let Some(result) = result {
                    let result = self.slot(result);
                    self.emit(Asm::movq(X86FullRegister::Rax, result));
                }

                self.jump(successor);
            }
            Instruction::Return => {
                let exit = self.exit_label();
                self.emit(Asm::jmp(exit));
            }
            // The frame itself is built by the prologue and torn down by the
            // epilogue
            Instruction::NewFrame { successor, .. } | Instruction::DeleteFrame { successor } => {
                self.jump(successor)
            }
            Instruction::LoadParameter {
                slot,
                destination,
                successor,
            } => {
                let destination = self.slot(destination);

                self.emit(Asm::movq(
                    Operand::Stack(2 * WORD + WORD * slot as i64),
                    X86FullRegister::Rax,
                ));
                self.emit(Asm::movq(X86FullRegister::Rax, destination));
                self.jump(successor);
            }
            Instruction::Push { source, successor } => {
                let source = self.slot(source);

                self.emit(Asm::pushq(source));
                self.jump(successor);
            }
        }
    }

    fn select_binary(&mut self, operator: BinaryOperator, source: Operand, destination: Operand) {
        match operator {
            BinaryOperator::Add
            | BinaryOperator::Sub
            | BinaryOperator::And
            | BinaryOperator::Or
            | BinaryOperator::Xor => {
                let accumulator = X86FullRegister::Rax;

                self.emit(Asm::movq(destination, accumulator));
                self.emit(match operator {
                    BinaryOperator::Add => Asm::addq(source, accumulator),
                    BinaryOperator::Sub => Asm::subq(source, accumulator),
                    BinaryOperator::And => Asm::andq(source, accumulator),
                    BinaryOperator::Or => Asm::orq(source, accumulator),
                    _ => Asm::xorq(source, accumulator),
                });
                self.emit(Asm::movq(X86FullRegister::Rax, destination));
            }
            BinaryOperator::Mul => {
                self.emit(Asm::movq(destination, X86FullRegister::Rax));
                self.emit(Asm::imulq(source));
                self.emit(Asm::movq(X86FullRegister::Rax, destination));
            }
            BinaryOperator::Div | BinaryOperator::Rem => {
                let result = match operator {
                    BinaryOperator::Div => X86FullRegister::Rax,
                    _ => X86FullRegister::Rdx,
                };

                self.emit(Asm::movq(destination, X86FullRegister::Rax));
                self.emit(Asm::cqto());
                self.emit(Asm::idivq(source));
                self.emit(Asm::movq(result, destination));
            }
            BinaryOperator::Sal | BinaryOperator::Sar => {
                self.emit(Asm::movq(source, X86FullRegister::Rcx));
                self.emit(Asm::movq(destination, X86FullRegister::Rax));
                self.emit(match operator {
                    BinaryOperator::Sal => Asm::salq(X86FullRegister::Rax),
                    _ => Asm::sarq(X86FullRegister::Rax),
                });
                self.emit(Asm::movq(X86FullRegister::Rax, destination));
            }
        }
    }
}

fn conditional_jump(condition: BinaryCondition, target: String) -> Asm {
    match condition {
        BinaryCondition::Je => Asm::je(target),
        BinaryCondition::Jne => Asm::jne(target),
        BinaryCondition::Jl => Asm::jl(target),
        BinaryCondition::Jle => Asm::jle(target),
        BinaryCondition::Jg => Asm::jg(target),
        BinaryCondition::Jge => Asm::jge(target),
    }
}
