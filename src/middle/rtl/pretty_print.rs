use colored::Colorize;
use itertools::Itertools;

use super::{Address, Callable, Global, Instruction, Label, Program, Pseudo};
use crate::index::Index;

impl core::fmt::Display for Pseudo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index())
    }
}

impl core::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.index())
    }
}

/// Renders a possibly discarded result
struct MaybePseudo(Option<Pseudo>);

impl core::fmt::Display for MaybePseudo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(pseudo) => write!(f, "{pseudo}"),
            None => write!(f, "##"),
        }
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Global(name) => write!(f, "{name}(%rip)"),
            Address::Frame(offset) => write!(f, "{offset}(%rbp)"),
            Address::Indirect(pseudo) => write!(f, "({pseudo})"),
        }
    }
}

fn arrow(labels: &[Label]) -> String {
    format!(
        "  {} {}",
        "-->".white(),
        labels
            .iter()
            .map(|label| label.to_string().blue())
            .join(", ")
    )
}

impl core::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let successors = arrow(&self.successors());

        match self {
            Instruction::Move {
                value,
                destination,
                ..
            } => write!(
                f,
                "{} {}, {destination}{successors}",
                "move".cyan(),
                value.to_string().purple()
            ),
            Instruction::Copy {
                source,
                destination,
                ..
            } => write!(f, "{} {source}, {destination}{successors}", "copy".cyan()),
            Instruction::CopyFromMachine {
                source,
                destination,
                ..
            } => write!(
                f,
                "{} {}, {destination}{successors}",
                "copy".cyan(),
                format!("%{source}").red()
            ),
            Instruction::CopyToMachine {
                source,
                destination,
                ..
            } => write!(
                f,
                "{} {source}, {}{successors}",
                "copy".cyan(),
                format!("%{destination}").red()
            ),
            Instruction::LoadAddress {
                address,
                destination,
                ..
            } => write!(f, "{} {address}, {destination}{successors}", "lea".cyan()),
            Instruction::Load {
                address,
                destination,
                ..
            } => write!(f, "{} {address}, {destination}{successors}", "load".cyan()),
            Instruction::Store {
                source, address, ..
            } => write!(f, "{} {source}, {address}{successors}", "store".cyan()),
            Instruction::Unary {
                operator, operand, ..
            } => write!(f, "{} {operator}, {operand}{successors}", "unop".cyan()),
            Instruction::Binary {
                operator,
                source,
                destination,
                ..
            } => write!(
                f,
                "{} {operator}, {source}, {destination}{successors}",
                "binop".cyan()
            ),
            Instruction::UnaryBranch {
                condition, operand, ..
            } => write!(
                f,
                "{} {condition}, {operand}{successors}",
                "ubranch".cyan()
            ),
            Instruction::BinaryBranch {
                condition, lhs, rhs, ..
            } => write!(
                f,
                "{} {condition}, {lhs}, {rhs}{successors}",
                "bbranch".cyan()
            ),
            Instruction::Goto { .. } => write!(f, "{}{successors}", "goto".cyan()),
            Instruction::Call {
                function,
                argument_count,
                result,
                ..
            } => write!(
                f,
                "{} {}/{}, {}{successors}",
                "call".cyan(),
                function.value().green(),
                argument_count.to_string().purple(),
                MaybePseudo(*result)
            ),
            Instruction::Return => write!(f, "{}", "return".cyan()),
            Instruction::NewFrame { size, .. } => write!(
                f,
                "{} {}{successors}",
                "newframe".cyan(),
                size.to_string().purple()
            ),
            Instruction::DeleteFrame { .. } => write!(f, "{}{successors}", "delframe".cyan()),
            Instruction::LoadParameter {
                slot, destination, ..
            } => write!(
                f,
                "{} {}, {destination}{successors}",
                "loadparam".cyan(),
                slot.to_string().purple()
            ),
            Instruction::Push { source, .. } => {
                write!(f, "{} {source}{successors}", "push".cyan())
            }
        }
    }
}

impl core::fmt::Display for Global {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}: {} = {} @ {}",
            "GLOBAL".magenta(),
            self.name.value().green(),
            self.ty,
            self.initial_value.to_string().purple(),
            self.offset
        )
    }
}

impl core::fmt::Display for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} {}", "CALLABLE".magenta(), self.name.value().green())?;
        writeln!(f, "  inputs: {}", self.input_pseudos.iter().join(", "))?;
        writeln!(f, "  output: {}", MaybePseudo(self.output_pseudo))?;
        writeln!(f, "  enter: {}", self.enter.to_string().blue())?;
        writeln!(f, "  leave: {}", self.leave.to_string().blue())?;
        writeln!(f, "----")?;

        for (label, instruction) in self.scheduled() {
            writeln!(f, "{}: {instruction}", label.to_string().blue())?;
        }

        writeln!(f, "{}", "END CALLABLE".magenta())
    }
}

impl core::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for global in &self.globals {
            writeln!(f, "{global}")?;
        }

        for callable in &self.callables {
            write!(f, "{callable}")?;
        }

        Ok(())
    }
}
