//! `bxc` compiles BX programs, handed over as annotated syntax trees, to
//! x86-64 assembly. The pipeline is type checking, lowering to RTL and
//! instruction selection; the first error stops it.

use log::info;

use crate::{
    backend::{
        CodegenOptions,
        targets::{CodeGenerator, Target},
    },
    frontend::ast::Program,
    middle::{
        rtl::ast_lowering::{GenerationContext, lower_program},
        type_checking::type_check_program,
    },
};

pub mod backend;
pub mod driver;
pub mod error;
pub mod frontend;
pub mod index;
pub mod middle;

pub use driver::Artifacts;
pub use error::CompileError;

/// Compiles for the default target with default options
pub fn compile(program: &mut Program) -> Result<Artifacts, CompileError> {
    compile_with(program, Target::default(), &CodegenOptions::default())
}

/// Type checks `program` in place, lowers it to RTL and selects
/// instructions for `target`
pub fn compile_with(
    program: &mut Program,
    target: Target,
    options: &CodegenOptions,
) -> Result<Artifacts, CompileError> {
    let checked = type_check_program(program)?;
    let parsed = checked.program().to_string();

    let mut context = GenerationContext::new();
    let rtl = lower_program(&mut context, checked);

    info!("selecting instructions for {target:?}");
    let assembly = target.get_code_generator().translate_to_asm(&rtl, options);

    Ok(Artifacts {
        parsed,
        rtl: rtl.to_string(),
        assembly,
    })
}
