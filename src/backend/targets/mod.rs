use std::{path::Path, process::Command};

use crate::{backend::CodegenOptions, middle::rtl};

pub mod x86_64_linux_gnu;

pub trait CodeGenerator {
    fn translate_to_asm(&self, program: &rtl::Program, options: &CodegenOptions) -> String;
    fn create_assembler_command(&self, input_file: &Path, output_file: &Path) -> Command;
    /// Links against the runtime library found in `runtime_directory`
    fn create_linker_command(
        &self,
        input_file: &Path,
        output_file: &Path,
        runtime_directory: &Path,
    ) -> Command;
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Target {
    #[default]
    x86_64LinuxGnu,
}

impl Target {
    pub fn get_code_generator(self) -> impl CodeGenerator {
        match self {
            Target::x86_64LinuxGnu => x86_64_linux_gnu::CodeGeneratorX86_64LinuxGnu,
        }
    }
}
