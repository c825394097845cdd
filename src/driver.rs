//! File handling around the compiler core: naming outputs after the source
//! file, writing the textual artifacts and running the external assembler and
//! linker.

use std::{
    borrow::Cow,
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
};

use log::{debug, info};
use mktemp::Temp;

use crate::{
    backend::targets::{CodeGenerator, Target},
    error::CompileError,
};

pub const SOURCE_EXTENSION: &str = "bx";

/// The textual output of a successful compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    /// The type checked program rendered back to source
    pub parsed: String,
    /// The RTL listing
    pub rtl: String,
    pub assembly: String,
}

impl Artifacts {
    /// Writes `<root>.parsed`, `<root>.rtl` and `<root>.s`. Terminal colors
    /// are stripped from the two listings; the assembly is written unchanged.
    pub fn write(&self, root: &Path) -> Result<(), CompileError> {
        for (suffix, contents) in [
            ("parsed", Cow::Owned(strip_ansi_escapes::strip_str(&self.parsed))),
            ("rtl", Cow::Owned(strip_ansi_escapes::strip_str(&self.rtl))),
            ("s", Cow::Borrowed(self.assembly.as_str())),
        ] {
            let path = with_suffix(root, suffix);
            debug!("writing {}", path.display());

            std::fs::write(&path, contents.as_bytes())
                .map_err(|error| CompileError::io(&path, error))?;
        }

        Ok(())
    }
}

/// Strips the `.bx` extension from a source path. Every output file is named
/// after the result.
pub fn output_root(source: &Path) -> Result<PathBuf, CompileError> {
    let has_stem = source
        .file_stem()
        .is_some_and(|stem| !stem.is_empty());

    match source.extension() {
        Some(extension) if extension == SOURCE_EXTENSION && has_stem => {
            Ok(source.with_extension(""))
        }
        _ => Err(CompileError::BadSourcePath {
            path: source.to_path_buf(),
        }),
    }
}

/// `<root>.s`
pub fn assembly_path(root: &Path) -> PathBuf {
    with_suffix(root, "s")
}

/// `root` with `.suffix` appended
fn with_suffix(root: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(root.as_os_str());
    path.push(".");
    path.push(suffix);

    PathBuf::from(path)
}

/// Assembles `assembly_file` into a temporary object file and links it with
/// the `bxrt` runtime from `runtime_directory` into `executable`
pub fn build_executable(
    target: Target,
    assembly_file: &Path,
    executable: &Path,
    runtime_directory: &Path,
) -> Result<(), CompileError> {
    let generator = target.get_code_generator();
    let object_file =
        Temp::new_file().map_err(|error| CompileError::io(std::env::temp_dir(), error))?;

    run_tool(generator.create_assembler_command(assembly_file, object_file.as_path()))?;
    run_tool(generator.create_linker_command(
        object_file.as_path(),
        executable,
        runtime_directory,
    ))?;

    info!("linked {}", executable.display());

    Ok(())
}

fn run_tool(mut command: Command) -> Result<(), CompileError> {
    let tool = command.get_program().to_string_lossy().into_owned();
    debug!("running {command:?}");

    let status = command
        .status()
        .map_err(|error| CompileError::io(&tool, error))?;

    if !status.success() {
        return Err(CompileError::ToolFailed {
            tool,
            status: status.to_string(),
        });
    }

    Ok(())
}
