//! minic compiler library.
//!
//! A C front-end: tokens flow through a recursive-descent parser with
//! semantic analysis inline, producing a typed AST that a single post-order
//! walk lowers to SSA IR (`minic-ir`). The pipeline is single-shot — the
//! first diagnostic wins and surfaces as an `Err` — and the library never
//! touches the process: exit codes are the binary's business.
//!
//! ```rust
//! use minicc::{compile_source, CompilerConfig};
//!
//! let ir = compile_source(
//!     "demo.c",
//!     "int main() { return 42; }",
//!     &CompilerConfig::default(),
//! )
//! .unwrap();
//! assert!(ir.contains("define i32 @main()"));
//! ```

pub mod ast;
pub mod config;
pub mod diag;
pub mod eval;
pub mod irgen;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod scope;
pub mod sema;
pub mod types;

pub use ast::Program;
pub use config::{CompilerConfig, EmitKind};
pub use diag::{Diag, DiagKind, DiagResult};
pub use irgen::IrGen;
pub use lexer::Lexer;
pub use parser::Parser;
pub use sema::Sema;
pub use types::Type;

use std::fmt;
use std::path::Path;

/// Parse a translation unit into its typed AST.
pub fn parse_source(file_name: &str, source: &str) -> DiagResult<Program> {
    let lexer = Lexer::new(source, file_name);
    let mut parser = Parser::new(lexer, Sema::new())?;
    parser.parse_program()
}

/// Compile a source string to the configured output (IR text by default,
/// the printed AST under `EmitKind::Ast`).
pub fn compile_source(
    file_name: &str,
    source: &str,
    config: &CompilerConfig,
) -> DiagResult<String> {
    let program = parse_source(file_name, source)?;
    match config.emit {
        EmitKind::Ast => Ok(printer::print_program(&program)),
        EmitKind::Ir => {
            let module = IrGen::new(config).emit_program(&program)?;
            minic_ir::verify(&module).map_err(|e| Diag::internal(e.to_string()))?;
            Ok(module.print_to_string())
        }
    }
}

/// Errors from the file-level entry point: I/O around the compilation, or a
/// diagnostic from inside it.
#[derive(Debug)]
pub enum CompileError {
    Io(std::io::Error),
    Compile { file: String, diag: Diag },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Io(e) => write!(f, "{}", e),
            CompileError::Compile { file, diag } => write!(f, "{}:{}", file, diag),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::Io(e)
    }
}

/// Compile `input` and write the artifact to `output`.
pub fn compile_file(
    input: &Path,
    output: &Path,
    config: &CompilerConfig,
) -> Result<(), CompileError> {
    let source = std::fs::read_to_string(input)?;
    let file_name = input.display().to_string();
    let artifact =
        compile_source(&file_name, &source, config).map_err(|diag| CompileError::Compile {
            file: file_name.clone(),
            diag,
        })?;
    std::fs::write(output, artifact)?;
    Ok(())
}
