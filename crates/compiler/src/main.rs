//! minicc — compile a C translation unit to textual SSA IR.

use clap::{CommandFactory, Parser as ClapParser, ValueEnum};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::process;

use minicc::{CompilerConfig, EmitKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmitArg {
    /// Textual SSA IR (default)
    Ir,
    /// Typed AST rendered as C-like source
    Ast,
}

#[derive(ClapParser)]
#[command(name = "minicc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "C front-end emitting SSA IR", long_about = None)]
struct Cli {
    /// Input C source file (after preprocessing)
    input: Option<PathBuf>,

    /// Output path (defaults to the input with the extension swapped)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the target triple stamped on the module
    #[arg(long = "mtriple", value_name = "TRIPLE")]
    mtriple: Option<String>,

    /// What to emit
    #[arg(long, value_enum, default_value = "ir")]
    emit: EmitArg,

    /// Compiler configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Generate shell completions and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,
}

fn main() {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "minicc", &mut io::stdout());
        return;
    }

    let Some(input) = cli.input else {
        eprintln!("error: no input file");
        process::exit(2);
    };

    let mut config = match &cli.config {
        Some(path) => match CompilerConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        },
        None => CompilerConfig::default(),
    };
    if let Some(triple) = cli.mtriple {
        config.triple = triple;
    }
    config.emit = match cli.emit {
        EmitArg::Ir => EmitKind::Ir,
        EmitArg::Ast => EmitKind::Ast,
    };

    let output = cli.output.unwrap_or_else(|| {
        let ext = match config.emit {
            EmitKind::Ir => "ll",
            EmitKind::Ast => "ast",
        };
        input.with_extension(ext)
    });

    match minicc::compile_file(&input, &output, &config) {
        Ok(()) => {
            println!("Compiled {} -> {}", input.display(), output.display());
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}
