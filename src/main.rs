//! Rill compiler CLI
//!
//! The `rillc` command compiles a Rill source file into a textual IR
//! module for the downstream native toolchain.

use clap::{Parser, ValueEnum};
use rill::{ir, Profile, Target};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rillc")]
#[command(version = rill::VERSION)]
#[command(about = "The Rill compiler", long_about = None)]
struct Cli {
    /// Source file to compile
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Path for the emitted IR module (defaults to <stem>.ll)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Build configuration
    #[arg(long, value_enum, default_value_t = Config::Debug)]
    config: Config,

    /// Target the portable sandboxed runtime instead of the native host
    #[arg(long)]
    sandbox: bool,

    /// Print the token stream and exit
    #[arg(long)]
    emit_tokens: bool,

    /// Print the AST and exit
    #[arg(long)]
    emit_ast: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Config {
    /// No optimization, debug info
    Debug,
    /// Moderate optimization, debug info
    Development,
    /// Whole-program optimization, no debug info
    Shipping,
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let source = fs::read_to_string(&cli.input)
        .map_err(|e| miette::miette!("cannot read '{}': {}", cli.input.display(), e))?;

    let target = if cli.sandbox { Target::Sandboxed } else { Target::Native };
    let profile = match cli.config {
        Config::Debug => Profile::debug(target),
        Config::Development => Profile::development(target),
        Config::Shipping => Profile::shipping(target),
    };

    if cli.emit_tokens {
        let tokens = rill::lexer::tokenize(&source).map_err(|e| miette::miette!("{}", e))?;
        for token in &tokens {
            println!("{:>4}  {:12?} {:?}", token.pos, token.kind, token.text(&source));
        }
        return Ok(());
    }

    if cli.emit_ast {
        let tokens = rill::lexer::tokenize(&source).map_err(|e| miette::miette!("{}", e))?;
        let program =
            rill::parser::parse(tokens, &source).map_err(|e| miette::miette!("{}", e))?;
        println!("{:#?}", program);
        return Ok(());
    }

    let source_path = cli.input.to_string_lossy();
    let module = rill::compile(&source, &source_path, profile)
        .map_err(|e| miette::miette!("{}: {}", cli.input.display(), e))?;

    let output = cli.output.unwrap_or_else(|| cli.input.with_extension("ll"));
    fs::write(&output, ir::emit(&module))
        .map_err(|e| miette::miette!("cannot write '{}': {}", output.display(), e))?;

    println!("Wrote {}", output.display());
    Ok(())
}
