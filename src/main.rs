use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tacc::Compiler;
use tracing_subscriber::EnvFilter;

/// Translate a restricted C source file into three-address code.
#[derive(Parser)]
#[clap(version, about)]
struct Opts {
    /// Source file to translate
    filename: PathBuf,

    /// Where to write the generated intermediate code
    #[clap(short, long, default_value = "intermediate_code.txt")]
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    let source = fs::read_to_string(&opts.filename)
        .with_context(|| format!("unable to read {}", opts.filename.display()))?;

    let mut compiler = Compiler::new();

    for (number, line) in source.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        compiler.parse_line(line, number + 1)?;
    }

    compiler.validate_entry_point()?;

    println!("Symbol Table:");
    for (name, role) in compiler.symbol_table().iter() {
        println!("  {name} -> {role}");
    }

    println!("\nIntermediate Code:");
    for line in compiler.intermediate_code() {
        println!("  {line}");
    }

    compiler
        .write_intermediate_code(&opts.output)
        .with_context(|| format!("unable to write {}", opts.output.display()))?;

    Ok(())
}
