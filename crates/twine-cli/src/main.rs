//! twine compiler CLI
//!
//! One subcommand per phase: each runs the pipeline up to its phase and
//! dumps that phase's artifact. Errors are rendered as diagnostics with
//! a source snippet; the first error stops the run.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use twine_codegen::CodeGen;
use twine_error::{Diagnostic, DiagnosticRenderer, Error, SourceFile};
use twine_lexer::tokenize;
use twine_parser::{parse, Program};
use twine_tac::Tac;

#[derive(Parser)]
#[command(name = "twinec")]
#[command(version)]
#[command(about = "twine language compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Checks for errors without emitting anything
    Check {
        /// Input file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Shows file tokens (debug)
    Lex {
        /// Input file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Shows the file AST (debug)
    Parse {
        /// Input file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Dump the tree as JSON instead of the outline
        #[arg(long)]
        json: bool,
    },

    /// Shows the linear three-address IR listing
    Tac {
        /// Input file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Shows the low-level IR handed to the backend
    Ir {
        /// Input file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::FAILURE,
    }
}

fn run(command: Commands) -> Result<(), ()> {
    match command {
        Commands::Check { input } => {
            let file = load(&input)?;
            let tokens = report(&file, tokenize(&file.source).map_err(Error::from))?;
            println!("  [ok] Lexer: {} tokens", tokens.len());

            let program = report(&file, parse(tokens).map_err(Error::from))?;
            println!(
                "  [ok] Parser: {} statements",
                program.statements.statements.len()
            );

            let tac = report(&file, Tac::generate(&program).map_err(Error::from))?;
            println!(
                "  [ok] TAC: {} instructions, types verified",
                tac.instructions.len()
            );

            let module = report(&file, CodeGen::generate(&program).map_err(Error::from))?;
            let main = module.get_function("main").expect("main exists");
            println!("  [ok] Codegen: {} basic blocks", main.blocks.len());

            println!("\nNo errors found!");
            Ok(())
        }

        Commands::Lex { input } => {
            let file = load(&input)?;
            let tokens = report(&file, tokenize(&file.source).map_err(Error::from))?;

            for token in &tokens {
                println!("  {:5}  {:<18} {}", token.position, token.kind, token.text);
            }
            println!("\nTotal: {} tokens", tokens.len());
            Ok(())
        }

        Commands::Parse { input, json } => {
            let file = load(&input)?;
            let program = front_end(&file)?;

            if json {
                let dump = serde_json::to_string_pretty(&program).expect("AST serializes");
                println!("{}", dump);
            } else {
                println!(
                    "Declared variables: {}",
                    program.variables.identifiers.join(", ")
                );
                println!(
                    "Statements: {}",
                    program.statements.statements.len()
                );
                println!("\nParse completed successfully!");
            }
            Ok(())
        }

        Commands::Tac { input } => {
            let file = load(&input)?;
            let program = front_end(&file)?;
            let tac = report(&file, Tac::generate(&program).map_err(Error::from))?;
            println!("{}", tac);
            Ok(())
        }

        Commands::Ir { input } => {
            let file = load(&input)?;
            let program = front_end(&file)?;
            let module = report(&file, CodeGen::generate(&program).map_err(Error::from))?;
            println!("{}", module);
            Ok(())
        }
    }
}

/// Reads the input file into a source cache entry
fn load(input: &PathBuf) -> Result<SourceFile, ()> {
    match fs::read_to_string(input) {
        Ok(source) => Ok(SourceFile::new(input.display().to_string(), source)),
        Err(e) => {
            eprintln!("Error reading file: {}", e);
            Err(())
        }
    }
}

/// Runs the scanner and parser, rendering any failure
fn front_end(file: &SourceFile) -> Result<Program, ()> {
    let tokens = report(file, tokenize(&file.source).map_err(Error::from))?;
    report(file, parse(tokens).map_err(Error::from))
}

/// Renders a phase failure and translates it into a process-level error
fn report<T>(file: &SourceFile, result: Result<T, Error>) -> Result<T, ()> {
    result.map_err(|error| {
        tracing::debug!(%error, "compilation aborted");
        let renderer = DiagnosticRenderer::new(file);
        eprintln!("{}", renderer.render(&Diagnostic::from(&error)));
    })
}
