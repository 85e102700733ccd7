use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use monkey::value::Value;

/// The Monkey programming language: bytecode compiler and VM.
#[derive(Parser)]
#[command(name = "monkey", version, about)]
struct Cli {
    /// Script to run; drops into the REPL when omitted.
    script: Option<PathBuf>,

    /// Print the compiled bytecode instead of running it.
    #[arg(long)]
    bytecode: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.script {
        Some(path) => {
            let source = match fs::read_to_string(&path) {
                Ok(source) => source,
                Err(err) => {
                    eprintln!("failed to read {}: {err}", path.display());
                    return ExitCode::FAILURE;
                }
            };
            if cli.bytecode {
                dump_bytecode(&source)
            } else {
                run(&source)
            }
        }
        None => {
            println!("Hello! This is the Monkey programming language!");
            println!("Feel free to type in commands");
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let mut output = io::stdout();
            if let Err(err) = monkey::repl::start(&mut input, &mut output) {
                eprintln!("repl error: {err}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
    }
}

fn run(source: &str) -> ExitCode {
    match monkey::run_source(source) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// Disassemble the main program and every function constant.
fn dump_bytecode(source: &str) -> ExitCode {
    match monkey::compile_source(source) {
        Ok(bytecode) => {
            print!("=== main ===\n{}", bytecode.instructions);
            for (i, constant) in bytecode.constants.iter().enumerate() {
                if let Value::Function(func) = constant {
                    print!("\n=== fn {i} ===\n{}", func.instructions);
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
