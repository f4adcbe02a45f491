use std::{env, io, path::Path, process};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use minilang::bytecode::{disasm::disassemble, text::read_program};
use minilang::runtime::InterpreterConfig;
use minilang::{RunError, run_program};

fn main() {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let disasm = args.iter().any(|a| a == "--bc");

    // first non-flag argument is the filename
    let Some(filename) = args.iter().skip(1).find(|a| !a.starts_with('-')) else {
        println!("You must supply a filename");
        process::exit(1);
    };

    let result = read_program(Path::new(filename))
        .map_err(RunError::from)
        .and_then(|program| {
            if disasm {
                print!("{}", disassemble(&program));
            }
            run_program(&program, io::stdout().lock(), InterpreterConfig::default())
        });

    match result {
        Ok(_) => {}
        Err(RunError::Load(e)) => {
            eprintln!("Failed to load '{}': {}", filename, e);
            process::exit(1);
        }
        Err(panic @ RunError::Panic(_)) => {
            eprintln!("{}", panic);
            process::exit(1);
        }
    }
}

/// Log to stderr, filtered by `RUST_LOG`.
///
/// Enable with `RUST_LOG=minilang=debug` or `RUST_LOG=minilang=trace`.
fn init_tracing() {
    // Only initialize if RUST_LOG is set
    if env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr).with_target(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}
