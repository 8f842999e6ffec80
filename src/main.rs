use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use exprc::backend::{Backend, Execute};
use exprc::toplevel::{self, Options, Session};

/// Compiles and runs a small expression language one statement at a time.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Print every parsed statement.
    #[arg(long)]
    dump_ast: bool,

    /// Print every lowered function.
    #[arg(long)]
    dump_ir: bool,

    /// Read statements from this file instead of the prompt.
    file: Option<PathBuf>,
}

fn run<B: Backend + Execute>(backend: B, args: Args) {
    let options = Options {
        dump_ast: args.dump_ast,
        dump_ir: args.dump_ir,
    };
    let mut session = Session::new(backend, options);

    match args.file {
        Some(path) => {
            let src = fs::read_to_string(&path).unwrap_or_else(|e| {
                eprintln!("failed to read '{}': {}", path.display(), e);
                process::exit(1);
            });
            for result in session.run_source(&src) {
                toplevel::report(&result);
            }
        }
        None => {
            let stdin = io::stdin();
            if let Err(e) = session.main_loop(stdin.lock(), true) {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        }
    }
}

#[cfg(not(feature = "llvm"))]
fn main() {
    run(exprc::ir::Builder::new(), Args::parse());
}

#[cfg(feature = "llvm")]
fn main() {
    let args = Args::parse();
    match exprc::llvm::Llvm::new() {
        Ok(backend) => run(backend, args),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}
