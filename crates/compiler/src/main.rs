//! Scheme Compiler CLI
//!
//! Reads a Scheme program and writes interpreter bytecode. The positional
//! arguments decide the plumbing:
//!
//! - no arguments: source from stdin, bytecode to stdout
//! - one `.scm` argument: source file, bytecode to stdout
//! - one `.bc` argument: source from stdin, bytecode file
//! - two arguments: source file, bytecode file
//!
//! Exit code 0 on success; 1 on any error, with a single-line message on
//! stderr.

use clap::Parser as ClapParser;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;

use scmc::CompileError;

#[derive(ClapParser)]
#[command(name = "scmc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scheme compiler - compile .scm programs to .bc bytecode", long_about = None)]
struct Cli {
    /// Source file (.scm) and/or destination file (.bc)
    #[arg(num_args = 0..=2)]
    files: Vec<PathBuf>,

    /// Print the compiled instruction listing to stderr
    #[arg(long)]
    dump_ops: bool,
}

fn main() {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<(), CompileError> {
    let (input, output) = match cli.files.as_slice() {
        [] => (None, None),
        [path] => match path.extension().and_then(|e| e.to_str()) {
            Some("scm") => (Some(path.clone()), None),
            Some("bc") => (None, Some(path.clone())),
            _ => {
                eprintln!("usage: scmc [ input_file.scm ] [ output_file.bc ]");
                process::exit(1);
            }
        },
        [source, dest, ..] => (Some(source.clone()), Some(dest.clone())),
    };

    let source = match input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let mut parser = scmc::Parser::new(&source);
    let ast = parser.parse()?;
    let ir = scmc::Resolver::new().resolve(ast);
    let mut codegen = scmc::CodeGen::new();
    codegen.compile_program(&ir)?;

    if cli.dump_ops {
        eprint!("{}", codegen.dump());
    }

    match output {
        Some(path) => {
            let mut file = std::fs::File::create(path)?;
            codegen.write_to_stream(&mut file)?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            codegen.write_to_stream(&mut handle)?;
            handle.flush()?;
        }
    }

    Ok(())
}
