//! Entry point: parses the CLI, installs logging, builds a heap from the
//! resulting config, and dispatches to one of run-a-file / REPL / serve
//! (spec §6). `anyhow` aggregates failures at this boundary only —
//! library crates never depend on it (SPEC_FULL §1).

use std::io::{BufRead, Write};

use clap::{Parser, Subcommand};

use suo::config::Config;
use suo_runtime::Heap;

/// Suo: a self-hosted programming environment's bootstrap runtime and CPS
/// compiler.
#[derive(Debug, Parser)]
#[command(name = "suo", version, about)]
struct Cli {
    /// Enable verbose (debug-level) tracing output on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate every top-level form in a file, printing each result.
    Run {
        /// Path to a file of bootstrap surface forms.
        path: std::path::PathBuf,
    },
    /// Read forms from stdin, evaluate, print results, one form per line.
    Repl,
    /// Speak the newline-delimited s-expression wire protocol over stdio.
    Serve,
}

fn install_tracing(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    install_tracing(cli.verbose);

    let mut heap = Heap::new(cli.config.into());

    match cli.command {
        Command::Run { path } => {
            let source = std::fs::read_to_string(&path)?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            if let Err(e) = suo::run_source(&mut heap, &source, &mut out) {
                if e.is_heap_exhausted() {
                    eprintln!("FULL");
                    std::process::exit(1);
                }
                return Err(e.into());
            }
        }
        Command::Repl => repl(&mut heap)?,
        Command::Serve => {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            let mut input = stdin.lock();
            let mut output = stdout.lock();
            suo::protocol::serve(&mut heap, &mut input, &mut output)?;
        }
    }

    Ok(())
}

/// Read one form per line from stdin until EOF, evaluating and printing
/// each. Per spec §6, heap exhaustion prints `FULL` to stderr and aborts;
/// every other error is reported and the REPL keeps reading (mirroring
/// reader-syntax errors' own "diagnostic, then unspecified" recovery).
fn repl(heap: &mut Heap) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut out = std::io::stdout();
    let mut line = String::new();
    loop {
        line.clear();
        let n = stdin.lock().read_line(&mut line)?;
        if n == 0 {
            return Ok(());
        }
        let mut lexer = suo_reader::Lexer::new(&line);
        match suo::eval_one(heap, &mut lexer) {
            Ok(Some(result)) => {
                writeln!(out, "{result}")?;
                out.flush()?;
            }
            Ok(None) => {}
            Err(e) if e.is_heap_exhausted() => {
                eprintln!("FULL");
                std::process::exit(1);
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }
}
