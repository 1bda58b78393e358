use std::fs::File;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::info;
use memmap2::Mmap;

use rlox as lox;

use lox::ast_printer::AstPrinter;
use lox::interpreter::Interpreter;
use lox::parser::Parser;
use lox::resolver::Resolver;
use lox::scanner::Scanner;
use lox::token::Token;

#[derive(ClapParser, Debug)]
#[command(version, about = "Lox language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize { filename: Option<PathBuf> },

    /// Parses input from a file and prints each statement's AST
    Parse {
        filename: Option<PathBuf>,

        /// Emit the AST as JSON instead of the parenthesized form
        #[arg(long)]
        json: bool,
    },

    /// Runs input from a file as a Lox program
    Run { filename: Option<PathBuf> },

    /// Starts an interactive read-eval-print loop
    Repl,
}

/// A script held as a read-only memory mapping, handed to the scanner
/// zero-copy.  Zero-length mappings are rejected by the OS, so an empty file
/// is represented without one.
struct ScriptFile {
    mmap: Option<Mmap>,
}

impl ScriptFile {
    fn open(filename: &PathBuf) -> Result<Self> {
        let file =
            File::open(filename).with_context(|| format!("Failed to open file {:?}", filename))?;

        let len = file
            .metadata()
            .with_context(|| format!("Failed to stat file {:?}", filename))?
            .len();

        if len == 0 {
            return Ok(Self { mmap: None });
        }

        // SAFETY: the mapping is read-only and outlives every borrow handed
        // to the scanner; the script is not expected to change underneath us.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to map file {:?}", filename))?;

        info!("Mapped {} bytes from {:?}", mmap.len(), filename);

        Ok(Self { mmap: Some(mmap) })
    }

    fn source(&self) -> Result<&str> {
        match &self.mmap {
            Some(mmap) => std::str::from_utf8(mmap).context("Script is not valid UTF-8"),
            None => Ok(""),
        }
    }
}

/// Scan the whole source, reporting lexical errors to stderr.  Returns the
/// token list (always EOF-terminated) and whether any error was seen.
fn scan(source: &str) -> (Vec<Token>, bool) {
    let mut tokens: Vec<Token> = Vec::new();
    let mut had_error = false;

    for result in Scanner::new(source) {
        match result {
            Ok(token) => tokens.push(token),

            Err(e) => {
                had_error = true;
                eprintln!("{}", e);
            }
        }
    }

    (tokens, had_error)
}

/// Scan → parse → resolve → interpret one source chunk against a persistent
/// interpreter.  Returns the two independent outcome flags
/// `(had static error, had runtime error)`; a static error suppresses
/// resolution and execution entirely.
fn run(source: &str, interpreter: &mut Interpreter) -> (bool, bool) {
    let (tokens, scan_failed) = scan(source);

    let (statements, parse_errors) = Parser::new(&tokens).parse();
    for e in &parse_errors {
        eprintln!("{}", e);
    }

    if scan_failed || !parse_errors.is_empty() {
        return (true, false);
    }

    let mut resolver = Resolver::new(interpreter);
    resolver.resolve(&statements);

    let resolve_errors = resolver.into_errors();
    for e in &resolve_errors {
        eprintln!("{}", e);
    }

    if !resolve_errors.is_empty() {
        return (true, false);
    }

    if let Err(e) = interpreter.interpret(&statements) {
        eprintln!("{}", e);
        return (false, true);
    }

    (false, false)
}

/// Interactive loop: one interpreter lives across lines, and diagnostics
/// never terminate the session.
fn run_prompt() -> Result<()> {
    info!("Starting REPL");

    let stdin = std::io::stdin();
    let mut reader = stdin.lock();
    let mut interpreter = Interpreter::default();
    let mut line = String::new();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        line.clear();
        let read = reader.read_line(&mut line)?;

        if read == 0 {
            break; // EOF (ctrl-D)
        }

        run(&line, &mut interpreter);
    }

    Ok(())
}

fn init_logger() -> Result<()> {
    // Create or open the log file
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    // Configure env_logger to write to file with timestamp and source line
    Builder::new()
        .format(|buf, record| {
            // Strip 'rlox::' from module path
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("rlox::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{} {}:{}] - {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

fn require_filename(filename: Option<PathBuf>) -> PathBuf {
    match filename {
        Some(filename) => filename,

        None => {
            eprintln!("Usage: rlox <command> [script]");
            std::process::exit(64);
        }
    }
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    // Initialize logger only if --log flag is provided
    if args.log {
        init_logger()?;
    } else {
        // Initialize a minimal logger to avoid "no logger" errors
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    match args.commands {
        Commands::Tokenize { filename } => {
            let filename = require_filename(filename);
            let script = ScriptFile::open(&filename)?;
            let source = script.source()?;

            let mut had_error = false;

            for result in Scanner::new(source) {
                match result {
                    Ok(token) => println!("{}", token),

                    Err(e) => {
                        had_error = true;
                        eprintln!("{}", e);
                    }
                }
            }

            if had_error {
                std::process::exit(65);
            }

            info!("Tokenization completed successfully");
        }

        Commands::Parse { filename, json } => {
            let filename = require_filename(filename);
            let script = ScriptFile::open(&filename)?;
            let source = script.source()?;

            let (tokens, scan_failed) = scan(source);

            let (statements, errors) = Parser::new(&tokens).parse();
            for e in &errors {
                eprintln!("{}", e);
            }

            if scan_failed || !errors.is_empty() {
                std::process::exit(65);
            }

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&statements)
                        .context("Failed to serialize AST")?
                );
            } else {
                for stmt in &statements {
                    println!("{}", AstPrinter::print_stmt(stmt));
                }
            }

            info!("Parse subcommand completed");
        }

        Commands::Run { filename } => {
            let filename = require_filename(filename);
            let script = ScriptFile::open(&filename)?;
            let source = script.source()?;

            let mut interpreter = Interpreter::default();

            let (had_error, had_runtime_error) = run(source, &mut interpreter);

            if had_error {
                std::process::exit(65);
            }
            if had_runtime_error {
                std::process::exit(70);
            }

            info!("Program executed successfully");
        }

        Commands::Repl => {
            run_prompt()?;
        }
    }

    Ok(())
}
