use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use basaltc::parser::{Scanner, TokenKind};
use basaltc::rt::EphemeralLoader;
use basaltc::{Config, ProgramTable};

#[derive(Parser)]
#[command(name = "basaltc")]
#[command(about = "Basalt language compiler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every .bas file under a source root to .class files
    Compile {
        /// Source root directory (or a single .bas file)
        #[arg(value_name = "ROOT")]
        root: PathBuf,

        /// Output directory for .class files
        #[arg(short, long, value_name = "DIR", default_value = "out")]
        output: PathBuf,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Compile a source root and invoke an entry unit
    Run {
        /// Source root directory (or a single .bas file)
        #[arg(value_name = "ROOT")]
        root: PathBuf,

        /// Qualified entry unit, e.g. demo.Main
        #[arg(value_name = "ENTRY")]
        entry: String,

        /// Arguments passed to the entry program
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Lexically analyze a .bas file
    Lex {
        /// Input .bas file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Show token lines
        #[arg(short, long)]
        lines: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Compile { root, output, verbose } => {
            let program = compile_root(root, *verbose)?;
            let loader = EphemeralLoader::define(&program)?;
            loader.write_to(output)?;
            if *verbose {
                println!(
                    "Compiled {} unit(s) into {}",
                    program.len(),
                    output.display()
                );
            }
        }
        Commands::Run { root, entry, args } => {
            let program = compile_root(root, false)?;
            let loader = EphemeralLoader::define(&program)?;
            let code = loader.invoke(&entry.replace('.', "/"), args)?;
            std::process::exit(code);
        }
        Commands::Lex { input, lines } => {
            lex_file(input, *lines)?;
        }
    }

    Ok(())
}

/// Every .bas file under the root, with its package path derived from
/// the directory structure
fn source_files(root: &Path) -> Result<Vec<(PathBuf, String, String)>> {
    let mut files = Vec::new();

    if root.is_file() {
        let stem = file_stem(root)?;
        files.push((root.to_path_buf(), String::new(), stem));
        return Ok(files);
    }

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("bas") {
            continue;
        }
        let relative = path.parent().unwrap_or(root).strip_prefix(root)?;
        let package = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(".");
        let stem = file_stem(path)?;
        files.push((path.to_path_buf(), package, stem));
    }

    Ok(files)
}

fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .with_context(|| format!("invalid source file name: {}", path.display()))
}

fn compile_root(root: &Path, verbose: bool) -> Result<ProgramTable> {
    let files = source_files(root)?;
    if files.is_empty() {
        bail!("no .bas files found under {}", root.display());
    }

    let config = Config::default();
    let mut program = ProgramTable::new();
    for (path, package, stem) in &files {
        if verbose {
            println!("Compiling {}...", path.display());
        }
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        basaltc::compile_into(&source, package, stem, &config, &mut program)
            .with_context(|| format!("compiling {}", path.display()))?;
    }
    Ok(program)
}

fn lex_file(input: &Path, lines: bool) -> Result<()> {
    let source = std::fs::read_to_string(input)?;
    let mut scanner = Scanner::new(&source);
    loop {
        let token = scanner.next_token();
        if token.kind == TokenKind::Eof {
            break;
        }
        if lines {
            println!("{:?} '{}' at line {}", token.kind, token.lexeme, token.line);
        } else {
            println!("{:?}: '{}'", token.kind, token.lexeme);
        }
    }
    Ok(())
}
