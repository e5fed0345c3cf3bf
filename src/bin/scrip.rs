//! scrip CLI
//!
//! Flatten a directory into a `.scrip` archive and restore it again.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scrip::{list_entries, Entry, Flattener, Restorer};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scrip")]
#[command(version)]
#[command(about = "Flatten a directory into a single text file and restore it")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Flatten a directory into a scrip archive
    Flatten {
        /// The directory to flatten
        directory: PathBuf,

        /// Output file (default: <directory name>.scrip)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Restore a directory from a scrip archive
    Restore {
        /// The .scrip file to restore
        file: PathBuf,

        /// Output directory (default: file name without extension)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Allow archive paths that are absolute or contain `..`
        #[arg(long)]
        allow_unsafe_paths: bool,
    },

    /// List the files and empty directories in a scrip archive
    List {
        /// The .scrip file to list
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Flatten { directory, output } => flatten(&directory, output)?,
        Commands::Restore {
            file,
            output,
            allow_unsafe_paths,
        } => restore(&file, output, allow_unsafe_paths)?,
        Commands::List { file } => list(&file)?,
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn flatten(directory: &Path, output: Option<PathBuf>) -> Result<()> {
    let output = match output {
        Some(output) => output,
        None => default_archive_name(directory)?,
    };

    let summary = Flattener::new()
        .flatten_to_file(directory, &output)
        .context("Error during flattening")?;

    if !summary.unreadable.is_empty() {
        eprintln!(
            "Warning: {} file(s) could not be read and were archived with an error placeholder",
            summary.unreadable.len()
        );
    }
    println!(
        "Successfully flattened '{}' to '{}'",
        directory.display(),
        output.display()
    );
    Ok(())
}

fn restore(file: &Path, output: Option<PathBuf>, allow_unsafe_paths: bool) -> Result<()> {
    let output = match output {
        Some(output) => output,
        None => file.file_stem().map(PathBuf::from).with_context(|| {
            format!("Cannot derive an output directory from '{}'", file.display())
        })?,
    };

    let report = Restorer::new()
        .allow_unsafe_paths(allow_unsafe_paths)
        .restore(file, &output)
        .context("Error during restoration")?;

    if !report.warnings.is_empty() {
        eprintln!("Restored with {} warning(s)", report.warnings.len());
    }
    let name = file.file_name().unwrap_or(file.as_os_str());
    println!(
        "Successfully restored '{}' to '{}'",
        Path::new(name).display(),
        output.display()
    );
    Ok(())
}

fn list(file: &Path) -> Result<()> {
    let reader =
        fs::File::open(file).with_context(|| format!("Failed to read: {}", file.display()))?;
    for entry in list_entries(BufReader::new(reader))? {
        match entry {
            Entry::File { path, is_binary } => {
                let kind = if is_binary { "binary" } else { "file" };
                println!("{}\t{}", kind, path);
            }
            Entry::EmptyDir { path } => println!("dir\t{}", path),
        }
    }
    Ok(())
}

/// `<name>.scrip` in the current directory, where `name` is the final
/// component of the canonicalized input directory
fn default_archive_name(directory: &Path) -> Result<PathBuf> {
    let resolved = fs::canonicalize(directory)
        .with_context(|| format!("Input path '{}' is not a valid directory", directory.display()))?;
    let name = resolved
        .file_name()
        .with_context(|| format!("Cannot derive an archive name from '{}'", directory.display()))?;
    Ok(PathBuf::from(format!("{}.scrip", name.to_string_lossy())))
}
