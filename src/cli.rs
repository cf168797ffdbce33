use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Detect schemas in candidate spreadsheets, then filter, summarise, and export them",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the schema detected for a CSV, XLSX, XLS, or JSON file
    Probe(ProbeArgs),
    /// Show the filtered records as a table
    View(ViewArgs),
    /// Write the filtered records' visible fields as CSV
    Export(ExportArgs),
    /// Summarise status distribution and field population
    Stats(StatsArgs),
}

/// Options shared by every command that loads a dataset.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Input file; the format is chosen from its extension
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// YAML configuration with detection settings and filter presets
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Character encoding of CSV and JSON input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct FilterArgs {
    /// Filter expression such as `Years=3..10`, `Stage in Phone|Onsite`, or `Name=ana` (repeatable)
    #[arg(short = 'f', long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// Only keep records with this status (hired, not-hired, consideration, pending)
    #[arg(long)]
    pub status: Option<String>,
    /// Case-insensitive text that must appear in at least one field
    #[arg(long)]
    pub search: Option<String>,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Emit the schema as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ViewArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Show every visible field instead of the primary ones
    #[arg(long = "all-fields")]
    pub all_fields: bool,
    /// Maximum number of records to print
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Output path; `-` writes to stdout. Defaults to candidates-<date>.csv
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Output delimiter (supports ',', 'tab', ';', '|'); overrides the configuration
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Columns to leave out of the export (comma separated)
    #[arg(long = "hide", value_delimiter = ',')]
    pub hide: Vec<String>,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub filter: FilterArgs,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_delimiter_accepts_names_and_single_characters() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("é").is_err());
    }

    #[test]
    fn repeated_filters_are_collected() {
        let cli = Cli::parse_from([
            "candidate-triage",
            "view",
            "-i",
            "people.csv",
            "--filter",
            "Years=3..5",
            "-f",
            "Stage in Phone|Onsite",
            "--limit",
            "5",
        ]);
        let Commands::View(args) = cli.command else {
            panic!("expected view command");
        };
        assert_eq!(args.filter.filters.len(), 2);
        assert_eq!(args.limit, Some(5));
        assert!(!args.all_fields);
    }
}
