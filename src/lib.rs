pub mod cli;
pub mod config;
pub mod data;
pub mod export;
pub mod filter;
pub mod infer;
pub mod ingest;
pub mod io_utils;
pub mod record;
pub mod schema;
pub mod session;
pub mod stats;
pub mod table;

use std::{env, path::PathBuf, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands, FilterArgs, SourceArgs},
    config::TriageConfig,
    export::ExportTable,
    filter::Filter,
    ingest::IngestOptions,
    record::{Record, Status},
    session::Session,
    stats::Overview,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("candidate_triage", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Probe(args) => handle_probe(&args),
        Commands::View(args) => handle_view(&args),
        Commands::Export(args) => handle_export(&args),
        Commands::Stats(args) => handle_stats(&args),
    }
}

fn load_session(source: &SourceArgs) -> Result<(Session, TriageConfig)> {
    let config = TriageConfig::load_or_default(source.config.as_deref())?;
    let encoding = io_utils::resolve_encoding(source.input_encoding.as_deref())?;
    info!(
        "Loading '{}' (encoding {})",
        source.input.display(),
        encoding.name()
    );
    let options = IngestOptions::new(&config.detection).with_encoding(encoding);
    let mut session = Session::new();
    let ticket = session.begin_ingest();
    let result = ingest::read_dataset(&source.input, options);
    session
        .finish_ingest(ticket, result)
        .with_context(|| format!("Reading {:?}", source.input))?;
    Ok((session, config))
}

/// Adds configured presets, then command-line filters, to the session.
/// Later filters on the same column replace earlier ones.
fn apply_filters(session: &mut Session, config: &TriageConfig, args: &FilterArgs) -> Result<()> {
    for expr in config.filters.iter().chain(&args.filters) {
        let filter = Filter::parse(expr, session.schema())
            .with_context(|| format!("Parsing filter '{expr}'"))?;
        debug!("Applying filter on '{}'", filter.column);
        session.add_filter(filter);
    }
    if let Some(raw) = &args.status {
        let status = raw.parse::<Status>()?;
        session.add_filter(Filter::status(status));
    }
    Ok(())
}

fn select<'a>(session: &'a Session, args: &FilterArgs) -> Vec<&'a Record> {
    match args.search.as_deref() {
        Some(query) => session.search(query),
        None => session.filtered(),
    }
}

fn handle_probe(args: &cli::ProbeArgs) -> Result<()> {
    let (session, _) = load_session(&args.source)?;
    let schema = session.schema();
    if args.json {
        let rendered = serde_json::to_string_pretty(schema).context("Serializing schema")?;
        println!("{rendered}");
    } else {
        print!("{}", table::schema_grid(schema).render());
    }
    info!(
        "Detected {} field(s) across {} record(s)",
        schema.len(),
        session.records().len()
    );
    Ok(())
}

fn handle_view(args: &cli::ViewArgs) -> Result<()> {
    let (mut session, config) = load_session(&args.source)?;
    apply_filters(&mut session, &config, &args.filter)?;
    let schema = session.schema();
    let mut fields = if args.all_fields {
        schema.visible_fields().collect::<Vec<_>>()
    } else {
        schema.primary_fields().collect::<Vec<_>>()
    };
    if fields.is_empty() {
        fields = schema.visible_fields().collect();
    }

    let records = select(&session, &args.filter);
    let shown = args.limit.unwrap_or(records.len()).min(records.len());
    let grid = table::records_grid(fields, records.iter().copied().take(shown));
    print!("{}", grid.render());
    println!(
        "Showing {shown} of {} matching record(s) ({} total)",
        records.len(),
        session.records().len()
    );
    Ok(())
}

fn handle_export(args: &cli::ExportArgs) -> Result<()> {
    let (mut session, config) = load_session(&args.source)?;
    apply_filters(&mut session, &config, &args.filter)?;
    for column in args.hide.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
        if !session.set_column_visibility(column, false) {
            warn!("Cannot hide unknown column '{column}'");
        }
    }

    let delimiter = match args.delimiter {
        Some(delimiter) => delimiter,
        None => config.export.delimiter_byte()?,
    };
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(export::default_export_filename()));
    let records = select(&session, &args.filter);
    let table = ExportTable::build(records, session.schema());
    table.save(&output, delimiter)
}

fn handle_stats(args: &cli::StatsArgs) -> Result<()> {
    let (mut session, config) = load_session(&args.source)?;
    apply_filters(&mut session, &config, &args.filter)?;
    let records = select(&session, &args.filter);
    let overview = Overview::new(session.records().len(), &records);
    let summaries = stats::field_summaries(records.iter().copied(), session.schema());

    println!(
        "{} of {} record(s) match",
        overview.filtered, overview.total
    );
    println!();
    print!("{}", table::status_grid(&overview.statuses).render());
    println!();
    print!("{}", table::summary_grid(&summaries).render());
    Ok(())
}
