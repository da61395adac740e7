//! msolap: inspect connection strings and run queries against fixtures
//!
//! # Usage
//!
//! ```bash
//! # Show how a connection string resolves and what gets submitted
//! msolap resolve "Server=powerbi://api.powerbi.com/v1.0/contoso.com/Sales;AppId=a;AppKey=k"
//!
//! # Run a query against a JSON fixture
//! msolap run --fixture sales.json "Server=localhost;Database=Sales" "EVALUATE Sales"
//!
//! # Use a named connection from the config file
//! msolap resolve @sales --format json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use msolap::binding::PlanTag;
use msolap::prelude::*;
use msolap::provider::{DbType, PropertySet};
use msolap::session::init_properties;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "msolap")]
#[command(version)]
#[command(about = "Resolve OLAP connection strings and stream typed rows", long_about = None)]
#[command(after_help = "EXAMPLES:
    msolap resolve 'Server=localhost;Database=Sales;Integrated Security=SSPI'
    msolap run --fixture sales.json 'Server=localhost' 'EVALUATE Sales'
    msolap types")]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    /// Config file (defaults to <config dir>/msolap/config.toml)
    #[arg(long, env = "MSOLAP_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a connection string and show the initialization properties
    Resolve {
        /// Connection string, or @name from the config file
        connection: String,
    },
    /// Run a query against a JSON fixture
    Run {
        /// Fixture file with catalogs and query results
        #[arg(long)]
        fixture: PathBuf,

        /// Command timeout in seconds
        #[arg(long)]
        timeout: Option<i64>,

        /// Connection string, or @name from the config file
        connection: String,

        /// Query text
        query: String,
    },
    /// Show the native type mapping
    Types,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = dispatch(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "msolap=debug" } else { "msolap=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn dispatch(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ScanConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ScanConfig::load_default().context("Failed to load config")?,
    };

    match &cli.command {
        Commands::Resolve { connection } => {
            let connection = config.resolve_connection(connection)?;
            show_resolved(connection, &cli.format)
        }
        Commands::Run {
            fixture,
            timeout,
            connection,
            query,
        } => run_query(config, fixture, *timeout, connection, query, &cli.format),
        Commands::Types => {
            show_types();
            Ok(())
        }
    }
}

fn show_resolved(connection: &str, format: &OutputFormat) -> Result<()> {
    let descriptor = ConnectionDescriptor::resolve(connection);
    let properties = init_properties(&descriptor).masked();

    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "descriptor": descriptor,
                "data_source": descriptor.data_source_address(),
                "properties": properties
                    .iter()
                    .map(|p| (p.id.to_string(), serde_json::json!(p.value)))
                    .collect::<serde_json::Map<_, _>>(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            println!("{}", "Connection".cyan().bold());
            println!("  {} {}", "Topology:".dimmed(), descriptor.topology().to_string().white());
            println!("  {} {}", "Address:".dimmed(), descriptor.data_source_address().white());
            println!(
                "  {} {}",
                "Catalog:".dimmed(),
                descriptor.catalog.as_deref().unwrap_or("(discover)").white()
            );
            println!("  {} {}", "Auth:".dimmed(), descriptor.auth.name().yellow());
            if let Some(encrypt) = &descriptor.encrypt {
                println!("  {} {} {}", "Encrypt:".dimmed(), encrypt, "(not submitted)".dimmed());
            }
            println!();
            print_properties(&properties);
        }
    }
    Ok(())
}

fn print_properties(properties: &PropertySet) {
    println!("{}", "Initialization properties".green().bold());
    let width = properties
        .iter()
        .map(|p| p.id.to_string().len())
        .max()
        .unwrap_or(0);
    for p in properties.iter() {
        println!(
            "  {:width$}  {}",
            p.id.to_string().white(),
            p.value.to_string().yellow(),
            width = width
        );
    }
}

fn run_query(
    config: ScanConfig,
    fixture: &Path,
    timeout: Option<i64>,
    connection: &str,
    query: &str,
    format: &OutputFormat,
) -> Result<()> {
    let provider = MemoryProvider::from_fixture_file(fixture)
        .with_context(|| format!("Failed to load fixture {}", fixture.display()))?;
    let scan = MsolapScan::new(Arc::new(provider), config);

    let mut input = BindInput::new(connection, query);
    input.timeout = timeout;
    let bind = scan.bind(input)?;

    let mut state = scan.init(&bind, None)?;
    let mut chunk = state.new_chunk();
    let mut rows: Vec<Vec<Value>> = Vec::new();
    while scan.scan(&mut state, &mut chunk)? > 0 {
        rows.extend((0..chunk.len()).map(|i| chunk.row(i)));
    }
    state.close();

    match format {
        OutputFormat::Json => {
            let out: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| {
                    serde_json::Value::Object(
                        bind.names
                            .iter()
                            .cloned()
                            .zip(row.iter().map(Value::to_json))
                            .collect(),
                    )
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => print_table(&bind, &rows),
    }
    Ok(())
}

fn print_table(bind: &BindData, rows: &[Vec<Value>]) {
    if rows.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(Value::to_string).collect())
        .collect();
    let widths: Vec<usize> = bind
        .names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header: Vec<String> = bind
        .names
        .iter()
        .zip(&widths)
        .map(|(name, w)| format!("{:w$}", name, w = *w))
        .collect();
    println!("{}", header.join(" │ ").white().bold());

    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", sep.join("─┼─").dimmed());

    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:w$}", cell, w = *w))
            .collect();
        println!("{}", line.join(" │ "));
    }

    println!();
    println!("{} row(s) returned", rows.len().to_string().cyan());
}

fn show_types() {
    let natives = [
        DbType::I1,
        DbType::I2,
        DbType::I4,
        DbType::I8,
        DbType::UI1,
        DbType::UI2,
        DbType::UI4,
        DbType::UI8,
        DbType::R4,
        DbType::R8,
        DbType::Cy,
        DbType::Decimal,
        DbType::Numeric,
        DbType::Bool,
        DbType::Date,
        DbType::DbDate,
        DbType::DbTime,
        DbType::DbTimestamp,
        DbType::FileTime,
        DbType::Bstr,
        DbType::WStr,
        DbType::Str,
        DbType::VarNumeric,
        DbType::Variant,
        DbType::Guid,
    ];

    println!(
        "{:14} {:18} {:12} {}",
        "Native".white().bold(),
        "Buffer".white().bold(),
        "Bound as".white().bold(),
        "Logical".white().bold()
    );
    println!("{}", "─".repeat(60).dimmed());

    for native in natives {
        let tag = PlanTag::for_native(native);
        println!(
            "{:14} {:18} {:12} {}",
            native.name().cyan(),
            format!("{:?}", tag).yellow(),
            tag.bind_type().name().white(),
            LogicalType::from_native(native).name().green()
        );
    }
}
