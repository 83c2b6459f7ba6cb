use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use pgfeed::data_importer::{ConnectionConfig, MemoryStore, PgStore};
use pgfeed::error::PgfeedError;
use pgfeed::monitoring::{MonitoringConfig, ProgressMonitor};
use pgfeed::pipeline::Orchestrator;
use pgfeed::record_decoder::InputSource;
use pgfeed::schema_deriver::{normalize, normalize_table_name};
use pgfeed::types::{ColumnType, ImportConfig, ImportReport, InputFormat, LineTerminator, TableRef};

#[derive(Parser)]
#[command(name = "pgfeed")]
#[command(about = "Imports CSV and JSON data into PostgreSQL")]
#[command(version)]
#[command(long_about = "Pgfeed streams delimited or newline-delimited JSON data from a file or standard input into a PostgreSQL table. The whole import runs in a single transaction: either every accepted row is committed or nothing is.")]
#[command(after_help = "EXAMPLES:
    # Import a CSV file into import.friends
    pgfeed csv friends.csv

    # Import semicolon separated data from stdin, skipping malformed rows
    cat data.csv | pgfeed --table data --ignore-errors csv --delimiter ';' -

    # Import newline-delimited JSON into a JSONB column
    pgfeed --schema events json --data-type jsonb clicks.jsonl")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// Target schema
    #[arg(long, global = true, env = "DB_SCHEMA", default_value = "import")]
    schema: String,

    /// Target table (defaults to the input file name)
    #[arg(long, global = true, env = "DB_TABLE")]
    table: Option<String>,

    /// Skip malformed rows and write them to stderr instead of aborting
    #[arg(long, global = true)]
    ignore_errors: bool,

    /// Decode and validate without connecting to the database
    #[arg(long, global = true)]
    dry_run: bool,

    /// Format of the final report
    #[arg(long, global = true, value_enum, default_value = "text")]
    report_format: ReportFormat,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Set log level explicitly
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Database to connect to
    #[arg(long = "dbname", visible_alias = "db", global = true, env = "DB_NAME", default_value = "postgres")]
    dbname: String,

    /// Host name
    #[arg(long, global = true, env = "DB_HOST", default_value = "localhost")]
    host: String,

    /// Port
    #[arg(long, global = true, env = "DB_PORT", default_value = "5432")]
    port: u16,

    /// Username
    #[arg(long = "username", visible_alias = "user", global = true, env = "DB_USER", default_value = "postgres")]
    username: String,

    /// Password
    #[arg(long = "pass", visible_alias = "pw", global = true, env = "DB_PASS", default_value = "", hide_env_values = true)]
    pass: String,

    /// Connection timeout in seconds
    #[arg(long, global = true, default_value = "5")]
    connect_timeout: u64,
}

impl From<&ConnectionArgs> for ConnectionConfig {
    fn from(args: &ConnectionArgs) -> Self {
        ConnectionConfig {
            host: args.host.clone(),
            port: args.port,
            database: args.dbname.clone(),
            user: args.username.clone(),
            password: args.pass.clone(),
            connection_timeout: Duration::from_secs(args.connect_timeout),
        }
    }
}

#[derive(ValueEnum, Clone, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ReportFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DataType {
    Json,
    Jsonb,
}

impl From<DataType> for ColumnType {
    fn from(data_type: DataType) -> Self {
        match data_type {
            DataType::Json => ColumnType::Json,
            DataType::Jsonb => ColumnType::Jsonb,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Import delimited records
    Csv {
        /// Input file, or - for standard input
        #[arg(value_name = "FILE")]
        input: String,

        /// Field delimiter (a single character, \t for tab)
        #[arg(long, default_value = ",")]
        delimiter: String,

        /// Comma separated column names to use instead of a header row
        #[arg(long)]
        fields: Option<String>,

        /// Discard the first line (only meaningful with --fields)
        #[arg(long)]
        skip_header: bool,

        /// Records are terminated by a bare carriage return
        #[arg(long)]
        excel: bool,

        /// Field value imported as NULL
        #[arg(long = "null", value_name = "VALUE")]
        null_value: Option<String>,
    },

    /// Import JSON documents
    Json {
        /// Input file, or - for standard input
        #[arg(value_name = "FILE")]
        input: String,

        /// Column type for the documents
        #[arg(long, value_enum, default_value = "json")]
        data_type: DataType,

        /// Column name for the documents
        #[arg(long, default_value = "data")]
        column: String,

        /// Treat the whole input as one document instead of one per line
        #[arg(long)]
        document: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    info!("Starting pgfeed v{}", env!("CARGO_PKG_VERSION"));

    let (source, config) = build_import_config(&cli)?;
    info!(
        input = %source,
        destination = %config.destination,
        format = ?config.format,
        ignore_errors = config.ignore_errors,
        dry_run = cli.dry_run,
        "Configuration loaded"
    );

    match execute_import_pipeline(&cli, &source, config).await {
        Ok(report) => {
            print_report(&report, cli.report_format)?;
        }
        Err(e) => {
            error!("Import failed: {}", e);
            eprintln!("Import failed: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Translate command line flags into the engine configuration
fn build_import_config(cli: &Cli) -> Result<(InputSource, ImportConfig), PgfeedError> {
    let (input, format) = match &cli.command {
        Commands::Csv { input, .. } => (input, InputFormat::Delimited),
        Commands::Json { input, document, .. } => (
            input,
            if *document { InputFormat::JsonDocument } else { InputFormat::JsonLines },
        ),
    };
    let source = InputSource::from_arg(input);

    let table = match &cli.table {
        Some(table) => normalize(table),
        None => source.path().and_then(normalize_table_name).ok_or_else(|| {
            PgfeedError::configuration("A --table name is required when reading from stdin")
        })?,
    };

    let mut config = ImportConfig::new(TableRef::new(cli.schema.clone(), table), format);
    config.ignore_errors = cli.ignore_errors;

    match &cli.command {
        Commands::Csv {
            delimiter,
            fields,
            skip_header,
            excel,
            null_value,
            ..
        } => {
            config.delimiter = parse_delimiter(delimiter)?;
            config.fields = fields.clone();
            config.skip_header = *skip_header;
            config.null_value = null_value.clone();
            if *excel {
                config.line_terminator = LineTerminator::CarriageReturn;
            }
            if *skip_header && fields.is_none() {
                warn!("--skip-header has no effect without --fields; the first line is read as the header");
            }
        }
        Commands::Json { data_type, column, .. } => {
            config.json_type = (*data_type).into();
            config.json_column = normalize(column);
        }
    }

    Ok((source, config))
}

fn parse_delimiter(raw: &str) -> Result<u8, PgfeedError> {
    let unescaped = match raw {
        "\\t" | "tab" => "\t",
        other => other,
    };
    match unescaped.as_bytes() {
        [b] if b.is_ascii() && *b != b'"' && *b != b'\n' && *b != b'\r' => Ok(*b),
        _ => Err(PgfeedError::configuration(format!(
            "Delimiter must be a single ASCII character other than a quote or line break, got {:?}",
            raw
        ))),
    }
}

/// Execute the import against PostgreSQL, or against memory for a dry run
async fn execute_import_pipeline(
    cli: &Cli,
    source: &InputSource,
    config: ImportConfig,
) -> Result<ImportReport, PgfeedError> {
    let input = source.open()?;
    let monitor = ProgressMonitor::new(MonitoringConfig::default(), source.total_bytes());

    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, rolling back at the next record");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let mut orchestrator = Orchestrator::new(config, io::stderr().lock())
        .with_monitor(monitor)
        .with_cancellation(cancelled);

    if cli.dry_run {
        info!("Dry run: rows are validated in memory and discarded");
        orchestrator.run(input, MemoryStore::new()).await
    } else {
        let store = PgStore::connect(&ConnectionConfig::from(&cli.connection)).await?;
        info!("PostgreSQL connection established");
        orchestrator.run(input, store).await
    }
}

fn print_report(report: &ImportReport, format: ReportFormat) -> Result<(), PgfeedError> {
    match format {
        ReportFormat::Text => {
            for line in report.summary_lines() {
                println!("{}", line);
            }
        }
        ReportFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }
    Ok(())
}

/// Initialize logging based on CLI configuration. Logs go to stdout so that
/// stderr only ever carries rejected rows.
fn initialize_logging(cli: &Cli) -> Result<()> {
    let log_level = if let Some(level) = &cli.log_level {
        level.clone().into()
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string().to_lowercase()));

    if cli.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stdout)
            .with_target(false)
            .with_thread_ids(cli.verbose)
            .with_file(cli.verbose)
            .with_line_number(cli.verbose)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stdout)
            .with_target(false)
            .with_thread_ids(cli.verbose)
            .with_file(cli.verbose)
            .with_line_number(cli.verbose)
            .init();
    }

    Ok(())
}
