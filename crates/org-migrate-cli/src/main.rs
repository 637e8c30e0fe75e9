//! org-migrate CLI - per-organization Candlepin data export and import.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use org_migrate::{
    resolve_org, ArchiveReader, ArchiveWriter, Backend, Config, DbConfig, MigrateError,
    MigrationSummary, Migrator,
};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "org-migrate")]
#[command(about = "Export or import one organization's Candlepin data")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file; --file and --password override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON summary to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Organization account to export or import
    org: String,

    /// Database backend: postgresql, mysql, or mariadb
    #[arg(long, default_value = "postgresql")]
    backend: String,

    /// Database host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Database port; backend default when omitted
    #[arg(long)]
    port: Option<u16>,

    /// Database username
    #[arg(long, short = 'u', default_value = "candlepin")]
    username: String,

    /// Database password
    #[arg(long, short = 'p', default_value = "")]
    password: String,

    /// Database name
    #[arg(long, default_value = "candlepin")]
    db: String,

    /// Archive file to export to or import from
    #[arg(long, default_value = "export.zip")]
    file: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Export an organization's data to an archive
    Export(ConnectionArgs),

    /// Import an organization's data from an archive
    Import(ConnectionArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(MigrateError::Config)?;

    let (conn, importing) = match &cli.command {
        Commands::Export(args) => (args, false),
        Commands::Import(args) => (args, true),
    };

    let config = build_config(cli.config.as_deref(), conn)?;

    // Open the archive before touching the database so a bad path fails
    // without a connection attempt.
    let mut reader = if importing {
        Some(ArchiveReader::open(&config.archive)?)
    } else {
        None
    };

    info!(
        backend = %config.database.backend,
        host = %config.database.host,
        database = %config.database.database,
        "connecting"
    );

    let store = org_migrate::store::connect(&config.database).await?;
    let org_id = resolve_org(&*store, &conn.org).await?;
    info!(org = %conn.org, org_id = %org_id, "resolved organization");

    let mut migrator = Migrator::new(store, conn.org.clone(), org_id);

    let summary = match reader.as_mut() {
        Some(archive) => migrator.run_import(archive).await?,
        None => {
            let mut archive = ArchiveWriter::create(&config.archive)?;
            let summary = migrator.run_export(&mut archive).await?;
            archive.finish()?;
            summary
        }
    };

    report(&cli, &config, &summary)?;
    Ok(())
}

/// Assemble the effective configuration: YAML file first, flags on top.
fn build_config(config_path: Option<&std::path::Path>, conn: &ConnectionArgs) -> Result<Config, MigrateError> {
    let mut config = match config_path {
        Some(path) => Config::load(path)?,
        None => Config {
            database: DbConfig {
                backend: conn.backend.parse::<Backend>()?,
                host: conn.host.clone(),
                port: conn.port,
                user: conn.username.clone(),
                password: conn.password.clone(),
                database: conn.db.clone(),
            },
            archive: conn.file.clone(),
        },
    };

    if config_path.is_some() {
        // Only the archive path and password win over file values; the
        // other connection flags cannot be told apart from their defaults.
        if conn.file != PathBuf::from("export.zip") {
            config.archive = conn.file.clone();
        }
        if !conn.password.is_empty() {
            config.database.password = conn.password.clone();
        }
    }

    Ok(config)
}

fn report(cli: &Cli, config: &Config, summary: &MigrationSummary) -> Result<(), MigrateError> {
    if cli.output_json {
        println!("{}", summary.to_json()?);
    } else {
        let verb = match summary.mode {
            "export" => "Exported",
            _ => "Imported",
        };
        println!("\n{} organization {}", verb, summary.org);
        println!("  Archive: {}", config.archive.display());
        println!("  Duration: {:.2}s", summary.duration_secs);
        println!("  Rows: {}", summary.total_rows);
        for task in &summary.tasks {
            println!("    {}: {}", task.task, task.rows);
        }
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
