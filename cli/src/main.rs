use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use dbmap_core::{Database, DatabaseConfig, Migration, SchemaRegistry};
use dbmap_sqlite::SqliteEngine;
use regex::Regex;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// `<database>.<old>-<new>.sql`, e.g. `shop.1-2.sql`.
const MIGRATION_FILE_PATTERN: &str = r"^(?P<db>.+)\.(?P<old>\d+)-(?P<new>\d+)\.sql$";

#[derive(Debug, Parser)]
#[command(name = "dbmap")]
#[command(about = "Schema bootstrap and migration for dbmap databases")]
struct Cli {
    /// Log at debug level regardless of RUST_LOG.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the stored schema version of every configured database.
    Status(StatusArgs),
    /// Create brand-new databases and apply pending migration scripts.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Path to the YAML configuration.
    #[arg(long)]
    config: PathBuf,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    /// Path to the YAML configuration.
    #[arg(long)]
    config: PathBuf,
    /// Directory of `<database>.<old>-<new>.sql` scripts.
    #[arg(long)]
    migrations: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Status(args) => run_status(args),
        Command::Migrate(args) => run_migrate(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // Logs go to stderr so stdout stays a clean report.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

// ---------------------------------------------------------------------------
// status command
// ---------------------------------------------------------------------------

fn run_status(args: StatusArgs) -> Result<(), String> {
    let config = load_config(&args.config)?;
    let names = config.database_names();
    if names.is_empty() {
        return Err(format!(
            "No connections configured in '{}'",
            args.config.display()
        ));
    }
    let db = open_database(&config, false)?;

    println!("Schema status (target version {}):", config.settings.version);
    for name in &names {
        let master = db
            .engine()
            .master_path(name)
            .map_err(|e| format!("Invalid connection settings: {e}"))?;
        if master != Path::new(":memory:") && !master.exists() {
            println!("  {name}: version 0 (no database file at {})", master.display());
            continue;
        }
        let info = db
            .system_info(name)
            .map_err(|e| {
                e.log();
                format!("Failed to read system info of '{name}': {e}")
            })?;
        let version = info.version();
        let state = if version == 0 {
            "not initialized".to_string()
        } else if version < config.settings.version {
            format!("{} migration(s) pending", config.settings.version - version)
        } else {
            "up to date".to_string()
        };
        println!("  {name}: version {version} ({state})");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// migrate command
// ---------------------------------------------------------------------------

fn run_migrate(args: MigrateArgs) -> Result<(), String> {
    let config = load_config(&args.config)?;
    let migrations = match &args.migrations {
        Some(dir) => load_migrations(dir)?,
        None => Vec::new(),
    };
    info!(
        scripts = migrations.len(),
        target = config.settings.version,
        "starting migration"
    );

    let db = open_database(&config, true)?;
    let report = db
        .initialize(&migrations)
        .map_err(|e| {
            e.log();
            format!("Migration failed: {e}")
        })?;

    println!("Migration complete:");
    for database in &report.databases {
        println!(
            "  {}: {} -> version {} (was {}, {} table(s) created, {} migration(s) applied)",
            database.database,
            database.found,
            database.version_after,
            database.version_before,
            database.tables_created,
            database.migrations_applied
        );
    }
    Ok(())
}

/// Reads every migration script in `dir`, ordered by database and version.
fn load_migrations(dir: &Path) -> Result<Vec<Migration>, String> {
    let pattern = Regex::new(MIGRATION_FILE_PATTERN).map_err(|e| e.to_string())?;
    let entries = fs::read_dir(dir)
        .map_err(|e| format!("Failed to read migrations directory '{}': {e}", dir.display()))?;

    let mut migrations = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| format!("Failed to read migrations directory '{}': {e}", dir.display()))?
            .path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != "sql") {
            continue;
        }
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let caps = pattern.captures(file_name).ok_or_else(|| {
            format!(
                "Migration file '{}' does not match <database>.<old>-<new>.sql",
                path.display()
            )
        })?;
        let old = parse_version(&caps["old"], &path)?;
        let new = parse_version(&caps["new"], &path)?;
        let sql = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read '{}': {e}", path.display()))?;
        let migration = Migration::new(&caps["db"], old, new, sql)
            .map_err(|e| format!("Invalid migration '{}': {e}", path.display()))?;
        debug!(file = %path.display(), old, new, "loaded migration script");
        migrations.push(migration);
    }

    migrations.sort_by(|a, b| {
        a.target_database()
            .cmp(b.target_database())
            .then(a.old_version().cmp(&b.old_version()))
    });
    Ok(migrations)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_version(raw: &str, path: &Path) -> Result<u32, String> {
    raw.parse()
        .map_err(|e| format!("Bad version '{raw}' in '{}': {e}", path.display()))
}

/// Loads the configuration and resolves relative database paths against the
/// directory holding the configuration file.
fn load_config(path: &Path) -> Result<DatabaseConfig, String> {
    let mut config = DatabaseConfig::load(path).map_err(|e| {
        e.log();
        format!("Failed to load config '{}': {e}", path.display())
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    for connection in &mut config.connections {
        let file = Path::new(&connection.connection_string);
        if file.is_relative() && connection.connection_string != ":memory:" {
            connection.connection_string = base.join(file).to_string_lossy().into_owned();
        }
    }
    Ok(config)
}

/// `create_missing` decides whether absent database files are created on first use.
fn open_database(config: &DatabaseConfig, create_missing: bool) -> Result<Database<SqliteEngine>, String> {
    let engine = SqliteEngine::from_config(config)
        .map_err(|e| format!("Invalid connection settings: {e}"))?
        .create_missing(create_missing);
    let default_database = config.database_names().into_iter().next().unwrap_or_default();
    let registry = SchemaRegistry::builder(config.settings.clone(), default_database).build();
    Ok(Database::new(engine, registry, config.settings.clone()))
}
