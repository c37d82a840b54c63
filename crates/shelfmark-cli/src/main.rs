use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use shelfmark_catalog::NdlClient;
use shelfmark_core::models::{CatalogCandidate, ClassifiedCandidate, Ownership, SeriesId, Volume};
use shelfmark_core::{
    AppConfig, ExitCode, InteractionId, Library, Reconciler, Registrar, RegistrationOutcome,
    ShelfError,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "shelfmark",
    about = "Home library for physical books, keyed by ISBN",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format.
    /// Also enabled by setting SHELFMARK_JSON=1.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract an ISBN from scanner or OCR text and look it up.
    Scan { text: String },

    /// Look up a typed ISBN in the catalog.
    Lookup { isbn: String },

    /// Search the catalog by keyword.
    Search {
        keyword: String,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Register one or more volumes by ISBN.
    Register {
        #[arg(required = true)]
        isbns: Vec<String>,
    },

    /// List owned series.
    Library {
        /// Only series whose title or author contains this text.
        #[arg(long)]
        query: Option<String>,
    },

    /// Show one series with its volumes.
    Series { id: SeriesId },

    /// Catalog volumes of a series that are not in the library yet.
    Candidates { id: SeriesId },

    /// Delete one volume. The series goes with its last volume.
    DeleteVolume {
        isbn: String,
        #[arg(long)]
        confirm: bool,
    },

    /// Delete a series and every volume in it.
    DeleteSeries {
        id: SeriesId,
        #[arg(long)]
        confirm: bool,
    },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run diagnostics.
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration.
    Show,
    /// Print the config file location.
    Path,
    /// Write the defaults to the config file if it does not exist.
    Init,
}

// ─── Main ────────────────────────────────────────────────────────────────────

const DEFAULT_LOG_FILTER: &str = "warn,shelfmark=info,shelfmark_core=info,shelfmark_catalog=info";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_output = cli.json || std::env::var("SHELFMARK_JSON").as_deref() == Ok("1");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(error) = run(cli.command, json_output).await {
        let code = exit_code(&error);
        if json_output {
            let _ = print_json(&error_json(&error));
        } else {
            eprintln!("Error: {error:#}");
        }
        std::process::exit(code as i32);
    }
}

async fn run(command: Commands, json_output: bool) -> Result<()> {
    let start = Instant::now();
    let config = AppConfig::load()?;

    match command {
        Commands::Scan { text } => {
            let candidate = reconciler(&config)?.scan(&text).await?;
            report(json_output, start, &candidate, || print_candidate(&candidate))?;
        }

        Commands::Lookup { isbn } => {
            let candidate = reconciler(&config)?.lookup(&isbn).await?;
            report(json_output, start, &candidate, || print_candidate(&candidate))?;
        }

        Commands::Search { keyword, limit } => {
            let results = reconciler(&config)?.search(&keyword, limit).await?;
            report(json_output, start, &results, || {
                if results.is_empty() {
                    println!("No results for: {keyword}");
                }
                for candidate in &results {
                    print_candidate(candidate);
                }
            })?;
        }

        Commands::Register { isbns } => {
            let (library, catalog) = open_services(&config)?;
            let registrar = Registrar::new(catalog, library, &config);
            // One terminal session is one interaction context.
            let context = InteractionId::new();

            let mut outcomes = Vec::with_capacity(isbns.len());
            for raw in &isbns {
                let outcome = registrar.register(context, raw).await;
                debug!(input = %raw, state = ?outcome.state(), "registration finished");
                outcomes.push(outcome);
            }
            let failed = outcomes.iter().any(|o| {
                matches!(
                    o,
                    RegistrationOutcome::Rejected { .. } | RegistrationOutcome::Failure { .. }
                )
            });

            report(json_output, start, &outcomes, || {
                for (raw, outcome) in isbns.iter().zip(&outcomes) {
                    print_outcome(raw, outcome);
                }
            })?;
            if failed {
                let last_error = outcomes.into_iter().rev().find_map(|o| match o {
                    RegistrationOutcome::Rejected { error }
                    | RegistrationOutcome::Failure { error } => Some(error),
                    _ => None,
                });
                if let Some(error) = last_error {
                    std::process::exit(ExitCode::from(error.kind()) as i32);
                }
            }
        }

        Commands::Library { query } => {
            let library = Library::from_config(&config)?;
            let series = library.library_overview(query.as_deref())?;
            report(json_output, start, &series, || {
                if series.is_empty() {
                    println!(
                        "No series in library. Use `shelfmark register <isbn>` to add volumes."
                    );
                }
                for summary in &series {
                    println!(
                        "{id:>5}  {title:<40}  {author:<20}  {count} vol.",
                        id = summary.series.id,
                        title = summary.series.title,
                        author = summary.series.author.as_deref().unwrap_or("-"),
                        count = summary.volume_count,
                    );
                }
            })?;
        }

        Commands::Series { id } => {
            let library = Library::from_config(&config)?;
            let detail = library.series_detail(id)?;
            report(json_output, start, &detail, || {
                println!("{}", detail.series.title);
                if let Some(author) = &detail.series.author {
                    println!("  Author:    {author}");
                }
                if let Some(publisher) = &detail.series.publisher {
                    println!("  Publisher: {publisher}");
                }
                for volume in &detail.volumes {
                    print_volume(volume);
                }
            })?;
        }

        Commands::Candidates { id } => {
            let missing = reconciler(&config)?.missing_volumes(id).await?;
            report(json_output, start, &missing, || {
                if missing.is_empty() {
                    println!("No missing volumes found for series {id}.");
                }
                for candidate in &missing {
                    println!("  {}", describe(candidate));
                }
            })?;
        }

        Commands::DeleteVolume { isbn, confirm } => {
            require_confirmation(confirm);
            let (library, catalog) = open_services(&config)?;
            let deleted = Registrar::new(catalog, library, &config).delete_volume(&isbn)?;
            report(json_output, start, &deleted, || {
                println!("Deleted volume: {}", deleted.isbn);
                if deleted.remaining_count == 0 {
                    println!("Series {} had no volumes left and was removed.", deleted.series_id);
                }
            })?;
        }

        Commands::DeleteSeries { id, confirm } => {
            require_confirmation(confirm);
            let (library, catalog) = open_services(&config)?;
            let deleted = Registrar::new(catalog, library, &config).delete_series(id)?;
            report(json_output, start, &deleted, || {
                println!("Deleted series {id} ({} volumes).", deleted.deleted_count);
            })?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                report(json_output, start, &config, || {
                    print!("{}", toml::to_string_pretty(&config).unwrap_or_default());
                })?;
            }
            ConfigAction::Path => {
                let path = AppConfig::config_path();
                report(json_output, start, &path, || println!("{}", path.display()))?;
            }
            ConfigAction::Init => {
                let path = AppConfig::config_path();
                let created = !path.exists();
                if created {
                    AppConfig::default().save_to(&path)?;
                }
                report(
                    json_output,
                    start,
                    &serde_json::json!({ "path": path, "created": created }),
                    || {
                        if created {
                            println!("Wrote default config to {}", path.display());
                        } else {
                            println!("Config already exists: {}", path.display());
                        }
                    },
                )?;
            }
        },

        Commands::Doctor => {
            let config_path = AppConfig::config_path();
            let config_found = config_path.exists();
            let database = Library::from_config(&config).and_then(|library| {
                library.check_connection()?;
                let versions = library.schema_versions()?;
                let path = library.path().unwrap_or_default().to_string();
                Ok((path, versions))
            });

            let data = doctor_data(&config, &config_path, config_found, &database);
            report(json_output, start, &data, || {
                if config_found {
                    println!("✓ Config: {}", config_path.display());
                } else {
                    println!("○ Config: not found (using defaults)");
                }
                match &database {
                    Ok((path, versions)) => println!("✓ Database: {path} (schema {versions:?})"),
                    Err(e) => println!("✗ Database: {e}"),
                }
                println!("  Catalog:  {}", config.catalog.base_url);
            })?;
            if database.is_err() {
                std::process::exit(ExitCode::GeneralError as i32);
            }
        }
    }

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn open_services(config: &AppConfig) -> Result<(Arc<Library>, Arc<NdlClient>)> {
    let library = Arc::new(Library::from_config(config)?);
    let catalog = Arc::new(NdlClient::from_config(&config.catalog)?);
    Ok((library, catalog))
}

fn reconciler(config: &AppConfig) -> Result<Reconciler> {
    let (library, catalog) = open_services(config)?;
    Ok(Reconciler::new(catalog, library, config))
}

fn doctor_data<E: std::fmt::Display>(
    config: &AppConfig,
    config_path: &std::path::Path,
    config_found: bool,
    database: &std::result::Result<(String, Vec<u32>), E>,
) -> serde_json::Value {
    let database_status = match database {
        Ok((path, versions)) => {
            serde_json::json!({ "ok": true, "path": path, "schema_versions": versions })
        }
        Err(e) => serde_json::json!({
            "ok": false,
            "path": config.database_path(),
            "error": e.to_string(),
        }),
    };
    serde_json::json!({
        "config": { "path": config_path, "found": config_found },
        "database": database_status,
        "catalog": { "base_url": config.catalog.base_url },
    })
}

fn require_confirmation(confirm: bool) {
    if !confirm {
        eprintln!("Add --confirm to delete without prompt.");
        std::process::exit(ExitCode::InvalidArgs as i32);
    }
}

fn exit_code(error: &anyhow::Error) -> ExitCode {
    error
        .downcast_ref::<ShelfError>()
        .map(|e| ExitCode::from(e.kind()))
        .or_else(|| {
            error
                .downcast_ref::<shelfmark_catalog::CatalogError>()
                .map(|_| ExitCode::NetworkError)
        })
        .unwrap_or(ExitCode::GeneralError)
}

/// Error envelope for `--json`: kind and subject come from `ShelfError` when available.
fn error_json(error: &anyhow::Error) -> serde_json::Value {
    let shelf_error = error.downcast_ref::<ShelfError>();
    serde_json::json!({
        "status": "error",
        "error": shelf_error.map(|e| e.kind()),
        "subject": shelf_error.and_then(ShelfError::subject),
        "message": error.to_string(),
    })
}

fn report<T: Serialize>(
    json_output: bool,
    start: Instant,
    data: &T,
    human: impl FnOnce(),
) -> Result<()> {
    if json_output {
        print_json(&serde_json::json!({
            "status": "ok",
            "data": data,
            "meta": { "duration_ms": start.elapsed().as_millis() }
        }))
    } else {
        human();
        Ok(())
    }
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn describe(candidate: &CatalogCandidate) -> String {
    let mut line = candidate.title.clone();
    if let Some(number) = candidate.volume_number {
        line.push_str(&format!(" 第{number}巻"));
    }
    if let Some(author) = &candidate.author {
        line.push_str(&format!(" / {author}"));
    }
    match &candidate.isbn {
        Some(isbn) => line.push_str(&format!("  [{isbn}]")),
        None => line.push_str("  [no ISBN]"),
    }
    line
}

fn print_candidate(classified: &ClassifiedCandidate) {
    let marker = match classified.ownership {
        Ownership::Owned => "✓ owned    ",
        Ownership::NotOwned => "+ not owned",
        Ownership::Unknown => "? unknown  ",
    };
    let hint = if classified.ownership.is_registrable() {
        "  (shelfmark register <isbn>)"
    } else {
        ""
    };
    println!("{marker}  {}{hint}", describe(&classified.candidate));
}

fn print_volume(volume: &Volume) {
    let number = volume
        .volume_number
        .map(|n| format!("第{n}巻"))
        .unwrap_or_else(|| "-".to_string());
    println!("  {number:>6}  {}  {}", volume.isbn, volume.cover().unwrap_or(""));
}

fn print_outcome(raw: &str, outcome: &RegistrationOutcome) {
    match outcome {
        RegistrationOutcome::Success(registered) => println!(
            "✓ {raw}: registered in {} (series {})",
            registered.series.title, registered.series.id
        ),
        RegistrationOutcome::Conflict { series_id, .. } => {
            println!("= {raw}: already in library (series {series_id})")
        }
        RegistrationOutcome::RecentlyProcessed { retry_after, .. } => println!(
            "… {raw}: processed moments ago, retry in {}s",
            retry_after.as_secs().max(1)
        ),
        RegistrationOutcome::Rejected { error } => println!("✗ {raw}: {error}"),
        RegistrationOutcome::Failure { error } => {
            println!("✗ {raw}: {error} (try again later)")
        }
        RegistrationOutcome::Dropped => println!("… {raw}: a submission is still running"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_json_carries_kind_and_subject() {
        let error = anyhow::Error::from(ShelfError::VolumeNotFound("9784000000002".into()));
        let json = error_json(&error);
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "not_found");
        assert_eq!(json["subject"], "9784000000002");
        assert_eq!(exit_code(&error), ExitCode::NotFound);
    }

    #[test]
    fn test_doctor_data_reports_database_state() {
        let config = AppConfig::default();
        let path = std::path::Path::new("/tmp/shelfmark/config.toml");

        let healthy = Ok::<_, &str>(("/tmp/shelfmark/library.db".to_string(), vec![1, 2]));
        let json = doctor_data(&config, path, true, &healthy);
        assert_eq!(json["config"]["found"], true);
        assert_eq!(json["database"]["ok"], true);
        assert_eq!(json["database"]["schema_versions"], serde_json::json!([1, 2]));
        assert_eq!(json["catalog"]["base_url"], config.catalog.base_url.as_str());

        let broken = Err::<(String, Vec<u32>), _>("unable to open database file");
        let json = doctor_data(&config, path, false, &broken);
        assert_eq!(json["config"]["found"], false);
        assert_eq!(json["database"]["ok"], false);
        assert_eq!(json["database"]["error"], "unable to open database file");
    }

    #[test]
    fn test_error_json_for_foreign_errors() {
        let error = anyhow::anyhow!("disk on fire");
        let json = error_json(&error);
        assert!(json["error"].is_null());
        assert!(json["subject"].is_null());
        assert_eq!(json["message"], "disk on fire");
        assert_eq!(exit_code(&error), ExitCode::GeneralError);
    }
}
