use anyhow::Result;
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

mod data;
mod dates;
mod db;
mod html;
mod server;
mod types;

#[derive(Parser, Debug)]
#[command(name = "bacheca")]
#[command(about = "Directory of educational initiatives for NAI students in Genova")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the SQLite database
    #[arg(long, default_value = "bacheca.db", global = true)]
    db: PathBuf,

    /// Directory scanned for iniziative_*.json export drops
    #[arg(long, default_value = "import", global = true)]
    import_dir: PathBuf,

    /// Output directory for generated files
    #[arg(short, long, default_value = ".", global = true)]
    output: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the web server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Generate a static HTML snapshot of the calendar view (no server)
    Build,

    /// Import export files into the database
    Import {
        /// A specific file; scans the import directory when omitted
        file: Option<PathBuf>,
    },

    /// Show how a free-form date text is interpreted
    Parse {
        /// The date text, e.g. "Giugno 2023 - Settembre 2023"
        text: String,
    },
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level))
        .add_directive("hyper=warn".parse().unwrap());

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_max_level(Level::TRACE)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level);

    match args.command {
        None => {
            server::serve(8080, args.db, args.import_dir).await?;
        }
        Some(Commands::Serve { port }) => {
            server::serve(port, args.db, args.import_dir).await?;
        }
        Some(Commands::Build) => {
            build_command(&args.db, &args.import_dir, &args.output)?;
        }
        Some(Commands::Import { file }) => {
            let conn = db::init_db(&args.db)?;
            let stats = match file {
                Some(path) => data::import_file(&conn, &path)?,
                None => data::process_all_imports(&conn, &args.import_dir)?,
            };
            info!(
                files = stats.files,
                inserted = stats.inserted,
                skipped = stats.skipped,
                "Import finished"
            );
        }
        Some(Commands::Parse { text }) => {
            match dates::parse_date_text(&text) {
                Some(range) => match range.end {
                    Some(end) => info!(start = %range.start, end = %end, "Parsed as range"),
                    None => info!(start = %range.start, "Parsed as single date"),
                },
                None => info!("No date recognized"),
            }
        }
    }

    Ok(())
}

/// Render the calendar view for the auto-selected day into a static file
fn build_command(
    db_path: &std::path::Path,
    import_dir: &std::path::Path,
    output: &std::path::Path,
) -> Result<()> {
    let conn = db::init_db(db_path)?;
    data::process_all_imports(&conn, import_dir)?;

    let all = db::list_initiatives(&conn)?;
    let now = Utc::now();
    let listed: Vec<types::Initiative> = all.into_iter().filter(|i| !i.is_expired(now)).collect();

    let today = Local::now().date_naive();
    let selected = dates::pick_default_day(&listed, today, None);
    let matched = match selected {
        Some(day) => dates::filter_by_day(&listed, day),
        None => Vec::new(),
    };

    let html_path = output.join("index.html");
    html::generate_html(&html_path, selected, &matched, listed.len())?;
    info!(path = %html_path.display(), "HTML saved");

    Ok(())
}
