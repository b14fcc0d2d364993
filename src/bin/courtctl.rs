//! courtctl - manage complexes and court regions in the court store

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use courtwatch::{
    now_ms, parse_points, ComplexRecord, CourtStatus, CourtStore, SqliteCourtStore,
    TransactionOutcome,
};

#[derive(Parser, Debug)]
#[command(name = "courtctl", about = "Inspect and configure tennis complexes")]
struct Args {
    /// Path to the court SQLite DB
    #[arg(long, global = true, env = "COURTWATCH_DB_PATH", default_value = "courts.db")]
    db: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List complexes with court counts
    List,

    /// Show the courts of one complex
    Show {
        complex: String,
        /// Print the stored JSON document instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Import a complex document (JSON) under the given id
    Import {
        #[arg(long)]
        id: String,
        #[arg(long)]
        file: String,
    },

    /// Save a court region as normalized "x,y;x,y;..." points
    Configure {
        complex: String,
        court: String,
        #[arg(long)]
        points: String,
    },

    /// Transactionally set a court status (available | in-use)
    SetStatus {
        complex: String,
        court: String,
        status: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let store = SqliteCourtStore::open(&args.db)
        .with_context(|| format!("failed to open court store {}", args.db))?;

    match args.command {
        Command::List => cmd_list(&store),
        Command::Show { complex, json } => cmd_show(&store, &complex, json),
        Command::Import { id, file } => cmd_import(&store, &id, &file),
        Command::Configure {
            complex,
            court,
            points,
        } => cmd_configure(&store, &complex, &court, &points),
        Command::SetStatus {
            complex,
            court,
            status,
        } => cmd_set_status(&store, &complex, &court, &status),
    }
}

fn cmd_list(store: &dyn CourtStore) -> Result<()> {
    let complexes = store.list_complexes()?;
    if complexes.is_empty() {
        println!("no complexes");
        return Ok(());
    }
    for complex in complexes {
        let configured = complex.courts.iter().filter(|c| c.is_watchable()).count();
        println!(
            "{:<20} {:<30} courts={} configured={}",
            complex.id,
            complex.name,
            complex.courts.len(),
            configured
        );
    }
    Ok(())
}

fn cmd_show(store: &dyn CourtStore, id: &str, json: bool) -> Result<()> {
    let complex = store.load_complex(id)?;
    if json {
        println!("{}", complex.to_json()?);
        return Ok(());
    }
    println!("=== {} ({}) ===", complex.name, complex.id);
    for court in &complex.courts {
        let points = court.region_points.as_ref().map_or(0, Vec::len);
        println!(
            "{:<16} {:<10} configured={:<5} surface={:<8} points={} updated={}",
            court.name,
            court.status.as_str(),
            court.is_configured,
            if court.surface.is_empty() { "-" } else { court.surface.as_str() },
            points,
            court.last_updated_status
        );
    }
    if complex.has_unconfigured_courts() {
        println!();
        println!("some courts have no region; run `courtctl configure` to add one");
    }
    Ok(())
}

fn cmd_import(store: &dyn CourtStore, id: &str, file: &str) -> Result<()> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file))?;
    let complex = ComplexRecord::from_json(id, &raw)?;
    store.put_complex(&complex)?;
    println!(
        "imported {} ({}) with {} court(s)",
        complex.id,
        complex.name,
        complex.courts.len()
    );
    Ok(())
}

fn cmd_configure(store: &dyn CourtStore, id: &str, court: &str, points: &str) -> Result<()> {
    let points = parse_points(points)?;
    let count = store.save_regions(id, &[(court.to_string(), points)])?;
    if count == 0 {
        return Err(anyhow!("no courts updated"));
    }
    println!("saved region for {} in {}", court, id);
    Ok(())
}

fn cmd_set_status(store: &dyn CourtStore, id: &str, court: &str, status: &str) -> Result<()> {
    let status: CourtStatus = status.parse()?;
    match store.update_court_status(id, court, status, now_ms())? {
        TransactionOutcome::Written => println!("{} is now {}", court, status),
        TransactionOutcome::NoOp => println!("{} was already {}", court, status),
    }
    Ok(())
}
