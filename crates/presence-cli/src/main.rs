use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use presence_core::display::format_secs;
use presence_core::matcher::{DEFAULT_FALLBACK_TOLERANCE, DEFAULT_MATCH_TOLERANCE};
use presence_core::{FeedReader, GalleryMatcher, IdentityMatcher, Recognition, Roster};
use presence_store::{open_store, AttendanceStore, SqliteStore, StoreBackend};
use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "presence", about = "Presence attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show saved attendance totals
    Report {
        /// Storage backend (json or sqlite)
        #[arg(short, long, default_value = "json")]
        backend: StoreBackend,
        /// Store location; defaults to the daemon's data directory
        #[arg(short, long)]
        store: Option<PathBuf>,
        /// Show per-day history instead of totals (sqlite only)
        #[arg(long)]
        daily: bool,
        /// Restrict daily history to one day (YYYY-MM-DD)
        #[arg(long, requires = "daily")]
        date: Option<NaiveDate>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Copy saved totals between stores, upgrading legacy records
    Migrate {
        /// Source store
        #[arg(long)]
        from: PathBuf,
        #[arg(long, default_value = "json")]
        from_backend: StoreBackend,
        /// Destination store; defaults to rewriting the source in place
        #[arg(long)]
        to: Option<PathBuf>,
        /// Destination backend; defaults to the source backend
        #[arg(long)]
        to_backend: Option<StoreBackend>,
    },
    /// List enrolled people
    Roster {
        #[arg(short, long)]
        roster: PathBuf,
    },
    /// Run a recorded feed through the matcher and summarize recognitions
    CheckFeed {
        #[arg(short, long)]
        feed: PathBuf,
        #[arg(short, long)]
        roster: PathBuf,
        #[arg(long, default_value_t = DEFAULT_MATCH_TOLERANCE)]
        tolerance: f32,
        #[arg(long, default_value_t = DEFAULT_FALLBACK_TOLERANCE)]
        fallback_tolerance: f32,
        /// Treat frames with several faces as unrecognizable
        #[arg(long)]
        single_person: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Report {
            backend,
            store,
            daily,
            date,
            json,
        } => {
            let path = store.unwrap_or_else(|| default_store_path(backend));
            if daily {
                report_daily(backend, &path, date, json)
            } else {
                report_totals(backend, &path, json)
            }
        }
        Commands::Migrate {
            from,
            from_backend,
            to,
            to_backend,
        } => {
            let to = to.unwrap_or_else(|| from.clone());
            migrate(from_backend, &from, to_backend.unwrap_or(from_backend), &to)
        }
        Commands::Roster { roster } => list_roster(&roster),
        Commands::CheckFeed {
            feed,
            roster,
            tolerance,
            fallback_tolerance,
            single_person,
        } => check_feed(&feed, &roster, tolerance, fallback_tolerance, single_person),
    }
}

/// Same location the daemon uses when no store path is configured.
fn default_store_path(backend: StoreBackend) -> PathBuf {
    let data_dir = std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = std::env::var_os("HOME").unwrap_or_else(|| "/tmp".into());
            PathBuf::from(home).join(".local/share")
        });
    data_dir
        .join("presence")
        .join(backend.default_file_name())
}

fn report_totals(backend: StoreBackend, path: &Path, json: bool) -> Result<()> {
    let store = open_store(backend, path)?;
    let Some(loaded) = store.load()? else {
        println!("No attendance saved at {}", store.location());
        return Ok(());
    };

    if json {
        let bytes = loaded.record.to_json_vec()?;
        println!("{}", String::from_utf8_lossy(&bytes));
        return Ok(());
    }

    if loaded.format.is_legacy() {
        println!("(legacy {:?} record; run `presence migrate` to upgrade)", loaded.format);
    }
    println!("{:<16} {:>10} {:>10}", "IDENTITY", "WORKED", "ABSENT");
    for (id, row) in totals_rows(&loaded.record) {
        println!(
            "{:<16} {:>10} {:>10}",
            id,
            format_secs(row.0),
            format_secs(row.1)
        );
    }
    Ok(())
}

/// Identities from either map, missing sides reported as zero.
fn totals_rows(record: &presence_core::AttendanceRecord) -> BTreeMap<&str, (f64, f64)> {
    let mut rows: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for (id, secs) in &record.worked_time {
        rows.entry(id.as_str()).or_default().0 = *secs;
    }
    for (id, secs) in &record.total_absent_time {
        rows.entry(id.as_str()).or_default().1 = *secs;
    }
    rows
}

fn report_daily(
    backend: StoreBackend,
    path: &Path,
    date: Option<NaiveDate>,
    json: bool,
) -> Result<()> {
    anyhow::ensure!(
        backend == StoreBackend::Sqlite,
        "daily history is only kept by the sqlite backend"
    );
    let store = SqliteStore::open(path)?;
    let rows = store.daily_history(date)?;

    if json {
        let out: Vec<serde_json::Value> = rows
            .iter()
            .map(|r| {
                serde_json::json!({
                    "identity": r.identity,
                    "date": r.date,
                    "worked_secs": r.worked_secs,
                    "total_absent_secs": r.total_absent_secs,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No daily history");
        return Ok(());
    }
    if let Some(updated) = store.last_updated()? {
        println!("Last saved: {updated}");
    }
    println!("{:<12} {:<16} {:>10} {:>10}", "DATE", "IDENTITY", "WORKED", "ABSENT");
    for r in &rows {
        println!(
            "{:<12} {:<16} {:>10} {:>10}",
            r.date.to_string(),
            r.identity.as_str(),
            format_secs(r.worked_secs),
            format_secs(r.total_absent_secs)
        );
    }
    Ok(())
}

fn migrate(
    from_backend: StoreBackend,
    from: &Path,
    to_backend: StoreBackend,
    to: &Path,
) -> Result<()> {
    let source = open_store(from_backend, from)?;
    let loaded = source
        .load()
        .with_context(|| format!("reading {}", source.location()))?
        .with_context(|| format!("nothing saved at {}", source.location()))?;

    let mut dest = open_store(to_backend, to)?;
    dest.save(&loaded.record)
        .with_context(|| format!("writing {}", dest.location()))?;

    tracing::info!(
        from = %source.location(),
        to = %dest.location(),
        format = ?loaded.format,
        "record migrated"
    );
    println!(
        "Migrated {} identities from {} ({:?}) to {}",
        totals_rows(&loaded.record).len(),
        source.location(),
        loaded.format,
        dest.location()
    );
    Ok(())
}

fn list_roster(path: &Path) -> Result<()> {
    let roster = Roster::load(path).with_context(|| format!("loading roster {}", path.display()))?;
    if roster.is_empty() {
        println!("No usable roster entries");
        return Ok(());
    }
    println!("{:<16} {:<24} {:>9} {:>5}", "ID", "NAME", "ENCODINGS", "DIM");
    for entry in roster.entries() {
        let dim = entry.encodings.first().map_or(0, |e| e.dim());
        println!(
            "{:<16} {:<24} {:>9} {:>5}",
            entry.id.as_str(),
            entry.name,
            entry.encodings.len(),
            dim
        );
    }
    Ok(())
}

/// Per-run recognition counts.
#[derive(Debug, Default, PartialEq)]
struct FeedCheck {
    frames: u64,
    faces: u64,
    bad_lines: u64,
    labels: BTreeMap<String, u64>,
}

fn check_feed(
    feed: &Path,
    roster: &Path,
    tolerance: f32,
    fallback_tolerance: f32,
    single_person: bool,
) -> Result<()> {
    let roster =
        Roster::load(roster).with_context(|| format!("loading roster {}", roster.display()))?;
    let matcher =
        GalleryMatcher::new(&roster, tolerance, fallback_tolerance).single_person(single_person);
    let file =
        std::fs::File::open(feed).with_context(|| format!("opening feed {}", feed.display()))?;

    let check = tally_feed(FeedReader::new(BufReader::new(file)), &matcher)?;

    println!(
        "{} frames, {} faces, {} bad lines",
        check.frames, check.faces, check.bad_lines
    );
    for (label, count) in &check.labels {
        println!("  {label:<24} {count}");
    }
    Ok(())
}

fn tally_feed<R, M>(reader: FeedReader<R>, matcher: &M) -> Result<FeedCheck>
where
    R: std::io::BufRead,
    M: IdentityMatcher,
{
    let mut check = FeedCheck::default();
    for item in reader {
        let frame = match item {
            Ok(f) => f,
            Err(e) if e.is_recoverable() => {
                eprintln!("warning: {e}");
                check.bad_lines += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        check.frames += 1;
        check.faces += frame.faces.len() as u64;
        for obs in matcher.identify(&frame.faces) {
            let label = match &obs.recognition {
                Recognition::Known(id) => id.to_string(),
                other => other.label().to_string(),
            };
            *check.labels.entry(label).or_default() += 1;
        }
    }
    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use presence_core::AttendanceRecord;
    use presence_store::JsonFileStore;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_date_requires_daily() {
        assert!(Cli::try_parse_from(["presence", "report", "--date", "2026-03-01"]).is_err());
        let daily = [
            "presence",
            "report",
            "--daily",
            "--backend",
            "sqlite",
            "--date",
            "2026-03-01",
        ];
        assert!(Cli::try_parse_from(daily).is_ok());
    }

    #[test]
    fn test_totals_rows_merges_maps() {
        let mut r = AttendanceRecord::default();
        r.worked_time.insert("A".into(), 10.0);
        r.total_absent_time.insert("B".into(), 30.0);
        let rows = totals_rows(&r);
        assert_eq!(rows.get("A"), Some(&(10.0, 0.0)));
        assert_eq!(rows.get("B"), Some(&(0.0, 30.0)));
    }

    #[test]
    fn test_migrate_legacy_json_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.json");
        std::fs::write(&path, r#"{"E001": 120.0}"#).unwrap();

        migrate(StoreBackend::Json, &path, StoreBackend::Json, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"version\""));
        assert!(text.contains("\"worked_time\""));
    }

    #[test]
    fn test_migrate_json_to_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("attendance.json");
        let to = dir.path().join("attendance.db");
        let mut r = AttendanceRecord::default();
        r.worked_time.insert("E001".into(), 5.0);
        r.total_absent_time.insert("E001".into(), 30.0);
        JsonFileStore::new(&from).save(&r).unwrap();

        migrate(StoreBackend::Json, &from, StoreBackend::Sqlite, &to).unwrap();

        let store = SqliteStore::open(&to).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.record, r);
    }

    #[test]
    fn test_migrate_empty_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("missing.json");
        assert!(migrate(StoreBackend::Json, &from, StoreBackend::Json, &from).is_err());
    }

    #[test]
    fn test_tally_feed_counts_labels() {
        let roster = Roster::from_json_str(
            r#"[{"id": "E001", "name": "Ada", "encodings": [[0.0, 0.0]]}]"#,
        )
        .unwrap();
        let matcher = GalleryMatcher::new(&roster, 0.43, 0.53);
        let src = concat!(
            "{\"t\": 0, \"faces\": [{\"encoding\": [0.0, 0.1]}]}\n",
            "{\"t\": 1, \"faces\": [{\"encoding\": [5.0, 5.0]}]}\n",
            "garbage\n",
            "{\"t\": 2, \"faces\": []}\n",
        );
        let check = tally_feed(FeedReader::new(src.as_bytes()), &matcher).unwrap();
        assert_eq!(check.frames, 3);
        assert_eq!(check.faces, 2);
        assert_eq!(check.bad_lines, 1);
        assert_eq!(check.labels.get("E001"), Some(&1));
        assert_eq!(check.labels.get("unknown_person"), Some(&1));
        assert_eq!(check.labels.get("no_persons_found"), Some(&1));
    }
}
