use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use storage::repository::Storage;
use syneval_core::model::{Session, SessionId, TrialSet};

#[derive(Debug, Clone)]
enum Target {
    Sqlite(String),
    Dir(PathBuf),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Sqlite(url) => f.write_str(url),
            Target::Dir(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
struct Args {
    config: PathBuf,
    target: Target,
    sessions: u32,
    incomplete: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingConfig,
    UnknownArg(String),
    InvalidSessions { raw: String },
    InvalidIncomplete { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingConfig => write!(f, "--config is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidSessions { raw } => write!(f, "invalid --sessions value: {raw}"),
            ArgsError::InvalidIncomplete { raw } => {
                write!(f, "invalid --incomplete value: {raw}")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut config = std::env::var("SYNEVAL_CONFIG").ok().map(PathBuf::from);
        let mut target = std::env::var("SYNEVAL_RESULT_DIR").map_or_else(
            |_| {
                Target::Sqlite(
                    std::env::var("SYNEVAL_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into()),
                )
            },
            |dir| Target::Dir(PathBuf::from(dir)),
        );
        let mut sessions = 12;
        let mut incomplete = 2;
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    config = Some(PathBuf::from(require_value(&mut args, "--config")?));
                }
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    target = Target::Sqlite(value);
                }
                "--dir" => {
                    target = Target::Dir(PathBuf::from(require_value(&mut args, "--dir")?));
                }
                "--sessions" => {
                    let value = require_value(&mut args, "--sessions")?;
                    sessions = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidSessions { raw: value.clone() })?;
                }
                "--incomplete" => {
                    let value = require_value(&mut args, "--incomplete")?;
                    incomplete = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidIncomplete { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            config: config.ok_or(ArgsError::MissingConfig)?,
            target,
            sessions,
            incomplete,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- --config <study.json> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>           Study configuration JSON (required)");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --dir <path>              Write one JSON file per session instead of SQLite");
    eprintln!("  --sessions <n>            Number of complete sessions (default: 12)");
    eprintln!("  --incomplete <n>          Number of half-finished sessions (default: 2)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  SYNEVAL_CONFIG, SYNEVAL_DB_URL, SYNEVAL_RESULT_DIR");
}

/// Deterministic answer for participant `p` on trial `t`: mostly correct,
/// with a drifting wrong pick so agreement is imperfect.
fn synthetic_choice(trials: &TrialSet, participant: usize, trial: usize) -> usize {
    let k = trials.option_count();
    let truth = trials.trial(trial).map_or(0, |t| t.truth());
    if (participant + trial) % 3 == 0 {
        (truth + 1 + participant % (k - 1)) % k
    } else {
        truth
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let trials: Arc<TrialSet> = Arc::new(std::fs::read_to_string(&args.config)?.parse()?);
    let storage = match &args.target {
        Target::Sqlite(url) => Storage::sqlite(url).await?,
        Target::Dir(path) => Storage::json_dir(path.clone(), Arc::clone(&trials)),
    };
    let now = args.now.unwrap_or_else(Utc::now);

    let total = args.sessions + args.incomplete;
    for p in 0..total {
        let participant = p as usize;
        let started_at = now - Duration::minutes(i64::from(total - p) * 15);
        let mut session = Session::new(SessionId::generate(), trials.len(), started_at);
        storage.sessions.create(&session).await?;

        let answered = if p < args.sessions {
            trials.len()
        } else {
            trials.len() / 2
        };
        for (offset, trial) in trials.trials().iter().take(answered).enumerate() {
            let at = started_at + Duration::seconds(20 * (offset as i64 + 1));
            session.record(trial, synthetic_choice(&trials, participant, trial.index()), at)?;
        }
        storage.sessions.store(&session).await?;
    }

    println!(
        "Seeded {} complete and {} incomplete sessions for '{}' ({} trials) into {}",
        args.sessions,
        args.incomplete,
        trials.name(),
        trials.len(),
        args.target
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
