mod report;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use services::{AggregationService, Clock, SessionMachine, SessionSettings, SubmitOutcome};
use storage::repository::Storage;
use syneval_core::model::{SessionId, SessionStage, StudyConfig, TrialSet};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "syneval=info,services=info,storage=warn";

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingPositional { name: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidSessionId { raw: String },
    InvalidIndex { name: &'static str, raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingPositional { name } => write!(f, "missing <{name}>"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidSessionId { raw } => write!(f, "invalid session id: {raw}"),
            ArgsError::InvalidIndex { name, raw } => write!(f, "invalid <{name}> value: {raw}"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  syneval aggregate <study.json> [--db <sqlite_url> | --dir <path>] [--json]");
    eprintln!("  syneval create    <study.json> [--db <sqlite_url> | --dir <path>]");
    eprintln!("  syneval status    <study.json> <session-id> [--db <sqlite_url> | --dir <path>]");
    eprintln!(
        "  syneval answer    <study.json> <session-id> <trial> <option> [--db <sqlite_url> | --dir <path>]"
    );
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:dev.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SYNEVAL_DB_URL, SYNEVAL_RESULT_DIR, SYNEVAL_ACTIVITY_TIMEOUT_SECS, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Aggregate,
    Create,
    Status,
    Answer,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "aggregate" => Some(Self::Aggregate),
            "create" => Some(Self::Create),
            "status" => Some(Self::Status),
            "answer" => Some(Self::Answer),
            _ => None,
        }
    }

    fn positional_names(self) -> &'static [&'static str] {
        match self {
            Self::Aggregate | Self::Create => &["study"],
            Self::Status => &["study", "session-id"],
            Self::Answer => &["study", "session-id", "trial", "option"],
        }
    }
}

#[derive(Debug, Clone)]
enum Target {
    Sqlite(String),
    Dir(PathBuf),
}

#[derive(Debug)]
struct Args {
    study: PathBuf,
    target: Target,
    session_id: Option<SessionId>,
    trial: usize,
    option: usize,
    json: bool,
}

fn parse_index(name: &'static str, raw: &str) -> Result<usize, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidIndex {
        name,
        raw: raw.to_string(),
    })
}

impl Args {
    fn parse(cmd: Command, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut target = std::env::var("SYNEVAL_RESULT_DIR").map_or_else(
            |_| {
                Target::Sqlite(
                    std::env::var("SYNEVAL_DB_URL")
                        .ok()
                        .map_or_else(|| "sqlite://dev.sqlite3".into(), normalize_sqlite_url),
                )
            },
            |dir| Target::Dir(PathBuf::from(dir)),
        );
        let mut json = false;
        let mut positional = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    target = Target::Sqlite(normalize_sqlite_url(value));
                }
                "--dir" => {
                    target = Target::Dir(PathBuf::from(require_value(args, "--dir")?));
                }
                "--json" if cmd == Command::Aggregate => json = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ if arg.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let names = cmd.positional_names();
        if let Some(extra) = positional.get(names.len()) {
            return Err(ArgsError::UnknownArg(extra.clone()));
        }
        if let Some(&name) = names.get(positional.len()) {
            return Err(ArgsError::MissingPositional { name });
        }

        let mut positional = positional.into_iter();
        let study = positional
            .next()
            .map(PathBuf::from)
            .ok_or(ArgsError::MissingPositional { name: "study" })?;
        let session_id = positional
            .next()
            .map(|raw| {
                raw.parse::<SessionId>()
                    .map_err(|_| ArgsError::InvalidSessionId { raw })
            })
            .transpose()?;
        let trial = positional
            .next()
            .map_or(Ok(0), |raw| parse_index("trial", &raw))?;
        let option = positional
            .next()
            .map_or(Ok(0), |raw| parse_index("option", &raw))?;

        Ok(Self {
            study,
            target,
            session_id,
            trial,
            option,
            json,
        })
    }

    fn session_id(&self) -> Result<&SessionId, ArgsError> {
        self.session_id
            .as_ref()
            .ok_or(ArgsError::MissingPositional { name: "session-id" })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn load_study(path: &std::path::Path) -> Result<TrialSet, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let trials = StudyConfig::from_json(&text)
        .and_then(StudyConfig::into_trial_set)
        .map_err(syneval_core::Error::from)?;
    debug!(
        study = trials.name(),
        trials = trials.len(),
        options = trials.option_count(),
        "study loaded"
    );
    Ok(trials)
}

async fn open_storage(
    target: &Target,
    trials: &Arc<TrialSet>,
) -> Result<Storage, Box<dyn std::error::Error>> {
    match target {
        Target::Sqlite(url) => {
            // Keep file creation in the binary glue so storage stays pure.
            prepare_sqlite_file(url)?;
            Ok(Storage::sqlite(url).await?)
        }
        Target::Dir(path) => Ok(Storage::json_dir(path.clone(), Arc::clone(trials))),
    }
}

fn session_machine(
    trials: Arc<TrialSet>,
    storage: Storage,
) -> Result<SessionMachine, Box<dyn std::error::Error>> {
    Ok(SessionMachine::new(
        Clock::default_clock(),
        trials,
        storage.sessions,
        SessionSettings::from_env()?,
    ))
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Err(ArgsError::MissingPositional { name: "command" }.into());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            ArgsError::UnknownArg(first.clone())
        })?,
    };

    let parsed = Args::parse(cmd, &mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let trials = Arc::new(load_study(&parsed.study)?);
    let storage = open_storage(&parsed.target, &trials).await?;

    match cmd {
        Command::Aggregate => {
            let report = AggregationService::new(trials, storage.sessions).run().await?;
            if parsed.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let mut out = String::new();
                report::render(&mut out, &report)?;
                print!("{out}");
            }
        }
        Command::Create => {
            let machine = session_machine(trials, storage)?;
            println!("{}", machine.create().await?);
        }
        Command::Status => {
            let id = parsed.session_id()?;
            let machine = session_machine(trials, storage)?;
            let progress = machine.progress(id).await?;
            let state = if machine.is_active(id).await? {
                "active"
            } else {
                "expired"
            };
            let (answered, total) = (progress.answered, progress.total);
            match progress.stage {
                SessionStage::Complete => {
                    println!("{id}: complete ({answered}/{total} answered, {state})");
                }
                SessionStage::New => {
                    println!("{id}: not started, next trial 0 of {total} ({state})");
                }
                SessionStage::InProgress => println!(
                    "{id}: in progress, next trial {} of {total} ({answered} answered, {state})",
                    progress.next_trial
                ),
            }
        }
        Command::Answer => {
            let id = parsed.session_id()?;
            let machine = session_machine(trials, storage)?;
            match machine.submit(id, parsed.trial, Some(parsed.option)).await? {
                SubmitOutcome::Next(next) => println!("{id}: next trial {next}"),
                SubmitOutcome::Complete => println!("{id}: complete"),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
