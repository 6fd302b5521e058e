use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use session_engine::zone::parse_timezone;
use session_engine::{
    auto_skip_exception, session_status, Clock, DuplicatePolicy, FixedClock,
    FormattedSessionTime, HourCycle, MemberResponse, ProjectedSession, Schedule,
    ScheduleDocument, SessionFormatter, SystemClock, DEFAULT_UPCOMING_COUNT,
};

/// sessions - project, format, and summarize recurring game sessions
#[derive(Parser, Debug)]
#[command(name = "sessions", version)]
#[command(about = "Project, format, and summarize recurring game sessions", long_about = None)]
struct Cli {
    /// Schedule document (JSON). Use "-" for stdin.
    #[arg(short, long, default_value = "-", global = true)]
    schedule: PathBuf,

    /// Treat "now" as this RFC 3339 instant (or set SESSIONS_NOW)
    #[arg(long, env = "SESSIONS_NOW", global = true)]
    now: Option<DateTime<Utc>>,

    /// Reject schedules with more than one exception per date
    #[arg(long, global = true)]
    strict: bool,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List upcoming sessions
    Upcoming {
        /// Number of sessions expected to happen
        #[arg(short = 'n', long, default_value_t = DEFAULT_UPCOMING_COUNT)]
        count: usize,

        #[command(flatten)]
        view: ViewArgs,
    },
    /// Show the next session
    Next {
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Describe the recurring pattern in words
    Describe,
    /// Summarize attendance for one session
    Status {
        /// Member responses (JSON array)
        #[arg(short, long)]
        responses: PathBuf,

        /// Session date; with auto-skip enabled, prints the skip to record
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
}

#[derive(clap::Args, Debug)]
struct ViewArgs {
    /// Viewer's IANA timezone (or set SESSIONS_VIEWER_TZ). Defaults to the schedule's zone.
    #[arg(long, env = "SESSIONS_VIEWER_TZ")]
    viewer_tz: Option<String>,

    /// Render times on a 24-hour clock
    #[arg(long)]
    h24: bool,
}

/// One session with its display strings.
#[derive(Serialize)]
struct SessionView<'a> {
    #[serde(flatten)]
    session: &'a ProjectedSession,
    formatted: FormattedSessionTime,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let clock: Box<dyn Clock> = match cli.now {
        Some(now) => Box::new(FixedClock(now)),
        None => Box::new(SystemClock),
    };
    let now = clock.now();
    debug!(now = %now, "clock");

    if let Command::Status { responses, .. } = &cli.command {
        if cli.schedule == Path::new("-") && responses == Path::new("-") {
            bail!("schedule and responses cannot both be read from stdin");
        }
    }

    let policy = if cli.strict {
        DuplicatePolicy::Reject
    } else {
        DuplicatePolicy::LastWriteWins
    };
    let schedule = load_schedule(&cli.schedule, policy)?;
    info!(
        mode = ?schedule.settings.mode,
        exceptions = schedule.exceptions.len(),
        "schedule loaded"
    );

    match &cli.command {
        Command::Upcoming { count, view } => {
            let sessions = schedule.upcoming(now, *count);
            print_sessions(&schedule, &sessions, view, now, cli.json)
        }
        Command::Next { view } => {
            let sessions: Vec<_> = schedule.next_session(now).into_iter().collect();
            if sessions.is_empty() && !cli.json {
                println!("No upcoming session");
                return Ok(());
            }
            print_sessions(&schedule, &sessions, view, now, cli.json)
        }
        Command::Describe => describe(&schedule, cli.json),
        Command::Status { responses, date } => status(&schedule, responses, *date, cli.json),
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

fn load_schedule(path: &Path, policy: DuplicatePolicy) -> Result<Schedule> {
    let text = read_input(path)?;
    let document: ScheduleDocument =
        serde_json::from_str(&text).context("Failed to parse schedule document")?;
    document
        .validate(policy)
        .context("Invalid schedule document")
}

fn formatter_for(
    schedule: &Schedule,
    view: &ViewArgs,
    anchor: DateTime<Utc>,
) -> (SessionFormatter, Tz) {
    let hour_cycle = if view.h24 {
        HourCycle::H23
    } else {
        HourCycle::H12
    };
    match schedule.active_pattern() {
        Some(pattern) => (
            SessionFormatter::for_pattern(pattern).with_hour_cycle(hour_cycle),
            pattern.timezone(),
        ),
        None => {
            let zone = schedule.authoring_zone();
            (
                SessionFormatter::for_zone(zone, anchor).with_hour_cycle(hour_cycle),
                zone,
            )
        }
    }
}

fn print_sessions(
    schedule: &Schedule,
    sessions: &[ProjectedSession],
    view: &ViewArgs,
    now: DateTime<Utc>,
    json: bool,
) -> Result<()> {
    // Outside full mode there is no pattern baseline; anchor on the first session.
    let anchor = sessions.first().map_or(now, |s| s.date);
    let (formatter, authoring) = formatter_for(schedule, view, anchor);
    let viewer = match &view.viewer_tz {
        Some(name) => parse_timezone(name).context("Invalid viewer timezone")?,
        None => authoring,
    };

    let views: Vec<SessionView<'_>> = sessions
        .iter()
        .map(|session| SessionView {
            session,
            formatted: formatter.format_in(session.date, viewer),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    for view in &views {
        let status = serde_json::to_value(view.session.status)?;
        let mut line = format!(
            "{}  {:<11} {} {}",
            view.session.date_string,
            status.as_str().unwrap_or_default(),
            view.formatted.full,
            view.formatted.timezone_label,
        );
        if let Some(exception) = &view.session.exception {
            if let Some(reason) = &exception.reason {
                line.push_str(&format!("  ({reason})"));
            }
        }
        println!("{line}");
        if let Some(shift) = &view.formatted.viewer_shift {
            println!("    {}", shift.warning);
        }
    }
    Ok(())
}

fn describe(schedule: &Schedule, json: bool) -> Result<()> {
    let description = schedule
        .pattern
        .as_ref()
        .map(|p| p.describe())
        .unwrap_or_else(|| "No recurring schedule".to_string());
    if json {
        let value = serde_json::json!({
            "description": description,
            "pattern": schedule.pattern.as_ref().map(|p| p.to_raw()),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{description}");
    }
    Ok(())
}

fn status(
    schedule: &Schedule,
    responses_path: &Path,
    date: Option<NaiveDate>,
    json: bool,
) -> Result<()> {
    let text = read_input(responses_path)?;
    let responses: Vec<MemberResponse> =
        serde_json::from_str(&text).context("Failed to parse responses")?;
    let summary = session_status(&responses, &schedule.settings);
    let skip = date.and_then(|d| auto_skip_exception(d, &summary, &schedule.settings));

    if json {
        let value = serde_json::json!({
            "status": summary,
            "auto_skip": skip,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!(
        "{} ({}/{} available)",
        summary.label, summary.available_count, summary.total_count
    );
    for warning in &summary.warnings {
        println!("  warning: {warning}");
    }
    if let Some(skip) = skip {
        println!(
            "  auto-skip {}: {}",
            skip.original_date_string,
            skip.reason.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}
