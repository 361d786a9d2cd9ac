//! Glucose CLI - Command-line interface for Synheart Glucose
//!
//! Commands:
//! - analyze: Run an analysis pass over a log snapshot (batch mode)
//! - prompt: Build the insight prompt for a log snapshot
//! - alerts: Evaluate projected high/low alerts over recent samples
//! - run: Evaluate alerts over streaming glucose samples from stdin
//! - validate: Validate a log snapshot and report discarded records
//! - doctor: Diagnose settings and cooldown state

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::VecDeque;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use synheart_glucose::adapter::{IngestReport, LogAdapter};
use synheart_glucose::config::{Settings, DEFAULT_RETENTION_DAYS};
use synheart_glucose::pipeline::InsightProcessor;
use synheart_glucose::projection::{CooldownState, MAX_RATE_SAMPLES};
use synheart_glucose::prompt::build_prompt;
use synheart_glucose::types::{GlucoseSample, InsightReport, PersonalContext};
use synheart_glucose::{ComputeError, ENGINE_VERSION, PRODUCER_NAME};

/// Glucose - On-device insight and projection engine for CGM logs
#[derive(Parser)]
#[command(name = "glucose")]
#[command(author = "Synheart AI Inc")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Analyze glucose, meal and insulin logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an analysis pass over a log snapshot (batch mode)
    Analyze {
        /// Snapshot file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Build the insight prompt for a log snapshot
    Prompt {
        /// Snapshot file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Age in years
        #[arg(long)]
        age: Option<u32>,

        /// Weight in kilograms
        #[arg(long)]
        weight_kg: Option<f64>,

        /// Height in centimeters
        #[arg(long)]
        height_cm: Option<f64>,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Evaluate projected high/low alerts over recent glucose samples
    Alerts {
        /// Glucose samples file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Evaluation time (RFC 3339); defaults to the current time
        #[arg(long)]
        now: Option<String>,

        /// Load cooldown state from file
        #[arg(long)]
        load_cooldowns: Option<PathBuf>,

        /// Save cooldown state to file after evaluation
        #[arg(long)]
        save_cooldowns: Option<PathBuf>,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Evaluate alerts over NDJSON glucose samples streamed on stdin
    Run {
        /// Load cooldown state from file
        #[arg(long)]
        load_cooldowns: Option<PathBuf>,

        /// Save cooldown state to file on exit
        #[arg(long)]
        save_cooldowns: Option<PathBuf>,

        /// Flush output after each alert
        #[arg(long, default_value = "true")]
        flush: bool,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Validate a log snapshot and report discarded records
    Validate {
        /// Snapshot file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose settings and cooldown state
    Doctor {
        /// Check settings file
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Check cooldown state file
        #[arg(long)]
        cooldowns: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Settings file plus per-field overrides
#[derive(Args)]
struct SettingsArgs {
    /// Settings JSON file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Local clock offset from UTC in minutes
    #[arg(long, allow_hyphen_values = true)]
    utc_offset_minutes: Option<i32>,

    /// High alert threshold (mg/dL)
    #[arg(long)]
    high_threshold: Option<i32>,

    /// Low alert threshold (mg/dL)
    #[arg(long)]
    low_threshold: Option<i32>,

    /// Projection window (minutes, 10-40)
    #[arg(long)]
    projection_minutes: Option<u32>,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one sample per line)
    Ndjson,
    /// JSON array of samples
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// Human-readable summary
    Text,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Diagnostics go to stderr so stdout stays machine-readable
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), GlucoseCliError> {
    match cli.command {
        Commands::Analyze {
            input,
            output,
            output_format,
            settings,
        } => cmd_analyze(&input, &output, output_format, &settings),

        Commands::Prompt {
            input,
            age,
            weight_kg,
            height_cm,
            settings,
        } => {
            let personal = PersonalContext {
                age_years: age,
                weight_kg,
                height_cm,
            };
            cmd_prompt(&input, &personal, &settings)
        }

        Commands::Alerts {
            input,
            input_format,
            now,
            load_cooldowns,
            save_cooldowns,
            settings,
        } => cmd_alerts(
            &input,
            input_format,
            now.as_deref(),
            load_cooldowns.as_deref(),
            save_cooldowns.as_deref(),
            &settings,
        ),

        Commands::Run {
            load_cooldowns,
            save_cooldowns,
            flush,
            settings,
        } => cmd_run(
            load_cooldowns.as_deref(),
            save_cooldowns.as_deref(),
            flush,
            &settings,
        ),

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Doctor {
            settings,
            cooldowns,
            json,
        } => cmd_doctor(settings.as_deref(), cooldowns.as_deref(), json),
    }
}

fn cmd_analyze(
    input: &Path,
    output: &Path,
    output_format: OutputFormat,
    settings: &SettingsArgs,
) -> Result<(), GlucoseCliError> {
    let processor = build_processor(settings)?;
    let (snapshot, ingest) = processor.ingest(&read_input(input)?)?;
    let report = processor.analyze_report(&snapshot)?;

    let output_data = match output_format {
        OutputFormat::Json => serde_json::to_string(&report)? + "\n",
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&report)? + "\n",
        OutputFormat::Text => format_text(&report, &ingest),
    };

    write_output(output, &output_data)
}

fn cmd_prompt(
    input: &Path,
    personal: &PersonalContext,
    settings: &SettingsArgs,
) -> Result<(), GlucoseCliError> {
    let processor = build_processor(settings)?;
    let (snapshot, _) = processor.ingest(&read_input(input)?)?;
    let result = processor.analyze(&snapshot)?;
    print!("{}", build_prompt(&result, Some(personal)));
    Ok(())
}

fn cmd_alerts(
    input: &Path,
    input_format: InputFormat,
    now: Option<&str>,
    load_cooldowns: Option<&Path>,
    save_cooldowns: Option<&Path>,
    settings: &SettingsArgs,
) -> Result<(), GlucoseCliError> {
    let mut processor = build_processor(settings)?;
    if let Some(path) = load_cooldowns {
        processor.load_cooldowns(&fs::read_to_string(path)?)?;
    }

    let retention = processor.settings().analysis.retention_days;
    let input_data = read_input(input)?;
    let (samples, _) = match input_format {
        InputFormat::Ndjson => LogAdapter::parse_glucose_ndjson(&input_data, retention),
        InputFormat::Json => LogAdapter::parse_glucose_array(&input_data, retention)?,
    };

    let now = match now {
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| GlucoseCliError::ParseError(format!("Invalid --now: {}", e)))?,
        None => Utc::now(),
    };

    let alerts = processor.evaluate_alerts(&samples, now);
    println!("{}", serde_json::to_string_pretty(&alerts)?);

    if let Some(path) = save_cooldowns {
        fs::write(path, processor.save_cooldowns()?)?;
    }

    Ok(())
}

fn cmd_run(
    load_cooldowns: Option<&Path>,
    save_cooldowns: Option<&Path>,
    flush: bool,
    settings: &SettingsArgs,
) -> Result<(), GlucoseCliError> {
    let mut processor = build_processor(settings)?;
    if let Some(path) = load_cooldowns {
        processor.load_cooldowns(&fs::read_to_string(path)?)?;
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut recent: VecDeque<GlucoseSample> = VecDeque::with_capacity(MAX_RATE_SAMPLES + 1);

    for (index, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let sample = match LogAdapter::parse_glucose_line(trimmed) {
            Ok(sample) => sample,
            Err(e) => {
                warn!(line = index + 1, reason = %e, "discarding malformed sample");
                continue;
            }
        };

        if let Some(last) = recent.back() {
            if sample.timestamp <= last.timestamp {
                warn!(line = index + 1, "discarding out-of-order sample");
                continue;
            }
        }

        let now = sample.timestamp;
        recent.push_back(sample);
        if recent.len() > MAX_RATE_SAMPLES {
            recent.pop_front();
        }

        let window: Vec<GlucoseSample> = recent.iter().cloned().collect();
        for alert in processor.evaluate_alerts(&window, now) {
            writeln!(stdout, "{}", serde_json::to_string(&alert)?)?;
            if flush {
                stdout.flush()?;
            }
        }
    }

    stdout.flush()?;

    if let Some(path) = save_cooldowns {
        fs::write(path, processor.save_cooldowns()?)?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), GlucoseCliError> {
    let (snapshot, ingest) = LogAdapter::parse_snapshot(&read_input(input)?, DEFAULT_RETENTION_DAYS)?;

    let report = ValidationReport {
        glucose_samples: snapshot.glucose.len(),
        food_events: snapshot.food.len(),
        insulin_events: snapshot.insulin.len(),
        duplicates: ingest.duplicates,
        expired: ingest.expired,
        discarded: ingest.discarded_count(),
        errors: ingest
            .discarded
            .iter()
            .map(|d| ValidationErrorDetail {
                log: d.log.as_str().to_string(),
                index: d.index,
                error: d.reason.clone(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Glucose samples: {}", report.glucose_samples);
        println!("Food events:     {}", report.food_events);
        println!("Insulin events:  {}", report.insulin_events);
        println!("Duplicates:      {}", report.duplicates);
        println!("Expired:         {}", report.expired);
        println!("Discarded:       {}", report.discarded);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - {} record {}: {}", err.log, err.index, err.error);
            }
        }
    }

    if report.discarded > 0 {
        Err(GlucoseCliError::ValidationFailed(report.discarded))
    } else {
        Ok(())
    }
}

fn cmd_doctor(
    settings: Option<&Path>,
    cooldowns: Option<&Path>,
    json: bool,
) -> Result<(), GlucoseCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Engine version {}", ENGINE_VERSION),
    });

    if let Some(path) = settings {
        checks.push(check_file(path, "settings", |content| {
            Settings::from_json(content).map(|s| {
                format!(
                    "Settings valid (alerts at {}/{} mg/dL, {} min projection)",
                    s.alerts.low_threshold, s.alerts.high_threshold, s.alerts.projection_minutes
                )
            })
        }));
    }

    if let Some(path) = cooldowns {
        checks.push(check_file(path, "cooldowns", |content| {
            CooldownState::from_json(content)
                .map_err(|e| ComputeError::ParseError(e.to_string()))
                .map(|c| {
                    let fmt = |t: Option<DateTime<Utc>>| {
                        t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string())
                    };
                    format!(
                        "Cooldown state valid (last high {}, last low {})",
                        fmt(c.last_high_fired),
                        fmt(c.last_low_fired)
                    )
                })
        }));
    }

    // Check stdin is available (for streaming mode)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Glucose Doctor Report");
        println!("=====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(GlucoseCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_file(
    path: &Path,
    name: &str,
    parse: impl Fn(&str) -> Result<String, ComputeError>,
) -> DoctorCheck {
    let (status, message) = if !path.exists() {
        (CheckStatus::Warning, format!("{} file does not exist", name))
    } else {
        match fs::read_to_string(path) {
            Ok(content) => match parse(&content) {
                Ok(message) => (CheckStatus::Ok, message),
                Err(e) => (CheckStatus::Error, format!("Invalid {} file: {}", name, e)),
            },
            Err(e) => (
                CheckStatus::Error,
                format!("Cannot read {} file: {}", name, e),
            ),
        }
    };
    DoctorCheck {
        name: name.to_string(),
        status,
        message,
    }
}

// Helper functions

fn build_processor(args: &SettingsArgs) -> Result<InsightProcessor, GlucoseCliError> {
    let mut settings = match &args.settings {
        Some(path) => serde_json::from_str::<Settings>(&fs::read_to_string(path)?)?,
        None => Settings::default(),
    };

    if let Some(offset) = args.utc_offset_minutes {
        settings.analysis.utc_offset_minutes = offset;
    }
    if let Some(high) = args.high_threshold {
        settings.alerts.high_threshold = high;
    }
    if let Some(low) = args.low_threshold {
        settings.alerts.low_threshold = low;
    }
    if let Some(minutes) = args.projection_minutes {
        settings.alerts.projection_minutes = minutes;
    }

    Ok(InsightProcessor::with_settings(settings)?)
}

fn read_input(input: &Path) -> Result<String, GlucoseCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), GlucoseCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn format_text(report: &InsightReport, ingest: &IngestReport) -> String {
    let result = &report.result;
    let summary = &result.summary;
    let fmt_opt = |v: Option<f64>, unit: &str| match v {
        Some(v) => format!("{:.1}{}", v, unit),
        None => "unavailable".to_string(),
    };

    let mut lines = vec![
        "Glucose Insight Report".to_string(),
        "======================".to_string(),
        format!(
            "Window:    {} .. {}",
            report.window.first_sample_utc.as_deref().unwrap_or("-"),
            report.window.last_sample_utc.as_deref().unwrap_or("-")
        ),
        format!(
            "Records:   {} samples, {} meals, {} doses ({} discarded)",
            result.sample_count,
            result.food_event_count,
            result.insulin_event_count,
            ingest.discarded_count()
        ),
        format!("Mean:      {}", fmt_opt(summary.mean, " mg/dL")),
        format!("GMI:       {}", fmt_opt(summary.gmi_pct, "%")),
        format!(
            "Range:     {}% low, {}% in range, {}% high",
            summary.pct_low, summary.pct_in_range, summary.pct_high
        ),
        format!("ISF:       {}", fmt_opt(result.isf, " mg/dL/unit")),
        format!("ICR:       {}", fmt_opt(result.icr, " g/unit")),
        String::new(),
        "Time of day:".to_string(),
    ];

    for bucket in &result.time_of_day {
        if bucket.is_empty() {
            lines.push(format!("  {}  no data", bucket.label));
        } else {
            lines.push(format!(
                "  {}  mean {:>5.0}  low {:>3}%  in range {:>3}%  high {:>3}%  (n={})",
                bucket.label,
                bucket.mean,
                bucket.pct_low,
                bucket.pct_in_range,
                bucket.pct_high,
                bucket.sample_count
            ));
        }
    }

    if !result.advisories.is_empty() {
        lines.push(String::new());
        lines.push("Advisories:".to_string());
        for advisory in &result.advisories {
            lines.push(format!("  - {}", advisory.message));
        }
    }

    lines.join("\n") + "\n"
}

// Error types

#[derive(Debug)]
enum GlucoseCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for GlucoseCliError {
    fn from(e: io::Error) -> Self {
        GlucoseCliError::Io(e)
    }
}

impl From<ComputeError> for GlucoseCliError {
    fn from(e: ComputeError) -> Self {
        GlucoseCliError::Compute(e)
    }
}

impl From<serde_json::Error> for GlucoseCliError {
    fn from(e: serde_json::Error) -> Self {
        GlucoseCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<GlucoseCliError> for CliError {
    fn from(e: GlucoseCliError) -> Self {
        match e {
            GlucoseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            GlucoseCliError::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::MissingInput(_) => (
                        "MISSING_INPUT",
                        "The snapshot must contain glucose, food and insulin arrays",
                    ),
                    ComputeError::InvalidConfig(_) => (
                        "INVALID_CONFIG",
                        "Run 'glucose doctor --settings <file>' for details",
                    ),
                    _ => ("PARSE_ERROR", "Run 'glucose validate' for details"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            GlucoseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            GlucoseCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Discarded records are skipped during analysis".to_string()),
            },
            GlucoseCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            GlucoseCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    glucose_samples: usize,
    food_events: usize,
    insulin_events: usize,
    duplicates: usize,
    expired: usize,
    discarded: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    log: String,
    index: usize,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
