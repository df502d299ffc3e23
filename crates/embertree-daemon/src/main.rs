//! Embertree - Main entry point
//!
//! Loads a provider tree, builds the monitored set and runs one command
//! against it: a registry dump, a read, a write, or a feedback check.

mod config;
mod session;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use embertree_control::{Direction, MutationOutcome, SetValue, Target};
use embertree_core::Feedback;
use embertree_provider::{split_address, MemoryProvider, TreeSnapshot};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::session::Session;

#[derive(Parser, Debug)]
#[command(name = "embertree")]
#[command(about = "Mirror and control a provider parameter tree")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "embertree.toml")]
    config: PathBuf,

    /// Tree snapshot to serve (overrides the configured one)
    #[arg(short, long)]
    snapshot: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Write a default configuration file and exit
    #[arg(long)]
    write_default_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and print the monitored set
    Discover,
    /// Re-read a monitored label from the provider and print its value
    Get { label: String },
    /// Set a parameter to a typed value
    Set {
        target: String,
        #[arg(value_enum)]
        kind: ValueKind,
        value: String,
    },
    /// Set a numeric parameter from an expression with $(instance:label) variables
    Expr { target: String, text: String },
    /// Increment a numeric parameter
    Inc { target: String, delta: f64 },
    /// Decrement a numeric parameter
    Dec { target: String, delta: f64 },
    /// Invert a boolean parameter
    Toggle { target: String },
    /// Evaluate a feedback against the monitored set
    Feedback {
        #[arg(value_enum)]
        kind: FeedbackKind,
        label: String,
        arg: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ValueKind {
    Integer,
    Real,
    Enum,
    Boolean,
    String,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FeedbackKind {
    Equals,
    Boolean,
    Enum,
    Above,
    Below,
}

/// A dotted numeric string is a path, anything else a label
fn parse_target(s: &str) -> Target {
    let numeric = split_address(s).is_some()
        && s.trim()
            .split('.')
            .all(|seg| !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()));
    if numeric {
        Target::Path(s.trim().to_string())
    } else {
        Target::Label(s.to_string())
    }
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "on" => Ok(true),
        "false" | "0" | "off" => Ok(false),
        other => bail!("'{}' is not a boolean", other),
    }
}

fn parse_set_value(kind: ValueKind, value: &str) -> Result<SetValue> {
    let value = value.trim();
    Ok(match kind {
        ValueKind::Integer => SetValue::Integer(value.parse().context("integer value")?),
        ValueKind::Real => SetValue::Real(value.parse().context("real value")?),
        ValueKind::Enum => SetValue::Enum(value.parse().context("enum index")?),
        ValueKind::Boolean => SetValue::Boolean(parse_bool(value)?),
        ValueKind::String => SetValue::String(value.to_string()),
    })
}

fn parse_feedback(kind: FeedbackKind, label: String, arg: &str) -> Result<Feedback> {
    Ok(match kind {
        FeedbackKind::Equals => Feedback::ParameterEquals {
            label,
            value: arg.trim().parse().context("numeric value")?,
        },
        FeedbackKind::Boolean => Feedback::BooleanEquals {
            label,
            value: parse_bool(arg)?,
        },
        FeedbackKind::Enum => Feedback::EnumEquals {
            label,
            value: arg.to_string(),
        },
        FeedbackKind::Above => Feedback::HitThreshold {
            label,
            threshold: arg.trim().parse().context("threshold")?,
        },
        FeedbackKind::Below => Feedback::BelowThreshold {
            label,
            threshold: arg.trim().parse().context("threshold")?,
        },
    })
}

fn report_outcome(outcome: &MutationOutcome) {
    match outcome {
        MutationOutcome::Dispatched(write) => println!(
            "{} <- {} ({})",
            write.path, write.value, write.value_type
        ),
        MutationOutcome::Declined(e) => println!("declined: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Embertree v{}", env!("CARGO_PKG_VERSION"));

    if args.write_default_config {
        config::save_default_config(&args.config)?;
        println!("Wrote {}", args.config.display());
        return Ok(());
    }

    // Load configuration
    let config = config::load_config(&args.config)?;
    let monitor_config = config.to_monitor_config()?;

    info!(
        auto_parse = monitor_config.auto_parse,
        scopes = monitor_config.scopes.len(),
        parameters = monitor_config.parameters.len(),
        "Configuration loaded"
    );

    let Some(snapshot_path) = args.snapshot.or(config.provider.snapshot) else {
        bail!("No tree snapshot configured (set provider.snapshot or pass --snapshot)");
    };
    let snapshot = TreeSnapshot::from_file(&snapshot_path)?;
    let (provider, notifications) = MemoryProvider::new(&snapshot);
    let session = Session::start(Arc::new(provider.lazy()), notifications);

    let report = session.connect(&monitor_config).await?;
    if report.explicit.failed > 0 {
        warn!(failed = report.explicit.failed, "Some configured parameters were not registered");
    }

    match args.command.unwrap_or(Command::Discover) {
        Command::Discover => {
            let entries = session.entries().await;
            println!("Monitoring {} parameters:", entries.len());
            for entry in entries {
                println!("  - {} [{}] = {}", entry.label, entry.path, entry.value);
            }
            if let Some(discovery) = &report.discovery {
                println!("{}", serde_json::to_string_pretty(discovery)?);
            }
        }
        Command::Get { label } => {
            let value = session
                .read(&label)
                .await
                .with_context(|| format!("reading '{}'", label))?;
            println!("{}", value);
        }
        Command::Set {
            target,
            kind,
            value,
        } => {
            let value = parse_set_value(kind, &value)?;
            report_outcome(&session.engine.set_absolute(&parse_target(&target), value).await);
        }
        Command::Expr { target, text } => {
            report_outcome(&session.engine.set_expression(&parse_target(&target), &text).await);
        }
        Command::Inc { target, delta } => {
            let target = parse_target(&target);
            report_outcome(&session.engine.adjust(&target, Direction::Increment, delta).await);
        }
        Command::Dec { target, delta } => {
            let target = parse_target(&target);
            report_outcome(&session.engine.adjust(&target, Direction::Decrement, delta).await);
        }
        Command::Toggle { target } => {
            report_outcome(&session.engine.toggle(&parse_target(&target)).await);
        }
        Command::Feedback { kind, label, arg } => {
            let feedback = parse_feedback(kind, label, &arg)?;
            println!("{}", session.evaluate(&feedback).await);
        }
    }

    Ok(())
}
