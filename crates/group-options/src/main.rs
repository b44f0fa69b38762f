use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};

use group_options::api::ApiClient;
use group_options::telemetry::init_tracing;
use group_options::{
    ClientConfig, HttpPartitionService, HttpResolver, OptionsSession, PartitionConsumer,
};
use selection::cascade::LevelPhase;
use selection::constraints::ConstraintKind;
use selection::options::{Level, OptionEntry};

#[derive(Parser, Debug)]
#[command(
    name = "group-options",
    about = "Pick a class, set constraints and request student groups"
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the API origin (e.g. http://localhost:5000)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Debug-level logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List teacher ids
    Teachers,
    /// List the classes a teacher teaches
    Classes {
        #[arg(long)]
        teacher: String,
    },
    /// List the roster of one of a teacher's classes
    Students {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        class: String,
    },
    /// Submit a grouping request and print the partition
    Generate {
        #[arg(long)]
        teacher: String,
        #[arg(long)]
        class: String,
        /// Students per group (2-6); defaults to the configured size
        #[arg(long)]
        group_size: Option<String>,
        /// Keep two students together, as `a:b` (repeatable)
        #[arg(long = "pair", value_parser = parse_pair)]
        pairs: Vec<(String, String)>,
        /// Keep two students apart, as `a:b` (repeatable)
        #[arg(long = "separate", value_parser = parse_pair)]
        separations: Vec<(String, String)>,
    },
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once(':') {
        Some((a, b)) if !a.is_empty() && !b.is_empty() => Ok((a.to_string(), b.to_string())),
        _ => Err(format!("expected two usernames as `a:b`, got {raw:?}")),
    }
}

/// Prints the partition to stdout; stands in for the results page.
struct StdoutConsumer;

impl PartitionConsumer for StdoutConsumer {
    fn on_partition_computed(&mut self, result: Value) {
        match serde_json::to_string_pretty(&result) {
            Ok(text) => println!("{text}"),
            Err(e) => warn!("Failed to render partition: {e}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
        config.validate()?;
    }
    let api = Arc::new(ApiClient::from_config(&config)?);
    info!(base_url = %api.base_url(), "Group options client starting");
    let mut session = OptionsSession::new(
        Arc::new(HttpResolver::new(Arc::clone(&api))),
        Arc::new(HttpPartitionService::new(api)),
        Box::new(StdoutConsumer),
    )
    .with_default_group_size(config.default_group_size);

    match cli.command {
        Command::Teachers => {
            session.load_teachers()?;
            session.settle().await;
            print_options(loaded_options(&session, Level::Teacher)?)?;
        }
        Command::Classes { teacher } => {
            session.select_teacher(&teacher)?;
            session.settle().await;
            print_options(loaded_options(&session, Level::Class)?)?;
        }
        Command::Students { teacher, class } => {
            open_class(&mut session, &teacher, &class).await?;
            print_options(loaded_options(&session, Level::StudentPool)?)?;
        }
        Command::Generate {
            teacher,
            class,
            group_size,
            pairs,
            separations,
        } => {
            open_class(&mut session, &teacher, &class).await?;
            loaded_options(&session, Level::StudentPool)?;
            let constraints = pairs
                .into_iter()
                .map(|p| (ConstraintKind::Paired, p))
                .chain(separations.into_iter().map(|p| (ConstraintKind::Separated, p)));

            for (kind, (a, b)) in constraints {
                for student in [&a, &b] {
                    if session.cascade().option(Level::StudentPool, student).is_none() {
                        warn!(%student, class = %class, "Student is not on the class roster");
                    }
                }
                session
                    .add_pair(kind, &a, &b)
                    .with_context(|| format!("Invalid {kind} constraint {a}:{b}"))?;
            }

            if let Some(size) = group_size {
                session.set_group_size_input(size);
            }
            session
                .generate()
                .await
                .context("Partition request failed")?;
        }
    }

    Ok(())
}

/// Select `teacher` then `class`, waiting for the class list and roster.
async fn open_class(session: &mut OptionsSession, teacher: &str, class: &str) -> Result<()> {
    session.select_teacher(teacher)?;
    session.settle().await;
    loaded_options(session, Level::Class)?;
    if session.cascade().option(Level::Class, class).is_none() {
        warn!(%teacher, %class, "Class is not in the teacher's class list");
    }
    session.select_class(class)?;
    session.settle().await;
    Ok(())
}

fn loaded_options(session: &OptionsSession, level: Level) -> Result<&[OptionEntry]> {
    if let LevelPhase::Error(e) = session.cascade().phase(level) {
        return Err(e).with_context(|| format!("Failed to load {level} options"));
    }
    Ok(session.cascade().options(level))
}

fn print_options(entries: &[OptionEntry]) -> Result<()> {
    let rows: Vec<Value> = entries
        .iter()
        .map(|entry| serde_json::json!({ "id": entry.id, "label": entry.display_label }))
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
