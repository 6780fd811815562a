mod aggregate;
mod aliases;
mod bot;
mod config;
mod date;
mod error;
mod extract;
mod form;
mod narrative;
mod normalize;
mod store;
mod summary;
mod validate;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use report_types::Voice;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::aggregate::Aggregator;
use crate::bot::{IncomingMessage, ReportBot, StdoutTransport};
use crate::config::Config;
use crate::date::{Clock, FixedClock, SystemClock};
use crate::extract::FieldExtractor;
use crate::form::{FormEngine, MemorySessionStore};
use crate::narrative::{HttpNarrativeGenerator, NarrativeGenerator};
use crate::store::{FileStore, MemoryStore, ReportStore, StoredReport};
use crate::summary::{ALL_GROUPS, Period, SummaryService, render_text};
use crate::validate::validate;

/// Line that separates messages on stdin in `chat` mode.
const MESSAGE_SEPARATOR: &str = "---";

#[derive(Parser)]
#[command(
    name = "outreach_report",
    about = "Parse, store and summarise evangelism outreach reports"
)]
struct Cli {
    /// Treat this date (YYYY-MM-DD) as today, e.g. when replaying old messages
    #[arg(long, global = true)]
    today: Option<NaiveDate>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract and validate one report, print it as JSON
    Parse {
        /// Report text file (stdin when omitted)
        file: Option<PathBuf>,
    },
    /// Validate one report and store it
    Submit {
        /// Report text file (stdin when omitted)
        file: Option<PathBuf>,
        #[arg(long)]
        group: String,
        #[arg(long)]
        sender: String,
    },
    /// Period report for a group from the file store
    Summary {
        /// Group key, or "all" for every group
        #[arg(long, default_value = ALL_GROUPS)]
        group: String,
        #[arg(long, value_enum, conflicts_with_all = ["from", "to"])]
        period: Option<PeriodArg>,
        /// First day, e.g. 2026-02-01 or 01/02/2026
        #[arg(long, requires = "to")]
        from: Option<String>,
        /// Last day (inclusive)
        #[arg(long, requires = "from")]
        to: Option<String>,
        /// eyewitness, compiled or neutral (default from REPORT_VOICE)
        #[arg(long)]
        voice: Option<Voice>,
        /// Also break totals down by area
        #[arg(long)]
        areas: bool,
        #[arg(long)]
        json: bool,
    },
    /// List the groups that have stored reports
    Groups,
    /// Feed stdin messages, separated by "---" lines, through the chat bot
    Chat {
        #[arg(long, default_value = "cli")]
        chat_id: String,
        #[arg(long, default_value = "cli-user")]
        sender: String,
        /// Keep accepted reports in memory instead of the file store
        #[arg(long)]
        ephemeral: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PeriodArg {
    Week,
    Month,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("outreach_report=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;
    let clock: Arc<dyn Clock> = match cli.today {
        Some(date) => Arc::new(FixedClock(date)),
        None => Arc::new(SystemClock),
    };

    match cli.command {
        Command::Parse { file } => run_parse(&config, clock.as_ref(), file),
        Command::Submit {
            file,
            group,
            sender,
        } => run_submit(&config, clock.as_ref(), file, &group, &sender).await,
        Command::Summary {
            group,
            period,
            from,
            to,
            voice,
            areas,
            json,
        } => {
            let args = SummaryArgs {
                group,
                period,
                from,
                to,
                voice,
                areas,
                json,
            };
            run_summary(&config, clock, args).await
        }
        Command::Groups => run_groups(&config).await,
        Command::Chat {
            chat_id,
            sender,
            ephemeral,
        } => {
            let store: Arc<dyn ReportStore> = if ephemeral {
                Arc::new(MemoryStore::new())
            } else {
                Arc::new(FileStore::new(&config.store_dir))
            };
            run_chat(&config, clock, store, &chat_id, &sender).await
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  WIRING
// ═══════════════════════════════════════════════════════════════════════

fn read_input(file: Option<PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("cannot read stdin")?;
            Ok(text)
        }
    }
}

fn print_json<T: serde::Serialize>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

fn summary_service(config: &Config, store: Arc<dyn ReportStore>, clock: Arc<dyn Clock>) -> SummaryService {
    let generator: Option<Arc<dyn NarrativeGenerator>> = config
        .narrative_api
        .clone()
        .map(|api| Arc::new(HttpNarrativeGenerator::new(api)) as Arc<dyn NarrativeGenerator>);
    if generator.is_none() {
        info!("no narrative API configured, using templated narratives");
    }
    SummaryService::new(
        store,
        Aggregator::new(config.field_table.placeholders.clone()),
        generator,
        clock,
        config.voice,
    )
}

// ═══════════════════════════════════════════════════════════════════════
//  PARSE / SUBMIT
// ═══════════════════════════════════════════════════════════════════════

fn run_parse(config: &Config, clock: &dyn Clock, file: Option<PathBuf>) -> anyhow::Result<()> {
    let text = read_input(file)?;
    let extractor = FieldExtractor::new(&config.field_table)?;
    let report = extractor.extract(&text, clock.today());
    let validation = validate(&report);
    print_json(&json!({ "report": report, "validation": validation }))
}

async fn run_submit(
    config: &Config,
    clock: &dyn Clock,
    file: Option<PathBuf>,
    group: &str,
    sender: &str,
) -> anyhow::Result<()> {
    let text = read_input(file)?;
    let extractor = FieldExtractor::new(&config.field_table)?;
    let report = extractor.extract(&text, clock.today());

    let validation = validate(&report);
    if !validation.valid {
        eprintln!("Report rejected:\n{}", validation.bullet_list());
        bail!("{} defect(s) in report", validation.errors.len());
    }

    let store = FileStore::new(&config.store_dir);
    let stored = StoredReport::new(group, sender, Utc::now(), report);
    store.save(&stored).await?;
    print_json(&stored)
}

// ═══════════════════════════════════════════════════════════════════════
//  SUMMARY
// ═══════════════════════════════════════════════════════════════════════

struct SummaryArgs {
    group: String,
    period: Option<PeriodArg>,
    from: Option<String>,
    to: Option<String>,
    voice: Option<Voice>,
    areas: bool,
    json: bool,
}

fn resolve_period(args: &SummaryArgs, today: NaiveDate) -> anyhow::Result<Period> {
    match (&args.from, &args.to, args.period) {
        (Some(from), Some(to), _) => {
            Period::from_args(&[from.as_str(), to.as_str()], today).map_err(anyhow::Error::msg)
        }
        (_, _, Some(PeriodArg::Month)) => Ok(Period::Month),
        _ => Ok(Period::Week),
    }
}

async fn run_summary(config: &Config, clock: Arc<dyn Clock>, args: SummaryArgs) -> anyhow::Result<()> {
    let store: Arc<dyn ReportStore> = Arc::new(FileStore::new(&config.store_dir));
    let service = summary_service(config, store, clock.clone());

    let period = resolve_period(&args, clock.today())?;
    let group = (args.group != ALL_GROUPS).then_some(args.group.as_str());
    let report = service.generate(group, &period, args.voice).await?;
    let areas = if args.areas {
        Some(service.area_breakdown(group, &period).await?)
    } else {
        None
    };

    if args.json {
        return match areas {
            Some(areas) => print_json(&json!({ "report": report, "areas": areas })),
            None => print_json(&report),
        };
    }

    print!("{}", render_text(&report));
    if let Some(areas) = areas {
        println!("\nBy area:");
        for (area, s) in &areas {
            println!(
                "  {area}: {} outreach(es), {} saved, {} healed",
                s.total_outreaches, s.total_saved, s.total_healed
            );
        }
    }
    Ok(())
}

async fn run_groups(config: &Config) -> anyhow::Result<()> {
    let store = FileStore::new(&config.store_dir);
    for group in store.groups().await? {
        println!("{group}");
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
//  CHAT
// ═══════════════════════════════════════════════════════════════════════

/// Split stdin into messages on lines that hold only the separator.
fn split_messages(input: &str) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in input.lines() {
        if line.trim() == MESSAGE_SEPARATOR {
            messages.push(current.join("\n"));
            current.clear();
        } else {
            current.push(line);
        }
    }
    messages.push(current.join("\n"));
    messages.retain(|m| !m.trim().is_empty());
    messages
}

async fn run_chat(
    config: &Config,
    clock: Arc<dyn Clock>,
    store: Arc<dyn ReportStore>,
    chat_id: &str,
    sender: &str,
) -> anyhow::Result<()> {
    let bot = ReportBot::new(
        FieldExtractor::new(&config.field_table)?,
        FormEngine::new(Arc::new(MemorySessionStore::new()), clock.clone()),
        store.clone(),
        summary_service(config, store, clock.clone()),
        Arc::new(StdoutTransport),
        clock,
        config.min_report_fields,
    );

    let input = read_input(None)?;
    for text in split_messages(&input) {
        let routed = bot
            .handle(&IncomingMessage::new(chat_id, sender, text))
            .await?;
        tracing::debug!(?routed, "handled message");
    }
    Ok(())
}
