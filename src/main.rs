//! Daybook daemon entrypoint.
//!
//! Default invocation runs the background agent: the adaptive sync loop and
//! the chat dispatch loop over a shared store. One-shot flags cover ops use:
//! `--health-check`, `--plan <text>`, `--sync-live-once`.
//!
//! Exit codes: 0 success; 2 success but requires confirmation; 1 failure.
#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use daybook::apply::PlanApplyService;
use daybook::calendar::{CalendarStore, InMemoryCalendarStore};
use daybook::chat;
use daybook::commands::CommandService;
use daybook::config::Config;
use daybook::credentials::{ChainedCredentialStore, CredentialStore};
use daybook::ingest;
use daybook::ingest::coordinator::MultiAccountCoordinator;
use daybook::ingest::service::IngestionService;
use daybook::llm::fallback::RuleBasedExtractor;
use daybook::llm::LlmClient;
use daybook::parser::ParserPipeline;
use daybook::providers::memory::StaticMailProvider;
use daybook::providers::MailProvider;
use daybook::store::Store;

/// Exit code for a successful command that still needs user confirmation.
const EXIT_REQUIRES_CONFIRMATION: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "daybook", about = "Email-to-schedule agent", version)]
struct Cli {
    /// Open the store, verify the schema, report counters, and exit.
    #[arg(long)]
    health_check: bool,

    /// Handle one command line (e.g. `--plan 'add "Homework" 60m'`) and exit.
    #[arg(long, value_name = "TEXT")]
    plan: Option<String>,

    /// Run one sync pass over all enabled accounts and exit.
    #[arg(long)]
    sync_live_once: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let one_shot = cli.health_check || cli.plan.is_some() || cli.sync_live_once;

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return ExitCode::from(1);
        }
    };

    let _logging_guard = if one_shot {
        daybook::logging::init_cli();
        None
    } else {
        match daybook::logging::init_production(Path::new(&config.logs_dir), &config.log_level) {
            Ok(guard) => Some(guard),
            Err(e) => {
                eprintln!("logging setup failed: {e:#}");
                return ExitCode::from(1);
            }
        }
    };

    let result = if cli.health_check {
        health_check(&config).await
    } else if let Some(text) = cli.plan {
        plan_once(&config, &text).await
    } else if cli.sync_live_once {
        sync_once(&config).await
    } else {
        run_daemon(&config).await
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

/// Open the store and mirror configured accounts into it.
async fn open_store(config: &Config) -> anyhow::Result<Store> {
    let store = Store::open(&PathBuf::from(&config.database_path))
        .await
        .with_context(|| format!("failed to open store at {}", config.database_path))?;
    store
        .upsert_accounts(&config.account_list())
        .await
        .context("failed to mirror accounts")?;
    Ok(store)
}

/// Build the calendar capability.
///
/// No calendar backend is linked into this build; blocks live in the local
/// mirror until a backend capability is attached.
async fn open_calendar(config: &Config) -> anyhow::Result<Arc<InMemoryCalendarStore>> {
    let calendar = Arc::new(InMemoryCalendarStore::new());
    calendar
        .ensure_managed_calendar(&config.managed_calendar)
        .await
        .context("failed to ensure managed calendar")?;
    Ok(calendar)
}

/// Build per-account ingestion services over the available provider clients.
fn build_services(
    config: &Config,
    store: &Store,
    apply: &Arc<PlanApplyService>,
    llm: &Arc<dyn LlmClient>,
) -> Vec<Arc<IngestionService>> {
    config
        .account_list()
        .into_iter()
        .filter(|account| account.enabled)
        .map(|account| {
            // No provider HTTP client is linked into this build; accounts
            // sync against an empty upstream until one is attached.
            let provider: Arc<dyn MailProvider> = if account.provider == "gmail" {
                Arc::new(StaticMailProvider::gmail())
            } else {
                Arc::new(StaticMailProvider::outlook())
            };
            Arc::new(IngestionService::new(
                provider,
                store.clone(),
                ParserPipeline::new(config.trusted_senders.clone()),
                Arc::clone(llm),
                Some(Arc::clone(apply)),
                account,
                config.confidence_threshold,
            ))
        })
        .collect()
}

async fn health_check(config: &Config) -> anyhow::Result<ExitCode> {
    let store = open_store(config).await?;
    let revision = store.latest_revision_id().await?;
    let accounts = store.list_enabled_accounts().await?;
    let updates = store.count_updates(None).await?;
    let tasks = store.count_tasks().await?;
    let credentials = ChainedCredentialStore::default_chain(daybook::config::credentials_path(
        &daybook::config::runtime_root()?,
    ));

    println!("store: ok ({})", config.database_path);
    println!("plan_revision: {revision}");
    println!("enabled_accounts: {}", accounts.len());
    for account in &accounts {
        let cursor = store
            .get_cursor(&account.provider, &account.account_id)
            .await?;
        let position = cursor
            .map(|c| format!("{}|{}", c.primary, c.secondary))
            .unwrap_or_else(|| "(none)".to_owned());
        let credential = match credentials.load(&account.provider, &account.account_id) {
            Some(_) => "present",
            None => "missing",
        };
        println!(
            "  {}/{} cursor: {position} credential: {credential}",
            account.provider, account.account_id
        );
    }
    println!("updates: {updates}");
    println!("tasks: {tasks}");
    println!(
        "sync_paused: {}",
        store
            .get_preference(daybook::ingest::SYNC_PAUSED_KEY)
            .await?
            .unwrap_or_else(|| "false".to_owned())
    );
    Ok(ExitCode::SUCCESS)
}

async fn plan_once(config: &Config, text: &str) -> anyhow::Result<ExitCode> {
    let store = open_store(config).await?;
    let calendar = open_calendar(config).await?;
    let calendar_store = calendar as Arc<dyn CalendarStore>;
    let apply = Arc::new(PlanApplyService::new(
        store.clone(),
        Arc::clone(&calendar_store),
        config.planner.clone(),
        config.managed_calendar.clone(),
    ));
    let commands = CommandService::new(
        store,
        calendar_store,
        Arc::new(RuleBasedExtractor),
        Some(apply),
        config.managed_calendar.clone(),
    );

    let now = chrono::Local::now().naive_local();
    let reply = commands.handle(text, now).await?;
    println!("{}", reply.text);
    if reply.requires_confirmation {
        return Ok(ExitCode::from(EXIT_REQUIRES_CONFIRMATION));
    }
    Ok(ExitCode::SUCCESS)
}

async fn sync_once(config: &Config) -> anyhow::Result<ExitCode> {
    let store = open_store(config).await?;
    let calendar = open_calendar(config).await?;
    let apply = Arc::new(PlanApplyService::new(
        store.clone(),
        calendar as Arc<dyn CalendarStore>,
        config.planner.clone(),
        config.managed_calendar.clone(),
    ));
    let llm: Arc<dyn LlmClient> = Arc::new(RuleBasedExtractor);
    let services = build_services(config, &store, &apply, &llm);
    if services.is_empty() {
        println!("no enabled accounts configured");
        return Ok(ExitCode::SUCCESS);
    }

    let coordinator = MultiAccountCoordinator::new(services);
    let now = chrono::Local::now().naive_local();
    let summary = coordinator
        .sync_all(now)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    for (account, outcome) in &summary.results {
        println!(
            "{}/{}: fetched {} stored {} tasks {}",
            account.provider,
            account.account_id,
            outcome.fetched,
            outcome.stored_updates,
            outcome.touched_tasks
        );
    }
    for failure in &summary.failures {
        println!(
            "{}/{} FAILED: {}",
            failure.provider, failure.account_id, failure.reason
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_daemon(config: &Config) -> anyhow::Result<ExitCode> {
    info!("daybook starting");
    let store = open_store(config).await?;
    let calendar = open_calendar(config).await?;
    let calendar_store: Arc<dyn CalendarStore> = calendar;

    let apply = Arc::new(PlanApplyService::new(
        store.clone(),
        Arc::clone(&calendar_store),
        config.planner.clone(),
        config.managed_calendar.clone(),
    ));
    let llm: Arc<dyn LlmClient> = Arc::new(RuleBasedExtractor);
    let commands = Arc::new(CommandService::new(
        store.clone(),
        Arc::clone(&calendar_store),
        Arc::clone(&llm),
        Some(Arc::clone(&apply)),
        config.managed_calendar.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let services = build_services(config, &store, &apply, &llm);
    let sync_handle = if services.is_empty() {
        warn!("no enabled accounts; ingestion disabled");
        None
    } else {
        let coordinator = Arc::new(MultiAccountCoordinator::new(services));
        Some(tokio::spawn(ingest::run_sync_loop(
            coordinator,
            store.clone(),
            config.sync,
            shutdown_rx.clone(),
        )))
    };

    // The chat transport is an external capability; this build listens on a
    // channel nothing feeds yet, so commands arrive via `--plan` until a
    // transport is attached.
    let (_chat_tx, chat_rx) = tokio::sync::mpsc::channel::<chat::CommandEnvelope>(64);
    let replier = Arc::new(chat::BufferedReplier::new());
    let chat_handle = tokio::spawn(chat::run_chat_loop(
        chat_rx,
        Arc::clone(&commands),
        replier,
        shutdown_rx,
    ));

    info!("daybook ready");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sync_handle {
        let _ = handle.await;
    }
    let _ = chat_handle.await;

    info!("daybook stopped");
    Ok(ExitCode::SUCCESS)
}
