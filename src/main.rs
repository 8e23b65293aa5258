pub mod bot;
pub mod calculation;
pub mod catalog;
pub mod config;
pub mod crawler;
pub mod declare;
pub mod event;
pub mod logging;
pub mod scheduler;
pub mod util;

#[cfg(all(target_os = "linux", target_env = "musl"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::{env, process::ExitCode, sync::Arc, time::Duration};

use anyhow::Result;
use tokio_cron_scheduler::JobScheduler;

use crate::{
    bot::{telegram::Telegram, PublishError, Publisher},
    catalog::IndexCatalog,
    config::App,
    crawler::fallback::PriceResolver,
    event::index_fingerprint::{IndexFingerprintEvent, Outcome},
    scheduler::guard::ScheduleGuard,
    util::backoff::BackoffPolicy,
};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let app = match App::load() {
        Ok(app) => app,
        Err(why) => {
            logging::error_console(format!("Failed to load configuration because {:?}", why));
            return ExitCode::FAILURE;
        }
    };

    if let Err(why) = app.ensure_publishable() {
        logging::error_console(format!("Nowhere to publish: {}", why));
        return ExitCode::FAILURE;
    }

    match run(app).await {
        Ok(code) => code,
        Err(why) => {
            logging::error_console(format!("{:?}", why));
            logging::error_file_async(format!("{:?}", why));
            ExitCode::FAILURE
        }
    }
}

async fn run(app: App) -> Result<ExitCode> {
    let timeout = Duration::from_secs(app.system.request_timeout_secs.max(1));
    let offset = app.utc_offset()?;
    let publisher: Arc<dyn Publisher> = Arc::new(Telegram::new(&app.bot.telegram, timeout));

    let catalog = match IndexCatalog::from_app(&app) {
        Ok(catalog) => catalog,
        Err(why) => {
            // the chat is the only place anyone will notice
            let _ = publisher.publish(&format!("⚠️ {}", why), false).await;
            return Err(why.into());
        }
    };

    let resolver = PriceResolver::from_catalog(
        &catalog,
        &app.endpoints,
        BackoffPolicy::from(&app.retry),
        timeout,
    );
    let guard = Arc::new(ScheduleGuard::new(catalog.slots()));
    let event = Arc::new(IndexFingerprintEvent::new(
        Arc::new(catalog),
        Arc::new(resolver),
        publisher.clone(),
        offset,
        &app.system.timezone_label,
        app.bot.telegram.pin,
    ));

    if let Some(names) = one_shot_indices() {
        return Ok(run_once(&event, &names).await);
    }

    let mut sched = JobScheduler::new().await?;
    scheduler::start(&sched, guard, event.clone(), app.system.poll_interval_secs).await?;

    let msg = format!(
        "IndexTailBot started\nindices: {}\nRust OS/Arch: {}/{}",
        event
            .catalog()
            .iter()
            .map(|p| p.index.to_string())
            .collect::<Vec<_>>()
            .join(", "),
        env::consts::OS,
        env::consts::ARCH
    );
    logging::info_console(msg.clone());
    logging::info_file_async(msg.clone());
    if app.system.announce_startup {
        if let Err(why) = publisher.publish(&msg, false).await {
            logging::error_file_async(format!("Failed to announce startup because {}", why));
        }
    }

    tokio::signal::ctrl_c().await?;
    logging::info_console("shutting down".to_string());
    sched.shutdown().await?;

    Ok(ExitCode::SUCCESS)
}

/// `INDEX` from the environment, or the first argument; a comma separates
/// several indices.
fn one_shot_indices() -> Option<Vec<String>> {
    let raw = env::var("INDEX")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| env::args().nth(1))?;

    let names: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    (!names.is_empty()).then_some(names)
}

async fn run_once(event: &IndexFingerprintEvent, names: &[String]) -> ExitCode {
    let results = event.execute_many(names, event.now()).await;
    let delivered = report(names, &results);

    // give the file loggers a moment to drain before the process exits
    tokio::time::sleep(Duration::from_millis(200)).await;

    if delivered {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Logs each run and tells whether every message, warnings included, went out.
fn report(names: &[String], results: &[Result<Outcome, PublishError>]) -> bool {
    names.iter().zip(results).fold(true, |delivered, (name, result)| match result {
        Ok(outcome) => {
            logging::info_console(format!("{}: {:?}", name, outcome));
            delivered
        }
        Err(why) => {
            logging::error_console(format!("{}: message could not be published: {}", name, why));
            false
        }
    })
}
