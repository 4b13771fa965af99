use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use powertrack_reports::channels::{AdminNotifier, ReplyAdminNotifier, ReplySender, TwitterReplySender};
use powertrack_reports::config::ReportsConfig;
use powertrack_reports::pipeline::ReportPipeline;
use powertrack_reports::pipeline::cache::CacheGate;
use powertrack_reports::pipeline::executor::ActionExecutor;
use powertrack_reports::pipeline::messages::MessageTexts;
use powertrack_reports::pipeline::reply::ReplyPolicy;
use powertrack_reports::store::{LibSqlBackend, ReportStore};
use powertrack_reports::stream::{
    ManagerSettings, PowertrackRules, PowertrackStream, StreamConnectionManager,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing, with a daily log file when REPORTS_LOG_DIR is set
    let (file_layer, _log_guard) = match std::env::var("REPORTS_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "powertrack-reports.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    // Config path from the first argument, or REPORTS_CONFIG
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("REPORTS_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            eprintln!("Error: no configuration file given");
            eprintln!("  powertrack-reports <config.json>   (or set REPORTS_CONFIG)");
            std::process::exit(1);
        });

    let config = ReportsConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.validate().context("invalid configuration")?;

    eprintln!("📡 PowerTrack Reports v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Instance: {}", config.instance);
    eprintln!("   Stream: {}", config.stream.stream_url);
    eprintln!(
        "   Replies: {}",
        if config.twitter.send_enabled { "enabled" } else { "disabled (logged only)" }
    );

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = PathBuf::from(&config.database.path);
    let store: Arc<dyn ReportStore> = Arc::new(
        LibSqlBackend::new_local(&db_path, config.database.tables.clone())
            .await
            .with_context(|| format!("opening database at {}", db_path.display()))?,
    );
    eprintln!("   Database: {}", db_path.display());

    // ── Outbound ─────────────────────────────────────────────────────────
    let sender: Arc<dyn ReplySender> = Arc::new(TwitterReplySender::new(
        config.twitter.api_url.clone(),
        config.twitter.bearer_token.clone(),
    ));
    let notifier: Arc<dyn AdminNotifier> = Arc::new(ReplyAdminNotifier::new(
        Arc::clone(&sender),
        config.stream.admin_recipients.clone(),
    ));

    // ── Pipeline ─────────────────────────────────────────────────────────
    let replies = ReplyPolicy::new(
        sender,
        config.twitter.reply_blacklist.clone(),
        config.twitter.send_enabled,
    );
    let texts = MessageTexts::new(
        config.twitter.messages.clone(),
        config.twitter.default_language.clone(),
    );
    let executor = ActionExecutor::new(store, replies, texts, config.twitter.add_timestamp);
    let pipeline = Arc::new(ReportPipeline::new(
        executor,
        config.twitter.username_verify.clone(),
    ));
    let gate = Arc::new(CacheGate::new(pipeline));

    // ── Stream ───────────────────────────────────────────────────────────
    let mut manager = StreamConnectionManager::new(
        ManagerSettings::from_config(&config.instance, &config.stream),
        Arc::new(PowertrackStream::new(&config.stream)),
        Arc::new(PowertrackRules::new(&config.stream)),
        gate,
        notifier,
    );

    tokio::select! {
        result = manager.run() => {
            result.context("replacing stream rules")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}
