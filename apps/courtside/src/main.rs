use anyhow::Context;
use clap::{Parser, Subcommand};
use courtside_bus::{Bus, UI_TOPICS};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use courtside_sync::cache::QueryKey;
use courtside_sync::config::ClientConfig;
use courtside_sync::{metrics, telemetry, SyncSession};

#[derive(Parser, Debug)]
#[command(name = "courtside", about = "Keeps a Courtside client cache in sync with the server")]
struct Cli {
    #[arg(long, help = "Push channel URL (overrides COURTSIDE_WS_URL)")]
    ws_url: Option<String>,

    #[arg(long, help = "REST base URL (overrides COURTSIDE_API_URL)")]
    api_url: Option<String>,

    #[arg(long, help = "Bearer token (overrides COURTSIDE_TOKEN)")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stay connected and print UI notices until interrupted.
    Watch {
        #[arg(long = "league", help = "League to follow; repeatable")]
        leagues: Vec<String>,

        #[arg(long, help = "Disable the polling fallback")]
        no_poll: bool,

        #[arg(long, help = "Dump Prometheus metrics on exit")]
        metrics: bool,
    },
    /// Print the unread counter and latest notifications, then exit.
    Status {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = ClientConfig::from_env();
    if let Some(ws_url) = cli.ws_url {
        config.ws_url = ws_url;
    }
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }
    if cli.token.is_some() {
        config.token = cli.token;
    }
    telemetry::init_tracing(&config.log_filter);

    let session = SyncSession::from_config(&config).context("failed to build sync session")?;
    match cli.command {
        Command::Watch {
            leagues,
            no_poll,
            metrics,
        } => watch(session, &config, leagues, !no_poll, metrics).await,
        Command::Status { limit } => status(session, limit).await,
    }
}

async fn watch(
    session: SyncSession,
    config: &ClientConfig,
    leagues: Vec<String>,
    poll: bool,
    dump_metrics: bool,
) -> anyhow::Result<()> {
    if let Err(err) = session.prime().await {
        warn!(error = %err, "initial fetch failed; relying on push and poll");
    }
    for league in &leagues {
        session.subscribe_league(league);
        if let Err(err) = session.load_league_activity(league).await {
            warn!(league = %league, error = %err, "initial activity fetch failed");
        }
    }

    let bus = session.bus();
    for topic in UI_TOPICS {
        let mut rx = bus.subscribe(topic);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(msg) => println!("{} {}", msg.topic, String::from_utf8_lossy(&msg.payload)),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "notice printer lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    let mut connected = session.status().watch_connected();
    tokio::spawn(async move {
        while connected.changed().await.is_ok() {
            let up = *connected.borrow_and_update();
            if up {
                info!("live updates on");
            } else {
                info!("offline; data may be stale");
            }
        }
    });

    session.connect();
    if poll {
        session.start_polling(config.poll_interval());
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");
    session.dispose().await;

    if dump_metrics {
        print!("{}", metrics::render());
    }
    Ok(())
}

async fn status(session: SyncSession, limit: usize) -> anyhow::Result<()> {
    session
        .refresh(&QueryKey::notification_list())
        .await
        .context("failed to fetch notifications")?;
    session
        .refresh(&QueryKey::unread_count())
        .await
        .context("failed to fetch unread count")?;

    let cache = session.cache();
    let cache = cache.lock();
    println!("unread: {}", cache.unread_count().unwrap_or_default());
    for item in cache.notifications().into_iter().flatten().take(limit) {
        let marker = if item.read { ' ' } else { '*' };
        println!("{marker} {} [{}] {}", item.id, item.kind.wire_name(), item.title);
    }
    Ok(())
}
