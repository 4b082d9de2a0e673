use clap::Parser;
use color_eyre::eyre::Result;
use dicegame_client::{
    api::ApiClient,
    events::EventKind,
    session::SessionClient,
    summary::Summary,
    sync::{
        SyncController,
        SyncUpdate,
    },
    transport::Transport,
};
use std::time::Duration;
use url::Url;

#[derive(Parser, Debug)]
#[command(version, about = "Headless client for the dice game API", long_about = None)]
struct Args {
    /// Base URL of the game server
    #[arg(long, default_value = "http://localhost:8000")]
    base_url: Url,

    /// Player names for a new session, comma separated
    #[arg(long, value_delimiter = ',')]
    players: Vec<String>,

    /// Attach to an existing session instead of creating one
    #[arg(long, conflicts_with = "players")]
    session_id: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_ms: u64,

    /// Play automatically: bank once the round score reaches this threshold,
    /// otherwise roll; one action per poll tick
    #[arg(long)]
    auto_bank_at: Option<u64>,

    #[arg(short, long, default_value = "false")]
    tracing: bool,
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    if args.tracing {
        init_tracing();
    }

    let api = ApiClient::new(args.base_url.as_str())?;
    let client = if let Some(session_id) = args.session_id {
        tracing::info!(%session_id, "joining session");
        SessionClient::join(api, session_id).await?
    } else {
        SessionClient::create(api, &args.players).await?
    };
    println!("session {}", client.session_id());

    let mut controller =
        SyncController::new(client.clone(), Duration::from_millis(args.poll_ms));
    let mut updates = controller.start()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                controller.stop();
                break;
            }
            update = updates.recv() => {
                let Some(update) = update else {
                    break;
                };
                match update {
                    SyncUpdate::Refreshed => {
                        for event in client.store().events() {
                            println!("{}", event.log_line());
                        }
                    }
                    SyncUpdate::Updated { new_events, summary } => {
                        let mut game_over = new_events
                            .iter()
                            .any(|event| matches!(event.kind, EventKind::GameEnd(_)));
                        for event in &new_events {
                            println!("{}", event.log_line());
                        }
                        if let Some(summary) = summary {
                            print_summary(&client, summary);
                        }
                        if let Some(threshold) = args.auto_bank_at {
                            if !game_over {
                                game_over = autoplay_step(&client, threshold).await;
                            }
                        }
                        if game_over {
                            controller.stop();
                            break;
                        }
                    }
                    SyncUpdate::Failed { reason } => {
                        tracing::warn!(%reason, "session poll failed");
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_summary<T: Transport>(client: &SessionClient<T>, summary: Summary) {
    println!("== {} ==", summary.title);
    for detail in &summary.details {
        println!("  {detail}");
    }
    client.summaries().dismiss(summary.seq);
}

/// Threshold strategy: bank every eligible player once the round score
/// reaches the threshold, otherwise roll. Returns whether the game ended.
async fn autoplay_step<T: Transport>(client: &SessionClient<T>, threshold: u64) -> bool {
    let snapshot = client.store().snapshot();
    let actions = client.store().valid_actions();
    if snapshot.is_game_over {
        return true;
    }
    let result = if snapshot.round_score >= threshold
        && !actions.bankable_player_ids.is_empty()
    {
        client.bank(actions.bankable_player_ids[0]).await
    } else if actions.can_roll {
        client.roll().await
    } else {
        return false;
    };
    match result {
        Ok(outcome) => {
            let game_over = outcome
                .new_events
                .iter()
                .any(|event| matches!(event.kind, EventKind::GameEnd(_)));
            for event in &outcome.new_events {
                println!("{}", event.log_line());
            }
            if let Some(summary) = outcome.summary {
                print_summary(client, summary);
            }
            game_over
        }
        Err(err) => {
            // stale legality hints lose races against other clients; the
            // next poll refreshes them
            tracing::warn!(%err, "action rejected");
            false
        }
    }
}
