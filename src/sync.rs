use crate::{
    Error,
    Result,
    events::Event,
    session::SessionClient,
    summary::Summary,
    transport::Transport,
};
use std::{
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing::warn;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate {
    /// The initial full fetch replaced the store contents.
    Refreshed,
    /// An incremental fetch merged; `new_events` may be empty.
    Updated {
        new_events: Vec<Event>,
        summary: Option<Summary>,
    },
    /// A fetch failed. The loop keeps its period; the next tick is the retry.
    Failed { reason: String },
}

enum SyncCommand {
    FetchNow,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControllerState {
    Idle,
    Polling,
    Stopped,
}

/// Owns the poll loop for one session: an initial full fetch, then an
/// incremental fetch every period using the store's cursor. Fetch failures
/// never stop the loop. `stop` is synchronous: once it returns, no further
/// fetch is issued and a response already in flight is discarded when it
/// lands. A user action running concurrently is unaffected; its merge still
/// applies.
pub struct SyncController<T> {
    client: SessionClient<T>,
    poll_interval: Duration,
    state: ControllerState,
    stopped: Arc<AtomicBool>,
    cmd_tx: Option<mpsc::UnboundedSender<SyncCommand>>,
}

impl<T> SyncController<T>
where
    T: Transport + Clone + Send + Sync + 'static,
{
    pub fn new(client: SessionClient<T>, poll_interval: Duration) -> Self {
        SyncController {
            client,
            poll_interval,
            state: ControllerState::Idle,
            stopped: Arc::new(AtomicBool::new(false)),
            cmd_tx: None,
        }
    }

    /// Spawn the poll loop and hand back its update stream. Starting an
    /// already-polling or stopped controller is an error, never a silent
    /// no-op.
    pub fn start(&mut self) -> Result<mpsc::UnboundedReceiver<SyncUpdate>> {
        match self.state {
            ControllerState::Idle => {}
            ControllerState::Polling => {
                return Err(Error::ValidationFailed(
                    "sync controller is already polling".to_string(),
                ));
            }
            ControllerState::Stopped => {
                return Err(Error::ValidationFailed(
                    "sync controller was stopped".to_string(),
                ));
            }
        }
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        tokio::spawn(poll_worker(
            self.client.clone(),
            self.poll_interval,
            self.stopped.clone(),
            cmd_rx,
            update_tx,
        ));
        self.cmd_tx = Some(cmd_tx);
        self.state = ControllerState::Polling;
        Ok(update_rx)
    }

    /// Ask for an incremental fetch ahead of the next tick.
    pub fn fetch_now(&self) {
        if let Some(cmd_tx) = &self.cmd_tx {
            let _ = cmd_tx.send(SyncCommand::FetchNow);
        }
    }

    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(cmd_tx) = self.cmd_tx.take() {
            let _ = cmd_tx.send(SyncCommand::Shutdown);
        }
        self.state = ControllerState::Stopped;
    }

    pub fn is_polling(&self) -> bool {
        self.state == ControllerState::Polling
    }
}

async fn poll_worker<T>(
    client: SessionClient<T>,
    poll_interval: Duration,
    stopped: Arc<AtomicBool>,
    mut cmd_rx: mpsc::UnboundedReceiver<SyncCommand>,
    update_tx: mpsc::UnboundedSender<SyncUpdate>,
) where
    T: Transport + Clone + Send + Sync + 'static,
{
    tracing::info!(session_id = %client.session_id(), "starting sync loop");
    if !initial_fetch(&client, &stopped, &update_tx).await {
        return;
    }
    let mut ticker =
        time::interval_at(time::Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !poll_once(&client, &stopped, &update_tx).await {
                    break;
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SyncCommand::FetchNow) => {
                        if !poll_once(&client, &stopped, &update_tx).await {
                            break;
                        }
                    }
                    Some(SyncCommand::Shutdown) | None => break,
                }
            }
        }
    }
    tracing::info!(session_id = %client.session_id(), "sync loop stopped");
}

// Both fetch helpers return whether the loop should keep running; they stop
// it only on shutdown or when nobody listens to updates any more.

async fn initial_fetch<T>(
    client: &SessionClient<T>,
    stopped: &AtomicBool,
    update_tx: &mpsc::UnboundedSender<SyncUpdate>,
) -> bool
where
    T: Transport + Clone + Send + Sync + 'static,
{
    if stopped.load(Ordering::SeqCst) {
        return false;
    }
    let fetched = client.fetch_full().await;
    if stopped.load(Ordering::SeqCst) {
        return false;
    }
    match fetched {
        Ok(payload) => {
            client.initialize_payload(payload);
            update_tx.send(SyncUpdate::Refreshed).is_ok()
        }
        Err(err) => {
            let reason = err.to_string();
            client.record_failure(&reason);
            warn!(%reason, "initial session fetch failed");
            // keep polling; incremental fetches from cursor 0 backfill the log
            update_tx.send(SyncUpdate::Failed { reason }).is_ok()
        }
    }
}

async fn poll_once<T>(
    client: &SessionClient<T>,
    stopped: &AtomicBool,
    update_tx: &mpsc::UnboundedSender<SyncUpdate>,
) -> bool
where
    T: Transport + Clone + Send + Sync + 'static,
{
    if stopped.load(Ordering::SeqCst) {
        return false;
    }
    let fetched = client.fetch_incremental().await;
    if stopped.load(Ordering::SeqCst) {
        // stopped while the request was in flight; discard whatever it
        // brought back
        return false;
    }
    match fetched {
        Ok(payload) => {
            let outcome = client.merge_payload(payload);
            update_tx
                .send(SyncUpdate::Updated {
                    new_events: outcome.new_events,
                    summary: outcome.summary,
                })
                .is_ok()
        }
        Err(err) => {
            let reason = err.to_string();
            client.record_failure(&reason);
            warn!(%reason, "session poll failed");
            update_tx.send(SyncUpdate::Failed { reason }).is_ok()
        }
    }
}
