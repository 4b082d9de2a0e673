use crate::{
    Error,
    Result,
    events::Event,
    store::{
        SessionStore,
        SyncPayload,
    },
    summary::{
        Summary,
        SummarySlot,
        derive_summary,
    },
    transport::{
        Action,
        NewSession,
        Transport,
    },
};
use std::sync::{
    Arc,
    Mutex,
};


/// What a single merge produced: the events that were actually new and the
/// summary triggered by them, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub new_events: Vec<Event>,
    pub summary: Option<Summary>,
}

/// Most recent failure message. Held until a later success or a different
/// failure supersedes it; a background poll tick only clears it by
/// succeeding.
#[derive(Clone, Default)]
pub struct ErrorSlot {
    inner: Arc<Mutex<Option<String>>>,
}

impl ErrorSlot {
    pub fn record(&self, reason: impl Into<String>) {
        *self.inner.lock().unwrap() = Some(reason.into());
    }

    pub fn clear(&self) {
        *self.inner.lock().unwrap() = None;
    }

    pub fn last(&self) -> Option<String> {
        self.inner.lock().unwrap().clone()
    }
}

/// One client's view of one remote session: the transport, the event log
/// store, the pending summary, and the last error. Cloning shares all of it.
#[derive(Clone)]
pub struct SessionClient<T> {
    session_id: String,
    transport: T,
    store: SessionStore,
    summaries: SummarySlot,
    errors: ErrorSlot,
}

impl<T: Transport> SessionClient<T> {
    /// Bind to a session id without talking to the server. The store stays
    /// empty until the sync controller's initial full fetch (or a manual
    /// refresh) populates it.
    pub fn attach(transport: T, session_id: impl Into<String>) -> Self {
        SessionClient {
            session_id: session_id.into(),
            transport,
            store: SessionStore::new(),
            summaries: SummarySlot::new(),
            errors: ErrorSlot::default(),
        }
    }

    /// Create a new session. Names are trimmed and blanks dropped before the
    /// two-player minimum is checked; validation failures never reach the
    /// server.
    pub async fn create(transport: T, player_names: &[String]) -> Result<Self> {
        let cleaned: Vec<String> = player_names
            .iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if cleaned.len() < 2 {
            return Err(Error::ValidationFailed(
                "Enter at least two player names.".to_string(),
            ));
        }
        let NewSession {
            session_id,
            payload,
        } = transport.create_session(&cleaned).await?;
        let client = Self::attach(transport, session_id);
        client.store.initialize(payload);
        Ok(client)
    }

    /// Attach to an existing session and load its full history.
    pub async fn join(transport: T, session_id: impl Into<String>) -> Result<Self> {
        let client = Self::attach(transport, session_id);
        let payload = client.fetch_full().await?;
        client.initialize_payload(payload);
        Ok(client)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn summaries(&self) -> &SummarySlot {
        &self.summaries
    }

    pub fn last_error(&self) -> Option<String> {
        self.errors.last()
    }

    pub async fn roll(&self) -> Result<MergeOutcome> {
        self.perform(Action::Roll).await
    }

    pub async fn bank(&self, player_id: u32) -> Result<MergeOutcome> {
        self.perform(Action::Bank { player_id }).await
    }

    /// Run one action and merge its payload exactly as a poll merge would.
    /// Legality hints in the store are advisory; a server rejection of a
    /// locally-valid action surfaces here as a recoverable failure.
    async fn perform(&self, action: Action) -> Result<MergeOutcome> {
        match self.transport.perform_action(&self.session_id, action).await {
            Ok(payload) => Ok(self.merge_payload(payload)),
            Err(err) => {
                self.errors.record(err.to_string());
                Err(err)
            }
        }
    }

    /// Restart the server session with the same players and drop all local
    /// session state with it.
    pub async fn reset(&self) -> Result<()> {
        match self.transport.reset_session(&self.session_id).await {
            Ok(payload) => {
                self.store.initialize(payload);
                self.summaries.clear();
                self.errors.clear();
                Ok(())
            }
            Err(err) => {
                self.errors.record(err.to_string());
                Err(err)
            }
        }
    }

    /// Fetch the full history and replace the store with it.
    pub async fn refresh_full(&self) -> Result<()> {
        let payload = self.fetch_full().await?;
        self.initialize_payload(payload);
        Ok(())
    }

    pub(crate) async fn fetch_full(&self) -> Result<SyncPayload> {
        self.transport.fetch_session(&self.session_id, None).await
    }

    pub(crate) async fn fetch_incremental(&self) -> Result<SyncPayload> {
        self.transport
            .fetch_session(&self.session_id, Some(self.store.cursor()))
            .await
    }

    pub(crate) fn initialize_payload(&self, payload: SyncPayload) {
        self.store.initialize(payload);
        self.errors.clear();
    }

    /// The summary is derived from the snapshot that travelled with this
    /// payload, not whatever the store holds afterwards.
    pub(crate) fn merge_payload(&self, payload: SyncPayload) -> MergeOutcome {
        let snapshot = payload.snapshot.clone();
        let new_events = self.store.merge(payload);
        let summary = derive_summary(&snapshot, &new_events);
        if let Some(summary) = &summary {
            self.summaries.publish(summary.clone());
        }
        self.errors.clear();
        MergeOutcome {
            new_events,
            summary,
        }
    }

    pub(crate) fn record_failure(&self, reason: &str) {
        self.errors.record(reason);
    }
}
