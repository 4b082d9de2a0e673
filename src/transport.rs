use crate::{
    Result,
    store::SyncPayload,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Roll,
    Bank { player_id: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub session_id: String,
    pub payload: SyncPayload,
}

pub trait Transport {
    /// start a new session for the given player names
    fn create_session(
        &self,
        player_names: &[String],
    ) -> impl Future<Output = Result<NewSession>> + Send;

    /// fetch the full history (`since_seq` unset) or everything past the cursor
    fn fetch_session(
        &self,
        session_id: &str,
        since_seq: Option<u64>,
    ) -> impl Future<Output = Result<SyncPayload>> + Send;

    /// perform a user action; the response carries the events it produced
    fn perform_action(
        &self,
        session_id: &str,
        action: Action,
    ) -> impl Future<Output = Result<SyncPayload>> + Send;

    /// restart the session with the same players and an empty log
    fn reset_session(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<SyncPayload>> + Send;
}
