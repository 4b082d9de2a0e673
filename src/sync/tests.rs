#![allow(non_snake_case)]

use super::*;
use crate::{
    store::SyncPayload,
    test_helpers::{
        payload,
        roll_event,
    },
    transport::{
        Action,
        NewSession,
    },
};
use std::{
    collections::VecDeque,
    sync::Mutex,
};
use tokio::sync::Notify;

#[derive(Clone)]
struct FakeTransport {
    responses: Arc<Mutex<VecDeque<Result<SyncPayload>>>>,
    calls: Arc<Mutex<Vec<Option<u64>>>>,
    gate_from: Option<usize>,
    gate: Arc<Notify>,
}

impl FakeTransport {
    fn new(responses: Vec<Result<SyncPayload>>) -> Self {
        FakeTransport {
            responses: Arc::new(Mutex::new(responses.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
            gate_from: None,
            gate: Arc::new(Notify::new()),
        }
    }

    /// Fetches from `gate_from` onwards block until `open_gate` is called,
    /// simulating a response still in flight.
    fn new_gated(responses: Vec<Result<SyncPayload>>, gate_from: usize) -> Self {
        FakeTransport {
            gate_from: Some(gate_from),
            ..Self::new(responses)
        }
    }

    fn calls(&self) -> Vec<Option<u64>> {
        self.calls.lock().unwrap().clone()
    }

    fn open_gate(&self) {
        self.gate.notify_one();
    }
}

impl Transport for FakeTransport {
    async fn create_session(&self, _player_names: &[String]) -> Result<NewSession> {
        todo!()
    }

    async fn fetch_session(
        &self,
        _session_id: &str,
        since_seq: Option<u64>,
    ) -> Result<SyncPayload> {
        let call_index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(since_seq);
            calls.len() - 1
        };
        if let Some(gate_from) = self.gate_from {
            if call_index >= gate_from {
                self.gate.notified().await;
            }
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::request_failed("scripted responses exhausted")))
    }

    async fn perform_action(
        &self,
        _session_id: &str,
        _action: Action,
    ) -> Result<SyncPayload> {
        todo!()
    }

    async fn reset_session(&self, _session_id: &str) -> Result<SyncPayload> {
        todo!()
    }
}

fn new_seqs(update: SyncUpdate) -> Vec<u64> {
    match update {
        SyncUpdate::Updated { new_events, .. } => {
            new_events.iter().map(|event| event.seq).collect()
        }
        other => panic!("expected an Updated sync update, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn start__initial_full_fetch_then_periodic_incremental() {
    // given
    let fake = FakeTransport::new(vec![
        Ok(payload(vec![roll_event(1, 0, 3), roll_event(2, 0, 4)], 2)),
        Ok(payload(vec![roll_event(3, 0, 5)], 3)),
        Ok(payload(vec![], 3)),
    ]);
    let client = SessionClient::attach(fake.clone(), "game-1");
    let mut controller = SyncController::new(client.clone(), Duration::from_secs(1));

    // when
    let mut updates = controller.start().unwrap();

    // then
    assert_eq!(Some(SyncUpdate::Refreshed), updates.recv().await);
    assert_eq!(vec![None], fake.calls());
    assert_eq!(2, client.store().cursor());

    let update = updates.recv().await.unwrap();
    assert_eq!(vec![3], new_seqs(update));
    assert_eq!(vec![None, Some(2)], fake.calls());

    let update = updates.recv().await.unwrap();
    assert!(new_seqs(update).is_empty());
    assert_eq!(vec![None, Some(2), Some(3)], fake.calls());
    assert_eq!(3, client.store().cursor());

    controller.stop();
}

#[tokio::test(start_paused = true)]
async fn start__fetch_failure__loop_continues_and_error_clears_on_success() {
    // given
    let fake = FakeTransport::new(vec![
        Ok(payload(vec![roll_event(1, 0, 3), roll_event(2, 0, 4)], 2)),
        Err(Error::request_failed("boom")),
        Ok(payload(vec![roll_event(3, 0, 5)], 3)),
    ]);
    let client = SessionClient::attach(fake.clone(), "game-1");
    let mut controller = SyncController::new(client.clone(), Duration::from_secs(1));
    let mut updates = controller.start().unwrap();
    assert_eq!(Some(SyncUpdate::Refreshed), updates.recv().await);

    // when
    let failed = updates.recv().await.unwrap();

    // then
    assert_eq!(
        SyncUpdate::Failed {
            reason: "boom".to_string()
        },
        failed
    );
    assert_eq!(Some("boom".to_string()), client.last_error());
    // the log survives a failed tick untouched
    assert_eq!(2, client.store().event_count());

    // and the next tick retries and clears the error
    let update = updates.recv().await.unwrap();
    assert_eq!(vec![3], new_seqs(update));
    assert_eq!(None, client.last_error());
    assert_eq!(3, client.store().cursor());

    controller.stop();
}

#[tokio::test(start_paused = true)]
async fn stop__issues_no_further_fetches() {
    // given
    let fake = FakeTransport::new(vec![Ok(payload(vec![roll_event(1, 0, 3)], 1))]);
    let client = SessionClient::attach(fake.clone(), "game-1");
    let mut controller = SyncController::new(client.clone(), Duration::from_secs(1));
    let mut updates = controller.start().unwrap();
    assert_eq!(Some(SyncUpdate::Refreshed), updates.recv().await);

    // when
    controller.stop();

    // then
    assert!(!controller.is_polling());
    assert_eq!(None, updates.recv().await);
    assert_eq!(vec![None], fake.calls());
}

#[tokio::test(start_paused = true)]
async fn stop__discards_fetch_already_in_flight() {
    // given
    let fake = FakeTransport::new_gated(
        vec![
            Ok(payload(vec![roll_event(1, 0, 3)], 1)),
            Ok(payload(vec![roll_event(2, 0, 6)], 2)),
        ],
        1,
    );
    let client = SessionClient::attach(fake.clone(), "game-1");
    let mut controller = SyncController::new(client.clone(), Duration::from_secs(1));
    let mut updates = controller.start().unwrap();
    assert_eq!(Some(SyncUpdate::Refreshed), updates.recv().await);

    // let the next tick start a fetch that stays in flight
    tokio::time::advance(Duration::from_secs(1)).await;
    while fake.calls().len() < 2 {
        tokio::task::yield_now().await;
    }

    // when
    controller.stop();
    fake.open_gate();

    // then
    assert_eq!(None, updates.recv().await);
    assert_eq!(1, client.store().cursor());
    assert_eq!(1, client.store().event_count());
}

#[tokio::test(start_paused = true)]
async fn start__on_running_or_stopped_controller__is_an_error() {
    // given
    let fake = FakeTransport::new(vec![Ok(payload(vec![], 0))]);
    let client = SessionClient::attach(fake, "game-1");
    let mut controller = SyncController::new(client, Duration::from_secs(1));
    let _updates = controller.start().unwrap();

    // when / then
    assert!(matches!(
        controller.start(),
        Err(Error::ValidationFailed(_))
    ));

    controller.stop();
    assert!(matches!(
        controller.start(),
        Err(Error::ValidationFailed(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn fetch_now__fetches_ahead_of_schedule() {
    // given
    let fake = FakeTransport::new(vec![
        Ok(payload(vec![roll_event(1, 0, 3)], 1)),
        Ok(payload(vec![roll_event(2, 0, 4)], 2)),
    ]);
    let client = SessionClient::attach(fake.clone(), "game-1");
    let mut controller = SyncController::new(client.clone(), Duration::from_secs(60));
    let mut updates = controller.start().unwrap();
    assert_eq!(Some(SyncUpdate::Refreshed), updates.recv().await);

    // when
    controller.fetch_now();

    // then
    let update = updates.recv().await.unwrap();
    assert_eq!(vec![2], new_seqs(update));
    assert_eq!(vec![None, Some(1)], fake.calls());

    controller.stop();
}
