#![allow(non_snake_case)]

use super::*;
use crate::{
    snapshot::RoundStatus,
    test_helpers::{
        active_player,
        bank_event,
        payload,
        payload_with_snapshot,
        roll_event,
    },
};
use proptest::prelude::*;

#[test]
fn initialize__full_payload__sets_log_and_cursor() {
    // given
    let store = SessionStore::new();
    let events = vec![roll_event(1, 0, 3), roll_event(2, 0, 4), bank_event(3, 1, 7)];

    // when
    store.initialize(payload(events.clone(), 3));

    // then
    assert_eq!(events, store.events());
    assert_eq!(3, store.cursor());
}

#[test]
fn merge__same_payload_twice__second_merge_is_noop() {
    // given
    let store = SessionStore::new();
    store.initialize(payload(vec![roll_event(1, 0, 3)], 1));
    let incremental = payload(vec![roll_event(2, 0, 5), bank_event(3, 0, 8)], 3);

    // when
    let first = store.merge(incremental.clone());
    let second = store.merge(incremental);

    // then
    assert_eq!(2, first.len());
    assert!(second.is_empty());
    assert_eq!(3, store.event_count());
    assert_eq!(3, store.cursor());
}

#[test]
fn merge__poll_and_action_in_either_order__converge() {
    // given
    let poll = payload(
        vec![roll_event(5, 0, 3), roll_event(6, 0, 4), roll_event(7, 0, 6)],
        7,
    );
    let action = payload(vec![bank_event(8, 1, 13)], 8);

    let poll_first = SessionStore::new();
    poll_first.initialize(payload(vec![], 4));
    let action_first = SessionStore::new();
    action_first.initialize(payload(vec![], 4));

    // when
    poll_first.merge(poll.clone());
    poll_first.merge(action.clone());
    action_first.merge(action);
    action_first.merge(poll);

    // then
    let seqs: Vec<u64> = poll_first.events().iter().map(|event| event.seq).collect();
    assert_eq!(vec![5, 6, 7, 8], seqs);
    assert_eq!(poll_first.events(), action_first.events());
    assert_eq!(8, poll_first.cursor());
    assert_eq!(8, action_first.cursor());
}

#[test]
fn merge__no_new_events_at_cursor__keeps_cursor() {
    // given
    let store = SessionStore::new();
    store.initialize(payload(vec![], 10));

    // when
    let appended = store.merge(payload(vec![], 10));

    // then
    assert!(appended.is_empty());
    assert_eq!(10, store.cursor());
}

#[test]
fn merge__payload_with_sequence_gap__appends_and_advances() {
    // given
    let store = SessionStore::new();
    store.initialize(payload(vec![roll_event(1, 0, 3), roll_event(2, 0, 4)], 2));

    // when
    let appended = store.merge(payload(vec![roll_event(7, 1, 5), roll_event(8, 1, 6)], 8));

    // then
    assert_eq!(2, appended.len());
    let seqs: Vec<u64> = store.events().iter().map(|event| event.seq).collect();
    assert_eq!(vec![1, 2, 7, 8], seqs);
    assert_eq!(8, store.cursor());
}

#[test]
fn merge__unsorted_batch__stored_in_sequence_order() {
    // given
    let store = SessionStore::new();
    store.initialize(payload(vec![], 0));

    // when
    store.merge(payload(
        vec![roll_event(3, 0, 4), roll_event(1, 0, 3), roll_event(2, 0, 6)],
        3,
    ));

    // then
    let seqs: Vec<u64> = store.events().iter().map(|event| event.seq).collect();
    assert_eq!(vec![1, 2, 3], seqs);
}

#[test]
fn merge__returns_only_newly_appended_events() {
    // given
    let store = SessionStore::new();
    store.initialize(payload(vec![roll_event(1, 0, 3), roll_event(2, 0, 4)], 2));

    // when
    let appended = store.merge(payload(
        vec![roll_event(2, 0, 4), roll_event(3, 0, 5)],
        3,
    ));

    // then
    let seqs: Vec<u64> = appended.iter().map(|event| event.seq).collect();
    assert_eq!(vec![3], seqs);
}

#[test]
fn merge__replaces_snapshot_and_valid_actions_wholesale() {
    // given
    let store = SessionStore::new();
    let first = Snapshot {
        players: vec![active_player(0, "Alice", 0), active_player(1, "Bob", 0)],
        round_score: 9,
        ..Snapshot::default()
    };
    store.initialize(payload_with_snapshot(first, vec![], 1));

    let mut second = Snapshot {
        players: vec![active_player(0, "Alice", 9), active_player(1, "Bob", 0)],
        round_score: 0,
        ..Snapshot::default()
    };
    second.players[0].round_status = RoundStatus::Banked;
    let mut incremental = payload_with_snapshot(second.clone(), vec![bank_event(2, 0, 9)], 2);
    incremental.valid_actions = ValidActions {
        can_roll: true,
        bankable_player_ids: vec![1],
    };

    // when
    store.merge(incremental);

    // then
    assert_eq!(second, store.snapshot());
    assert_eq!(vec![1], store.valid_actions().bankable_player_ids);
    assert_eq!(0, store.snapshot().round_score);
}

#[test]
fn events_newest_first__reverses_storage_order() {
    // given
    let store = SessionStore::new();
    store.initialize(payload(vec![roll_event(1, 0, 3), roll_event(2, 0, 4)], 2));

    // when
    let newest_first: Vec<u64> = store
        .events_newest_first()
        .iter()
        .map(|event| event.seq)
        .collect();

    // then
    assert_eq!(vec![2, 1], newest_first);
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]

    #[test]
    fn merge__any_batch_split_in_either_order__converges(
        seqs in prop::collection::btree_set(1u64..60, 0..16),
        base_cursor in 0u64..5,
    ) {
        // given
        let seqs: Vec<u64> = seqs.into_iter().collect();
        let (left, right): (Vec<_>, Vec<_>) = seqs
            .iter()
            .enumerate()
            .partition(|(index, _)| index % 2 == 0);
        let batch = |half: Vec<(usize, &u64)>| -> SyncPayload {
            let events: Vec<Event> = half
                .iter()
                .map(|(_, seq)| roll_event(**seq, 0, 3))
                .collect();
            let latest = events.iter().map(|event| event.seq).max().unwrap_or(0);
            payload(events, latest)
        };
        let first_batch = batch(left);
        let second_batch = batch(right);

        let forward = SessionStore::new();
        forward.initialize(payload(vec![], base_cursor));
        let backward = SessionStore::new();
        backward.initialize(payload(vec![], base_cursor));

        // when
        forward.merge(first_batch.clone());
        forward.merge(second_batch.clone());
        backward.merge(second_batch);
        backward.merge(first_batch);

        // then
        prop_assert_eq!(forward.events(), backward.events());
        prop_assert_eq!(forward.cursor(), backward.cursor());
    }
}
