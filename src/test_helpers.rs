use crate::{
    Error,
    Result,
    events::{
        BankEvent,
        BustEvent,
        Event,
        EventKind,
        GameEndEvent,
        MatchEndEvent,
        RollEvent,
        RoundEndEvent,
    },
    snapshot::{
        Player,
        PlayerStats,
        RoundStatus,
        Snapshot,
        ValidActions,
    },
    store::SyncPayload,
    transport::{
        Action,
        NewSession,
        Transport,
    },
};
use chrono::{
    DateTime,
    TimeZone,
    Utc,
};
use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        Mutex,
    },
};

pub const SCRIPTED_SESSION_ID: &str = "scripted-session";

const ROUNDS_PER_MATCH: u32 = 10;
const ROUNDS_PER_GAME: u32 = 30;

pub fn event_ts(seq: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seq as i64, 0).unwrap()
}

pub fn event(seq: u64, kind: EventKind) -> Event {
    Event::new(seq, event_ts(seq), kind)
}

pub fn roll_event(seq: u64, player_id: u32, die: u8) -> Event {
    event(
        seq,
        EventKind::Roll(RollEvent {
            player_id,
            die,
            round_score_before: 0,
            round_score_after: u64::from(die),
        }),
    )
}

pub fn bank_event(seq: u64, player_id: u32, amount: u64) -> Event {
    event(
        seq,
        EventKind::Bank(BankEvent {
            player_id,
            amount,
            round_score: amount,
            total_score: amount,
            rolls_elapsed_in_round: 1,
        }),
    )
}

pub fn match_end_event(seq: u64, match_index: u32) -> Event {
    event(seq, EventKind::MatchEnd(MatchEndEvent { match_index }))
}

pub fn game_end_event(seq: u64, totals: Vec<u64>) -> Event {
    event(seq, EventKind::GameEnd(GameEndEvent { totals }))
}

pub fn active_player(id: u32, name: &str, total_score: u64) -> Player {
    Player {
        id,
        name: name.to_string(),
        total_score,
        round_status: RoundStatus::Active,
    }
}

pub fn payload(events: Vec<Event>, latest_seq: u64) -> SyncPayload {
    SyncPayload {
        snapshot: Snapshot::default(),
        events,
        valid_actions: ValidActions::default(),
        latest_seq,
    }
}

pub fn payload_with_snapshot(
    snapshot: Snapshot,
    events: Vec<Event>,
    latest_seq: u64,
) -> SyncPayload {
    SyncPayload {
        snapshot,
        events,
        valid_actions: ValidActions::default(),
        latest_seq,
    }
}

/// In-process stand-in for the remote game server, driven by a fixed die
/// script so every flow is deterministic. Implements the same rules the real
/// engine enforces: 1 busts the round, 2 doubles the round score, everything
/// else adds; a round ends when everyone banks or the roller busts; every
/// tenth round closes a match and round thirty ends the game.
#[derive(Clone)]
pub struct ScriptedServer {
    inner: Arc<Mutex<ServerState>>,
}

struct ServerState {
    dice: Vec<u8>,
    next_die: usize,
    session: Option<GameSession>,
}

struct GameSession {
    players: Vec<String>,
    totals: Vec<u64>,
    stats: Vec<RawStats>,
    round_index: u32,
    match_index: u32,
    round_score: u64,
    active: BTreeSet<u32>,
    roller: u32,
    starter: u32,
    rolls_elapsed: u32,
    game_over: bool,
    events: Vec<Event>,
    latest_seq: u64,
}

#[derive(Default, Clone)]
struct RawStats {
    ones_rolled: u32,
    voluntary_banks_count: u32,
    forced_zero_banks_count: u32,
    missed_points: u64,
    rolls_taken_as_roller: u32,
    voluntary_bank_amounts: Vec<u64>,
    rolls_elapsed_before_voluntary_bank: Vec<u32>,
}

impl RawStats {
    fn to_player_stats(&self) -> PlayerStats {
        PlayerStats {
            ones_rolled: self.ones_rolled,
            voluntary_banks_count: self.voluntary_banks_count,
            forced_zero_banks_count: self.forced_zero_banks_count,
            missed_points: self.missed_points,
            rolls_taken_as_roller: self.rolls_taken_as_roller,
            avg_voluntary_bank: average_u64(&self.voluntary_bank_amounts),
            avg_rolls_elapsed_before_bank: average_u32(
                &self.rolls_elapsed_before_voluntary_bank,
            ),
        }
    }
}

fn average_u64(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<u64>() as f64 / values.len() as f64
}

fn average_u32(values: &[u32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| u64::from(*v)).sum::<u64>() as f64 / values.len() as f64
}

impl ScriptedServer {
    pub fn new(dice: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ServerState {
                dice,
                next_die: 0,
                session: None,
            })),
        }
    }

    fn not_found() -> Error {
        Error::request_failed("Game not found")
    }
}

impl GameSession {
    fn new(players: Vec<String>) -> Self {
        let n = players.len() as u32;
        GameSession {
            totals: vec![0; players.len()],
            stats: vec![RawStats::default(); players.len()],
            players,
            round_index: 1,
            match_index: 1,
            round_score: 0,
            active: (0..n).collect(),
            roller: 0,
            starter: 0,
            rolls_elapsed: 0,
            game_over: false,
            events: Vec::new(),
            latest_seq: 0,
        }
    }

    fn push_event(&mut self, kind: EventKind) -> Event {
        self.latest_seq += 1;
        let event = event(self.latest_seq, kind);
        self.events.push(event.clone());
        event
    }

    fn next_active_after(&self, start: u32) -> Option<u32> {
        let n = self.players.len() as u32;
        (1..=n)
            .map(|offset| (start + offset) % n)
            .find(|candidate| self.active.contains(candidate))
    }

    fn current_roller_id(&self) -> Option<u32> {
        if self.game_over || self.active.is_empty() {
            return None;
        }
        if self.active.contains(&self.roller) {
            return Some(self.roller);
        }
        self.next_active_after(self.roller)
    }

    fn roll(&mut self, die: u8) -> Vec<Event> {
        if !self.active.contains(&self.roller) {
            self.roller = self
                .next_active_after(self.roller)
                .expect("no active players to roll");
        }
        let roller = self.roller;
        self.stats[roller as usize].rolls_taken_as_roller += 1;
        let before = self.round_score;
        if die == 1 {
            self.stats[roller as usize].ones_rolled += 1;
            for pid in self.active.clone() {
                let stats = &mut self.stats[pid as usize];
                stats.forced_zero_banks_count += 1;
                stats.missed_points += before;
            }
            let mut produced = vec![
                self.push_event(EventKind::Roll(RollEvent {
                    player_id: roller,
                    die,
                    round_score_before: before,
                    round_score_after: 0,
                })),
                self.push_event(EventKind::Bust(BustEvent {
                    player_id: roller,
                    round_score_before: before,
                    affected_players: self.active.iter().copied().collect(),
                })),
            ];
            self.round_score = 0;
            self.rolls_elapsed += 1;
            produced.extend(self.end_round("bust"));
            return produced;
        }
        if die == 2 {
            self.round_score = if self.round_score == 0 {
                2
            } else {
                self.round_score * 2
            };
        } else {
            self.round_score += u64::from(die);
        }
        self.rolls_elapsed += 1;
        vec![self.push_event(EventKind::Roll(RollEvent {
            player_id: roller,
            die,
            round_score_before: before,
            round_score_after: self.round_score,
        }))]
    }

    fn bank(&mut self, player_id: u32) -> Result<Vec<Event>> {
        if !self.active.contains(&player_id) {
            return Err(Error::request_failed("Player is not active"));
        }
        let amount = self.round_score;
        self.active.remove(&player_id);
        self.totals[player_id as usize] += amount;
        let rolls_elapsed = self.rolls_elapsed;
        let stats = &mut self.stats[player_id as usize];
        stats.voluntary_banks_count += 1;
        stats.voluntary_bank_amounts.push(amount);
        stats.rolls_elapsed_before_voluntary_bank.push(rolls_elapsed);
        let mut produced = vec![self.push_event(EventKind::Bank(BankEvent {
            player_id,
            amount,
            round_score: amount,
            total_score: self.totals[player_id as usize],
            rolls_elapsed_in_round: rolls_elapsed,
        }))];
        if self.active.is_empty() {
            produced.extend(self.end_round("all_bank"));
        }
        Ok(produced)
    }

    fn end_round(&mut self, reason: &str) -> Vec<Event> {
        let mut produced = vec![self.push_event(EventKind::RoundEnd(RoundEndEvent {
            round_index: self.round_index,
            reason: reason.to_string(),
            totals: self.totals.clone(),
        }))];
        if self.round_index % ROUNDS_PER_MATCH == 0 {
            produced.push(self.push_event(EventKind::MatchEnd(MatchEndEvent {
                match_index: self.match_index,
            })));
        }
        if self.round_index >= ROUNDS_PER_GAME {
            self.game_over = true;
            produced.push(self.push_event(EventKind::GameEnd(GameEndEvent {
                totals: self.totals.clone(),
            })));
            return produced;
        }
        let n = self.players.len() as u32;
        self.round_index += 1;
        self.starter = (self.starter + 1) % n;
        self.match_index = (self.round_index - 1) / ROUNDS_PER_MATCH + 1;
        self.round_score = 0;
        self.active = (0..n).collect();
        self.roller = self.starter;
        self.rolls_elapsed = 0;
        produced
    }

    fn snapshot(&self) -> Snapshot {
        let players = self
            .players
            .iter()
            .enumerate()
            .map(|(id, name)| {
                let id = id as u32;
                Player {
                    id,
                    name: name.clone(),
                    total_score: self.totals[id as usize],
                    round_status: if self.active.contains(&id) {
                        RoundStatus::Active
                    } else {
                        RoundStatus::Banked
                    },
                }
            })
            .collect();
        Snapshot {
            players,
            stats: self.stats.iter().map(RawStats::to_player_stats).collect(),
            round_score: self.round_score,
            round_number: self.round_index,
            match_number: self.match_index,
            current_roller_id: self.current_roller_id(),
            starter_id: self.starter,
            is_round_over: false,
            is_game_over: self.game_over,
        }
    }

    fn valid_actions(&self) -> ValidActions {
        if self.game_over || self.active.is_empty() {
            return ValidActions::default();
        }
        ValidActions {
            can_roll: true,
            bankable_player_ids: self.active.iter().copied().collect(),
        }
    }

    fn payload(&self, events: Vec<Event>) -> SyncPayload {
        SyncPayload {
            snapshot: self.snapshot(),
            events,
            valid_actions: self.valid_actions(),
            latest_seq: self.latest_seq,
        }
    }
}

impl Transport for ScriptedServer {
    async fn create_session(&self, player_names: &[String]) -> Result<NewSession> {
        let mut state = self.inner.lock().unwrap();
        let session = GameSession::new(player_names.to_vec());
        let payload = session.payload(session.events.clone());
        state.session = Some(session);
        Ok(NewSession {
            session_id: SCRIPTED_SESSION_ID.to_string(),
            payload,
        })
    }

    async fn fetch_session(
        &self,
        session_id: &str,
        since_seq: Option<u64>,
    ) -> Result<SyncPayload> {
        let state = self.inner.lock().unwrap();
        if session_id != SCRIPTED_SESSION_ID {
            return Err(Self::not_found());
        }
        let session = state.session.as_ref().ok_or_else(Self::not_found)?;
        let events = match since_seq {
            None => session.events.clone(),
            Some(cursor) => session
                .events
                .iter()
                .filter(|event| event.seq > cursor)
                .cloned()
                .collect(),
        };
        Ok(session.payload(events))
    }

    async fn perform_action(
        &self,
        session_id: &str,
        action: Action,
    ) -> Result<SyncPayload> {
        let mut state = self.inner.lock().unwrap();
        if session_id != SCRIPTED_SESSION_ID {
            return Err(Self::not_found());
        }
        let ServerState {
            dice,
            next_die,
            session,
        } = &mut *state;
        let session = session.as_mut().ok_or_else(Self::not_found)?;
        let produced = match action {
            Action::Roll if session.game_over => Vec::new(),
            Action::Roll => {
                let die = *dice.get(*next_die).expect("scripted dice exhausted");
                *next_die += 1;
                session.roll(die)
            }
            Action::Bank { .. } if session.game_over => Vec::new(),
            Action::Bank { player_id } => session.bank(player_id)?,
        };
        Ok(session.payload(produced))
    }

    async fn reset_session(&self, session_id: &str) -> Result<SyncPayload> {
        let mut state = self.inner.lock().unwrap();
        if session_id != SCRIPTED_SESSION_ID {
            return Err(Self::not_found());
        }
        let players = state
            .session
            .as_ref()
            .ok_or_else(Self::not_found)?
            .players
            .clone();
        let session = GameSession::new(players);
        let payload = session.payload(Vec::new());
        state.session = Some(session);
        Ok(payload)
    }
}
