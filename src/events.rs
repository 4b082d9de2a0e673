use chrono::{
    DateTime,
    Local,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub seq: u64,
    pub ts: DateTime<Utc>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Roll(RollEvent),
    Bank(BankEvent),
    Bust(BustEvent),
    RoundEnd(RoundEndEvent),
    MatchEnd(MatchEndEvent),
    GameEnd(GameEndEvent),
    Unknown(UnknownEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollEvent {
    pub player_id: u32,
    pub die: u8,
    pub round_score_before: u64,
    pub round_score_after: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankEvent {
    pub player_id: u32,
    pub amount: u64,
    pub round_score: u64,
    pub total_score: u64,
    pub rolls_elapsed_in_round: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BustEvent {
    pub player_id: u32,
    pub round_score_before: u64,
    pub affected_players: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundEndEvent {
    pub round_index: u32,
    pub reason: String,
    pub totals: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEndEvent {
    pub match_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEndEvent {
    pub totals: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnknownEvent {
    pub kind: String,
    pub payload: serde_json::Value,
}

impl EventKind {
    pub const ROLL: &'static str = "roll";
    pub const BANK: &'static str = "bank";
    pub const BUST: &'static str = "bust";
    pub const ROUND_END: &'static str = "round_end";
    pub const MATCH_END: &'static str = "match_end";
    pub const GAME_END: &'static str = "game_end";

    /// Decode a wire tag and payload into a typed kind. Unknown tags and
    /// undecodable payloads degrade to `Unknown` so one odd event can never
    /// fail a whole merge.
    pub fn decode(kind: &str, payload: &serde_json::Value) -> Self {
        let decoded = match kind {
            Self::ROLL => serde_json::from_value(payload.clone()).map(EventKind::Roll),
            Self::BANK => serde_json::from_value(payload.clone()).map(EventKind::Bank),
            Self::BUST => serde_json::from_value(payload.clone()).map(EventKind::Bust),
            Self::ROUND_END => {
                serde_json::from_value(payload.clone()).map(EventKind::RoundEnd)
            }
            Self::MATCH_END => {
                serde_json::from_value(payload.clone()).map(EventKind::MatchEnd)
            }
            Self::GAME_END => {
                serde_json::from_value(payload.clone()).map(EventKind::GameEnd)
            }
            _ => {
                return EventKind::Unknown(UnknownEvent {
                    kind: kind.to_string(),
                    payload: payload.clone(),
                });
            }
        };
        decoded.unwrap_or_else(|err| {
            tracing::warn!(%kind, ?err, "undecodable event payload");
            EventKind::Unknown(UnknownEvent {
                kind: kind.to_string(),
                payload: payload.clone(),
            })
        })
    }

    pub fn tag(&self) -> &str {
        match self {
            EventKind::Roll(_) => Self::ROLL,
            EventKind::Bank(_) => Self::BANK,
            EventKind::Bust(_) => Self::BUST,
            EventKind::RoundEnd(_) => Self::ROUND_END,
            EventKind::MatchEnd(_) => Self::MATCH_END,
            EventKind::GameEnd(_) => Self::GAME_END,
            EventKind::Unknown(inner) => inner.kind.as_str(),
        }
    }

    /// Session-boundary markers that trigger a summary.
    pub fn is_summary_boundary(&self) -> bool {
        matches!(self, EventKind::MatchEnd(_) | EventKind::GameEnd(_))
    }
}

impl Event {
    pub fn new(seq: u64, ts: DateTime<Utc>, kind: EventKind) -> Self {
        Event { seq, ts, kind }
    }

    /// One human-readable line per event, newest events usually printed last.
    pub fn log_line(&self) -> String {
        let ts = self.ts.with_timezone(&Local).format("%H:%M:%S");
        match &self.kind {
            EventKind::Roll(roll) => {
                format!("{ts} - Roll by P{}: {}", roll.player_id, roll.die)
            }
            EventKind::Bank(bank) => {
                format!("{ts} - Bank by P{}: +{}", bank.player_id, bank.amount)
            }
            EventKind::Bust(_) => format!("{ts} - Bust! Round score reset."),
            EventKind::RoundEnd(round_end) => format!(
                "{ts} - Round {} ended ({}).",
                round_end.round_index, round_end.reason
            ),
            EventKind::MatchEnd(match_end) => {
                format!("{ts} - Match {} summary ready.", match_end.match_index)
            }
            EventKind::GameEnd(_) => format!("{ts} - Game over."),
            EventKind::Unknown(unknown) => format!("{ts} - {}", unknown.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use serde_json::json;

    #[test]
    fn decode__known_tag__produces_typed_payload() {
        // given
        let payload = json!({
            "player_id": 1,
            "die": 5,
            "round_score_before": 4,
            "round_score_after": 9,
        });

        // when
        let kind = EventKind::decode("roll", &payload);

        // then
        let expected = EventKind::Roll(RollEvent {
            player_id: 1,
            die: 5,
            round_score_before: 4,
            round_score_after: 9,
        });
        assert_eq!(expected, kind);
    }

    #[test]
    fn decode__unknown_tag__falls_back_to_unknown() {
        // given
        let payload = json!({"anything": true});

        // when
        let kind = EventKind::decode("spectator_joined", &payload);

        // then
        let expected = EventKind::Unknown(UnknownEvent {
            kind: "spectator_joined".to_string(),
            payload,
        });
        assert_eq!(expected, kind);
    }

    #[test]
    fn decode__known_tag_with_malformed_payload__falls_back_to_unknown() {
        // given
        let payload = json!({"player_id": "not-a-number"});

        // when
        let kind = EventKind::decode("bank", &payload);

        // then
        assert!(matches!(kind, EventKind::Unknown(_)));
        assert_eq!("bank", kind.tag());
    }

    #[test]
    fn decode__match_end_payload_with_extra_fields__still_decodes() {
        // given
        // the server attaches a full summary object the client does not read
        let payload = json!({"match_index": 2, "summary": {"score_deltas": [1, 2]}});

        // when
        let kind = EventKind::decode("match_end", &payload);

        // then
        let expected = EventKind::MatchEnd(MatchEndEvent { match_index: 2 });
        assert_eq!(expected, kind);
    }
}
