use std::fmt;

use crate::{
    Error,
    GENERIC_REQUEST_FAILED,
    Result,
    events::{
        Event,
        EventKind,
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
    Utc,
};
use serde::Deserialize;
use serde_json::json;

/// HTTP transport against the remote game API. One request-response per
/// operation; retries and backoff are the caller's concern.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().build().map_err(|err| {
            Error::request_failed(format!("failed to build HTTP client: {err}"))
        })?;
        Ok(Self { base_url, http })
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<SyncResponseDto> {
        let res = request
            .send()
            .await
            .map_err(|err| Error::request_failed(format!("request failed: {err}")))?;
        let status = res.status();
        let bytes = res.bytes().await.map_err(|err| {
            Error::request_failed(format!("failed to read response body: {err}"))
        })?;
        if !status.is_success() {
            return Err(Error::request_failed(error_detail(&bytes)));
        }
        serde_json::from_slice(&bytes)
            .map_err(|_| Error::request_failed("invalid session payload"))
    }
}

impl Transport for ApiClient {
    async fn create_session(&self, player_names: &[String]) -> Result<NewSession> {
        let url = format!("{}/api/games", self.base_url);
        let body = json!({ "players": player_names });
        let dto = self.execute(self.http.post(url).json(&body)).await?;
        Ok(dto.into())
    }

    async fn fetch_session(
        &self,
        session_id: &str,
        since_seq: Option<u64>,
    ) -> Result<SyncPayload> {
        let url = match since_seq {
            None => format!("{}/api/games/{}", self.base_url, session_id),
            Some(cursor) => {
                format!("{}/api/games/{}?since_seq={}", self.base_url, session_id, cursor)
            }
        };
        let dto = self.execute(self.http.get(url)).await?;
        Ok(dto.into_payload())
    }

    async fn perform_action(
        &self,
        session_id: &str,
        action: Action,
    ) -> Result<SyncPayload> {
        let (path, body) = match action {
            Action::Roll => ("roll", json!({})),
            Action::Bank { player_id } => ("bank", json!({ "player_id": player_id })),
        };
        let url = format!("{}/api/games/{}/{}", self.base_url, session_id, path);
        let dto = self.execute(self.http.post(url).json(&body)).await?;
        Ok(dto.into_payload())
    }

    async fn reset_session(&self, session_id: &str) -> Result<SyncPayload> {
        let url = format!("{}/api/games/{}/reset", self.base_url, session_id);
        let dto = self.execute(self.http.post(url).json(&json!({}))).await?;
        Ok(dto.into_payload())
    }
}

impl fmt::Display for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_url)
    }
}

/// Best-effort extraction of the server's `detail` message. A body that is
/// not JSON, or JSON of the wrong shape, yields the generic message instead
/// of an error.
fn error_detail(bytes: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        detail: String,
    }
    serde_json::from_slice::<ErrorBody>(bytes)
        .map(|body| body.detail)
        .unwrap_or_else(|_| GENERIC_REQUEST_FAILED.to_string())
}

#[derive(Deserialize)]
struct SyncResponseDto {
    game_id: String,
    state: GameStateDto,
    events: Vec<EventDto>,
    valid_actions: ValidActionsDto,
    latest_seq: u64,
}

#[derive(Deserialize)]
struct GameStateDto {
    players: Vec<PlayerDto>,
    stats: Vec<PlayerStatsDto>,
    round_score: u64,
    round_number: u32,
    match_number: u32,
    current_roller_id: Option<u32>,
    starter_id: u32,
    is_round_over: bool,
    is_game_over: bool,
}

#[derive(Deserialize)]
struct PlayerDto {
    id: u32,
    name: String,
    total_score: u64,
    round_status: RoundStatusDto,
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum RoundStatusDto {
    Active,
    Banked,
}

#[derive(Deserialize)]
struct PlayerStatsDto {
    ones_rolled: u32,
    voluntary_banks_count: u32,
    forced_zero_banks_count: u32,
    missed_points: u64,
    rolls_taken_as_roller: u32,
    avg_voluntary_bank: f64,
    avg_rolls_elapsed_before_bank: f64,
}

#[derive(Deserialize)]
struct ValidActionsDto {
    can_roll: bool,
    bankable_player_ids: Vec<u32>,
}

#[derive(Deserialize)]
struct EventDto {
    seq: u64,
    ts_iso: DateTime<Utc>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl SyncResponseDto {
    fn into_payload(self) -> SyncPayload {
        SyncPayload {
            snapshot: self.state.into(),
            events: self.events.into_iter().map(Into::into).collect(),
            valid_actions: self.valid_actions.into(),
            latest_seq: self.latest_seq,
        }
    }
}

impl From<SyncResponseDto> for NewSession {
    fn from(dto: SyncResponseDto) -> Self {
        let session_id = dto.game_id.clone();
        NewSession {
            session_id,
            payload: dto.into_payload(),
        }
    }
}

impl From<GameStateDto> for Snapshot {
    fn from(dto: GameStateDto) -> Self {
        Snapshot {
            players: dto.players.into_iter().map(Into::into).collect(),
            stats: dto.stats.into_iter().map(Into::into).collect(),
            round_score: dto.round_score,
            round_number: dto.round_number,
            match_number: dto.match_number,
            current_roller_id: dto.current_roller_id,
            starter_id: dto.starter_id,
            is_round_over: dto.is_round_over,
            is_game_over: dto.is_game_over,
        }
    }
}

impl From<PlayerDto> for Player {
    fn from(dto: PlayerDto) -> Self {
        Player {
            id: dto.id,
            name: dto.name,
            total_score: dto.total_score,
            round_status: dto.round_status.into(),
        }
    }
}

impl From<RoundStatusDto> for RoundStatus {
    fn from(dto: RoundStatusDto) -> Self {
        match dto {
            RoundStatusDto::Active => RoundStatus::Active,
            RoundStatusDto::Banked => RoundStatus::Banked,
        }
    }
}

impl From<PlayerStatsDto> for PlayerStats {
    fn from(dto: PlayerStatsDto) -> Self {
        PlayerStats {
            ones_rolled: dto.ones_rolled,
            voluntary_banks_count: dto.voluntary_banks_count,
            forced_zero_banks_count: dto.forced_zero_banks_count,
            missed_points: dto.missed_points,
            rolls_taken_as_roller: dto.rolls_taken_as_roller,
            avg_voluntary_bank: dto.avg_voluntary_bank,
            avg_rolls_elapsed_before_bank: dto.avg_rolls_elapsed_before_bank,
        }
    }
}

impl From<ValidActionsDto> for ValidActions {
    fn from(dto: ValidActionsDto) -> Self {
        ValidActions {
            can_roll: dto.can_roll,
            bankable_player_ids: dto.bankable_player_ids,
        }
    }
}

impl From<EventDto> for Event {
    fn from(dto: EventDto) -> Self {
        let kind = EventKind::decode(&dto.kind, &dto.payload);
        Event::new(dto.seq, dto.ts_iso, kind)
    }
}
