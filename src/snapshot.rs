#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStatus {
    Active,
    Banked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: u32,
    pub name: String,
    pub total_score: u64,
    pub round_status: RoundStatus,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerStats {
    pub ones_rolled: u32,
    pub voluntary_banks_count: u32,
    pub forced_zero_banks_count: u32,
    pub missed_points: u64,
    pub rolls_taken_as_roller: u32,
    pub avg_voluntary_bank: f64,
    pub avg_rolls_elapsed_before_bank: f64,
}

// The server recomputes the whole snapshot on every response; the client
// replaces it wholesale and never patches individual fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub players: Vec<Player>,
    pub stats: Vec<PlayerStats>,
    pub round_score: u64,
    pub round_number: u32,
    pub match_number: u32,
    pub current_roller_id: Option<u32>,
    pub starter_id: u32,
    pub is_round_over: bool,
    pub is_game_over: bool,
}

impl Default for Snapshot {
    fn default() -> Self {
        Snapshot {
            players: Vec::new(),
            stats: Vec::new(),
            round_score: 0,
            round_number: 1,
            match_number: 1,
            current_roller_id: None,
            starter_id: 0,
            is_round_over: false,
            is_game_over: false,
        }
    }
}

/// Server-computed legality hints for the next user action. Advisory only;
/// the server remains the sole enforcer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidActions {
    pub can_roll: bool,
    pub bankable_player_ids: Vec<u32>,
}

impl ValidActions {
    pub fn can_bank(&self, player_id: u32) -> bool {
        self.bankable_player_ids.contains(&player_id)
    }
}
