mod despawn;
mod event_processing;
pub mod region;
pub mod unit;

pub use event_processing::Engine;
pub use region::GameMap;
pub use unit::{Unit, UnitType};

use crate::config::MAX_EVENTS;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

/// Milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    Active,
    Idle,
    Disconnected,
}

/// Player palette, in assignment order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerColor {
    Blue,
    Red,
    Green,
    Yellow,
    Purple,
    Orange,
}

impl PlayerColor {
    pub const PALETTE: [PlayerColor; 6] = [
        PlayerColor::Blue,
        PlayerColor::Red,
        PlayerColor::Green,
        PlayerColor::Yellow,
        PlayerColor::Purple,
        PlayerColor::Orange,
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub tool_calls_total: u64,
    pub tool_calls_failed: u64,
    pub files_read: u64,
    pub files_written: u64,
    pub bash_commands_run: u64,
    pub subagents_spawned: u64,
}

/// One Claude Code session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub session_id: String,
    pub status: PlayerStatus,
    pub model: String,
    pub permission_mode: String,
    pub color: PlayerColor,
    pub joined_at: i64,
    pub last_activity_at: i64,
    pub commander: Unit,
    pub units: BTreeMap<String, Unit>,
    pub stats: PlayerStats,
}

impl Player {
    pub fn new(
        session_id: &str,
        model: &str,
        permission_mode: &str,
        color: PlayerColor,
        now: i64,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            status: PlayerStatus::Active,
            model: model.to_string(),
            permission_mode: permission_mode.to_string(),
            color,
            joined_at: now,
            last_activity_at: now,
            commander: Unit::new(session_id, UnitType::Commander, "Commander", now),
            units: BTreeMap::new(),
            stats: PlayerStats::default(),
        }
    }

    /// Commander when `agent_id` is absent or unknown, else that sub-agent
    pub fn unit(&self, agent_id: Option<&str>) -> &Unit {
        agent_id
            .and_then(|id| self.units.get(id))
            .unwrap_or(&self.commander)
    }

    pub fn unit_mut(&mut self, agent_id: Option<&str>) -> &mut Unit {
        match agent_id.and_then(|id| self.units.get_mut(id)) {
            Some(unit) => unit,
            None => &mut self.commander,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    pub task_id: String,
    pub subject: String,
    pub status: ObjectiveStatus,
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEventType {
    PlayerJoined,
    PlayerLeft,
    UnitSpawned,
    UnitDespawned,
    UnitActionStart,
    UnitActionComplete,
    UnitActionFailed,
    UnitWaiting,
    ObjectiveCompleted,
    PlayerIdle,
    PlayerCompact,
    SessionClear,
}

/// Audit log entry; immutable once appended
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    pub id: String,
    pub tick: u64,
    pub timestamp: i64,
    pub player_id: String,
    pub unit_id: String,
    #[serde(rename = "type")]
    pub event_type: GameEventType,
    pub data: Value,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub path: String,
    pub name: String,
}

impl Repo {
    pub fn from_path(path: &str) -> Self {
        let name = path
            .split(['/', '\\'])
            .filter(|s| !s.is_empty())
            .next_back()
            .unwrap_or("unknown")
            .to_string();
        Self {
            path: path.to_string(),
            name,
        }
    }
}

/// Root aggregate, serialized verbatim as the snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub tick: u64,
    pub timestamp: i64,
    pub repo: Repo,
    pub map: GameMap,
    pub players: BTreeMap<String, Player>,
    pub objectives: BTreeMap<String, Objective>,
    pub event_log: VecDeque<GameEvent>,
}

impl GameState {
    pub fn new(repo_path: &str) -> Self {
        Self {
            tick: 0,
            timestamp: now_ms(),
            repo: Repo::from_path(repo_path),
            map: GameMap::new(),
            players: BTreeMap::new(),
            objectives: BTreeMap::new(),
            event_log: VecDeque::new(),
        }
    }

    /// Advance the clock; every handled event calls this exactly once
    pub fn advance(&mut self, now: i64) {
        self.tick += 1;
        self.timestamp = now;
    }

    /// Append to the audit log, evicting the oldest entry past `MAX_EVENTS`
    pub fn push_event(&mut self, event: GameEvent) {
        self.event_log.push_back(event);
        while self.event_log.len() > MAX_EVENTS {
            self.event_log.pop_front();
        }
    }

    /// First palette color not held by a connected player other than `session_id`
    ///
    /// Falls back to the first palette entry once every color is taken.
    pub fn assign_color(&self, session_id: &str) -> PlayerColor {
        let used: Vec<PlayerColor> = self
            .players
            .values()
            .filter(|p| p.session_id != session_id && p.status != PlayerStatus::Disconnected)
            .map(|p| p.color)
            .collect();

        PlayerColor::PALETTE
            .into_iter()
            .find(|c| !used.contains(c))
            .unwrap_or(PlayerColor::PALETTE[0])
    }

    /// Serialize for the snapshot file and `GET /state`
    pub fn to_snapshot(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(n: u64) -> GameEvent {
        GameEvent {
            id: format!("evt-{n}"),
            tick: n,
            timestamp: 0,
            player_id: String::new(),
            unit_id: String::new(),
            event_type: GameEventType::PlayerIdle,
            data: json!({}),
            message: String::new(),
        }
    }

    #[test]
    fn test_repo_name() {
        assert_eq!(Repo::from_path("/home/me/project").name, "project");
        assert_eq!(Repo::from_path("/home/me/project/").name, "project");
        assert_eq!(Repo::from_path("").name, "unknown");
        assert_eq!(Repo::from_path("/").name, "unknown");
    }

    #[test]
    fn test_event_log_is_capped() {
        let mut state = GameState::new("/repo");
        for n in 1..=(MAX_EVENTS as u64 + 5) {
            state.push_event(event(n));
        }
        assert_eq!(state.event_log.len(), MAX_EVENTS);
        assert_eq!(state.event_log.front().unwrap().id, "evt-6");
        assert_eq!(state.event_log.back().unwrap().id, format!("evt-{}", MAX_EVENTS + 5));
    }

    #[test]
    fn test_assign_color_skips_connected_players() {
        let mut state = GameState::new("/repo");
        assert_eq!(state.assign_color("s1"), PlayerColor::Blue);

        state
            .players
            .insert("s1".into(), Player::new("s1", "m", "default", PlayerColor::Blue, 0));
        state
            .players
            .insert("s2".into(), Player::new("s2", "m", "default", PlayerColor::Red, 0));
        assert_eq!(state.assign_color("s3"), PlayerColor::Green);
        // A session never competes with its own previous color
        assert_eq!(state.assign_color("s1"), PlayerColor::Blue);

        state.players.get_mut("s1").unwrap().status = PlayerStatus::Disconnected;
        assert_eq!(state.assign_color("s3"), PlayerColor::Blue);
    }

    #[test]
    fn test_assign_color_falls_back_when_exhausted() {
        let mut state = GameState::new("/repo");
        for (i, color) in PlayerColor::PALETTE.into_iter().enumerate() {
            let id = format!("s{i}");
            state
                .players
                .insert(id.clone(), Player::new(&id, "m", "default", color, 0));
        }
        assert_eq!(state.assign_color("late"), PlayerColor::Blue);
    }

    #[test]
    fn test_unit_mut_falls_back_to_commander() {
        let mut player = Player::new("s1", "m", "default", PlayerColor::Blue, 0);
        player
            .units
            .insert("a1".into(), Unit::new("a1", UnitType::Scout, "Scout-1", 0));

        assert_eq!(player.unit_mut(Some("a1")).id, "a1");
        assert_eq!(player.unit_mut(Some("ghost")).id, "s1");
        assert_eq!(player.unit_mut(None).id, "s1");
        assert_eq!(player.unit(Some("a1")).id, "a1");
        assert_eq!(player.unit(Some("ghost")).id, "s1");
    }

    #[test]
    fn test_snapshot_shape() {
        let mut state = GameState::new("/repo");
        state.push_event(event(1));
        let v: Value = serde_json::from_slice(&state.to_snapshot().unwrap()).unwrap();
        assert_eq!(v["repo"]["name"], "repo");
        assert!(v["eventLog"].is_array());
        assert_eq!(v["eventLog"][0]["type"], "player_idle");
        assert!(v["players"].is_object());
        assert!(v["map"]["regions"].is_object());
    }
}
