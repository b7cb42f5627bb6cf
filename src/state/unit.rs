//! Units: the commander of each session and the sub-agents it spawns
//!
//! # Lifecycle
//! `Spawning -> Idle <-> Acting <-> Waiting`, any of `Idle/Acting/Waiting -> Failed`,
//! any state `-> Despawning -> (removed)`. Transitions are driven by the
//! handlers in `event_processing`; this module only holds the data and the
//! tool classification tables.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unit class, derived from the sub-agent type reported by Claude Code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Commander,
    Scout,
    Warrior,
    Strategist,
    Soldier,
    Specialist,
}

impl UnitType {
    /// Map a sub-agent `agent_type` to its unit class
    pub fn from_agent_type(agent_type: &str) -> Self {
        match agent_type {
            "Explore" => UnitType::Scout,
            "Bash" => UnitType::Warrior,
            "Plan" => UnitType::Strategist,
            "general-purpose" => UnitType::Soldier,
            _ => UnitType::Specialist,
        }
    }

    /// Capitalized name used in display names ("Scout-2")
    pub fn title(self) -> &'static str {
        match self {
            UnitType::Commander => "Commander",
            UnitType::Scout => "Scout",
            UnitType::Warrior => "Warrior",
            UnitType::Strategist => "Strategist",
            UnitType::Soldier => "Soldier",
            UnitType::Specialist => "Specialist",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Spawning,
    Idle,
    Acting,
    Waiting,
    Failed,
    Despawning,
}

/// Presentation category of a tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Scouting,
    Building,
    Attacking,
    Summoning,
    Researching,
    Special,
}

impl ActionType {
    pub fn from_tool(tool_name: &str) -> Self {
        match tool_name {
            "Read" | "Glob" | "Grep" => ActionType::Scouting,
            "Write" | "Edit" => ActionType::Building,
            "Bash" => ActionType::Attacking,
            "Task" => ActionType::Summoning,
            "WebFetch" | "WebSearch" => ActionType::Researching,
            _ => ActionType::Special,
        }
    }
}

/// Tools whose target is a filesystem path
pub const FILE_TOOLS: [&str; 5] = ["Read", "Edit", "Write", "Glob", "Grep"];

/// Tools whose target lives off the repository map
pub const WEB_TOOLS: [&str; 2] = ["WebFetch", "WebSearch"];

/// Tools counted as reads in player stats
pub const READ_TOOLS: [&str; 3] = ["Read", "Glob", "Grep"];

/// Tools counted as writes in player stats
pub const WRITE_TOOLS: [&str; 2] = ["Write", "Edit"];

pub fn is_file_tool(tool_name: &str) -> bool {
    FILE_TOOLS.contains(&tool_name)
}

pub fn is_web_tool(tool_name: &str) -> bool {
    WEB_TOOLS.contains(&tool_name)
}

fn input_str<'a>(input: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

/// Resolve the target of a tool call from its structured input
///
/// File tools yield a path, shell yields the command, web tools the URL or
/// query. Anything else gets a truncated JSON dump of the input.
pub fn extract_target(tool_name: &str, input: &Map<String, Value>) -> String {
    let found = match tool_name {
        "Read" | "Edit" | "Write" => input_str(input, "file_path"),
        "Glob" => input_str(input, "pattern").or_else(|| input_str(input, "path")),
        "Grep" => input_str(input, "path").or_else(|| input_str(input, "pattern")),
        "Bash" => input_str(input, "command"),
        "WebFetch" => input_str(input, "url"),
        "WebSearch" => input_str(input, "query"),
        _ => {
            let dump = serde_json::to_string(input).unwrap_or_default();
            return dump.chars().take(100).collect();
        }
    };
    found.unwrap_or_default().to_string()
}

/// Cut `s` to `max` characters, appending an ellipsis when shortened
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max).collect();
        format!("{head}…")
    } else {
        s.to_string()
    }
}

/// A point on the map, attributed to the region containing it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPosition {
    pub region: String,
    pub x: f64,
    pub y: f64,
}

impl MapPosition {
    /// Center of the world, inside `base`
    pub fn origin() -> Self {
        Self {
            region: "base".to_string(),
            x: 500.0,
            y: 500.0,
        }
    }
}

/// In-flight tool invocation attributed to a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitAction {
    pub tool_use_id: String,
    pub tool_name: String,
    pub action_type: ActionType,
    pub target: String,
    pub started_at: i64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: String,
    #[serde(rename = "type")]
    pub unit_type: UnitType,
    pub display_name: String,
    pub status: UnitStatus,
    pub position: MapPosition,
    /// Set while an action is in flight, consumed on success
    pub target_position: Option<MapPosition>,
    pub current_action: Option<UnitAction>,
    pub spawned_at: i64,
    pub last_action_at: i64,
    /// Stamped when the session's history was cleared; never interpreted here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleared_at: Option<i64>,
}

impl Unit {
    pub fn new(id: impl Into<String>, unit_type: UnitType, display_name: impl Into<String>, now: i64) -> Self {
        Self {
            id: id.into(),
            unit_type,
            display_name: display_name.into(),
            status: UnitStatus::Idle,
            position: MapPosition::origin(),
            target_position: None,
            current_action: None,
            spawned_at: now,
            last_action_at: now,
            cleared_at: None,
        }
    }

    /// Close the action window without moving
    pub fn clear_action(&mut self) {
        self.current_action = None;
    }

    /// Commit the pending move: teleport to the target, then go idle
    pub fn complete_action(&mut self) {
        if let Some(target) = self.target_position.take() {
            self.position = target;
        }
        self.status = UnitStatus::Idle;
        self.current_action = None;
    }

    /// Abort the action in place; the pending target is dropped
    pub fn fail_action(&mut self) {
        self.status = UnitStatus::Failed;
        self.current_action = None;
        self.target_position = None;
    }
}
