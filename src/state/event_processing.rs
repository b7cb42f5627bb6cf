//! Event processing for the game world
//!
//! `Engine` owns the `GameState` together with the audit id counter and the
//! despawn queue. `handle_event` is the single entry point: it advances the
//! tick, routes the payload to exactly one handler and appends the handler's
//! audit entry. Handlers never fail; missing fields fall back to defaults and
//! unknown sessions or agents skip entity mutation.

use super::despawn::DespawnQueue;
use super::region::{file_name, path_to_region, EXTERNAL};
use super::unit::{
    extract_target, is_file_tool, is_web_tool, truncate, ActionType, MapPosition, Unit, UnitAction,
    UnitStatus, UnitType, READ_TOOLS, WRITE_TOOLS,
};
use super::{
    now_ms, GameEvent, GameEventType, GameState, Objective, ObjectiveStatus, Player,
    PlayerStatus, Repo,
};
use crate::event::{
    HookEvent, NotificationPayload, PermissionRequestPayload, PreCompactPayload,
    SessionEndPayload, SessionStartPayload, StopPayload, SubagentPayload, TaskCompletedPayload,
    ToolPayload, UserPromptPayload,
};
use serde_json::{json, Value};

/// What a handler produced, before it is stamped with id and tick
struct Outcome {
    event_type: GameEventType,
    player_id: String,
    unit_id: String,
    message: String,
    data: Value,
}

impl Outcome {
    fn new(event_type: GameEventType, player_id: &str, unit_id: &str, message: String) -> Self {
        Self {
            event_type,
            player_id: player_id.to_string(),
            unit_id: unit_id.to_string(),
            message,
            data: json!({}),
        }
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

#[derive(Debug)]
pub struct Engine {
    pub state: GameState,
    next_event_id: u64,
    despawns: DespawnQueue,
}

impl Engine {
    pub fn new(repo_path: &str, despawn_delay_ms: u64) -> Self {
        Self {
            state: GameState::new(repo_path),
            next_event_id: 0,
            despawns: DespawnQueue::new(despawn_delay_ms),
        }
    }

    /// Apply one hook event and return its audit entry
    pub fn handle_event(&mut self, event_type: &str, payload: Value) -> GameEvent {
        self.handle_event_at(event_type, payload, now_ms())
    }

    /// `handle_event` with an explicit clock
    pub fn handle_event_at(&mut self, event_type: &str, payload: Value, now: i64) -> GameEvent {
        self.state.advance(now);

        let event = HookEvent::parse(event_type, payload);
        tracing::trace!(tick = self.state.tick, kind = ?event.kind(), "Handling event");

        let outcome = match event {
            HookEvent::SessionStart(p) => self.on_session_start(p, now),
            HookEvent::SessionEnd(p) => self.on_session_end(p),
            HookEvent::UserPrompt(p) => self.on_user_prompt(p, now),
            HookEvent::Stop(p) => self.on_stop(p, now),
            HookEvent::PreTool(p) => self.on_pre_tool(p, now),
            HookEvent::PostTool(p) => self.on_post_tool(p, now),
            HookEvent::PostToolFailure(p) => self.on_post_tool_failure(p, now),
            HookEvent::SubagentStart(p) => self.on_subagent_start(p, now),
            HookEvent::SubagentStop(p) => self.on_subagent_stop(p, now),
            HookEvent::PermissionRequest(p) => self.on_permission_request(p, now),
            HookEvent::Notification(p) => self.on_notification(p),
            HookEvent::TaskCompleted(p) => self.on_task_completed(p, now),
            HookEvent::PreCompact(p) => self.on_pre_compact(p),
            HookEvent::Unknown { event_type, raw } => {
                tracing::debug!(event_type = %event_type, "Unknown event type");
                Outcome::new(
                    GameEventType::PlayerIdle,
                    "",
                    "",
                    format!("Unknown event: {event_type}"),
                )
                .with_data(raw)
            }
        };

        self.record(outcome, now)
    }

    /// Remove sub-agents whose despawn window has elapsed
    pub fn sweep_despawns(&mut self, now: i64) -> usize {
        self.despawns.sweep(&mut self.state, now).len()
    }

    pub fn pending_despawns(&self) -> usize {
        self.despawns.len()
    }

    fn record(&mut self, outcome: Outcome, now: i64) -> GameEvent {
        self.next_event_id += 1;
        let event = GameEvent {
            id: format!("evt-{}", self.next_event_id),
            tick: self.state.tick,
            timestamp: now,
            player_id: outcome.player_id,
            unit_id: outcome.unit_id,
            event_type: outcome.event_type,
            data: outcome.data,
            message: outcome.message,
        };
        self.state.push_event(event.clone());
        event
    }

    fn on_session_start(&mut self, p: SessionStartPayload, now: i64) -> Outcome {
        let session_id = p.session_id.unwrap_or_default();
        let model = p.model.unwrap_or_else(|| "unknown".to_string());
        let permission_mode = p.permission_mode.unwrap_or_else(|| "default".to_string());

        if let Some(cwd) = p.cwd.filter(|c| !c.is_empty()) {
            self.state.repo = Repo::from_path(&cwd);
        }

        let color = self.state.assign_color(&session_id);
        let cleared = p.source.as_deref() == Some("clear");

        // A returning player keeps its color unless someone took it meanwhile
        let kept_color = self.state.players.get(&session_id).map(|existing| existing.color).filter(|c| {
            !self.state.players.iter().any(|(id, other)| {
                *id != session_id && other.status != PlayerStatus::Disconnected && other.color == *c
            })
        });

        if let Some(player) = self.state.players.get_mut(&session_id) {
            player.model = model.clone();
            player.permission_mode = permission_mode;
            player.status = PlayerStatus::Active;
            player.last_activity_at = now;
            player.color = kept_color.unwrap_or(color);

            let commander = &mut player.commander;
            commander.status = UnitStatus::Idle;
            commander.current_action = None;
            commander.target_position = None;

            // Subagents left over from a previous run leave after the usual delay
            for (agent_id, unit) in &player.units {
                if unit.status == UnitStatus::Despawning {
                    self.despawns.schedule(&session_id, agent_id, now);
                }
            }

            if cleared {
                player.commander.cleared_at = Some(now);
                tracing::info!(session_id = %session_id, "Session cleared");
                return Outcome::new(
                    GameEventType::SessionClear,
                    &session_id,
                    &session_id,
                    "Session cleared".to_string(),
                )
                .with_data(json!({ "model": model }));
            }

            tracing::info!(session_id = %session_id, model = %model, "Player resumed");
        } else {
            let player = Player::new(&session_id, &model, &permission_mode, color, now);
            tracing::info!(session_id = %session_id, model = %model, color = ?color, "Player joined");
            self.state.players.insert(session_id.clone(), player);
        }

        Outcome::new(
            GameEventType::PlayerJoined,
            &session_id,
            &session_id,
            format!("Player joined ({model})"),
        )
        .with_data(json!({ "model": model }))
    }

    fn on_session_end(&mut self, p: SessionEndPayload) -> Outcome {
        let session_id = p.session_id.unwrap_or_default();
        let reason = p.reason.unwrap_or_default();

        if let Some(player) = self.state.players.get_mut(&session_id) {
            player.status = PlayerStatus::Disconnected;
            let units = std::iter::once(&mut player.commander).chain(player.units.values_mut());
            for unit in units {
                unit.status = UnitStatus::Despawning;
                unit.clear_action();
            }
            tracing::info!(session_id = %session_id, reason = %reason, "Player disconnected");
        }

        Outcome::new(
            GameEventType::PlayerLeft,
            &session_id,
            &session_id,
            "Player disconnected".to_string(),
        )
        .with_data(json!({ "reason": reason }))
    }

    fn on_user_prompt(&mut self, p: UserPromptPayload, now: i64) -> Outcome {
        let session_id = p.session_id.unwrap_or_default();
        let prompt = p.prompt.unwrap_or_default();

        if let Some(player) = self.state.players.get_mut(&session_id) {
            player.status = PlayerStatus::Active;
            player.last_activity_at = now;
            player.commander.status = UnitStatus::Acting;
            player.commander.last_action_at = now;
        }

        Outcome::new(
            GameEventType::UnitActionStart,
            &session_id,
            &session_id,
            format!("Commander received orders: \"{}\"", truncate(&prompt, 80)),
        )
        .with_data(json!({ "prompt": prompt }))
    }

    fn on_stop(&mut self, p: StopPayload, now: i64) -> Outcome {
        let session_id = p.session_id.unwrap_or_default();

        if let Some(player) = self.state.players.get_mut(&session_id) {
            player.status = PlayerStatus::Idle;
            player.last_activity_at = now;
            let units = std::iter::once(&mut player.commander).chain(player.units.values_mut());
            for unit in units {
                unit.status = UnitStatus::Idle;
                unit.clear_action();
                unit.target_position = None;
            }
        }

        Outcome::new(
            GameEventType::PlayerIdle,
            &session_id,
            &session_id,
            "Turn complete, all units idle".to_string(),
        )
    }

    fn on_pre_tool(&mut self, p: ToolPayload, now: i64) -> Outcome {
        let session_id = p.session_id.unwrap_or_default();
        let agent_id = p.agent_id;
        let tool_name = p.tool_name.unwrap_or_else(|| "unknown".to_string());
        let tool_use_id = p.tool_use_id.unwrap_or_else(|| format!("tool-{now}"));
        let input = p.tool_input.unwrap_or_default();
        let target = extract_target(&tool_name, &input);
        let unit_id = agent_id.clone().unwrap_or_else(|| session_id.clone());

        let outcome = Outcome::new(
            GameEventType::UnitActionStart,
            &session_id,
            &unit_id,
            format!("{tool_name} → {}", truncate(&target, 80)),
        )
        .with_data(json!({ "toolName": tool_name, "toolUseId": tool_use_id }));

        let Some(current_region) = self
            .state
            .players
            .get(&session_id)
            .map(|player| player.unit(agent_id.as_deref()).position.region.clone())
        else {
            tracing::debug!(session_id = %session_id, "pre-tool for unknown session");
            return outcome;
        };

        let file_target = is_file_tool(&tool_name) && !target.is_empty() && !target.starts_with("http");
        let region_path = if file_target {
            path_to_region(&target, &self.state.repo.path)
        } else if is_web_tool(&tool_name) {
            EXTERNAL.to_string()
        } else {
            current_region
        };
        let region_id = self.state.map.ensure_region(&region_path);

        let slot = if file_target {
            file_name(&target).and_then(|name| self.state.map.record_file(&region_id, &name))
        } else {
            None
        };
        let target_position = match self.state.map.get(&region_id) {
            Some(region) => {
                let (x, y) = match slot {
                    Some(index) => region.file_slot(index),
                    None => region.bounds.center(),
                };
                MapPosition {
                    region: region_id.clone(),
                    x,
                    y,
                }
            }
            None => MapPosition::origin(),
        };

        let Some(player) = self.state.players.get_mut(&session_id) else {
            return outcome;
        };
        player.last_activity_at = now;
        player.stats.tool_calls_total += 1;
        if READ_TOOLS.contains(&tool_name.as_str()) {
            player.stats.files_read += 1;
        } else if WRITE_TOOLS.contains(&tool_name.as_str()) {
            player.stats.files_written += 1;
        } else if tool_name == "Bash" {
            player.stats.bash_commands_run += 1;
        }

        let unit = player.unit_mut(agent_id.as_deref());
        unit.status = UnitStatus::Acting;
        unit.last_action_at = now;
        unit.current_action = Some(UnitAction {
            tool_use_id,
            tool_name: tool_name.clone(),
            action_type: ActionType::from_tool(&tool_name),
            description: format!("{tool_name}: {}", truncate(&target, 60)),
            target,
            started_at: now,
        });
        unit.target_position = Some(target_position);

        outcome
    }

    fn on_post_tool(&mut self, p: ToolPayload, now: i64) -> Outcome {
        let session_id = p.session_id.unwrap_or_default();
        let unit_id = p.agent_id.clone().unwrap_or_else(|| session_id.clone());
        let tool_use_id = p.tool_use_id.unwrap_or_default();

        if let Some(player) = self.state.players.get_mut(&session_id) {
            player.last_activity_at = now;
            let unit = player.unit_mut(p.agent_id.as_deref());
            unit.complete_action();
            unit.last_action_at = now;
        }

        let tool = p.tool_name.as_deref().unwrap_or("tool");
        Outcome::new(
            GameEventType::UnitActionComplete,
            &session_id,
            &unit_id,
            format!("Action complete ({tool})"),
        )
        .with_data(json!({ "toolUseId": tool_use_id }))
    }

    fn on_post_tool_failure(&mut self, p: ToolPayload, now: i64) -> Outcome {
        let session_id = p.session_id.unwrap_or_default();
        let unit_id = p.agent_id.clone().unwrap_or_else(|| session_id.clone());
        let error = p.error.unwrap_or_else(|| "unknown error".to_string());
        let tool_name = p.tool_name.unwrap_or_default();

        if let Some(player) = self.state.players.get_mut(&session_id) {
            player.last_activity_at = now;
            player.stats.tool_calls_failed += 1;
            let unit = player.unit_mut(p.agent_id.as_deref());
            unit.fail_action();
            unit.last_action_at = now;
        }

        Outcome::new(
            GameEventType::UnitActionFailed,
            &session_id,
            &unit_id,
            format!("Action failed: {}", truncate(&error, 80)),
        )
        .with_data(json!({ "error": error, "toolName": tool_name }))
    }

    fn on_subagent_start(&mut self, p: SubagentPayload, now: i64) -> Outcome {
        let session_id = p.session_id.unwrap_or_default();
        let agent_id = p.agent_id.unwrap_or_else(|| format!("agent-{now}"));
        let agent_type = p.agent_type.unwrap_or_else(|| "general-purpose".to_string());

        if let Some(player) = self.state.players.get_mut(&session_id) {
            let unit_type = UnitType::from_agent_type(&agent_type);
            let display_name = format!("{}-{}", unit_type.title(), player.units.len() + 1);
            let mut unit = Unit::new(agent_id.as_str(), unit_type, display_name, now);
            unit.status = UnitStatus::Spawning;
            unit.position = player.commander.position.clone();

            player.units.insert(agent_id.clone(), unit);
            player.stats.subagents_spawned += 1;
            player.last_activity_at = now;

            if self.despawns.cancel(&session_id, &agent_id) {
                tracing::debug!(agent_id = %agent_id, "Respawn cancelled pending despawn");
            }
        }

        Outcome::new(
            GameEventType::UnitSpawned,
            &session_id,
            &agent_id,
            format!("Subagent spawned: {agent_type}"),
        )
        .with_data(json!({ "agentType": agent_type, "agentId": agent_id }))
    }

    fn on_subagent_stop(&mut self, p: SubagentPayload, now: i64) -> Outcome {
        let session_id = p.session_id.unwrap_or_default();
        let agent_id = p.agent_id.unwrap_or_default();

        let stopped = self
            .state
            .players
            .get_mut(&session_id)
            .and_then(|player| player.units.get_mut(&agent_id));
        if let Some(unit) = stopped {
            unit.status = UnitStatus::Despawning;
            unit.clear_action();
            self.despawns.schedule(&session_id, &agent_id, now);
        }

        let agent_type = p.agent_type.as_deref().unwrap_or("unknown");
        Outcome::new(
            GameEventType::UnitDespawned,
            &session_id,
            &agent_id,
            format!("Subagent despawned: {agent_type}"),
        )
        .with_data(json!({ "agentId": agent_id }))
    }

    fn on_permission_request(&mut self, p: PermissionRequestPayload, now: i64) -> Outcome {
        let session_id = p.session_id.unwrap_or_default();
        let tool_name = p.tool_name.unwrap_or_default();

        if let Some(player) = self.state.players.get_mut(&session_id) {
            player.last_activity_at = now;
            player.commander.status = UnitStatus::Waiting;
        }

        let tool = if tool_name.is_empty() { "tool" } else { &tool_name };
        Outcome::new(
            GameEventType::UnitWaiting,
            &session_id,
            &session_id,
            format!("Awaiting permission: {tool}"),
        )
        .with_data(json!({ "toolName": tool_name }))
    }

    fn on_notification(&mut self, p: NotificationPayload) -> Outcome {
        let session_id = p.session_id.unwrap_or_default();
        let message = p.message.unwrap_or_default();
        let notification_type = p.notification_type.unwrap_or_default();

        if notification_type == "idle_prompt" {
            if let Some(player) = self.state.players.get_mut(&session_id) {
                player.status = PlayerStatus::Idle;
            }
        }

        Outcome::new(
            GameEventType::PlayerIdle,
            &session_id,
            &session_id,
            format!("Notification: {message}"),
        )
        .with_data(json!({ "notificationType": notification_type }))
    }

    fn on_task_completed(&mut self, p: TaskCompletedPayload, now: i64) -> Outcome {
        let session_id = p.session_id.unwrap_or_default();
        let task_id = p.task_id.unwrap_or_else(|| format!("task-{now}"));
        let subject = p.task_subject.unwrap_or_else(|| "Unknown task".to_string());

        self.state.objectives.insert(
            task_id.clone(),
            Objective {
                task_id: task_id.clone(),
                subject: subject.clone(),
                status: ObjectiveStatus::Completed,
                completed_at: Some(now),
            },
        );

        Outcome::new(
            GameEventType::ObjectiveCompleted,
            &session_id,
            &session_id,
            format!("Objective complete: {subject}"),
        )
        .with_data(json!({ "taskId": task_id, "subject": subject }))
    }

    fn on_pre_compact(&mut self, p: PreCompactPayload) -> Outcome {
        let session_id = p.session_id.unwrap_or_default();
        let trigger = p.trigger.unwrap_or_default();
        let shown = if trigger.is_empty() { "auto" } else { &trigger };

        Outcome::new(
            GameEventType::PlayerCompact,
            &session_id,
            &session_id,
            format!("Context compacting ({shown})"),
        )
        .with_data(json!({ "trigger": trigger }))
    }
}
