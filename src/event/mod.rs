pub mod emit;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Closed set of hook event slugs understood by the engine
///
/// Slugs are what `cli-rts emit <slug>` receives on its command line; hook
/// names are what Claude Code calls the same events in `settings.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionStart,
    SessionEnd,
    UserPrompt,
    Stop,
    PreTool,
    PostTool,
    PostToolFailure,
    SubagentStart,
    SubagentStop,
    PermissionRequest,
    Notification,
    TaskCompleted,
    PreCompact,
}

impl EventKind {
    /// Every known kind, in hook installation order
    pub const ALL: [EventKind; 13] = [
        EventKind::SessionStart,
        EventKind::SessionEnd,
        EventKind::UserPrompt,
        EventKind::Stop,
        EventKind::PreTool,
        EventKind::PostTool,
        EventKind::PostToolFailure,
        EventKind::SubagentStart,
        EventKind::SubagentStop,
        EventKind::PermissionRequest,
        EventKind::Notification,
        EventKind::TaskCompleted,
        EventKind::PreCompact,
    ];

    /// Parse a slug; `None` for anything outside the closed set
    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.slug() == slug)
    }

    pub fn slug(self) -> &'static str {
        match self {
            EventKind::SessionStart => "session-start",
            EventKind::SessionEnd => "session-end",
            EventKind::UserPrompt => "user-prompt",
            EventKind::Stop => "stop",
            EventKind::PreTool => "pre-tool",
            EventKind::PostTool => "post-tool",
            EventKind::PostToolFailure => "post-tool-failure",
            EventKind::SubagentStart => "subagent-start",
            EventKind::SubagentStop => "subagent-stop",
            EventKind::PermissionRequest => "permission-request",
            EventKind::Notification => "notification",
            EventKind::TaskCompleted => "task-completed",
            EventKind::PreCompact => "pre-compact",
        }
    }

    /// Claude Code hook name for this kind
    pub fn hook_name(self) -> &'static str {
        match self {
            EventKind::SessionStart => "SessionStart",
            EventKind::SessionEnd => "SessionEnd",
            EventKind::UserPrompt => "UserPromptSubmit",
            EventKind::Stop => "Stop",
            EventKind::PreTool => "PreToolUse",
            EventKind::PostTool => "PostToolUse",
            EventKind::PostToolFailure => "PostToolUseFailure",
            EventKind::SubagentStart => "SubagentStart",
            EventKind::SubagentStop => "SubagentStop",
            EventKind::PermissionRequest => "PermissionRequest",
            EventKind::Notification => "Notification",
            EventKind::TaskCompleted => "TaskCompleted",
            EventKind::PreCompact => "PreCompact",
        }
    }
}

/// Request body posted by `cli-rts emit` to `POST /events`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventEnvelope {
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Accept any JSON value, keep it only if it is a string
///
/// Hook payloads come from an external process; a number where a string was
/// expected must degrade to "absent" rather than reject the whole event.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Accept any JSON value, keep it only if it is an object
fn lenient_object<'de, D>(deserializer: D) -> Result<Option<serde_json::Map<String, Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(map) => Some(map),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionStartPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub permission_mode: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cwd: Option<String>,
    /// "startup", "resume", "clear" or "compact"
    #[serde(default, deserialize_with = "lenient_string")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionEndPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPromptPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub session_id: Option<String>,
}

/// PreToolUse / PostToolUse / PostToolUseFailure share one shape
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub session_id: Option<String>,
    /// Present when the tool call came from a sub-agent
    #[serde(default, deserialize_with = "lenient_string")]
    pub agent_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tool_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub tool_input: Option<serde_json::Map<String, Value>>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tool_use_id: Option<String>,
    /// PostToolUseFailure only
    #[serde(default, deserialize_with = "lenient_string")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubagentPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub agent_id: Option<String>,
    /// "Explore", "Plan", "Bash", "general-purpose", ...
    #[serde(default, deserialize_with = "lenient_string")]
    pub agent_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermissionRequestPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tool_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
    /// "idle_prompt", "permission_prompt", ...
    #[serde(default, deserialize_with = "lenient_string")]
    pub notification_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskCompletedPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub task_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub task_subject: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreCompactPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub session_id: Option<String>,
    /// "manual" or "auto"
    #[serde(default, deserialize_with = "lenient_string")]
    pub trigger: Option<String>,
}

/// A hook event with its payload decoded for the matching handler
///
/// Decoding never fails: a payload that is not a JSON object, or that carries
/// wrong-typed fields, yields the variant with those fields absent.
#[derive(Debug, Clone)]
pub enum HookEvent {
    SessionStart(SessionStartPayload),
    SessionEnd(SessionEndPayload),
    UserPrompt(UserPromptPayload),
    Stop(StopPayload),
    PreTool(ToolPayload),
    PostTool(ToolPayload),
    PostToolFailure(ToolPayload),
    SubagentStart(SubagentPayload),
    SubagentStop(SubagentPayload),
    PermissionRequest(PermissionRequestPayload),
    Notification(NotificationPayload),
    TaskCompleted(TaskCompletedPayload),
    PreCompact(PreCompactPayload),
    /// Slug outside the closed set; the raw payload is kept for the audit log
    Unknown { event_type: String, raw: Value },
}

fn decode<T: serde::de::DeserializeOwned + Default>(payload: &Value) -> T {
    match serde_json::from_value(payload.clone()) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::debug!(error = %e, "Payload not decodable, using defaults");
            T::default()
        }
    }
}

impl HookEvent {
    /// Route a slug + raw payload to its typed variant
    pub fn parse(event_type: &str, payload: Value) -> Self {
        let Some(kind) = EventKind::from_slug(event_type) else {
            return HookEvent::Unknown {
                event_type: event_type.to_string(),
                raw: payload,
            };
        };

        match kind {
            EventKind::SessionStart => HookEvent::SessionStart(decode(&payload)),
            EventKind::SessionEnd => HookEvent::SessionEnd(decode(&payload)),
            EventKind::UserPrompt => HookEvent::UserPrompt(decode(&payload)),
            EventKind::Stop => HookEvent::Stop(decode(&payload)),
            EventKind::PreTool => HookEvent::PreTool(decode(&payload)),
            EventKind::PostTool => HookEvent::PostTool(decode(&payload)),
            EventKind::PostToolFailure => HookEvent::PostToolFailure(decode(&payload)),
            EventKind::SubagentStart => HookEvent::SubagentStart(decode(&payload)),
            EventKind::SubagentStop => HookEvent::SubagentStop(decode(&payload)),
            EventKind::PermissionRequest => HookEvent::PermissionRequest(decode(&payload)),
            EventKind::Notification => HookEvent::Notification(decode(&payload)),
            EventKind::TaskCompleted => HookEvent::TaskCompleted(decode(&payload)),
            EventKind::PreCompact => HookEvent::PreCompact(decode(&payload)),
        }
    }

    /// The kind this event was routed to, `None` for unknown slugs
    pub fn kind(&self) -> Option<EventKind> {
        Some(match self {
            HookEvent::SessionStart(_) => EventKind::SessionStart,
            HookEvent::SessionEnd(_) => EventKind::SessionEnd,
            HookEvent::UserPrompt(_) => EventKind::UserPrompt,
            HookEvent::Stop(_) => EventKind::Stop,
            HookEvent::PreTool(_) => EventKind::PreTool,
            HookEvent::PostTool(_) => EventKind::PostTool,
            HookEvent::PostToolFailure(_) => EventKind::PostToolFailure,
            HookEvent::SubagentStart(_) => EventKind::SubagentStart,
            HookEvent::SubagentStop(_) => EventKind::SubagentStop,
            HookEvent::PermissionRequest(_) => EventKind::PermissionRequest,
            HookEvent::Notification(_) => EventKind::Notification,
            HookEvent::TaskCompleted(_) => EventKind::TaskCompleted,
            HookEvent::PreCompact(_) => EventKind::PreCompact,
            HookEvent::Unknown { .. } => return None,
        })
    }
}
