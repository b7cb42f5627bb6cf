//! Delayed removal of sub-agents that have stopped
//!
//! A stopped sub-agent stays in its player's roster as `Despawning` for a
//! grace window so observers can see the terminal state. Removals are kept in
//! a deadline queue keyed by `(session, agent)` and executed by `sweep`,
//! which re-checks the unit's status first: a unit reused or respawned under
//! the same agent id before its deadline is never removed by a stale entry.

use super::unit::UnitStatus;
use super::GameState;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct DespawnKey {
    session_id: String,
    agent_id: String,
}

#[derive(Debug, Clone)]
pub struct DespawnQueue {
    delay_ms: i64,
    deadlines: BTreeMap<DespawnKey, i64>,
}

impl DespawnQueue {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms: i64::try_from(delay_ms).unwrap_or(i64::MAX),
            deadlines: BTreeMap::new(),
        }
    }

    /// Schedule (or push back) removal of `agent_id` at `now + delay`
    pub fn schedule(&mut self, session_id: &str, agent_id: &str, now: i64) {
        let key = DespawnKey {
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
        };
        self.deadlines.insert(key, now.saturating_add(self.delay_ms));
    }

    /// Drop a pending removal; returns whether one existed
    pub fn cancel(&mut self, session_id: &str, agent_id: &str) -> bool {
        let key = DespawnKey {
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
        };
        self.deadlines.remove(&key).is_some()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// Remove every due unit that is still `Despawning`
    ///
    /// Returns the `(session, agent)` pairs actually removed. Due entries
    /// whose unit is gone or no longer despawning are discarded silently.
    pub fn sweep(&mut self, state: &mut GameState, now: i64) -> Vec<(String, String)> {
        let due: Vec<DespawnKey> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = Vec::new();
        for key in due {
            self.deadlines.remove(&key);

            let Some(player) = state.players.get_mut(&key.session_id) else {
                continue;
            };
            let still_despawning = player
                .units
                .get(&key.agent_id)
                .is_some_and(|u| u.status == UnitStatus::Despawning);
            if still_despawning {
                player.units.remove(&key.agent_id);
                tracing::debug!(
                    session_id = %key.session_id,
                    agent_id = %key.agent_id,
                    "Unit removed after despawn window"
                );
                removed.push((key.session_id, key.agent_id));
            }
        }
        removed
    }
}
