//! Power- and network-driven auto-recovery
//!
//! The policy is evaluated on every observation but only acts when the
//! observation differs from the previous one, so a failed attempt never
//! triggers another until power, state, or reachability changes.

use super::ConnectionState;

/// What the controller should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Connect,
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Observation {
    power: bool,
    state: ConnectionState,
    online: bool,
}

/// Edge-triggered reconnect/disconnect rule
#[derive(Debug, Default)]
pub struct RecoveryPolicy {
    last: Option<Observation>,
}

impl RecoveryPolicy {
    /// Decide an action for the current observation
    pub fn evaluate(
        &mut self,
        power: bool,
        state: ConnectionState,
        online: bool,
    ) -> Option<RecoveryAction> {
        let current = Observation {
            power,
            state,
            online,
        };
        if self.last == Some(current) {
            return None;
        }
        let previous = self.last.replace(current);

        if !power {
            return state.is_active().then_some(RecoveryAction::Disconnect);
        }

        match state {
            ConnectionState::Disconnected => Some(RecoveryAction::Connect),
            ConnectionState::Error => {
                let came_online = online && previous.is_none_or(|p| !p.online);
                let powered_on = previous.is_none_or(|p| !p.power);
                (came_online || powered_on).then_some(RecoveryAction::Connect)
            }
            ConnectionState::Connecting | ConnectionState::Connected => None,
        }
    }
}
