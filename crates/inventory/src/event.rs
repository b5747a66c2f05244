use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_events::Event;

use crate::alert::Alert;
use crate::movement::Movement;

/// Facts published after a ledger transaction commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum LedgerEvent {
    MovementRegistered(Movement),
    AlertRaised(Alert),
    AlertResolved(Alert),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::MovementRegistered(_) => "inventory.movement.registered",
            LedgerEvent::AlertRaised(_) => "inventory.alert.raised",
            LedgerEvent::AlertResolved(_) => "inventory.alert.resolved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn subject(&self) -> String {
        match self {
            LedgerEvent::MovementRegistered(m) => m.id.to_string(),
            LedgerEvent::AlertRaised(a) | LedgerEvent::AlertResolved(a) => a.id.clone(),
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::MovementRegistered(m) => m.created_at,
            LedgerEvent::AlertRaised(a) | LedgerEvent::AlertResolved(a) => a.updated_at,
        }
    }
}
