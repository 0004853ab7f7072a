//! Control vocabulary for the broker-link handshake.

use std::fmt;

use crate::broker::wire::{Envelope, WireAction, WireActionKind};

/// One control action sent to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Ask the broker for a queue that lives only as long as this link.
    CreateTransientQueue(String),
    /// Route everything published to the named queue down this link.
    Subscribe(String),
}

impl Action {
    pub fn target(&self) -> &str {
        match self {
            Action::CreateTransientQueue(name) | Action::Subscribe(name) => name,
        }
    }

    /// Seal the action for the broker's control destination.
    pub fn to_envelope(&self, control_destination: &str) -> Envelope {
        Envelope::seal(control_destination, &WireAction::from(self))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::CreateTransientQueue(name) => write!(f, "create-transient-queue({})", name),
            Action::Subscribe(name) => write!(f, "subscribe({})", name),
        }
    }
}

impl From<&Action> for WireAction {
    fn from(action: &Action) -> Self {
        let kind = match action {
            Action::CreateTransientQueue(_) => WireActionKind::CreateTransientQueue,
            Action::Subscribe(_) => WireActionKind::Subscribe,
        };
        Self {
            kind: kind as i32,
            target: action.target().to_string(),
        }
    }
}

impl TryFrom<WireAction> for Action {
    type Error = crate::broker::wire::WireError;

    fn try_from(wire: WireAction) -> Result<Self, Self::Error> {
        match WireActionKind::try_from(wire.kind) {
            Ok(WireActionKind::CreateTransientQueue) => Ok(Action::CreateTransientQueue(wire.target)),
            Ok(WireActionKind::Subscribe) => Ok(Action::Subscribe(wire.target)),
            Err(_) => Err(crate::broker::wire::WireError::UnknownTag {
                field: "action",
                value: wire.kind,
            }),
        }
    }
}

/// The handshake every new broker link performs before it is ready.
///
/// Order matters: both queues must exist before the subscription.
pub fn bootstrap(inbound_destination: &str, reply_destination: &str) -> [Action; 3] {
    [
        Action::CreateTransientQueue(inbound_destination.to_string()),
        Action::CreateTransientQueue(reply_destination.to_string()),
        Action::Subscribe(reply_destination.to_string()),
    ]
}
