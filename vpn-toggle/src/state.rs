// Per-connection action rules

//! State machine rules for connect/disconnect/toggle
//!
//! Pure decision logic used by the controller: which OS action a command
//! maps to for a given current status, which optimistic marker to publish
//! while it runs, and how to judge the outcome after the settle wait.

use crate::types::Status;

/// User-level commands against one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionCommand {
    /// Bring the service up
    Connect,
    /// Bring the service down
    Disconnect,
    /// Flip the service based on its current status
    Toggle,
}

/// Actions to take in response to a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAction {
    /// Issue the OS connect command
    Connect,
    /// Issue the OS disconnect command
    Disconnect,
    /// No action needed
    None,
}

/// Decide which action a command maps to for the current status
pub fn plan(current: Status, cmd: ConnectionCommand) -> StateAction {
    let action = match (current, cmd) {
        // Already up: nothing to connect
        (Status::Connected, ConnectionCommand::Connect) => StateAction::None,
        (_, ConnectionCommand::Connect) => StateAction::Connect,

        // Already down: nothing to disconnect
        (Status::Disconnected, ConnectionCommand::Disconnect) => StateAction::None,
        (_, ConnectionCommand::Disconnect) => StateAction::Disconnect,

        (Status::Connected | Status::Connecting, ConnectionCommand::Toggle) => {
            StateAction::Disconnect
        }
        (Status::Disconnected | Status::Invalid, ConnectionCommand::Toggle) => {
            StateAction::Connect
        }
        // Still going down: wait for it to settle instead of reversing
        (Status::Disconnecting, ConnectionCommand::Toggle) => StateAction::None,
    };

    log::debug!("Status: {:?}, Command: {:?} -> {:?}", current, cmd, action);
    action
}

/// Marker published while the action is outstanding
pub fn optimistic_status(action: StateAction) -> Option<Status> {
    match action {
        StateAction::Connect => Some(Status::Connecting),
        StateAction::Disconnect => Some(Status::Disconnecting),
        StateAction::None => None,
    }
}

/// Whether the action achieved its goal, judged on statuses before and after
pub fn action_succeeded(action: StateAction, previous: Status, resolved: Status) -> bool {
    match action {
        StateAction::Connect => previous != Status::Connected && resolved == Status::Connected,
        StateAction::Disconnect => previous == Status::Connected && resolved != Status::Connected,
        StateAction::None => false,
    }
}
