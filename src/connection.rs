use log::{debug, error, info};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.pad(text)
    }
}

/// Inputs to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Start,
    Opened,
    /// The connection closed, errored, or could not be opened.
    Closed,
    RetryElapsed,
    ManualRetry,
}

/// Work the state machine asks its driver to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    Open,
    RequestRoster,
    ScheduleRetry(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Result of feeding one event: every state entered, in order, and the actions to run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Step {
    pub transitions: Vec<ConnectionState>,
    pub actions: Vec<ConnectionAction>,
}

impl Step {
    fn enter(&mut self, state: ConnectionState) {
        self.transitions.push(state);
    }

    fn act(&mut self, action: ConnectionAction) {
        self.actions.push(action);
    }
}

pub struct ConnectionManager {
    state: ConnectionState,
    retries: u32,
    policy: RetryPolicy,
}

impl ConnectionManager {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: ConnectionState::Connecting,
            retries: 0,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn handle(&mut self, event: ConnectionEvent) -> Step {
        let mut step = Step::default();

        match (self.state, event) {
            (ConnectionState::Connecting, ConnectionEvent::Start) => {
                self.transition(ConnectionState::Connecting, &mut step);
                step.act(ConnectionAction::Open);
            }
            (ConnectionState::Connecting, ConnectionEvent::Opened) => {
                self.retries = 0;
                self.transition(ConnectionState::Connected, &mut step);
                step.act(ConnectionAction::RequestRoster);
            }
            (ConnectionState::Connecting | ConnectionState::Connected, ConnectionEvent::Closed) => {
                self.transition(ConnectionState::Disconnected, &mut step);
                self.after_disconnect(&mut step);
            }
            (ConnectionState::Reconnecting, ConnectionEvent::RetryElapsed) => {
                self.transition(ConnectionState::Connecting, &mut step);
                step.act(ConnectionAction::Open);
            }
            (ConnectionState::Failed, ConnectionEvent::ManualRetry) => {
                self.retries = 0;
                self.transition(ConnectionState::Connecting, &mut step);
                step.act(ConnectionAction::Open);
            }
            (state, event) => {
                debug!("Ignoring {:?} while {}", event, state);
            }
        }

        step
    }

    fn after_disconnect(&mut self, step: &mut Step) {
        if self.retries < self.policy.max_retries {
            self.retries += 1;
            info!(
                "Reconnecting ({}/{}) in {:?}",
                self.retries, self.policy.max_retries, self.policy.delay
            );
            self.transition(ConnectionState::Reconnecting, step);
            step.act(ConnectionAction::ScheduleRetry(self.policy.delay));
        } else {
            error!(
                "Giving up after {} reconnection attempts",
                self.policy.max_retries
            );
            self.transition(ConnectionState::Failed, step);
        }
    }

    fn transition(&mut self, next: ConnectionState, step: &mut Step) {
        info!("Connection state: {} -> {}", self.state, next);
        self.state = next;
        step.enter(next);
    }
}
