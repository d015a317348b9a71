//! Publish loop state machine
//!
//! ```text
//! Idle -> Connecting -> Publishing -> Sleeping -> Idle
//!   \________\_____________\____________\
//!                                        v
//!                                      Error -> Idle
//! ```

use std::fmt;

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Connecting,
    Publishing,
    Sleeping,
    Error,
}

/// What just happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    /// A new cycle begins
    CycleStarted,
    /// A broker session is available (new or reused)
    SessionReady,
    /// The reading was delivered
    Published,
    /// The interval sleep finished
    SleepElapsed,
    /// Anything in the cycle failed
    Failed,
    /// The failure was logged and the retry delay elapsed
    Recovered,
}

impl LoopState {
    /// Next state after `event` (pure function)
    ///
    /// Events that make no sense in the current state leave it unchanged.
    pub fn next(self, event: LoopEvent) -> LoopState {
        use LoopEvent::*;
        use LoopState::*;

        match (self, event) {
            (_, Failed) => Error,
            (Idle, CycleStarted) => Connecting,
            (Connecting, SessionReady) => Publishing,
            (Publishing, Published) => Sleeping,
            (Sleeping, SleepElapsed) => Idle,
            (Error, Recovered) => Idle,
            (state, _) => state,
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Idle => "idle",
            LoopState::Connecting => "connecting",
            LoopState::Publishing => "publishing",
            LoopState::Sleeping => "sleeping",
            LoopState::Error => "error",
        };
        f.write_str(name)
    }
}
