use std::fmt;
use std::io;

use lane_telemetry::ReportError;
use task_format::{Lane, RecordError};

use crate::config::ConfigError;

/// Pipeline component a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Router,
    Queue,
    Worker,
    Reducer,
    Monitor,
    Reporter,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Component::Router => "router",
            Component::Queue => "queue",
            Component::Worker => "worker",
            Component::Reducer => "reducer",
            Component::Monitor => "monitor",
            Component::Reporter => "reporter",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{component}: failed to spawn thread: {source}")]
    Spawn {
        component: Component,
        source: io::Error,
    },

    #[error("queue: enqueue on closed {lane} lane")]
    QueueClosed { lane: Lane },

    #[error("router: failed to read input: {0}")]
    Input(#[source] RecordError),

    #[error("{component}: thread {thread} panicked")]
    Panicked { component: Component, thread: String },

    #[error("reducer: completion queue disconnected after {exited} of {expected} workers exited")]
    CompletionDisconnected { exited: usize, expected: usize },

    #[error("reporter: {0}")]
    Report(#[from] ReportError),
}

impl SchedError {
    pub fn component(&self) -> Component {
        match self {
            SchedError::Config(_) | SchedError::Input(_) => Component::Router,
            SchedError::Spawn { component, .. } | SchedError::Panicked { component, .. } => *component,
            SchedError::QueueClosed { .. } => Component::Queue,
            SchedError::CompletionDisconnected { .. } => Component::Reducer,
            SchedError::Report(_) => Component::Reporter,
        }
    }
}
