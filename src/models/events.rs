use std::fmt;

use serde::{Deserialize, Serialize};

/// Broadcast channels published by the session authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "sessionTick")]
    SessionTick,
    #[serde(rename = "interventionSignal")]
    InterventionSignal,
    #[serde(rename = "sessionStarted")]
    SessionStarted,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::SessionTick => "sessionTick",
            Topic::InterventionSignal => "interventionSignal",
            Topic::SessionStarted => "sessionStarted",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a detected distraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionSignal {
    /// Soft nudge: OS notice, nothing blocks the user.
    Notification,
    /// Hard block: modal overlay capturing input.
    Overlay,
}

/// User judgement about a flagged distraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    /// The flagged activity was actually work (false positive).
    IsWork,
    /// The user acknowledged the distraction and dismissed the overlay.
    DistractionIgnored,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::IsWork => "is_work",
            FeedbackKind::DistractionIgnored => "distraction_ignored",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "is_work" => Some(FeedbackKind::IsWork),
            "distraction_ignored" => Some(FeedbackKind::DistractionIgnored),
            _ => None,
        }
    }
}

/// A message on the authority's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload")]
pub enum BridgeEvent {
    /// Elapsed seconds of the active session, 0 when none is active.
    #[serde(rename = "sessionTick")]
    Tick(u64),
    #[serde(rename = "interventionSignal")]
    Intervention(InterventionSignal),
    /// Opaque marker announcing a session (or login) to waiting surfaces.
    #[serde(rename = "sessionStarted")]
    SessionStarted(String),
}

impl BridgeEvent {
    pub fn topic(&self) -> Topic {
        match self {
            BridgeEvent::Tick(_) => Topic::SessionTick,
            BridgeEvent::Intervention(_) => Topic::InterventionSignal,
            BridgeEvent::SessionStarted(_) => Topic::SessionStarted,
        }
    }
}
