use serde::Serialize;

use super::error::CaptureError;

/// Recording session state machine.
///
/// State transitions:
/// ```text
/// idle → starting → recording → stopping → idle
///    ↘       ↓          ↓          ↓
///      faulted ──(force reset)──→ idle
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Starting,
    Recording,
    Stopping,
    Faulted(CaptureError),
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted(_))
    }

    /// Whether a new `start()` would collide with this session.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Starting | Self::Recording)
    }

    pub fn fault(&self) -> Option<&CaptureError> {
        match self {
            Self::Faulted(err) => Some(err),
            _ => None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match self {
            Self::Idle => SessionPhase::Idle,
            Self::Starting => SessionPhase::Starting,
            Self::Recording => SessionPhase::Recording,
            Self::Stopping => SessionPhase::Stopping,
            Self::Faulted(_) => SessionPhase::Faulted,
        }
    }
}

/// Serializable name of a [`CaptureState`], without the fault payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Starting,
    Recording,
    Stopping,
    Faulted,
}
