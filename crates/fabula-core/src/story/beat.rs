use crate::error::{Error, Result};
use crate::time::now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Dramatic function of a beat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeatType {
    /// Establishes the situation
    Setup,
    /// Changes direction
    Turn,
    /// Discloses something hidden
    Reveal,
    /// Opposing forces meet
    Conflict,
    /// Peak of tension
    Climax,
    /// Tension released
    Resolution,
    /// Pulls the reader forward
    Hook,
    /// Bridges two moments
    Transition,
}

impl BeatType {
    /// Persisted representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Turn => "turn",
            Self::Reveal => "reveal",
            Self::Conflict => "conflict",
            Self::Climax => "climax",
            Self::Resolution => "resolution",
            Self::Hook => "hook",
            Self::Transition => "transition",
        }
    }
}

impl fmt::Display for BeatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BeatType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "setup" => Ok(Self::Setup),
            "turn" => Ok(Self::Turn),
            "reveal" => Ok(Self::Reveal),
            "conflict" => Ok(Self::Conflict),
            "climax" => Ok(Self::Climax),
            "resolution" => Ok(Self::Resolution),
            "hook" => Ok(Self::Hook),
            "transition" => Ok(Self::Transition),
            _ => Err(format!("unknown beat type: {s}")),
        }
    }
}

/// Smallest unit of story structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    /// Unique identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Scene the beat belongs to
    pub scene_id: Uuid,
    /// Position within the scene
    pub order_num: i32,
    /// Dramatic function
    pub beat_type: BeatType,
    /// What a character wants here
    pub intent: String,
    /// What actually happens
    pub outcome: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Beat {
    /// Create a beat
    #[must_use]
    pub fn new(tenant_id: Uuid, scene_id: Uuid, order_num: i32, beat_type: BeatType) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            scene_id,
            order_num,
            beat_type,
            intent: String::new(),
            outcome: String::new(),
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Check the invariants enforced on write
    pub fn validate(&self) -> Result<()> {
        if self.order_num < 0 {
            return Err(Error::validation("order_num", "must not be negative"));
        }
        Ok(())
    }
}
