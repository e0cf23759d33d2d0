//! Closed enumeration of entity kinds a polymorphic reference may point at

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target kind of a polymorphic `(entity_type, entity_id)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// World-scoped character
    Character,
    /// World-scoped location
    Location,
    /// World-scoped artifact
    Artifact,
    /// World-scoped faction
    Faction,
    /// World-scoped lore entry
    Lore,
    /// World-scoped event
    Event,
    /// The world itself
    World,
    /// Story scene
    Scene,
    /// Story chapter
    Chapter,
    /// Scene beat
    Beat,
}

impl EntityType {
    /// Every variant, in declaration order
    pub const ALL: [EntityType; 10] = [
        Self::Character,
        Self::Location,
        Self::Artifact,
        Self::Faction,
        Self::Lore,
        Self::Event,
        Self::World,
        Self::Scene,
        Self::Chapter,
        Self::Beat,
    ];

    /// Persisted representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Location => "location",
            Self::Artifact => "artifact",
            Self::Faction => "faction",
            Self::Lore => "lore",
            Self::Event => "event",
            Self::World => "world",
            Self::Scene => "scene",
            Self::Chapter => "chapter",
            Self::Beat => "beat",
        }
    }

    /// True for kinds that live in a world (as opposed to a story)
    #[must_use]
    pub fn is_world_entity(&self) -> bool {
        matches!(
            self,
            Self::Character
                | Self::Location
                | Self::Artifact
                | Self::Faction
                | Self::Lore
                | Self::Event
                | Self::World
        )
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown entity type: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_variant() {
        for t in EntityType::ALL {
            assert_eq!(t.as_str().parse::<EntityType>().unwrap(), t);
        }
        assert!("spaceship".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_world_entity_split() {
        assert!(EntityType::Faction.is_world_entity());
        assert!(!EntityType::Scene.is_world_entity());
    }
}
