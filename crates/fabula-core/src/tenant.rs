//! Tenant - top-level isolation boundary

use crate::error::{require_non_empty, Result};
use crate::time::now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Tenant lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Serving traffic
    #[default]
    Active,
    /// Temporarily disabled
    Suspended,
}

impl TenantStatus {
    /// Persisted representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
        }
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            _ => Err(format!("unknown tenant status: {s}")),
        }
    }
}

/// A tenant owns every other entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique identifier
    pub id: Uuid,
    /// Unique display name
    pub name: String,
    /// Lifecycle status
    pub status: TenantStatus,
    /// User who created the tenant
    pub created_by_user_id: Option<Uuid>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Create an active tenant
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: TenantStatus::Active,
            created_by_user_id: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Check the invariants enforced on write
    pub fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)
    }
}
