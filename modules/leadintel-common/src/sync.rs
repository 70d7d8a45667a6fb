use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of the external id a sync row carries until the CRM assigns one.
pub const PLACEHOLDER_ID_PREFIX: &str = "pending-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrmSystem {
    Salesforce,
    Hubspot,
    Pipedrive,
    Zoho,
}

impl fmt::Display for CrmSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Salesforce => write!(f, "salesforce"),
            Self::Hubspot => write!(f, "hubspot"),
            Self::Pipedrive => write!(f, "pipedrive"),
            Self::Zoho => write!(f, "zoho"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Synced => write!(f, "synced"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One attempt to mirror a lead into an external CRM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCrmSync {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub system: CrmSystem,
    pub status: SyncStatus,
    pub external_id: String,
    pub last_synced: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExternalCrmSync {
    pub fn pending(lead_id: Uuid, system: CrmSystem, now: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            lead_id,
            system,
            status: SyncStatus::Pending,
            external_id: format!("{PLACEHOLDER_ID_PREFIX}{}", id.simple()),
            last_synced: None,
            error_message: None,
            created_at: now,
        }
    }

    pub fn has_placeholder_id(&self) -> bool {
        self.external_id.starts_with(PLACEHOLDER_ID_PREFIX)
    }
}

/// Terminal state of a sync attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncResolution {
    Synced {
        external_id: String,
        at: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl SyncResolution {
    pub fn apply(&self, row: &mut ExternalCrmSync) {
        match self {
            Self::Synced { external_id, at } => {
                row.status = SyncStatus::Synced;
                row.external_id = external_id.clone();
                row.last_synced = Some(*at);
                row.error_message = None;
            }
            Self::Error { message } => {
                row.status = SyncStatus::Error;
                row.error_message = Some(message.clone());
            }
        }
    }
}
