use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub activity_id: String,
    pub user_id: String,
    pub credits: f64,
    pub joined_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Participant row joined with the user's directory profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedParticipant {
    #[serde(flatten)]
    pub participant: Participant,
    pub name: String,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddParticipants {
    pub user_ids: Vec<String>,
    #[serde(default)]
    pub credits: f64,
}

/// Per-user credit override used by the batch credits operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditAssignment {
    pub user_id: String,
    pub credits: f64,
}
