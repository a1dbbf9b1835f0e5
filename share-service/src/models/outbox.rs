//! Outbox email records consumed by the external mail dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A queued notification email. This subsystem only produces these records;
/// delivery is the dispatcher's responsibility.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OutboxEmail {
    pub email_id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub html: String,
    pub created_at: DateTime<Utc>,
}

impl OutboxEmail {
    pub fn new(recipient: String, subject: String, html: String) -> Self {
        Self {
            email_id: Uuid::new_v4(),
            recipient,
            subject,
            html,
            created_at: Utc::now(),
        }
    }
}
