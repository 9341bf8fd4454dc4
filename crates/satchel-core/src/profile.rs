use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PROFILE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeetingRecord {
    pub meeting_id: Uuid,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl MeetingRecord {
    pub fn new(title: impl Into<String>, starts_at: DateTime<Utc>, duration_minutes: u32) -> Self {
        Self {
            meeting_id: Uuid::new_v4(),
            title: title.into(),
            starts_at,
            duration_minutes,
            participants: vec![],
            notes: None,
        }
    }
}

/// A user's meeting data plus display identity. The passphrase protecting
/// exported copies is never part of the profile itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub profile_id: Uuid,
    // Payloads written before this field existed deserialize as 0 and are
    // normalized by migrate_profile.
    #[serde(default)]
    pub schema_version: u32,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub meetings: Vec<MeetingRecord>,
}

impl UserProfile {
    pub fn new(username: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            profile_id: Uuid::new_v4(),
            schema_version: PROFILE_SCHEMA_VERSION,
            username: username.into(),
            created_at: now,
            updated_at: now,
            meetings: vec![],
        }
    }

    pub fn add_meeting(&mut self, meeting: MeetingRecord) {
        self.meetings.push(meeting);
        self.updated_at = Utc::now();
    }
}

pub fn migrate_profile(profile: &mut UserProfile) {
    if profile.schema_version < PROFILE_SCHEMA_VERSION {
        profile.schema_version = PROFILE_SCHEMA_VERSION;
    }
}
