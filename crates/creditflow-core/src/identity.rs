use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Student,
    Teacher,
    Admin,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Student => "student",
            UserType::Teacher => "teacher",
            UserType::Admin => "admin",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "student" => Some(UserType::Student),
            "teacher" => Some(UserType::Teacher),
            "admin" => Some(UserType::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller's identity as asserted by the upstream gateway.
/// The headers are trusted verbatim; no credential checking happens here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub user_type: UserType,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, user_type: UserType) -> Self {
        Self {
            user_id: user_id.into(),
            user_type,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }

    pub fn is_student(&self) -> bool {
        self.user_type == UserType::Student
    }

    /// Teachers and admins may review submissions.
    pub fn can_review(&self) -> bool {
        matches!(self.user_type, UserType::Teacher | UserType::Admin)
    }
}

/// Directory record for a user, fetched from the user service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    pub user_type: UserType,
    #[serde(default)]
    pub unit: String,
}
