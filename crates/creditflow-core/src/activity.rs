use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detail::CategoryDetail;

/// Longest accepted activity title, in characters.
pub const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Draft,
    PendingReview,
    Approved,
    Rejected,
}

impl ActivityStatus {
    pub const ALL: &[ActivityStatus] = &[
        ActivityStatus::Draft,
        ActivityStatus::PendingReview,
        ActivityStatus::Approved,
        ActivityStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Draft => "draft",
            ActivityStatus::PendingReview => "pending_review",
            ActivityStatus::Approved => "approved",
            ActivityStatus::Rejected => "rejected",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ActivityStatus::Draft => "Draft",
            ActivityStatus::PendingReview => "Pending Review",
            ActivityStatus::Approved => "Approved",
            ActivityStatus::Rejected => "Rejected",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ActivityStatus::Draft),
            "pending_review" => Some(ActivityStatus::PendingReview),
            "approved" => Some(ActivityStatus::Approved),
            "rejected" => Some(ActivityStatus::Rejected),
            _ => None,
        }
    }

    /// A review decision may be applied while in any of these states;
    /// re-reviewing an already decided activity is allowed.
    pub fn is_reviewable(&self) -> bool {
        matches!(
            self,
            ActivityStatus::PendingReview | ActivityStatus::Approved | ActivityStatus::Rejected
        )
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Innovation,
    Competition,
    EntrepreneurshipProject,
    EntrepreneurshipPractice,
    PaperPatent,
}

impl Category {
    pub const ALL: &[Category] = &[
        Category::Innovation,
        Category::Competition,
        Category::EntrepreneurshipProject,
        Category::EntrepreneurshipPractice,
        Category::PaperPatent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Innovation => "innovation",
            Category::Competition => "competition",
            Category::EntrepreneurshipProject => "entrepreneurship_project",
            Category::EntrepreneurshipPractice => "entrepreneurship_practice",
            Category::PaperPatent => "paper_patent",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Innovation => "Innovation Training",
            Category::Competition => "Competition",
            Category::EntrepreneurshipProject => "Entrepreneurship Project",
            Category::EntrepreneurshipPractice => "Entrepreneurship Practice",
            Category::PaperPatent => "Paper & Patent",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "innovation" => Some(Category::Innovation),
            "competition" => Some(Category::Competition),
            "entrepreneurship_project" => Some(Category::EntrepreneurshipProject),
            "entrepreneurship_practice" => Some(Category::EntrepreneurshipPractice),
            "paper_patent" => Some(Category::PaperPatent),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Outcome of a review. Maps onto the terminal review statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewDecision::Approve => "approve",
            ReviewDecision::Reject => "reject",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(ReviewDecision::Approve),
            "reject" => Some(ReviewDecision::Reject),
            _ => None,
        }
    }

    pub fn resulting_status(&self) -> ActivityStatus {
        match self {
            ReviewDecision::Approve => ActivityStatus::Approved,
            ReviewDecision::Reject => ActivityStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub status: ActivityStatus,
    pub owner_id: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub reviewer_id: Option<String>,
    pub review_comment: String,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateActivity {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub detail: Option<CategoryDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateActivity {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub start_date: Option<Option<DateTime<Utc>>>,
    pub end_date: Option<Option<DateTime<Utc>>>,
    pub detail: Option<CategoryDetail>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub status: Option<ActivityStatus>,
    pub category: Option<Category>,
    pub owner_id: Option<String>,
    pub starts_after: Option<DateTime<Utc>>,
    pub ends_before: Option<DateTime<Utc>>,
    /// Substring match over title and description.
    pub search: Option<String>,
    /// Restrict to activities this user owns or participates in. Set by
    /// the service for student callers; never exposed on the wire.
    pub visible_to: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A single activity together with its derived counts and category payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityOverview {
    #[serde(flatten)]
    pub activity: Activity,
    pub participant_count: i64,
    pub application_count: i64,
    pub detail: Option<CategoryDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_roundtrip() {
        for status in ActivityStatus::ALL {
            assert_eq!(ActivityStatus::parse_str(status.as_str()), Some(*status));
        }
        assert_eq!(ActivityStatus::parse_str("bogus"), None);
    }

    #[test]
    fn category_string_roundtrip() {
        for category in Category::ALL {
            assert_eq!(Category::parse_str(category.as_str()), Some(*category));
        }
        assert_eq!(Category::parse_str(""), None);
    }

    #[test]
    fn only_submitted_states_are_reviewable() {
        assert!(!ActivityStatus::Draft.is_reviewable());
        assert!(ActivityStatus::PendingReview.is_reviewable());
        assert!(ActivityStatus::Approved.is_reviewable());
        assert!(ActivityStatus::Rejected.is_reviewable());
    }

    #[test]
    fn decision_maps_to_status() {
        assert_eq!(
            ReviewDecision::Approve.resulting_status(),
            ActivityStatus::Approved
        );
        assert_eq!(
            ReviewDecision::Reject.resulting_status(),
            ActivityStatus::Rejected
        );
    }
}
