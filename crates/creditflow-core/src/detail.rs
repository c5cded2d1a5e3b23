use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::Category;

/// Category-specific payload attached to an activity. Exactly one variant
/// per [`Category`], matched exhaustively wherever a detail is handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum CategoryDetail {
    Innovation(InnovationDetail),
    Competition(CompetitionDetail),
    EntrepreneurshipProject(EntrepreneurshipProjectDetail),
    EntrepreneurshipPractice(EntrepreneurshipPracticeDetail),
    PaperPatent(PaperPatentDetail),
}

impl CategoryDetail {
    pub fn category(&self) -> Category {
        match self {
            CategoryDetail::Innovation(_) => Category::Innovation,
            CategoryDetail::Competition(_) => Category::Competition,
            CategoryDetail::EntrepreneurshipProject(_) => Category::EntrepreneurshipProject,
            CategoryDetail::EntrepreneurshipPractice(_) => Category::EntrepreneurshipPractice,
            CategoryDetail::PaperPatent(_) => Category::PaperPatent,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InnovationDetail {
    #[serde(default)]
    pub item: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub project_no: String,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_hours: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompetitionDetail {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub competition: String,
    #[serde(default)]
    pub award_level: String,
    #[serde(default)]
    pub ranking: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntrepreneurshipProjectDetail {
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub project_level: String,
    #[serde(default)]
    pub project_rank: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntrepreneurshipPracticeDetail {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub legal_person: String,
    #[serde(default)]
    pub share_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperPatentDetail {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub ranking: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_reports_its_category() {
        let detail = CategoryDetail::Competition(CompetitionDetail {
            level: "national".into(),
            competition: "ACM".into(),
            award_level: "first".into(),
            ranking: "1".into(),
        });
        assert_eq!(detail.category(), Category::Competition);
    }

    #[test]
    fn detail_serializes_with_category_tag() {
        let detail = CategoryDetail::PaperPatent(PaperPatentDetail {
            name: "A Study".into(),
            kind: "paper".into(),
            ranking: "first_author".into(),
        });
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["category"], "paper_patent");
        assert_eq!(value["name"], "A Study");

        let back: CategoryDetail = serde_json::from_value(value).unwrap();
        assert_eq!(back, detail);
    }
}
