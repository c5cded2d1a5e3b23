use rusqlite::{params, Connection, OptionalExtension};

use creditflow_core::activity::Category;
use creditflow_core::detail::{
    CategoryDetail, CompetitionDetail, EntrepreneurshipPracticeDetail,
    EntrepreneurshipProjectDetail, InnovationDetail, PaperPatentDetail,
};

use crate::{Db, DbError};

const DETAIL_TABLES: &[&str] = &[
    "innovation_details",
    "competition_details",
    "entrepreneurship_project_details",
    "entrepreneurship_practice_details",
    "paper_patent_details",
];

/// Drop the activity's rows from every detail table.
pub(crate) fn clear_details(conn: &Connection, activity_id: &str) -> Result<(), DbError> {
    for table in DETAIL_TABLES {
        conn.execute(
            &format!("DELETE FROM {table} WHERE activity_id = ?1"),
            params![activity_id],
        )?;
    }
    Ok(())
}

/// Replace the category payload of an activity. Rows in the other detail
/// tables are cleared so a category change leaves nothing stale behind.
pub(crate) fn replace_detail(
    conn: &Connection,
    activity_id: &str,
    detail: &CategoryDetail,
) -> Result<(), DbError> {
    clear_details(conn, activity_id)?;

    match detail {
        CategoryDetail::Innovation(d) => {
            conn.execute(
                "INSERT INTO innovation_details
                     (activity_id, item, company, project_no, issuer, date, total_hours)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    activity_id,
                    d.item,
                    d.company,
                    d.project_no,
                    d.issuer,
                    d.date,
                    d.total_hours
                ],
            )?;
        }
        CategoryDetail::Competition(d) => {
            conn.execute(
                "INSERT INTO competition_details
                     (activity_id, level, competition, award_level, ranking)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![activity_id, d.level, d.competition, d.award_level, d.ranking],
            )?;
        }
        CategoryDetail::EntrepreneurshipProject(d) => {
            conn.execute(
                "INSERT INTO entrepreneurship_project_details
                     (activity_id, project_name, project_level, project_rank)
                 VALUES (?1, ?2, ?3, ?4)",
                params![activity_id, d.project_name, d.project_level, d.project_rank],
            )?;
        }
        CategoryDetail::EntrepreneurshipPractice(d) => {
            conn.execute(
                "INSERT INTO entrepreneurship_practice_details
                     (activity_id, company_name, legal_person, share_percent)
                 VALUES (?1, ?2, ?3, ?4)",
                params![activity_id, d.company_name, d.legal_person, d.share_percent],
            )?;
        }
        CategoryDetail::PaperPatent(d) => {
            conn.execute(
                "INSERT INTO paper_patent_details (activity_id, name, kind, ranking)
                 VALUES (?1, ?2, ?3, ?4)",
                params![activity_id, d.name, d.kind, d.ranking],
            )?;
        }
    }

    Ok(())
}

pub(crate) fn get_detail(
    conn: &Connection,
    activity_id: &str,
    category: Category,
) -> Result<Option<CategoryDetail>, DbError> {
    let detail = match category {
        Category::Innovation => conn
            .query_row(
                "SELECT item, company, project_no, issuer, date, total_hours
                 FROM innovation_details WHERE activity_id = ?1",
                params![activity_id],
                |row| {
                    Ok(CategoryDetail::Innovation(InnovationDetail {
                        item: row.get(0)?,
                        company: row.get(1)?,
                        project_no: row.get(2)?,
                        issuer: row.get(3)?,
                        date: row.get(4)?,
                        total_hours: row.get(5)?,
                    }))
                },
            )
            .optional()?,
        Category::Competition => conn
            .query_row(
                "SELECT level, competition, award_level, ranking
                 FROM competition_details WHERE activity_id = ?1",
                params![activity_id],
                |row| {
                    Ok(CategoryDetail::Competition(CompetitionDetail {
                        level: row.get(0)?,
                        competition: row.get(1)?,
                        award_level: row.get(2)?,
                        ranking: row.get(3)?,
                    }))
                },
            )
            .optional()?,
        Category::EntrepreneurshipProject => conn
            .query_row(
                "SELECT project_name, project_level, project_rank
                 FROM entrepreneurship_project_details WHERE activity_id = ?1",
                params![activity_id],
                |row| {
                    Ok(CategoryDetail::EntrepreneurshipProject(
                        EntrepreneurshipProjectDetail {
                            project_name: row.get(0)?,
                            project_level: row.get(1)?,
                            project_rank: row.get(2)?,
                        },
                    ))
                },
            )
            .optional()?,
        Category::EntrepreneurshipPractice => conn
            .query_row(
                "SELECT company_name, legal_person, share_percent
                 FROM entrepreneurship_practice_details WHERE activity_id = ?1",
                params![activity_id],
                |row| {
                    Ok(CategoryDetail::EntrepreneurshipPractice(
                        EntrepreneurshipPracticeDetail {
                            company_name: row.get(0)?,
                            legal_person: row.get(1)?,
                            share_percent: row.get(2)?,
                        },
                    ))
                },
            )
            .optional()?,
        Category::PaperPatent => conn
            .query_row(
                "SELECT name, kind, ranking FROM paper_patent_details WHERE activity_id = ?1",
                params![activity_id],
                |row| {
                    Ok(CategoryDetail::PaperPatent(PaperPatentDetail {
                        name: row.get(0)?,
                        kind: row.get(1)?,
                        ranking: row.get(2)?,
                    }))
                },
            )
            .optional()?,
    };
    Ok(detail)
}

impl Db {
    pub fn get_activity_detail(
        &self,
        activity_id: &str,
        category: Category,
    ) -> Result<Option<CategoryDetail>, DbError> {
        self.with_conn(|conn| get_detail(conn, activity_id, category))
    }
}

#[cfg(test)]
mod tests {
    use creditflow_core::activity::{Category, CreateActivity};
    use creditflow_core::detail::{CategoryDetail, CompetitionDetail, InnovationDetail};

    use crate::Db;

    fn setup() -> Db {
        Db::open_in_memory().unwrap()
    }

    #[test]
    fn detail_survives_roundtrip() {
        let db = setup();
        let activity = db
            .create_activity(
                "owner-1",
                &CreateActivity {
                    title: "Robot contest".into(),
                    description: String::new(),
                    category: Category::Competition,
                    start_date: None,
                    end_date: None,
                    detail: Some(CategoryDetail::Competition(CompetitionDetail {
                        level: "provincial".into(),
                        competition: "RoboCup".into(),
                        award_level: "second".into(),
                        ranking: "3".into(),
                    })),
                },
            )
            .unwrap();

        let detail = db
            .get_activity_detail(&activity.id, Category::Competition)
            .unwrap()
            .unwrap();
        match detail {
            CategoryDetail::Competition(d) => {
                assert_eq!(d.competition, "RoboCup");
                assert_eq!(d.ranking, "3");
            }
            other => panic!("unexpected detail: {other:?}"),
        }
    }

    #[test]
    fn category_change_clears_old_detail() {
        let db = setup();
        let activity = db
            .create_activity(
                "owner-1",
                &CreateActivity {
                    title: "Project".into(),
                    description: String::new(),
                    category: Category::Competition,
                    start_date: None,
                    end_date: None,
                    detail: Some(CategoryDetail::Competition(CompetitionDetail::default())),
                },
            )
            .unwrap();

        db.update_activity(
            &activity.id,
            &creditflow_core::activity::UpdateActivity {
                category: Some(Category::Innovation),
                detail: Some(CategoryDetail::Innovation(InnovationDetail {
                    item: "training".into(),
                    ..Default::default()
                })),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(db
            .get_activity_detail(&activity.id, Category::Competition)
            .unwrap()
            .is_none());
        assert!(db
            .get_activity_detail(&activity.id, Category::Innovation)
            .unwrap()
            .is_some());
    }

    #[test]
    fn category_change_without_payload_drops_stale_detail() {
        let db = setup();
        let activity = db
            .create_activity(
                "owner-1",
                &CreateActivity {
                    title: "Project".into(),
                    description: String::new(),
                    category: Category::Competition,
                    start_date: None,
                    end_date: None,
                    detail: Some(CategoryDetail::Competition(CompetitionDetail {
                        competition: "RoboCup".into(),
                        ..Default::default()
                    })),
                },
            )
            .unwrap();

        db.update_activity(
            &activity.id,
            &creditflow_core::activity::UpdateActivity {
                category: Some(Category::Innovation),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(db
            .get_activity_detail(&activity.id, Category::Competition)
            .unwrap()
            .is_none());

        // Switching back must not resurrect the old payload either.
        db.update_activity(
            &activity.id,
            &creditflow_core::activity::UpdateActivity {
                category: Some(Category::Competition),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(db
            .get_activity_detail(&activity.id, Category::Competition)
            .unwrap()
            .is_none());
    }
}
