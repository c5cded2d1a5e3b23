use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use creditflow_core::application::{Application, ApplicationFilter, ApplicationStatus};

use crate::{Db, DbError};

fn row_to_application(row: &Row) -> rusqlite::Result<Application> {
    let status_str: String = row.get("status")?;
    Ok(Application {
        id: row.get("id")?,
        activity_id: row.get("activity_id")?,
        user_id: row.get("user_id")?,
        status: ApplicationStatus::parse_str(&status_str).unwrap_or(ApplicationStatus::Pending),
        applied_credits: row.get("applied_credits")?,
        awarded_credits: row.get("awarded_credits")?,
        submitted_at: row.get("submitted_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Materialize one application per live participant of the activity.
///
/// Idempotent: a live application for the pair is left untouched, a
/// soft-deleted one is revived and refreshed, and only truly missing pairs
/// get a new row.
pub(crate) fn generate_applications(
    conn: &Connection,
    activity_id: &str,
    now: DateTime<Utc>,
) -> Result<usize, DbError> {
    let mut stmt = conn.prepare(
        "SELECT user_id, credits FROM participants
         WHERE activity_id = ?1 AND deleted_at IS NULL",
    )?;
    let participants: Vec<(String, f64)> = stmt
        .query_map(params![activity_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut generated = 0;
    for (user_id, credits) in participants {
        let live: Option<String> = conn
            .query_row(
                "SELECT id FROM applications
                 WHERE activity_id = ?1 AND user_id = ?2 AND deleted_at IS NULL",
                params![activity_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        if live.is_some() {
            continue;
        }

        let buried: Option<String> = conn
            .query_row(
                "SELECT id FROM applications
                 WHERE activity_id = ?1 AND user_id = ?2 AND deleted_at IS NOT NULL",
                params![activity_id, user_id],
                |row| row.get(0),
            )
            .optional()?;

        match buried {
            Some(id) => {
                conn.execute(
                    "UPDATE applications
                     SET deleted_at = NULL, status = ?1, applied_credits = ?2,
                         awarded_credits = ?2, submitted_at = ?3, updated_at = ?3
                     WHERE id = ?4",
                    params![ApplicationStatus::Approved.as_str(), credits, now, id],
                )?;
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO applications
                         (id, activity_id, user_id, status, applied_credits,
                          awarded_credits, submitted_at, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?6, ?6)",
                    params![
                        id,
                        activity_id,
                        user_id,
                        ApplicationStatus::Approved.as_str(),
                        credits,
                        now
                    ],
                )?;
            }
        }
        generated += 1;
    }

    Ok(generated)
}

/// Soft-delete every live application of the activity, whatever its status.
pub(crate) fn revert_applications(
    conn: &Connection,
    activity_id: &str,
    now: DateTime<Utc>,
) -> Result<usize, DbError> {
    let changed = conn.execute(
        "UPDATE applications SET deleted_at = ?1, updated_at = ?1
         WHERE activity_id = ?2 AND deleted_at IS NULL",
        params![now, activity_id],
    )?;
    Ok(changed)
}

impl Db {
    /// Generate applications for every live participant of the activity.
    /// Normally driven by the approval transition; safe to call repeatedly.
    pub fn generate_applications_for(&self, activity_id: &str) -> Result<usize, DbError> {
        self.with_tx(|conn| generate_applications(conn, activity_id, Utc::now()))
    }

    /// Undo the application side of an approval.
    pub fn revert_applications_for(&self, activity_id: &str) -> Result<usize, DbError> {
        self.with_tx(|conn| revert_applications(conn, activity_id, Utc::now()))
    }

    pub fn list_applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<Application>, DbError> {
        self.with_conn(|conn| {
            let mut sql = String::from("SELECT * FROM applications WHERE deleted_at IS NULL");
            let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

            if let Some(ref activity_id) = filter.activity_id {
                param_values.push(Box::new(activity_id.clone()));
                sql.push_str(&format!(" AND activity_id = ?{}", param_values.len()));
            }
            if let Some(ref user_id) = filter.user_id {
                param_values.push(Box::new(user_id.clone()));
                sql.push_str(&format!(" AND user_id = ?{}", param_values.len()));
            }
            if let Some(status) = filter.status {
                param_values.push(Box::new(status.as_str().to_string()));
                sql.push_str(&format!(" AND status = ?{}", param_values.len()));
            }

            sql.push_str(" ORDER BY submitted_at DESC");

            if let Some(limit) = filter.limit {
                param_values.push(Box::new(limit));
                sql.push_str(&format!(" LIMIT ?{}", param_values.len()));
                if let Some(offset) = filter.offset {
                    param_values.push(Box::new(offset));
                    sql.push_str(&format!(" OFFSET ?{}", param_values.len()));
                }
            }

            let params_ref: Vec<&dyn rusqlite::types::ToSql> =
                param_values.iter().map(|p| p.as_ref()).collect();

            let mut stmt = conn.prepare(&sql)?;
            let applications = stmt
                .query_map(params_ref.as_slice(), row_to_application)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(applications)
        })
    }

    pub fn count_applications(&self, activity_id: &str) -> Result<i64, DbError> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM applications
                 WHERE activity_id = ?1 AND deleted_at IS NULL",
                params![activity_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}
