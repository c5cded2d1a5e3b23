use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use creditflow_core::activity::{
    Activity, ActivityFilter, ActivityStatus, CreateActivity, UpdateActivity,
};
use creditflow_core::attachment::Attachment;

use super::applications::{generate_applications, revert_applications};
use super::attachments::soft_delete_activity_attachments;
use super::details::{clear_details, replace_detail};
use crate::{Db, DbError};

fn row_to_activity(row: &Row) -> rusqlite::Result<Activity> {
    let status_str: String = row.get("status")?;
    let category_str: String = row.get("category")?;
    Ok(Activity {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        category: creditflow_core::Category::parse_str(&category_str)
            .unwrap_or(creditflow_core::Category::Innovation),
        status: ActivityStatus::parse_str(&status_str).unwrap_or(ActivityStatus::Draft),
        owner_id: row.get("owner_id")?,
        start_date: row.get("start_date")?,
        end_date: row.get("end_date")?,
        reviewer_id: row.get("reviewer_id")?,
        review_comment: row.get("review_comment")?,
        reviewed_at: row.get("reviewed_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn fetch_live(conn: &Connection, id: &str) -> Result<Activity, DbError> {
    conn.query_row(
        "SELECT * FROM activities WHERE id = ?1 AND deleted_at IS NULL",
        params![id],
        row_to_activity,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(format!("activity {id}")),
        other => DbError::Sqlite(other),
    })
}

fn insert_activity(
    conn: &Connection,
    owner_id: &str,
    input: &CreateActivity,
    now: DateTime<Utc>,
) -> Result<Activity, DbError> {
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO activities
             (id, title, description, category, status, owner_id,
              start_date, end_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            id,
            input.title,
            input.description,
            input.category.as_str(),
            ActivityStatus::Draft.as_str(),
            owner_id,
            input.start_date,
            input.end_date,
            now
        ],
    )?;
    if let Some(ref detail) = input.detail {
        replace_detail(conn, &id, detail)?;
    }
    fetch_live(conn, &id)
}

fn apply_update(
    conn: &Connection,
    id: &str,
    update: &UpdateActivity,
    now: DateTime<Utc>,
) -> Result<Activity, DbError> {
    let current = fetch_live(conn, id)?;

    let mut sets = vec!["updated_at = ?1".to_string()];
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(now)];

    if let Some(ref title) = update.title {
        param_values.push(Box::new(title.clone()));
        sets.push(format!("title = ?{}", param_values.len()));
    }
    if let Some(ref description) = update.description {
        param_values.push(Box::new(description.clone()));
        sets.push(format!("description = ?{}", param_values.len()));
    }
    if let Some(category) = update.category {
        param_values.push(Box::new(category.as_str().to_string()));
        sets.push(format!("category = ?{}", param_values.len()));
    }
    if let Some(ref start_date) = update.start_date {
        param_values.push(Box::new(*start_date));
        sets.push(format!("start_date = ?{}", param_values.len()));
    }
    if let Some(ref end_date) = update.end_date {
        param_values.push(Box::new(*end_date));
        sets.push(format!("end_date = ?{}", param_values.len()));
    }

    param_values.push(Box::new(id.to_string()));
    let id_param = param_values.len();

    let sql = format!(
        "UPDATE activities SET {} WHERE id = ?{} AND deleted_at IS NULL",
        sets.join(", "),
        id_param
    );

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();

    let changed = conn.execute(&sql, params_ref.as_slice())?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("activity {id}")));
    }

    if let Some(ref detail) = update.detail {
        replace_detail(conn, id, detail)?;
    } else if let Some(category) = update.category {
        // A category change without a fresh payload must not leave the
        // previous category's detail row behind.
        if category != current.category {
            clear_details(conn, id)?;
        }
    }

    fetch_live(conn, id)
}

impl Db {
    pub fn create_activity(
        &self,
        owner_id: &str,
        input: &CreateActivity,
    ) -> Result<Activity, DbError> {
        self.with_tx(|conn| insert_activity(conn, owner_id, input, Utc::now()))
    }

    /// Create several activities in one transaction. Any failure leaves
    /// nothing persisted.
    pub fn create_activities(
        &self,
        owner_id: &str,
        inputs: &[CreateActivity],
    ) -> Result<Vec<Activity>, DbError> {
        self.with_tx(|conn| {
            let now = Utc::now();
            inputs
                .iter()
                .map(|input| insert_activity(conn, owner_id, input, now))
                .collect()
        })
    }

    pub fn get_activity(&self, id: &str) -> Result<Activity, DbError> {
        self.with_conn(|conn| fetch_live(conn, id))
    }

    pub fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>, DbError> {
        self.with_conn(|conn| {
            let mut sql = String::from("SELECT * FROM activities WHERE deleted_at IS NULL");
            let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

            if let Some(status) = filter.status {
                param_values.push(Box::new(status.as_str().to_string()));
                sql.push_str(&format!(" AND status = ?{}", param_values.len()));
            }
            if let Some(category) = filter.category {
                param_values.push(Box::new(category.as_str().to_string()));
                sql.push_str(&format!(" AND category = ?{}", param_values.len()));
            }
            if let Some(ref owner_id) = filter.owner_id {
                param_values.push(Box::new(owner_id.clone()));
                sql.push_str(&format!(" AND owner_id = ?{}", param_values.len()));
            }
            if let Some(starts_after) = filter.starts_after {
                param_values.push(Box::new(starts_after));
                sql.push_str(&format!(" AND start_date >= ?{}", param_values.len()));
            }
            if let Some(ends_before) = filter.ends_before {
                param_values.push(Box::new(ends_before));
                sql.push_str(&format!(" AND end_date <= ?{}", param_values.len()));
            }
            if let Some(ref search) = filter.search {
                let pattern = format!("%{search}%");
                param_values.push(Box::new(pattern));
                let n = param_values.len();
                sql.push_str(&format!(" AND (title LIKE ?{n} OR description LIKE ?{n})"));
            }
            if let Some(ref visible_to) = filter.visible_to {
                param_values.push(Box::new(visible_to.clone()));
                let n = param_values.len();
                sql.push_str(&format!(
                    " AND (owner_id = ?{n} OR id IN (SELECT activity_id FROM participants
                       WHERE user_id = ?{n} AND deleted_at IS NULL))"
                ));
            }

            sql.push_str(" ORDER BY created_at DESC");

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
            let activities = stmt
                .query_map(params_ref.as_slice(), row_to_activity)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(activities)
        })
    }

    pub fn update_activity(
        &self,
        id: &str,
        update: &UpdateActivity,
    ) -> Result<Activity, DbError> {
        self.with_tx(|conn| apply_update(conn, id, update, Utc::now()))
    }

    /// Update several activities in one transaction. State conflicts are
    /// collected in a read pass and reported together; any conflict aborts
    /// the whole batch.
    pub fn update_activities(
        &self,
        items: &[(String, UpdateActivity)],
        require_draft: bool,
    ) -> Result<Vec<Activity>, DbError> {
        self.with_tx(|conn| {
            let now = Utc::now();

            let mut conflicts = Vec::new();
            for (id, _) in items {
                let activity = fetch_live(conn, id)?;
                if require_draft && activity.status != ActivityStatus::Draft {
                    conflicts.push(format!(
                        "activity {id} is {} and cannot be edited",
                        activity.status.as_str()
                    ));
                }
            }
            if !conflicts.is_empty() {
                return Err(DbError::Conflict(conflicts.join("; ")));
            }

            items
                .iter()
                .map(|(id, update)| apply_update(conn, id, update, now))
                .collect()
        })
    }

    /// Draft → PendingReview.
    pub fn submit_activity(&self, id: &str) -> Result<Activity, DbError> {
        self.with_tx(|conn| {
            let activity = fetch_live(conn, id)?;
            if activity.status != ActivityStatus::Draft {
                return Err(DbError::Conflict(
                    "only draft activities can be submitted".into(),
                ));
            }
            let now = Utc::now();
            conn.execute(
                "UPDATE activities SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![ActivityStatus::PendingReview.as_str(), now, id],
            )?;
            fetch_live(conn, id)
        })
    }

    /// Apply a review decision. Application generation and reversal run in
    /// the same transaction, keyed on the Approved edge: entering Approved
    /// generates, leaving Approved reverts.
    pub fn review_activity(
        &self,
        id: &str,
        new_status: ActivityStatus,
        reviewer_id: &str,
        comment: &str,
    ) -> Result<Activity, DbError> {
        self.with_tx(|conn| {
            let activity = fetch_live(conn, id)?;
            if !activity.status.is_reviewable() {
                return Err(DbError::Conflict(
                    "only submitted activities can be reviewed".into(),
                ));
            }
            let now = Utc::now();
            conn.execute(
                "UPDATE activities
                 SET status = ?1, reviewer_id = ?2, review_comment = ?3,
                     reviewed_at = ?4, updated_at = ?4
                 WHERE id = ?5",
                params![new_status.as_str(), reviewer_id, comment, now, id],
            )?;

            let was_approved = activity.status == ActivityStatus::Approved;
            let is_approved = new_status == ActivityStatus::Approved;
            if is_approved && !was_approved {
                generate_applications(conn, id, now)?;
            } else if was_approved && !is_approved {
                revert_applications(conn, id, now)?;
            }

            fetch_live(conn, id)
        })
    }

    /// Any non-draft status → Draft, clearing the review fields. Reverts
    /// applications when leaving Approved.
    pub fn withdraw_activity(&self, id: &str) -> Result<Activity, DbError> {
        self.with_tx(|conn| {
            let activity = fetch_live(conn, id)?;
            if activity.status == ActivityStatus::Draft {
                return Err(DbError::Conflict(
                    "draft activities cannot be withdrawn".into(),
                ));
            }
            let now = Utc::now();
            conn.execute(
                "UPDATE activities
                 SET status = ?1, reviewer_id = NULL, review_comment = '',
                     reviewed_at = NULL, updated_at = ?2
                 WHERE id = ?3",
                params![ActivityStatus::Draft.as_str(), now, id],
            )?;

            if activity.status == ActivityStatus::Approved {
                revert_applications(conn, id, now)?;
            }

            fetch_live(conn, id)
        })
    }

    /// Soft-delete the activity and cascade over participants, applications
    /// and attachments. Returns the attachments that were live so the
    /// caller can release unreferenced blobs after commit.
    pub fn soft_delete_activity(&self, id: &str) -> Result<Vec<Attachment>, DbError> {
        self.with_tx(|conn| soft_delete_cascade(conn, id, Utc::now()))
    }

    /// Batch form of [`soft_delete_activity`]; all-or-nothing.
    pub fn soft_delete_activities(&self, ids: &[String]) -> Result<Vec<Attachment>, DbError> {
        self.with_tx(|conn| {
            let now = Utc::now();
            let mut attachments = Vec::new();
            for id in ids {
                attachments.extend(soft_delete_cascade(conn, id, now)?);
            }
            Ok(attachments)
        })
    }

    /// Number of live metadata rows referencing a digest, system-wide.
    pub fn count_live_digest_references(&self, digest: &str) -> Result<i64, DbError> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM attachments
                 WHERE digest = ?1 AND deleted_at IS NULL",
                params![digest],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn soft_delete_cascade(
    conn: &Connection,
    id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Attachment>, DbError> {
    let activity = fetch_live(conn, id)?;

    conn.execute(
        "UPDATE participants SET deleted_at = ?1, updated_at = ?1
         WHERE activity_id = ?2 AND deleted_at IS NULL",
        params![now, id],
    )?;
    revert_applications(conn, id, now)?;
    let attachments = soft_delete_activity_attachments(conn, id, now)?;

    conn.execute(
        "UPDATE activities SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
        params![now, activity.id],
    )?;

    Ok(attachments)
}
