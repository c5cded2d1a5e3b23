use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use creditflow_core::attachment::{
    Attachment, AttachmentFilter, AttachmentStats, FileKind,
};

use crate::{Db, DbError};

fn row_to_attachment(row: &Row) -> rusqlite::Result<Attachment> {
    let kind_str: String = row.get("file_kind")?;
    Ok(Attachment {
        id: row.get("id")?,
        activity_id: row.get("activity_id")?,
        file_name: row.get("file_name")?,
        original_name: row.get("original_name")?,
        file_size: row.get("file_size")?,
        file_type: row.get("file_type")?,
        file_kind: FileKind::parse_str(&kind_str).unwrap_or(FileKind::Other),
        description: row.get("description")?,
        digest: row.get("digest")?,
        uploaded_by: row.get("uploaded_by")?,
        uploaded_at: row.get("uploaded_at")?,
        download_count: row.get("download_count")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Fields of a new metadata row; the digest is computed by the caller.
pub struct NewAttachment<'a> {
    pub activity_id: &'a str,
    pub file_name: &'a str,
    pub original_name: &'a str,
    pub file_size: i64,
    pub file_type: &'a str,
    pub file_kind: FileKind,
    pub description: &'a str,
    pub digest: &'a str,
    pub uploaded_by: &'a str,
}

pub(crate) fn soft_delete_activity_attachments(
    conn: &Connection,
    activity_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Attachment>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM attachments WHERE activity_id = ?1 AND deleted_at IS NULL",
    )?;
    let attachments = stmt
        .query_map(params![activity_id], row_to_attachment)?
        .collect::<Result<Vec<_>, _>>()?;

    conn.execute(
        "UPDATE attachments SET deleted_at = ?1, updated_at = ?1
         WHERE activity_id = ?2 AND deleted_at IS NULL",
        params![now, activity_id],
    )?;

    Ok(attachments)
}

impl Db {
    pub fn create_attachment(&self, input: &NewAttachment<'_>) -> Result<Attachment, DbError> {
        self.with_conn(|conn| {
            let id = uuid::Uuid::new_v4().to_string();
            let now = Utc::now();
            conn.execute(
                "INSERT INTO attachments
                     (id, activity_id, file_name, original_name, file_size, file_type,
                      file_kind, description, digest, uploaded_by, uploaded_at,
                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?11)",
                params![
                    id,
                    input.activity_id,
                    input.file_name,
                    input.original_name,
                    input.file_size,
                    input.file_type,
                    input.file_kind.as_str(),
                    input.description,
                    input.digest,
                    input.uploaded_by,
                    now
                ],
            )?;
            conn.query_row(
                "SELECT * FROM attachments WHERE id = ?1",
                params![id],
                row_to_attachment,
            )
            .map_err(DbError::from)
        })
    }

    pub fn get_attachment(&self, id: &str) -> Result<Attachment, DbError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM attachments WHERE id = ?1 AND deleted_at IS NULL",
                params![id],
                row_to_attachment,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    DbError::NotFound(format!("attachment {id}"))
                }
                other => DbError::Sqlite(other),
            })
        })
    }

    pub fn list_attachments(
        &self,
        activity_id: &str,
        filter: &AttachmentFilter,
    ) -> Result<Vec<Attachment>, DbError> {
        self.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT * FROM attachments WHERE activity_id = ?1 AND deleted_at IS NULL",
            );
            let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
                vec![Box::new(activity_id.to_string())];

            if let Some(kind) = filter.kind {
                param_values.push(Box::new(kind.as_str().to_string()));
                sql.push_str(&format!(" AND file_kind = ?{}", param_values.len()));
            }
            if let Some(ref file_type) = filter.file_type {
                param_values.push(Box::new(file_type.clone()));
                sql.push_str(&format!(" AND file_type = ?{}", param_values.len()));
            }
            if let Some(ref uploaded_by) = filter.uploaded_by {
                param_values.push(Box::new(uploaded_by.clone()));
                sql.push_str(&format!(" AND uploaded_by = ?{}", param_values.len()));
            }

            sql.push_str(" ORDER BY uploaded_at DESC");

            let params_ref: Vec<&dyn rusqlite::types::ToSql> =
                param_values.iter().map(|p| p.as_ref()).collect();

            let mut stmt = conn.prepare(&sql)?;
            let attachments = stmt
                .query_map(params_ref.as_slice(), row_to_attachment)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(attachments)
        })
    }

    pub fn attachment_stats(&self, activity_id: &str) -> Result<AttachmentStats, DbError> {
        self.with_conn(|conn| {
            let (count, total_size): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(file_size), 0) FROM attachments
                 WHERE activity_id = ?1 AND deleted_at IS NULL",
                params![activity_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let mut by_kind = BTreeMap::new();
            let mut stmt = conn.prepare(
                "SELECT file_kind, COUNT(*) FROM attachments
                 WHERE activity_id = ?1 AND deleted_at IS NULL GROUP BY file_kind",
            )?;
            let rows = stmt.query_map(params![activity_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (kind, n) = row?;
                by_kind.insert(kind, n);
            }

            let mut by_type = BTreeMap::new();
            let mut stmt = conn.prepare(
                "SELECT file_type, COUNT(*) FROM attachments
                 WHERE activity_id = ?1 AND deleted_at IS NULL GROUP BY file_type",
            )?;
            let rows = stmt.query_map(params![activity_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (file_type, n) = row?;
                by_type.insert(file_type, n);
            }

            Ok(AttachmentStats {
                count,
                total_size,
                by_kind,
                by_type,
            })
        })
    }

    pub fn update_attachment_description(
        &self,
        id: &str,
        description: &str,
    ) -> Result<Attachment, DbError> {
        self.with_conn(|conn| {
            let now = Utc::now();
            let changed = conn.execute(
                "UPDATE attachments SET description = ?1, updated_at = ?2
                 WHERE id = ?3 AND deleted_at IS NULL",
                params![description, now, id],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound(format!("attachment {id}")));
            }
            conn.query_row(
                "SELECT * FROM attachments WHERE id = ?1",
                params![id],
                row_to_attachment,
            )
            .map_err(DbError::from)
        })
    }

    /// Soft-delete the row and, in the same transaction, count the live
    /// rows still sharing its digest anywhere in the system. A zero count
    /// tells the caller the blob itself can go.
    pub fn soft_delete_attachment(&self, id: &str) -> Result<(Attachment, i64), DbError> {
        self.with_tx(|conn| {
            let attachment = conn
                .query_row(
                    "SELECT * FROM attachments WHERE id = ?1 AND deleted_at IS NULL",
                    params![id],
                    row_to_attachment,
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => {
                        DbError::NotFound(format!("attachment {id}"))
                    }
                    other => DbError::Sqlite(other),
                })?;
            let now = Utc::now();
            conn.execute(
                "UPDATE attachments SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
                params![now, id],
            )?;
            let remaining: i64 = conn.query_row(
                "SELECT COUNT(*) FROM attachments
                 WHERE digest = ?1 AND deleted_at IS NULL",
                params![attachment.digest],
                |row| row.get(0),
            )?;
            Ok((attachment, remaining))
        })
    }

    /// Live row on this activity sharing the digest, if any. Used to reject
    /// duplicate content within one activity.
    pub fn find_digest_on_activity(
        &self,
        activity_id: &str,
        digest: &str,
    ) -> Result<Option<Attachment>, DbError> {
        self.with_conn(|conn| {
            let attachment = conn
                .query_row(
                    "SELECT * FROM attachments
                     WHERE activity_id = ?1 AND digest = ?2 AND deleted_at IS NULL",
                    params![activity_id, digest],
                    row_to_attachment,
                )
                .optional()?;
            Ok(attachment)
        })
    }

    pub fn increment_download_count(&self, id: &str) -> Result<Attachment, DbError> {
        self.with_conn(|conn| {
            let now = Utc::now();
            let changed = conn.execute(
                "UPDATE attachments
                 SET download_count = download_count + 1, updated_at = ?1
                 WHERE id = ?2 AND deleted_at IS NULL",
                params![now, id],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound(format!("attachment {id}")));
            }
            conn.query_row(
                "SELECT * FROM attachments WHERE id = ?1",
                params![id],
                row_to_attachment,
            )
            .map_err(DbError::from)
        })
    }
}
