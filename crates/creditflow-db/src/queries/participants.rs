use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use creditflow_core::participant::Participant;

use crate::{Db, DbError};

fn row_to_participant(row: &Row) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: row.get("id")?,
        activity_id: row.get("activity_id")?,
        user_id: row.get("user_id")?,
        credits: row.get("credits")?,
        joined_at: row.get("joined_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl Db {
    /// Add `(user_id, credits)` entries to the ledger. Users that already
    /// have a live row are skipped; returns the rows actually inserted.
    pub fn add_participants(
        &self,
        activity_id: &str,
        entries: &[(String, f64)],
    ) -> Result<Vec<Participant>, DbError> {
        self.with_tx(|conn| {
            let now = Utc::now();
            let mut added = Vec::new();
            for (user_id, credits) in entries {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT id FROM participants
                         WHERE activity_id = ?1 AND user_id = ?2 AND deleted_at IS NULL",
                        params![activity_id, user_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if existing.is_some() {
                    continue;
                }

                let id = uuid::Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO participants
                         (id, activity_id, user_id, credits, joined_at, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5)",
                    params![id, activity_id, user_id, credits, now],
                )?;
                let participant = conn.query_row(
                    "SELECT * FROM participants WHERE id = ?1",
                    params![id],
                    row_to_participant,
                )?;
                added.push(participant);
            }
            Ok(added)
        })
    }

    pub fn list_participants(&self, activity_id: &str) -> Result<Vec<Participant>, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM participants
                 WHERE activity_id = ?1 AND deleted_at IS NULL
                 ORDER BY joined_at ASC",
            )?;
            let participants = stmt
                .query_map(params![activity_id], row_to_participant)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(participants)
        })
    }

    pub fn get_participant(
        &self,
        activity_id: &str,
        user_id: &str,
    ) -> Result<Participant, DbError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM participants
                 WHERE activity_id = ?1 AND user_id = ?2 AND deleted_at IS NULL",
                params![activity_id, user_id],
                row_to_participant,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    DbError::NotFound(format!("participant {user_id} in activity {activity_id}"))
                }
                other => DbError::Sqlite(other),
            })
        })
    }

    pub fn is_participant(&self, activity_id: &str, user_id: &str) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            let found: Option<String> = conn
                .query_row(
                    "SELECT id FROM participants
                     WHERE activity_id = ?1 AND user_id = ?2 AND deleted_at IS NULL",
                    params![activity_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn set_participant_credits(
        &self,
        activity_id: &str,
        user_id: &str,
        credits: f64,
    ) -> Result<Participant, DbError> {
        self.with_conn(|conn| {
            let now = Utc::now();
            let changed = conn.execute(
                "UPDATE participants SET credits = ?1, updated_at = ?2
                 WHERE activity_id = ?3 AND user_id = ?4 AND deleted_at IS NULL",
                params![credits, now, activity_id, user_id],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound(format!(
                    "participant {user_id} in activity {activity_id}"
                )));
            }
            conn.query_row(
                "SELECT * FROM participants
                 WHERE activity_id = ?1 AND user_id = ?2 AND deleted_at IS NULL",
                params![activity_id, user_id],
                row_to_participant,
            )
            .map_err(DbError::from)
        })
    }

    /// Overwrite credits for several participants at once. Unknown users
    /// are skipped; returns the rows that were updated.
    pub fn set_many_participant_credits(
        &self,
        activity_id: &str,
        assignments: &[(String, f64)],
    ) -> Result<Vec<Participant>, DbError> {
        self.with_tx(|conn| {
            let now = Utc::now();
            let mut updated = Vec::new();
            for (user_id, credits) in assignments {
                let changed = conn.execute(
                    "UPDATE participants SET credits = ?1, updated_at = ?2
                     WHERE activity_id = ?3 AND user_id = ?4 AND deleted_at IS NULL",
                    params![credits, now, activity_id, user_id],
                )?;
                if changed == 0 {
                    continue;
                }
                let participant = conn.query_row(
                    "SELECT * FROM participants
                     WHERE activity_id = ?1 AND user_id = ?2 AND deleted_at IS NULL",
                    params![activity_id, user_id],
                    row_to_participant,
                )?;
                updated.push(participant);
            }
            Ok(updated)
        })
    }

    pub fn remove_participant(&self, activity_id: &str, user_id: &str) -> Result<(), DbError> {
        self.with_conn(|conn| {
            let now = Utc::now();
            let changed = conn.execute(
                "UPDATE participants SET deleted_at = ?1, updated_at = ?1
                 WHERE activity_id = ?2 AND user_id = ?3 AND deleted_at IS NULL",
                params![now, activity_id, user_id],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound(format!(
                    "participant {user_id} in activity {activity_id}"
                )));
            }
            Ok(())
        })
    }

    pub fn count_participants(&self, activity_id: &str) -> Result<i64, DbError> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM participants
                 WHERE activity_id = ?1 AND deleted_at IS NULL",
                params![activity_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

#[cfg(test)]
mod tests {
    use creditflow_core::activity::{Category, CreateActivity};

    use crate::{Db, DbError};

    fn setup() -> (Db, String) {
        let db = Db::open_in_memory().unwrap();
        let activity = db
            .create_activity(
                "owner-1",
                &CreateActivity {
                    title: "Seminar".into(),
                    description: String::new(),
                    category: Category::Innovation,
                    start_date: None,
                    end_date: None,
                    detail: None,
                },
            )
            .unwrap();
        (db, activity.id)
    }

    #[test]
    fn add_skips_existing_participants() {
        let (db, activity_id) = setup();

        let first = db
            .add_participants(
                &activity_id,
                &[("s1".into(), 1.0), ("s2".into(), 2.0)],
            )
            .unwrap();
        assert_eq!(first.len(), 2);

        let second = db
            .add_participants(
                &activity_id,
                &[("s1".into(), 5.0), ("s3".into(), 3.0)],
            )
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].user_id, "s3");

        // s1 kept its original credits
        let s1 = db.get_participant(&activity_id, "s1").unwrap();
        assert_eq!(s1.credits, 1.0);
    }

    #[test]
    fn credits_can_be_overwritten() {
        let (db, activity_id) = setup();
        db.add_participants(&activity_id, &[("s1".into(), 1.0)])
            .unwrap();

        let updated = db
            .set_participant_credits(&activity_id, "s1", 4.5)
            .unwrap();
        assert_eq!(updated.credits, 4.5);

        let err = db
            .set_participant_credits(&activity_id, "ghost", 1.0)
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn batch_credits_skips_unknown_users() {
        let (db, activity_id) = setup();
        db.add_participants(&activity_id, &[("s1".into(), 1.0), ("s2".into(), 1.0)])
            .unwrap();

        let updated = db
            .set_many_participant_credits(
                &activity_id,
                &[("s1".into(), 3.0), ("ghost".into(), 9.0)],
            )
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].user_id, "s1");
        assert_eq!(updated[0].credits, 3.0);
    }

    #[test]
    fn removed_participant_is_gone_from_listing() {
        let (db, activity_id) = setup();
        db.add_participants(&activity_id, &[("s1".into(), 1.0)])
            .unwrap();

        db.remove_participant(&activity_id, "s1").unwrap();
        assert!(db.list_participants(&activity_id).unwrap().is_empty());
        assert_eq!(db.count_participants(&activity_id).unwrap(), 0);

        // Re-adding after removal inserts a fresh live row
        let readded = db
            .add_participants(&activity_id, &[("s1".into(), 2.0)])
            .unwrap();
        assert_eq!(readded.len(), 1);
    }
}
