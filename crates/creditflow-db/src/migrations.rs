use rusqlite::Connection;

use crate::DbError;

pub fn run(conn: &Connection) -> Result<(), DbError> {
    // Idempotent CREATE TABLE IF NOT EXISTS schema. Live-row uniqueness is
    // enforced with partial indexes so soft-deleted rows never collide.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS activities (
            id             TEXT PRIMARY KEY,
            title          TEXT NOT NULL,
            description    TEXT NOT NULL DEFAULT '',
            category       TEXT NOT NULL
                               CHECK(category IN (
                                   'innovation', 'competition',
                                   'entrepreneurship_project',
                                   'entrepreneurship_practice', 'paper_patent'
                               )),
            status         TEXT NOT NULL DEFAULT 'draft'
                               CHECK(status IN (
                                   'draft', 'pending_review', 'approved', 'rejected'
                               )),
            owner_id       TEXT NOT NULL,
            start_date     TEXT,
            end_date       TEXT,
            reviewer_id    TEXT,
            review_comment TEXT NOT NULL DEFAULT '',
            reviewed_at    TEXT,
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL,
            deleted_at     TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_activities_owner
            ON activities(owner_id) WHERE deleted_at IS NULL;
        CREATE INDEX IF NOT EXISTS idx_activities_status
            ON activities(status) WHERE deleted_at IS NULL;

        CREATE TABLE IF NOT EXISTS participants (
            id          TEXT PRIMARY KEY,
            activity_id TEXT NOT NULL REFERENCES activities(id),
            user_id     TEXT NOT NULL,
            credits     REAL NOT NULL DEFAULT 0 CHECK(credits >= 0),
            joined_at   TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            deleted_at  TEXT
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_participants_live
            ON participants(activity_id, user_id) WHERE deleted_at IS NULL;

        CREATE TABLE IF NOT EXISTS applications (
            id              TEXT PRIMARY KEY,
            activity_id     TEXT NOT NULL REFERENCES activities(id),
            user_id         TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending'
                                CHECK(status IN ('pending', 'approved', 'rejected')),
            applied_credits REAL NOT NULL DEFAULT 0,
            awarded_credits REAL NOT NULL DEFAULT 0,
            submitted_at    TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            deleted_at      TEXT
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_applications_live
            ON applications(activity_id, user_id) WHERE deleted_at IS NULL;
        CREATE INDEX IF NOT EXISTS idx_applications_user ON applications(user_id);

        CREATE TABLE IF NOT EXISTS attachments (
            id             TEXT PRIMARY KEY,
            activity_id    TEXT NOT NULL REFERENCES activities(id),
            file_name      TEXT NOT NULL,
            original_name  TEXT NOT NULL,
            file_size      INTEGER NOT NULL DEFAULT 0,
            file_type      TEXT NOT NULL DEFAULT '',
            file_kind      TEXT NOT NULL DEFAULT 'other'
                               CHECK(file_kind IN (
                                   'document', 'image', 'video', 'audio',
                                   'archive', 'spreadsheet', 'presentation', 'other'
                               )),
            description    TEXT NOT NULL DEFAULT '',
            digest         TEXT NOT NULL,
            uploaded_by    TEXT NOT NULL,
            uploaded_at    TEXT NOT NULL,
            download_count INTEGER NOT NULL DEFAULT 0,
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL,
            deleted_at     TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_attachments_activity
            ON attachments(activity_id) WHERE deleted_at IS NULL;
        CREATE INDEX IF NOT EXISTS idx_attachments_digest ON attachments(digest);

        CREATE TABLE IF NOT EXISTS innovation_details (
            activity_id TEXT PRIMARY KEY REFERENCES activities(id) ON DELETE CASCADE,
            item        TEXT NOT NULL DEFAULT '',
            company     TEXT NOT NULL DEFAULT '',
            project_no  TEXT NOT NULL DEFAULT '',
            issuer      TEXT NOT NULL DEFAULT '',
            date        TEXT,
            total_hours REAL NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS competition_details (
            activity_id TEXT PRIMARY KEY REFERENCES activities(id) ON DELETE CASCADE,
            level       TEXT NOT NULL DEFAULT '',
            competition TEXT NOT NULL DEFAULT '',
            award_level TEXT NOT NULL DEFAULT '',
            ranking     TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS entrepreneurship_project_details (
            activity_id   TEXT PRIMARY KEY REFERENCES activities(id) ON DELETE CASCADE,
            project_name  TEXT NOT NULL DEFAULT '',
            project_level TEXT NOT NULL DEFAULT '',
            project_rank  TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS entrepreneurship_practice_details (
            activity_id   TEXT PRIMARY KEY REFERENCES activities(id) ON DELETE CASCADE,
            company_name  TEXT NOT NULL DEFAULT '',
            legal_person  TEXT NOT NULL DEFAULT '',
            share_percent REAL NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS paper_patent_details (
            activity_id TEXT PRIMARY KEY REFERENCES activities(id) ON DELETE CASCADE,
            name        TEXT NOT NULL DEFAULT '',
            kind        TEXT NOT NULL DEFAULT '',
            ranking     TEXT NOT NULL DEFAULT ''
        );
        ",
    )?;

    Ok(())
}
