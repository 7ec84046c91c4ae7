use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE polls (
                id          TEXT PRIMARY KEY,
                question    TEXT NOT NULL,
                created_by  TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_polls_creator
                ON polls(created_by, created_at);

            CREATE TABLE poll_options (
                poll_id     TEXT NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
                position    INTEGER NOT NULL,
                text        TEXT NOT NULL,
                votes       INTEGER NOT NULL DEFAULT 0 CHECK (votes >= 0),
                PRIMARY KEY (poll_id, position)
            );

            -- One row per accepted authenticated vote.
            CREATE TABLE poll_user_votes (
                poll_id     TEXT NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id),
                PRIMARY KEY (poll_id, user_id)
            );

            -- One row per accepted anonymous vote, keyed by origin fingerprint.
            CREATE TABLE poll_anon_votes (
                poll_id     TEXT NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
                fingerprint TEXT NOT NULL,
                PRIMARY KEY (poll_id, fingerprint)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
