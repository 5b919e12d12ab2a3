use std::path::Path;

use rusqlite::Connection;

use super::DatabaseError;

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

const MIGRATION_V1: &str = "
CREATE TABLE schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE agents (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    criteria_matrix TEXT NOT NULL,
    min_words INTEGER NOT NULL,
    max_words INTEGER NOT NULL,
    stringency TEXT NOT NULL,
    pass_threshold INTEGER NOT NULL,
    verification_prefix INTEGER,
    owner_id TEXT NOT NULL,
    visibility TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE materials (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
    storage_path TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    status TEXT NOT NULL,
    extracted_text TEXT,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    token_count INTEGER NOT NULL DEFAULT 0,
    force_trim INTEGER NOT NULL DEFAULT 0,
    reprocess_requested INTEGER NOT NULL DEFAULT 0,
    trimmed INTEGER NOT NULL DEFAULT 0,
    error_code TEXT,
    error_message TEXT,
    observed_tokens INTEGER,
    token_limit INTEGER,
    uploaded_at TEXT NOT NULL
);
CREATE INDEX idx_materials_agent ON materials(agent_id, status);

CREATE TABLE chunks (
    key TEXT PRIMARY KEY,
    material_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    content TEXT NOT NULL
);
CREATE INDEX idx_chunks_material ON chunks(material_id);

CREATE TABLE access_sessions (
    token TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    accepted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE submissions (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    session_digest TEXT NOT NULL,
    score INTEGER NOT NULL,
    pass_fail TEXT NOT NULL,
    stringency TEXT NOT NULL,
    decision_source TEXT NOT NULL,
    rubric_snapshot TEXT NOT NULL,
    criterion_verdicts TEXT NOT NULL,
    triage TEXT NOT NULL,
    insights TEXT NOT NULL,
    verification_code INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX idx_submissions_agent ON submissions(agent_id);

INSERT INTO schema_version (version) VALUES (1);
";

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![(1, MIGRATION_V1)];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::MigrationFailed {
                    version,
                    reason: e.to_string(),
                })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}
