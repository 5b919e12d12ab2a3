use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

/// Document-store batch ceiling: chunk writes/deletes are committed in
/// independent transactions of at most this many row operations.
pub const MAX_BATCH_OPS: usize = 400;

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ═══════════════════════════════════════════
// Agent Repository
// ═══════════════════════════════════════════

pub fn insert_agent(conn: &Connection, agent: &Agent) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO agents (id, name, criteria_matrix, min_words, max_words, stringency,
         pass_threshold, verification_prefix, owner_id, visibility, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            agent.id.to_string(),
            agent.name,
            serde_json::to_string(&agent.criteria_matrix)?,
            agent.min_words,
            agent.max_words,
            agent.stringency.as_str(),
            agent.pass_threshold,
            agent.verification_prefix,
            agent.owner_id,
            serde_json::to_string(&agent.visibility)?,
            agent.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_agent(conn: &Connection, id: &Uuid) -> Result<Option<Agent>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, criteria_matrix, min_words, max_words, stringency,
         pass_threshold, verification_prefix, owner_id, visibility, created_at
         FROM agents WHERE id = ?1",
    )?;

    let row = stmt
        .query_row(params![id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, u32>(6)?,
                row.get::<_, Option<u32>>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, String>(10)?,
            ))
        })
        .optional()?;

    let Some((id, name, matrix, min_w, max_w, stringency, threshold, prefix, owner, vis, created)) =
        row
    else {
        return Ok(None);
    };

    Ok(Some(Agent {
        id: Uuid::parse_str(&id).map_err(|_| DatabaseError::InvalidEnum {
            field: "agents.id".into(),
            value: id,
        })?,
        name,
        criteria_matrix: serde_json::from_str(&matrix)?,
        min_words: min_w,
        max_words: max_w,
        stringency: Stringency::from_str(&stringency)?,
        pass_threshold: threshold,
        verification_prefix: prefix,
        owner_id: owner,
        visibility: serde_json::from_str(&vis)?,
        created_at: parse_ts(&created),
    }))
}

/// Assign-once verification prefix: the write lands only while the column
/// is still NULL, so concurrent first assignments cannot overwrite each
/// other. Returns the prefix now stored on the agent.
pub fn assign_verification_prefix(
    conn: &Connection,
    agent_id: &Uuid,
    prefix: u32,
) -> Result<u32, DatabaseError> {
    conn.execute(
        "UPDATE agents SET verification_prefix = ?2
         WHERE id = ?1 AND verification_prefix IS NULL",
        params![agent_id.to_string(), prefix],
    )?;

    let stored: Option<u32> = conn.query_row(
        "SELECT verification_prefix FROM agents WHERE id = ?1",
        params![agent_id.to_string()],
        |row| row.get(0),
    )?;

    stored.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "Agent".into(),
        id: agent_id.to_string(),
    })
}

pub fn update_agent_rubric(
    conn: &Connection,
    agent_id: &Uuid,
    criteria: &[Criterion],
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE agents SET criteria_matrix = ?2 WHERE id = ?1",
        params![agent_id.to_string(), serde_json::to_string(criteria)?],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Agent".into(),
            id: agent_id.to_string(),
        });
    }
    Ok(())
}

pub fn delete_agent(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM agents WHERE id = ?1", params![id.to_string()])?;
    Ok(())
}

// ═══════════════════════════════════════════
// Material Repository
// ═══════════════════════════════════════════

pub fn insert_material(conn: &Connection, m: &Material) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO materials (id, agent_id, storage_path, mime_type, status, extracted_text,
         chunk_count, token_count, force_trim, reprocess_requested, trimmed,
         error_code, error_message, observed_tokens, token_limit, uploaded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            m.id.to_string(),
            m.agent_id.to_string(),
            m.storage_path,
            m.mime_type,
            m.status.as_str(),
            m.extracted_text,
            m.chunk_count,
            m.token_count,
            m.force_trim as i32,
            m.reprocess_requested as i32,
            m.trimmed as i32,
            m.error_code.map(|c| c.as_str()),
            m.error_message,
            m.observed_tokens,
            m.token_limit,
            m.uploaded_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn update_material(conn: &Connection, m: &Material) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE materials SET status = ?2, extracted_text = ?3, chunk_count = ?4,
         token_count = ?5, force_trim = ?6, reprocess_requested = ?7, trimmed = ?8,
         error_code = ?9, error_message = ?10, observed_tokens = ?11, token_limit = ?12
         WHERE id = ?1",
        params![
            m.id.to_string(),
            m.status.as_str(),
            m.extracted_text,
            m.chunk_count,
            m.token_count,
            m.force_trim as i32,
            m.reprocess_requested as i32,
            m.trimmed as i32,
            m.error_code.map(|c| c.as_str()),
            m.error_message,
            m.observed_tokens,
            m.token_limit,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Material".into(),
            id: m.id.to_string(),
        });
    }
    Ok(())
}

pub fn get_material(conn: &Connection, id: &Uuid) -> Result<Option<Material>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, agent_id, storage_path, mime_type, status, extracted_text,
         chunk_count, token_count, force_trim, reprocess_requested, trimmed,
         error_code, error_message, observed_tokens, token_limit, uploaded_at
         FROM materials WHERE id = ?1",
    )?;
    let row = stmt
        .query_row(params![id.to_string()], material_from_row)
        .optional()?;
    row.map(finish_material).transpose()
}

/// Most recent `ready` materials for an agent, newest first. Used both for
/// submission context and the retrieval fallback path.
pub fn list_ready_materials(
    conn: &Connection,
    agent_id: &Uuid,
    limit: usize,
) -> Result<Vec<Material>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, agent_id, storage_path, mime_type, status, extracted_text,
         chunk_count, token_count, force_trim, reprocess_requested, trimmed,
         error_code, error_message, observed_tokens, token_limit, uploaded_at
         FROM materials WHERE agent_id = ?1 AND status = 'ready'
         ORDER BY uploaded_at DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![agent_id.to_string(), limit], material_from_row)?;
    rows.map(|r| finish_material(r?)).collect()
}

pub fn delete_material(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM materials WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(())
}

#[allow(clippy::type_complexity)]
fn material_from_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<(
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    u32,
    u32,
    i32,
    i32,
    i32,
    Option<String>,
    Option<String>,
    Option<u32>,
    Option<u32>,
    String,
)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
        row.get(15)?,
    ))
}

#[allow(clippy::type_complexity)]
fn finish_material(
    r: (
        String,
        String,
        String,
        String,
        String,
        Option<String>,
        u32,
        u32,
        i32,
        i32,
        i32,
        Option<String>,
        Option<String>,
        Option<u32>,
        Option<u32>,
        String,
    ),
) -> Result<Material, DatabaseError> {
    let (
        id,
        agent_id,
        storage_path,
        mime_type,
        status,
        extracted_text,
        chunk_count,
        token_count,
        force_trim,
        reprocess_requested,
        trimmed,
        error_code,
        error_message,
        observed_tokens,
        token_limit,
        uploaded_at,
    ) = r;

    Ok(Material {
        id: Uuid::parse_str(&id).map_err(|_| DatabaseError::InvalidEnum {
            field: "materials.id".into(),
            value: id,
        })?,
        agent_id: Uuid::parse_str(&agent_id).map_err(|_| DatabaseError::InvalidEnum {
            field: "materials.agent_id".into(),
            value: agent_id,
        })?,
        storage_path,
        mime_type,
        status: MaterialStatus::from_str(&status)?,
        extracted_text,
        chunk_count,
        token_count,
        force_trim: force_trim != 0,
        reprocess_requested: reprocess_requested != 0,
        trimmed: trimmed != 0,
        error_code: error_code
            .as_deref()
            .map(MaterialErrorCode::from_str)
            .transpose()?,
        error_message,
        observed_tokens,
        token_limit,
        uploaded_at: parse_ts(&uploaded_at),
    })
}

// ═══════════════════════════════════════════
// Chunk Store
// ═══════════════════════════════════════════

/// Replace a material's chunks. Writes land in independent transactions of
/// at most [`MAX_BATCH_OPS`] rows; a failure mid-sequence leaves earlier
/// batches committed and re-application is the safety net.
pub fn replace_chunks(
    conn: &Connection,
    material_id: &Uuid,
    chunks: &[Chunk],
) -> Result<usize, DatabaseError> {
    delete_chunks_for_material(conn, material_id)?;

    for batch in chunks.chunks(MAX_BATCH_OPS) {
        conn.execute_batch("BEGIN")?;
        let result: Result<(), DatabaseError> = batch.iter().try_for_each(|chunk| {
            conn.execute(
                "INSERT OR REPLACE INTO chunks (key, material_id, chunk_index, content)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    chunk.key(),
                    chunk.material_id.to_string(),
                    chunk.index,
                    chunk.content,
                ],
            )?;
            Ok(())
        });
        match result {
            Ok(()) => conn.execute_batch("COMMIT")?,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(e);
            }
        }
    }

    Ok(chunks.len())
}

pub fn get_chunks_by_keys(
    conn: &Connection,
    keys: &[String],
) -> Result<Vec<Chunk>, DatabaseError> {
    let mut out = Vec::with_capacity(keys.len());
    let mut stmt = conn.prepare(
        "SELECT material_id, chunk_index, content FROM chunks WHERE key = ?1",
    )?;
    for key in keys {
        let row = stmt
            .query_row(params![key], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .optional()?;
        if let Some((material_id, index, content)) = row {
            out.push(Chunk {
                material_id: Uuid::parse_str(&material_id).map_err(|_| {
                    DatabaseError::InvalidEnum {
                        field: "chunks.material_id".into(),
                        value: material_id,
                    }
                })?,
                index,
                content,
            });
        }
    }
    Ok(out)
}

pub fn list_chunk_keys(
    conn: &Connection,
    material_id: &Uuid,
) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT key FROM chunks WHERE material_id = ?1 ORDER BY chunk_index",
    )?;
    let rows = stmt.query_map(params![material_id.to_string()], |row| {
        row.get::<_, String>(0)
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Delete a material's chunk rows in bounded batches.
pub fn delete_chunks_for_material(
    conn: &Connection,
    material_id: &Uuid,
) -> Result<usize, DatabaseError> {
    let keys = list_chunk_keys(conn, material_id)?;
    let mut deleted = 0usize;
    for batch in keys.chunks(MAX_BATCH_OPS) {
        conn.execute_batch("BEGIN")?;
        for key in batch {
            deleted += conn.execute("DELETE FROM chunks WHERE key = ?1", params![key])?;
        }
        conn.execute_batch("COMMIT")?;
    }
    Ok(deleted)
}

// ═══════════════════════════════════════════
// Access Sessions
// ═══════════════════════════════════════════

pub fn insert_session(conn: &Connection, s: &AccessSession) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO access_sessions (token, agent_id, accepted, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            s.token,
            s.agent_id.to_string(),
            s.accepted as i32,
            s.created_at.to_rfc3339(),
            s.expires_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_session(
    conn: &Connection,
    token: &str,
) -> Result<Option<AccessSession>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT token, agent_id, accepted, created_at, expires_at
         FROM access_sessions WHERE token = ?1",
    )?;
    let row = stmt
        .query_row(params![token], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })
        .optional()?;

    let Some((token, agent_id, accepted, created_at, expires_at)) = row else {
        return Ok(None);
    };
    Ok(Some(AccessSession {
        token,
        agent_id: Uuid::parse_str(&agent_id).map_err(|_| DatabaseError::InvalidEnum {
            field: "access_sessions.agent_id".into(),
            value: agent_id,
        })?,
        accepted: accepted != 0,
        created_at: parse_ts(&created_at),
        expires_at: parse_ts(&expires_at),
    }))
}

pub fn accept_session(conn: &Connection, token: &str) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE access_sessions SET accepted = 1 WHERE token = ?1",
        params![token],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "AccessSession".into(),
            id: token.into(),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════
// Submissions (append-only)
// ═══════════════════════════════════════════

pub fn insert_submission(conn: &Connection, s: &Submission) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO submissions (id, agent_id, session_digest, score, pass_fail, stringency,
         decision_source, rubric_snapshot, criterion_verdicts, triage, insights,
         verification_code, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            s.id.to_string(),
            s.agent_id.to_string(),
            s.session_digest,
            s.score,
            s.pass_fail.as_str(),
            s.stringency.as_str(),
            s.decision_source.as_str(),
            serde_json::to_string(&s.rubric_snapshot)?,
            serde_json::to_string(&s.criterion_verdicts)?,
            serde_json::to_string(&s.triage)?,
            serde_json::to_string(&s.insights)?,
            s.verification_code,
            s.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_submission(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<Submission>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, agent_id, session_digest, score, pass_fail, stringency, decision_source,
         rubric_snapshot, criterion_verdicts, triage, insights, verification_code, created_at
         FROM submissions WHERE id = ?1",
    )?;
    let row = stmt
        .query_row(params![id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, String>(10)?,
                row.get::<_, i64>(11)?,
                row.get::<_, String>(12)?,
            ))
        })
        .optional()?;

    let Some((
        id,
        agent_id,
        session_digest,
        score,
        pass_fail,
        stringency,
        decision_source,
        rubric,
        verdicts,
        triage,
        insights,
        verification_code,
        created_at,
    )) = row
    else {
        return Ok(None);
    };

    Ok(Some(Submission {
        id: Uuid::parse_str(&id).map_err(|_| DatabaseError::InvalidEnum {
            field: "submissions.id".into(),
            value: id,
        })?,
        agent_id: Uuid::parse_str(&agent_id).map_err(|_| DatabaseError::InvalidEnum {
            field: "submissions.agent_id".into(),
            value: agent_id,
        })?,
        session_digest,
        score,
        pass_fail: PassFail::from_str(&pass_fail)?,
        stringency: Stringency::from_str(&stringency)?,
        decision_source: DecisionSource::from_str(&decision_source)?,
        rubric_snapshot: serde_json::from_str(&rubric)?,
        criterion_verdicts: serde_json::from_str(&verdicts)?,
        triage: serde_json::from_str(&triage)?,
        insights: serde_json::from_str(&insights)?,
        verification_code,
        created_at: parse_ts(&created_at),
    }))
}

/// Bulk delete for the owning teacher. Returns rows removed.
pub fn delete_submissions_for_agent(
    conn: &Connection,
    agent_id: &Uuid,
) -> Result<usize, DatabaseError> {
    let n = conn.execute(
        "DELETE FROM submissions WHERE agent_id = ?1",
        params![agent_id.to_string()],
    )?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{ReviewTrigger, Stringency};

    pub(crate) fn test_agent() -> Agent {
        Agent {
            id: Uuid::new_v4(),
            name: "Photosynthesis essay".into(),
            criteria_matrix: vec![Criterion {
                id: "c1".into(),
                name: "Mechanism".into(),
                description: "Explains light-dependent reactions".into(),
                indicator: "Names chlorophyll and ATP production".into(),
                mandatory: true,
                bloom_level: "understand".into(),
                bloom_index: 2,
                reliability: 0.9,
                weight: 1.0,
            }],
            min_words: 100,
            max_words: 600,
            stringency: Stringency::Standard,
            pass_threshold: 70_000,
            verification_prefix: None,
            owner_id: "teacher@example.edu".into(),
            visibility: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn agent_round_trip() {
        let conn = open_memory_database().unwrap();
        let agent = test_agent();
        insert_agent(&conn, &agent).unwrap();

        let loaded = get_agent(&conn, &agent.id).unwrap().unwrap();
        assert_eq!(loaded.name, agent.name);
        assert_eq!(loaded.criteria_matrix.len(), 1);
        assert_eq!(loaded.criteria_matrix[0].id, "c1");
        assert_eq!(loaded.pass_threshold, 70_000);
        assert!(loaded.verification_prefix.is_none());
    }

    #[test]
    fn prefix_assignment_is_write_once() {
        let conn = open_memory_database().unwrap();
        let agent = test_agent();
        insert_agent(&conn, &agent).unwrap();

        let first = assign_verification_prefix(&conn, &agent.id, 450).unwrap();
        assert_eq!(first, 450);

        // A later assignment attempt must not overwrite the stored prefix.
        let second = assign_verification_prefix(&conn, &agent.id, 777).unwrap();
        assert_eq!(second, 450);
    }

    #[test]
    fn deleting_agent_cascades_to_materials() {
        let conn = open_memory_database().unwrap();
        let agent = test_agent();
        insert_agent(&conn, &agent).unwrap();

        let material = Material::new(agent.id, "blobs/m1", "text/plain");
        insert_material(&conn, &material).unwrap();

        delete_agent(&conn, &agent.id).unwrap();
        assert!(get_material(&conn, &material.id).unwrap().is_none());
    }

    #[test]
    fn material_round_trip_with_error_fields() {
        let conn = open_memory_database().unwrap();
        let agent = test_agent();
        insert_agent(&conn, &agent).unwrap();

        let mut m = Material::new(agent.id, "blobs/m2", "application/pdf");
        insert_material(&conn, &m).unwrap();

        m.status = MaterialStatus::NeedsReview;
        m.error_code = Some(MaterialErrorCode::TokenLimit);
        m.error_message = Some("token count 12000 exceeds limit 8192".into());
        m.observed_tokens = Some(12_000);
        m.token_limit = Some(8_192);
        update_material(&conn, &m).unwrap();

        let loaded = get_material(&conn, &m.id).unwrap().unwrap();
        assert_eq!(loaded.status, MaterialStatus::NeedsReview);
        assert_eq!(loaded.error_code, Some(MaterialErrorCode::TokenLimit));
        assert_eq!(loaded.observed_tokens, Some(12_000));
    }

    #[test]
    fn ready_materials_newest_first_with_limit() {
        let conn = open_memory_database().unwrap();
        let agent = test_agent();
        insert_agent(&conn, &agent).unwrap();

        for i in 0..8 {
            let mut m = Material::new(agent.id, &format!("blobs/{i}"), "text/plain");
            m.status = MaterialStatus::Ready;
            m.uploaded_at = Utc::now() + chrono::Duration::seconds(i);
            insert_material(&conn, &m).unwrap();
        }

        let ready = list_ready_materials(&conn, &agent.id, 6).unwrap();
        assert_eq!(ready.len(), 6);
        assert!(ready[0].uploaded_at >= ready[5].uploaded_at);
    }

    #[test]
    fn chunk_replace_and_lookup() {
        let conn = open_memory_database().unwrap();
        let material_id = Uuid::new_v4();
        let chunks: Vec<Chunk> = (0..5)
            .map(|i| Chunk {
                material_id,
                index: i,
                content: format!("chunk {i}"),
            })
            .collect();

        let written = replace_chunks(&conn, &material_id, &chunks).unwrap();
        assert_eq!(written, 5);

        let keys = list_chunk_keys(&conn, &material_id).unwrap();
        assert_eq!(keys.len(), 5);

        let loaded = get_chunks_by_keys(&conn, &keys[..2]).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].content, "chunk 0");

        // Replacing again must not duplicate rows.
        replace_chunks(&conn, &material_id, &chunks).unwrap();
        assert_eq!(list_chunk_keys(&conn, &material_id).unwrap().len(), 5);
    }

    #[test]
    fn chunk_writes_split_into_batches() {
        let conn = open_memory_database().unwrap();
        let material_id = Uuid::new_v4();
        let chunks: Vec<Chunk> = (0..(MAX_BATCH_OPS as u32 + 50))
            .map(|i| Chunk {
                material_id,
                index: i,
                content: "x".into(),
            })
            .collect();

        let written = replace_chunks(&conn, &material_id, &chunks).unwrap();
        assert_eq!(written, MAX_BATCH_OPS + 50);

        let deleted = delete_chunks_for_material(&conn, &material_id).unwrap();
        assert_eq!(deleted, MAX_BATCH_OPS + 50);
    }

    #[test]
    fn session_round_trip_and_accept() {
        let conn = open_memory_database().unwrap();
        let session = AccessSession::create(Uuid::new_v4());
        insert_session(&conn, &session).unwrap();

        let loaded = get_session(&conn, &session.token).unwrap().unwrap();
        assert!(!loaded.accepted);

        accept_session(&conn, &session.token).unwrap();
        let loaded = get_session(&conn, &session.token).unwrap().unwrap();
        assert!(loaded.accepted);
    }

    #[test]
    fn submission_round_trip() {
        let conn = open_memory_database().unwrap();
        let agent = test_agent();

        let submission = Submission {
            id: Uuid::new_v4(),
            agent_id: agent.id,
            session_digest: "abcd1234abcd1234".into(),
            score: 82_500,
            pass_fail: PassFail::G,
            stringency: Stringency::Standard,
            decision_source: DecisionSource::ModelsAb,
            rubric_snapshot: agent.criteria_matrix.clone(),
            criterion_verdicts: vec![CriterionVerdict {
                criterion_id: "c1".into(),
                met: true,
                score: 82.5,
                evidence_quote: "chlorophyll absorbs light to drive ATP synthesis".into(),
                evidence_valid: true,
                self_reflection: 90.0,
            }],
            triage: TriageSignals {
                disagreement_score: 0.0,
                boundary_score: 0.0,
                evidence_gap_score: 0.0,
                self_reflection_score: 0.1,
                difficulty_score: 0.015,
                is_escalated: false,
                review_trigger: ReviewTrigger::None,
            },
            insights: TeacherInsights::default(),
            verification_code: 823_082_517,
            created_at: Utc::now(),
        };
        insert_submission(&conn, &submission).unwrap();

        let loaded = get_submission(&conn, &submission.id).unwrap().unwrap();
        assert_eq!(loaded.score, 82_500);
        assert_eq!(loaded.rubric_snapshot.len(), 1);
        assert_eq!(loaded.criterion_verdicts[0].criterion_id, "c1");

        assert_eq!(delete_submissions_for_agent(&conn, &agent.id).unwrap(), 1);
    }
}
