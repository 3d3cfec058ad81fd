use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::{InputMode, PredictionOutput, Submission};

const SELECT_COLUMNS: &str = "id, owner_id, mode, raw_input, image_url, image_storage_id,
         original_name, mime_type, size_bytes, prediction_output, created_at";

/// Persist a new submission. `raw_input` is stored as it will be read back;
/// it is never rewritten after this insert.
pub fn insert_submission(conn: &Connection, s: &Submission) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO submissions (id, owner_id, mode, raw_input, image_url, image_storage_id,
         original_name, mime_type, size_bytes, prediction_output, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            s.id,
            s.owner_id,
            s.mode.as_str(),
            serde_json::to_string(&s.raw_input)?,
            s.image_url,
            s.image_storage_id,
            s.original_name,
            s.mime_type,
            s.size_bytes,
            s.prediction_output
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            s.created_at_str(),
        ],
    )?;
    Ok(())
}

/// Attach the enriched prediction output to an existing submission. This is
/// the record's single post-creation mutation; raw input stays untouched.
pub fn attach_prediction(
    conn: &Connection,
    id: &str,
    output: &PredictionOutput,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE submissions SET prediction_output = ?1 WHERE id = ?2",
        params![serde_json::to_string(output)?, id],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Submission".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn get_submission(conn: &Connection, id: &str) -> Result<Submission, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM submissions WHERE id = ?1"
    ))?;
    let mut rows = stmt.query_map(params![id], |row| Ok(row_to_parts(row)))?;
    match rows.next() {
        Some(row) => submission_from_parts(row??),
        None => Err(DatabaseError::NotFound {
            entity_type: "Submission".into(),
            id: id.to_string(),
        }),
    }
}

/// All submissions of one mode for an owner, newest first.
pub fn list_by_owner(
    conn: &Connection,
    owner_id: &str,
    mode: InputMode,
) -> Result<Vec<Submission>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM submissions
         WHERE owner_id = ?1 AND mode = ?2
         ORDER BY created_at DESC"
    ))?;

    let rows = stmt.query_map(params![owner_id, mode.as_str()], |row| Ok(row_to_parts(row)))?;

    let mut submissions = Vec::new();
    for row in rows {
        submissions.push(submission_from_parts(row??)?);
    }
    Ok(submissions)
}

// Internal row type, decoded in two steps so JSON errors are not conflated
// with SQLite errors.
struct SubmissionRow {
    id: String,
    owner_id: String,
    mode: String,
    raw_input: String,
    image_url: Option<String>,
    image_storage_id: Option<String>,
    original_name: Option<String>,
    mime_type: Option<String>,
    size_bytes: Option<i64>,
    prediction_output: Option<String>,
    created_at: String,
}

fn row_to_parts(row: &rusqlite::Row<'_>) -> Result<SubmissionRow, rusqlite::Error> {
    Ok(SubmissionRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        mode: row.get(2)?,
        raw_input: row.get(3)?,
        image_url: row.get(4)?,
        image_storage_id: row.get(5)?,
        original_name: row.get(6)?,
        mime_type: row.get(7)?,
        size_bytes: row.get(8)?,
        prediction_output: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn submission_from_parts(row: SubmissionRow) -> Result<Submission, DatabaseError> {
    let mode = InputMode::from_str(&row.mode).map_err(|_| DatabaseError::NotFound {
        entity_type: "InputMode".into(),
        id: row.mode.clone(),
    })?;
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default();

    Ok(Submission {
        id: row.id,
        owner_id: row.owner_id,
        mode,
        raw_input: serde_json::from_str(&row.raw_input)?,
        image_url: row.image_url,
        image_storage_id: row.image_storage_id,
        original_name: row.original_name,
        mime_type: row.mime_type,
        size_bytes: row.size_bytes,
        prediction_output: row
            .prediction_output
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        created_at,
    })
}
