//! Dual-store write coordination.
//!
//! The relational row is the durable source of truth and always lands
//! first. The vector write is second and best-effort: when it fails, the
//! row stays committed and is flagged `vector_pending` instead of being
//! rolled back. The next sync (or `embed pending`) recovers the vector.
//! Rows are never deleted here; a course that disappears from a listing
//! simply stops being updated.

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::warn;

use crate::dedup::{ExistingCourse, Resolution};
use crate::embedding::vec_to_blob;
use crate::models::{CommitResult, CourseRecord, Decision};

/// Apply one dedup resolution to both stores.
pub async fn apply(
    pool: &SqlitePool,
    record: &CourseRecord,
    resolution: &Resolution,
    model: &str,
    content_hash: &str,
    vector: &[f32],
) -> Result<CommitResult> {
    match resolution.decision {
        Decision::New | Decision::UpdateInPlace => {
            upsert_course(
                pool,
                record,
                resolution.existing.as_ref(),
                model,
                content_hash,
                vector,
            )
            .await
        }
        Decision::SkipDuplicate => {
            merge_semester_metadata(pool, record, resolution.existing.as_ref()).await
        }
    }
}

/// Write the full row, then the vector.
///
/// The row goes in flagged `vector_pending = 1`; only a successful vector
/// write clears the flag, so the flag is truthful at every point in the
/// sequence.
async fn upsert_course(
    pool: &SqlitePool,
    record: &CourseRecord,
    existing: Option<&ExistingCourse>,
    model: &str,
    content_hash: &str,
    vector: &[f32],
) -> Result<CommitResult> {
    let now = Utc::now().timestamp();
    let (offered, semester_data) =
        merged_semester_state(existing, &record.semester, record.instructor.as_deref());

    sqlx::query(
        r#"
        INSERT INTO courses (
            course_code, title, department, level, credits, ects, hours,
            catalog_description, learning_outcomes, assessment_methods, textbooks,
            prerequisites, corequisites, instructor, syllabus_url, syllabus_pdf_url,
            offered_semesters, semester_data, content_hash, vector_pending, last_updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
        ON CONFLICT(course_code) DO UPDATE SET
            title = excluded.title,
            department = excluded.department,
            level = excluded.level,
            credits = excluded.credits,
            ects = excluded.ects,
            hours = excluded.hours,
            catalog_description = excluded.catalog_description,
            learning_outcomes = excluded.learning_outcomes,
            assessment_methods = excluded.assessment_methods,
            textbooks = excluded.textbooks,
            prerequisites = excluded.prerequisites,
            corequisites = excluded.corequisites,
            instructor = excluded.instructor,
            syllabus_url = excluded.syllabus_url,
            syllabus_pdf_url = excluded.syllabus_pdf_url,
            offered_semesters = excluded.offered_semesters,
            semester_data = excluded.semester_data,
            content_hash = excluded.content_hash,
            vector_pending = excluded.vector_pending,
            last_updated_at = excluded.last_updated_at
        "#,
    )
    .bind(&record.course_code)
    .bind(&record.title)
    .bind(&record.department)
    .bind(&record.level)
    .bind(record.credits)
    .bind(record.ects)
    .bind(&record.hours)
    .bind(&record.catalog_description)
    .bind(&record.learning_outcomes)
    .bind(&record.assessment_methods)
    .bind(&record.textbooks)
    .bind(serde_json::to_string(&record.prerequisites)?)
    .bind(serde_json::to_string(&record.corequisites)?)
    .bind(&record.instructor)
    .bind(&record.syllabus_url)
    .bind(&record.syllabus_pdf_url)
    .bind(serde_json::to_string(&offered)?)
    .bind(semester_data.to_string())
    .bind(content_hash)
    .bind(now)
    .execute(pool)
    .await?;

    match upsert_vector(pool, &record.course_code, model, content_hash, vector).await {
        Ok(()) => {
            sqlx::query("UPDATE courses SET vector_pending = 0 WHERE course_code = ?")
                .bind(&record.course_code)
                .execute(pool)
                .await?;
            Ok(CommitResult::Committed)
        }
        Err(e) => {
            warn!(
                "vector write failed for {}, row kept with vector_pending: {e:#}",
                record.course_code
            );
            Ok(CommitResult::VectorPending)
        }
    }
}

/// Insert or replace the embedding for one course.
pub async fn upsert_vector(
    pool: &SqlitePool,
    course_code: &str,
    model: &str,
    content_hash: &str,
    vector: &[f32],
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO course_vectors (course_code, model, dims, hash, embedding, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(course_code) DO UPDATE SET
            model = excluded.model,
            dims = excluded.dims,
            hash = excluded.hash,
            embedding = excluded.embedding,
            created_at = excluded.created_at
        "#,
    )
    .bind(course_code)
    .bind(model)
    .bind(vector.len() as i64)
    .bind(content_hash)
    .bind(vec_to_blob(vector))
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

/// Duplicate content: the only thing worth recording is that the course was
/// sighted in a semester the stored row does not know about yet.
async fn merge_semester_metadata(
    pool: &SqlitePool,
    record: &CourseRecord,
    existing: Option<&ExistingCourse>,
) -> Result<CommitResult> {
    let Some(existing) = existing else {
        // SkipDuplicate is only ever decided against an existing row.
        return Ok(CommitResult::Unchanged);
    };

    if existing
        .offered_semesters
        .iter()
        .any(|s| s == &record.semester)
    {
        return Ok(CommitResult::Unchanged);
    }

    let (offered, semester_data) =
        merged_semester_state(Some(existing), &record.semester, record.instructor.as_deref());

    sqlx::query(
        "UPDATE courses SET offered_semesters = ?, semester_data = ?, last_updated_at = ? \
         WHERE course_code = ?",
    )
    .bind(serde_json::to_string(&offered)?)
    .bind(semester_data.to_string())
    .bind(Utc::now().timestamp())
    .bind(&record.course_code)
    .execute(pool)
    .await?;

    Ok(CommitResult::MetadataMerged)
}

/// Fold one sighting into the accumulated semester state: the semester tag
/// joins the offered set (once), and per-semester details are recorded
/// under that tag.
fn merged_semester_state(
    existing: Option<&ExistingCourse>,
    semester: &str,
    instructor: Option<&str>,
) -> (Vec<String>, serde_json::Value) {
    let mut offered: Vec<String> = existing
        .map(|e| e.offered_semesters.clone())
        .unwrap_or_default();
    if !offered.iter().any(|s| s == semester) {
        offered.push(semester.to_string());
        offered.sort();
    }

    let mut data = existing
        .map(|e| e.semester_data.clone())
        .unwrap_or_else(|| serde_json::json!({}));
    let mut entry = serde_json::Map::new();
    if let Some(name) = instructor {
        entry.insert("instructor".to_string(), serde_json::json!(name));
    }
    if let Some(obj) = data.as_object_mut() {
        obj.insert(semester.to_string(), serde_json::Value::Object(entry));
    }

    (offered, data)
}
