//! Near-duplicate detection against stored course vectors.
//!
//! The canonical course code is the only correlation key: a fresh record is
//! compared against the stored vector for the same code, never against the
//! whole corpus. Cosine similarity between the fresh and stored embedding
//! then decides whether the sighting is new content or a re-scrape of what
//! is already stored.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity};
use crate::models::Decision;

/// Dedup outcome for one course: the decision plus the stored row state the
/// store coordinator needs for merging.
#[derive(Debug)]
pub struct Resolution {
    pub decision: Decision,
    /// Similarity against the stored vector, when one existed.
    pub similarity: Option<f32>,
    pub existing: Option<ExistingCourse>,
}

/// Merge-relevant state of an already-stored row.
#[derive(Debug, Clone)]
pub struct ExistingCourse {
    pub offered_semesters: Vec<String>,
    pub semester_data: serde_json::Value,
}

/// Compare a freshly embedded course against its stored version.
///
/// No stored row means [`Decision::New`]. A stored row without a vector
/// (a previous run left it `vector_pending`) forces
/// [`Decision::UpdateInPlace`] so the vector gets written this cycle.
pub async fn resolve(
    pool: &SqlitePool,
    course_code: &str,
    vector: &[f32],
    threshold: f32,
) -> Result<Resolution> {
    let row = sqlx::query("SELECT offered_semesters, semester_data FROM courses WHERE course_code = ?")
        .bind(course_code)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(Resolution {
            decision: Decision::New,
            similarity: None,
            existing: None,
        });
    };

    let offered_json: String = row.get("offered_semesters");
    let semester_data_json: String = row.get("semester_data");
    let existing = ExistingCourse {
        offered_semesters: serde_json::from_str(&offered_json).unwrap_or_default(),
        semester_data: serde_json::from_str(&semester_data_json)
            .unwrap_or_else(|_| serde_json::json!({})),
    };

    let stored_blob: Option<Vec<u8>> =
        sqlx::query_scalar("SELECT embedding FROM course_vectors WHERE course_code = ?")
            .bind(course_code)
            .fetch_optional(pool)
            .await?;

    let Some(blob) = stored_blob else {
        return Ok(Resolution {
            decision: Decision::UpdateInPlace,
            similarity: None,
            existing: Some(existing),
        });
    };

    let stored_vec = blob_to_vec(&blob);
    let similarity = cosine_similarity(vector, &stored_vec);
    Ok(Resolution {
        decision: classify_similarity(similarity, threshold),
        similarity: Some(similarity),
        existing: Some(existing),
    })
}

/// Threshold comparison for an existing row. Inclusive: a similarity exactly
/// at the threshold counts as a duplicate.
pub fn classify_similarity(similarity: f32, threshold: f32) -> Decision {
    if similarity >= threshold {
        Decision::SkipDuplicate
    } else {
        Decision::UpdateInPlace
    }
}
