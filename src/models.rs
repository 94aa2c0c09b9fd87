//! Core data models used throughout Catalog Harvest.
//!
//! These types represent the listing references, raw pages, course records,
//! and batch outcomes that flow through the fetch, extraction, dedup, and
//! storage pipeline.

use chrono::{DateTime, Utc};

/// One entry on a department course-listing page, before its detail page
/// has been fetched.
#[derive(Debug, Clone)]
pub struct CourseListingRef {
    pub department: String,
    pub semester: String,
    /// Canonical course code parsed from the listing link text.
    pub course_code: String,
    /// Absolute URL of the course detail page.
    pub url: String,
}

/// Raw detail page as fetched, prior to extraction.
///
/// Transient: discarded after extraction, except that a page that fails
/// extraction has its body persisted to the `scrape_failures` side channel
/// for manual review.
#[derive(Debug, Clone)]
pub struct RawCoursePage {
    pub url: String,
    pub department: String,
    pub semester: String,
    pub fetched_at: DateTime<Utc>,
    pub body: String,
}

/// Normalized course record extracted from one scrape sighting.
///
/// `semester` is the tag of the batch this sighting came from; the
/// accumulated `offered_semesters` set lives on the stored row and is merged
/// by the store coordinator.
#[derive(Debug, Clone)]
pub struct CourseRecord {
    /// Canonical "DEPT NUM" form, e.g. "CMPE 211". The unique key.
    pub course_code: String,
    pub title: String,
    pub department: String,
    pub semester: String,
    pub level: Option<String>,
    pub credits: Option<i64>,
    pub ects: Option<i64>,
    pub hours: Option<String>,
    pub catalog_description: Option<String>,
    pub learning_outcomes: Option<String>,
    pub assessment_methods: Option<String>,
    pub textbooks: Option<String>,
    /// Recognized course codes only; unrecognized clauses are discarded.
    pub prerequisites: Vec<String>,
    pub corequisites: Vec<String>,
    pub instructor: Option<String>,
    pub syllabus_url: Option<String>,
    pub syllabus_pdf_url: Option<String>,
}

/// Extraction failure value returned to the batch. Never an error escaping
/// it: the batch records the failure and continues with the next course.
#[derive(Debug, Clone)]
pub struct ExtractionFailure {
    pub reason: String,
}

impl std::fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

/// Outcome of the dedup comparison for one extracted course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No stored row for this course code.
    New,
    /// Stored content materially changed (or the stored vector is missing);
    /// replace the row and the vector.
    UpdateInPlace,
    /// Similarity at or above the threshold; content is unchanged.
    SkipDuplicate,
}

/// What the store coordinator actually did for one course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitResult {
    /// Relational row upserted and vector written.
    Committed,
    /// Relational row upserted; the vector write failed and the row is
    /// flagged `vector_pending` for the next cycle.
    VectorPending,
    /// Metadata-only merge: a new semester tag on otherwise unchanged
    /// content. The vector store is untouched.
    MetadataMerged,
    /// Duplicate with an already-recorded semester; nothing written.
    Unchanged,
}

/// Per-course failure entry in a batch report.
#[derive(Debug, Clone)]
pub struct CourseFailure {
    /// Course code when known, otherwise the detail URL.
    pub course: String,
    pub reason: String,
}

/// Summary of one (department, semester) batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub department: String,
    pub semester: String,
    pub fetched: u64,
    pub extracted: u64,
    pub new: u64,
    pub updated: u64,
    pub skipped_duplicate: u64,
    pub failed: u64,
    pub vectors_written: u64,
    pub vectors_pending: u64,
    pub failures: Vec<CourseFailure>,
}

/// A ranked hit returned by course search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub course_code: String,
    pub title: String,
    pub department: String,
    /// Cosine similarity between the query vector and the stored vector.
    pub score: f32,
    pub excerpt: String,
}
