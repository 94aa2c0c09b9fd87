use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Relational store: one row per course, keyed by canonical code.
    // List-valued fields (prerequisites, offered_semesters, ...) are stored
    // as JSON text.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS courses (
            course_code TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            department TEXT NOT NULL,
            level TEXT,
            credits INTEGER,
            ects INTEGER,
            hours TEXT,
            catalog_description TEXT,
            learning_outcomes TEXT,
            assessment_methods TEXT,
            textbooks TEXT,
            prerequisites TEXT NOT NULL DEFAULT '[]',
            corequisites TEXT NOT NULL DEFAULT '[]',
            instructor TEXT,
            syllabus_url TEXT,
            syllabus_pdf_url TEXT,
            offered_semesters TEXT NOT NULL DEFAULT '[]',
            semester_data TEXT NOT NULL DEFAULT '{}',
            content_hash TEXT NOT NULL,
            vector_pending INTEGER NOT NULL DEFAULT 0,
            last_updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Vector store: at most one embedding per course. `hash` records the
    // content hash of the text that was embedded, so staleness is detectable.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_vectors (
            course_code TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (course_code) REFERENCES courses(course_code)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Side channel for per-course failures. `raw_body` keeps the fetched
    // page when extraction failed, for manual review.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scrape_failures (
            id TEXT PRIMARY KEY,
            run_id TEXT NOT NULL,
            department TEXT NOT NULL,
            semester TEXT NOT NULL,
            course TEXT,
            url TEXT NOT NULL,
            reason TEXT NOT NULL,
            raw_body TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_courses_department ON courses(department)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_courses_updated_at ON courses(last_updated_at DESC)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_courses_pending ON courses(vector_pending)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scrape_failures_run ON scrape_failures(run_id)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
