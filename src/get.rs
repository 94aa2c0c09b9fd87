//! Course retrieval by code.
//!
//! Fetches one stored course with its semester history and vector status.
//! Backs the `harvest course` CLI command.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::extract;

#[derive(Debug, Clone, Serialize)]
pub struct CourseResponse {
    pub course_code: String,
    pub title: String,
    pub department: String,
    pub level: Option<String>,
    pub credits: Option<i64>,
    pub ects: Option<i64>,
    pub hours: Option<String>,
    pub catalog_description: Option<String>,
    pub learning_outcomes: Option<String>,
    pub assessment_methods: Option<String>,
    pub textbooks: Option<String>,
    pub prerequisites: Vec<String>,
    pub corequisites: Vec<String>,
    pub instructor: Option<String>,
    pub syllabus_url: Option<String>,
    pub syllabus_pdf_url: Option<String>,
    pub offered_semesters: Vec<String>,
    pub semester_data: serde_json::Value,
    pub vector: Option<VectorStatus>,
    pub vector_pending: bool,
    pub updated_at: String, // ISO8601
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorStatus {
    pub model: String,
    pub dims: i64,
}

/// Core lookup returning structured data. The code argument is normalized
/// first, so "cmpe211" and "CMPE-211" both resolve to "CMPE 211".
pub async fn get_course(config: &Config, code: &str) -> Result<CourseResponse> {
    let Some(course_code) = extract::normalize_course_code(code) else {
        bail!("not a recognizable course code: '{}'", code);
    };

    let pool = db::connect(config).await?;

    let row = sqlx::query(
        r#"
        SELECT course_code, title, department, level, credits, ects, hours,
               catalog_description, learning_outcomes, assessment_methods,
               textbooks, prerequisites, corequisites, instructor,
               syllabus_url, syllabus_pdf_url, offered_semesters,
               semester_data, vector_pending, last_updated_at
        FROM courses WHERE course_code = ?
        "#,
    )
    .bind(&course_code)
    .fetch_optional(&pool)
    .await?;

    let row = match row {
        Some(row) => row,
        None => {
            pool.close().await;
            bail!("course not found: {}", course_code);
        }
    };

    let vector_row = sqlx::query("SELECT model, dims FROM course_vectors WHERE course_code = ?")
        .bind(&course_code)
        .fetch_optional(&pool)
        .await?;
    pool.close().await;

    let prerequisites: Vec<String> =
        serde_json::from_str(row.get::<String, _>("prerequisites").as_str()).unwrap_or_default();
    let corequisites: Vec<String> =
        serde_json::from_str(row.get::<String, _>("corequisites").as_str()).unwrap_or_default();
    let offered_semesters: Vec<String> =
        serde_json::from_str(row.get::<String, _>("offered_semesters").as_str()).unwrap_or_default();
    let semester_data: serde_json::Value =
        serde_json::from_str(row.get::<String, _>("semester_data").as_str())
            .unwrap_or(serde_json::json!({}));

    let vector_pending: i64 = row.get("vector_pending");
    let updated_at: i64 = row.get("last_updated_at");

    Ok(CourseResponse {
        course_code: row.get("course_code"),
        title: row.get("title"),
        department: row.get("department"),
        level: row.get("level"),
        credits: row.get("credits"),
        ects: row.get("ects"),
        hours: row.get("hours"),
        catalog_description: row.get("catalog_description"),
        learning_outcomes: row.get("learning_outcomes"),
        assessment_methods: row.get("assessment_methods"),
        textbooks: row.get("textbooks"),
        prerequisites,
        corequisites,
        instructor: row.get("instructor"),
        syllabus_url: row.get("syllabus_url"),
        syllabus_pdf_url: row.get("syllabus_pdf_url"),
        offered_semesters,
        semester_data,
        vector: vector_row.map(|v| VectorStatus {
            model: v.get("model"),
            dims: v.get("dims"),
        }),
        vector_pending: vector_pending != 0,
        updated_at: format_ts_iso(updated_at),
    })
}

/// CLI entry point. Prints the course and exits nonzero when it is missing.
pub async fn run_get(config: &Config, code: &str) -> Result<()> {
    let course = match get_course(config, code).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("--- Course ---");
    println!("code:          {}", course.course_code);
    println!("title:         {}", course.title);
    println!("department:    {}", course.department);
    if let Some(ref level) = course.level {
        println!("level:         {}", level);
    }
    if let Some(credits) = course.credits {
        println!("credits:       {}", credits);
    }
    if let Some(ects) = course.ects {
        println!("ects:          {}", ects);
    }
    if let Some(ref hours) = course.hours {
        println!("hours:         {}", hours);
    }
    println!("prerequisites: {}", join_or_none(&course.prerequisites));
    println!("corequisites:  {}", join_or_none(&course.corequisites));
    if let Some(ref instructor) = course.instructor {
        println!("instructor:    {}", instructor);
    }
    if let Some(ref url) = course.syllabus_url {
        println!("syllabus:      {}", url);
    }
    if let Some(ref url) = course.syllabus_pdf_url {
        println!("syllabus_pdf:  {}", url);
    }
    println!("semesters:     {}", join_or_none(&course.offered_semesters));
    println!("semester_data: {}", course.semester_data);
    match course.vector {
        Some(ref v) => println!("vector:        stored (model {}, dims {})", v.model, v.dims),
        None if course.vector_pending => println!("vector:        pending"),
        None => println!("vector:        none"),
    }
    println!("updated_at:    {}", course.updated_at);
    println!();

    if let Some(ref description) = course.catalog_description {
        println!("--- Description ---");
        println!("{}", description);
        println!();
    }
    if let Some(ref outcomes) = course.learning_outcomes {
        println!("--- Learning Outcomes ---");
        println!("{}", outcomes);
        println!();
    }
    if let Some(ref assessment) = course.assessment_methods {
        println!("--- Assessment ---");
        println!("{}", assessment);
        println!();
    }
    if let Some(ref textbooks) = course.textbooks {
        println!("--- Textbooks ---");
        println!("{}", textbooks);
        println!();
    }

    Ok(())
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
