//! Database statistics and health overview.
//!
//! Provides a quick summary of what's stored: course counts, vector
//! coverage, pending backfills, and per-department breakdowns. Used by
//! `harvest stats` to give confidence that syncs and embeddings are
//! working as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Per-department breakdown of course and vector counts.
struct DepartmentStats {
    department: String,
    course_count: i64,
    vector_count: i64,
    pending_count: i64,
    last_update_ts: i64,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_courses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
        .fetch_one(&pool)
        .await?;

    let total_vectors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM course_vectors")
        .fetch_one(&pool)
        .await?;

    let total_pending: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM courses WHERE vector_pending = 1")
            .fetch_one(&pool)
            .await?;

    let total_failures: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scrape_failures")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Catalog Harvest — Database Stats");
    println!("================================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Courses:     {}", total_courses);
    println!(
        "  Vectors:     {} / {} ({}%)",
        total_vectors,
        total_courses,
        if total_courses > 0 {
            (total_vectors * 100) / total_courses
        } else {
            0
        }
    );
    println!("  Pending:     {}", total_pending);
    println!("  Failures:    {}", total_failures);
    if config.embedding.is_enabled() {
        println!(
            "  Model:       {} ({} dims)",
            config.embedding.model.as_deref().unwrap_or("?"),
            config.embedding.dims.unwrap_or(0)
        );
    }

    // Per-department breakdown
    let department_rows = sqlx::query(
        r#"
        SELECT
            c.department,
            COUNT(*) AS course_count,
            COUNT(cv.course_code) AS vector_count,
            COALESCE(SUM(c.vector_pending), 0) AS pending_count,
            MAX(c.last_updated_at) AS last_update
        FROM courses c
        LEFT JOIN course_vectors cv ON cv.course_code = c.course_code
        GROUP BY c.department
        ORDER BY course_count DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let department_stats: Vec<DepartmentStats> = department_rows
        .iter()
        .map(|row| DepartmentStats {
            department: row.get("department"),
            course_count: row.get("course_count"),
            vector_count: row.get("vector_count"),
            pending_count: row.get("pending_count"),
            last_update_ts: row.get("last_update"),
        })
        .collect();

    if !department_stats.is_empty() {
        println!();
        println!("  By department:");
        println!(
            "  {:<16} {:>8} {:>8} {:>8}   {}",
            "DEPARTMENT", "COURSES", "VECTORS", "PENDING", "LAST UPDATE"
        );
        println!("  {}", "-".repeat(64));

        for d in &department_stats {
            println!(
                "  {:<16} {:>8} {:>8} {:>8}   {}",
                d.department,
                d.course_count,
                d.vector_count,
                d.pending_count,
                format_ts_relative(d.last_update_ts)
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_scale_through_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn recent_timestamps_render_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now - 10), "just now");
        assert_eq!(format_ts_relative(now - 120), "2 mins ago");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
    }
}
