use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::models::SearchHit;

/// Semantic search over the stored catalog.
///
/// Embeds the query with the configured provider, scores it against every
/// stored course vector with cosine similarity, and returns the top `top_k`
/// hits. Courses whose vector write is still pending have no row in
/// `course_vectors` and are invisible here until the backfill runs.
pub async fn search_courses(
    config: &Config,
    query: &str,
    top_k: usize,
    department: Option<&str>,
) -> Result<Vec<SearchHit>> {
    // A blank query has nothing to embed; no hits rather than zero-score
    // noise.
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let query_vec = embedding::embed_query(provider.as_ref(), &config.embedding, query).await?;

    let pool = db::connect(config).await?;
    let rows = sqlx::query(
        r#"
        SELECT cv.course_code, cv.embedding, c.title, c.department,
               COALESCE(substr(c.catalog_description, 1, 240), '') AS excerpt
        FROM course_vectors cv
        JOIN courses c ON c.course_code = cv.course_code
        "#,
    )
    .fetch_all(&pool)
    .await?;
    pool.close().await;

    let mut hits: Vec<SearchHit> = rows
        .iter()
        .filter(|row| match department {
            Some(dept) => {
                let row_dept: String = row.get("department");
                row_dept.eq_ignore_ascii_case(dept)
            }
            None => true,
        })
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = embedding::blob_to_vec(&blob);
            SearchHit {
                course_code: row.get("course_code"),
                title: row.get("title"),
                department: row.get("department"),
                score: embedding::cosine_similarity(&query_vec, &vec),
                excerpt: row.get("excerpt"),
            }
        })
        .collect();

    rank_hits(&mut hits, top_k);
    Ok(hits)
}

/// Sort hits by score descending, ties broken by course code so output is
/// deterministic, and keep the top `top_k`.
fn rank_hits(hits: &mut Vec<SearchHit>, top_k: usize) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.course_code.cmp(&b.course_code))
    });
    hits.truncate(top_k);
}

pub async fn run_search(
    config: &Config,
    query: &str,
    top_k: usize,
    department: Option<String>,
) -> Result<()> {
    let hits = search_courses(config, query, top_k, department.as_deref()).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} / {}",
            i + 1,
            hit.score,
            hit.course_code,
            hit.title
        );
        println!("    department: {}", hit.department);
        if !hit.excerpt.is_empty() {
            println!("    excerpt: \"{}\"", hit.excerpt.replace('\n', " "));
        }
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(code: &str, score: f32) -> SearchHit {
        SearchHit {
            course_code: code.to_string(),
            title: String::new(),
            department: "cmpe".to_string(),
            score,
            excerpt: String::new(),
        }
    }

    #[test]
    fn ranks_by_score_descending() {
        let mut hits = vec![hit("CMPE 211", 0.3), hit("SENG 301", 0.9), hit("MATH 101", 0.6)];
        rank_hits(&mut hits, 10);
        let order: Vec<&str> = hits.iter().map(|h| h.course_code.as_str()).collect();
        assert_eq!(order, vec!["SENG 301", "MATH 101", "CMPE 211"]);
    }

    #[test]
    fn ties_break_on_course_code() {
        let mut hits = vec![hit("SENG 301", 0.5), hit("CMPE 211", 0.5)];
        rank_hits(&mut hits, 10);
        let order: Vec<&str> = hits.iter().map(|h| h.course_code.as_str()).collect();
        assert_eq!(order, vec!["CMPE 211", "SENG 301"]);
    }

    #[tokio::test]
    async fn blank_query_returns_no_hits_without_touching_stores() {
        // Disabled provider and an unopenable db path: a blank query must
        // short-circuit before either would matter.
        let config = Config {
            db: crate::config::DbConfig {
                path: "/nonexistent/never-opened.sqlite".into(),
            },
            source: crate::config::SourceConfig {
                base_url: "https://catalog.test".to_string(),
                departments: vec!["cmpe".to_string()],
                semesters: vec!["Fall 2025".to_string()],
                user_agent: "test".to_string(),
                timeout_secs: 5,
                max_retries: 0,
                base_backoff_ms: 10,
            },
            pipeline: Default::default(),
            embedding: Default::default(),
        };
        for query in ["", "   ", "\n\t"] {
            let hits = search_courses(&config, query, 5, None).await.unwrap();
            assert!(hits.is_empty(), "query '{:?}' produced hits", query);
        }
    }

    #[test]
    fn truncates_to_top_k() {
        let mut hits = vec![hit("A 100", 0.9), hit("B 100", 0.8), hit("C 100", 0.7)];
        rank_hits(&mut hits, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].course_code, "B 100");
    }
}
