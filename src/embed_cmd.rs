//! Vector backfill commands.
//!
//! The sync pipeline embeds inline, but a vector write can fail after the
//! course row has already landed; such rows carry `vector_pending = 1`.
//! `harvest embed pending` picks those up, along with rows whose stored
//! vector is stale (content changed, or a different model produced it).
//! `harvest embed rebuild` drops every vector and regenerates from scratch,
//! for model migrations.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::store;

/// Find and embed courses that are missing vectors or carry stale ones.
pub async fn run_embed_pending(config: &Config, limit: Option<usize>, dry_run: bool) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let model_name = provider.model_name().to_string();
    let pool = db::connect(config).await?;

    let pending = find_pending_courses(&pool, &model_name, limit).await?;

    if dry_run {
        println!("embed pending (dry-run)");
        println!("  courses needing vectors: {}", pending.len());
        pool.close().await;
        return Ok(());
    }

    if pending.is_empty() {
        println!("embed pending");
        println!("  all courses up to date");
        pool.close().await;
        return Ok(());
    }

    let total = pending.len();
    let (embedded, failed) = embed_batches(config, &pool, provider.as_ref(), &model_name, &pending).await;

    println!("embed pending");
    println!("  total pending: {}", total);
    println!("  embedded: {}", embedded);
    println!("  failed: {}", failed);

    pool.close().await;
    Ok(())
}

/// Delete all vectors and regenerate for every stored course.
pub async fn run_embed_rebuild(config: &Config) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let model_name = provider.model_name().to_string();
    let pool = db::connect(config).await?;

    sqlx::query("DELETE FROM course_vectors")
        .execute(&pool)
        .await?;
    sqlx::query("UPDATE courses SET vector_pending = 1")
        .execute(&pool)
        .await?;

    println!("embed rebuild — cleared existing vectors");

    let pending = find_pending_courses(&pool, &model_name, None).await?;

    if pending.is_empty() {
        println!("  no courses to embed");
        pool.close().await;
        return Ok(());
    }

    let total = pending.len();
    let (embedded, failed) = embed_batches(config, &pool, provider.as_ref(), &model_name, &pending).await;

    println!("embed rebuild");
    println!("  total courses: {}", total);
    println!("  embedded: {}", embedded);
    println!("  failed: {}", failed);

    pool.close().await;
    Ok(())
}

struct PendingCourse {
    course_code: String,
    text: String,
    text_hash: String,
}

/// Courses that either have no vector for the active model or whose stored
/// vector hash no longer matches the row content, plus any row still
/// flagged `vector_pending` from an interrupted sync.
async fn find_pending_courses(
    pool: &SqlitePool,
    model: &str,
    limit: Option<usize>,
) -> Result<Vec<PendingCourse>> {
    let limit_val = limit.map_or(i64::MAX, |l| l as i64);

    let rows = sqlx::query(
        r#"
        SELECT c.course_code, c.title, c.catalog_description, c.learning_outcomes
        FROM courses c
        LEFT JOIN course_vectors cv ON cv.course_code = c.course_code
        WHERE cv.course_code IS NULL
           OR cv.model != ?
           OR cv.hash != c.content_hash
           OR c.vector_pending = 1
        ORDER BY c.course_code
        LIMIT ?
        "#,
    )
    .bind(model)
    .bind(limit_val)
    .fetch_all(pool)
    .await?;

    let results: Vec<PendingCourse> = rows
        .iter()
        .map(|row| {
            let title: String = row.get("title");
            let description: Option<String> = row.get("catalog_description");
            let outcomes: Option<String> = row.get("learning_outcomes");
            let text =
                embedding::compose_input(&title, description.as_deref(), outcomes.as_deref());
            let text_hash = embedding::hash_text(&text);
            PendingCourse {
                course_code: row.get("course_code"),
                text,
                text_hash,
            }
        })
        .collect();

    Ok(results)
}

/// Embed in provider-sized batches. A failed batch is reported and skipped;
/// its rows stay pending for the next run.
async fn embed_batches(
    config: &Config,
    pool: &SqlitePool,
    provider: &dyn embedding::EmbeddingProvider,
    model_name: &str,
    pending: &[PendingCourse],
) -> (u64, u64) {
    let mut embedded = 0u64;
    let mut failed = 0u64;

    for batch in pending.chunks(config.embedding.batch_size) {
        let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();

        match embedding::embed_texts(provider, &config.embedding, &texts).await {
            Ok(vectors) => {
                for (item, vec) in batch.iter().zip(vectors.iter()) {
                    // The pending flag only clears once the vector is down.
                    let stored = match store::upsert_vector(
                        pool,
                        &item.course_code,
                        model_name,
                        &item.text_hash,
                        vec,
                    )
                    .await
                    {
                        Ok(()) => clear_pending(pool, &item.course_code).await,
                        Err(e) => Err(e),
                    };

                    match stored {
                        Ok(()) => embedded += 1,
                        Err(e) => {
                            eprintln!(
                                "Warning: failed to store vector for {}: {}",
                                item.course_code, e
                            );
                            failed += 1;
                        }
                    }
                }
            }
            Err(e) => {
                eprintln!("Warning: embedding batch failed: {}", e);
                failed += batch.len() as u64;
            }
        }
    }

    (embedded, failed)
}

async fn clear_pending(pool: &SqlitePool, course_code: &str) -> Result<()> {
    sqlx::query("UPDATE courses SET vector_pending = 0 WHERE course_code = ?")
        .bind(course_code)
        .execute(pool)
        .await?;
    Ok(())
}
