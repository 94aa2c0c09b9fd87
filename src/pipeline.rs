//! Batch orchestration.
//!
//! One batch covers one (department, semester) pair: list the courses,
//! fan the detail pages out to a bounded worker pool, and run each course
//! through extract, embed, dedup, and store. Per-course failures land in
//! the `scrape_failures` side channel and the report; only an unreachable
//! listing page (or database) aborts a batch.

use std::sync::Arc;

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use sqlx::SqlitePool;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::dedup;
use crate::embedding::{self, EmbeddingProvider};
use crate::extract;
use crate::fetch::Fetcher;
use crate::models::{BatchReport, CommitResult, CourseFailure, CourseListingRef, Decision};
use crate::store;

/// What one course worker reports back to the batch accumulator.
enum CourseOutcome {
    Committed {
        decision: Decision,
        commit: CommitResult,
    },
    Failed {
        course: String,
        reason: String,
        /// Whether extraction had already succeeded when the failure hit.
        extracted: bool,
    },
}

/// Entry point for the `sync` command. `department` may be a configured
/// slug or "all"; a missing semester means every configured semester.
pub async fn run_sync(
    config: &Config,
    department: &str,
    semester: Option<String>,
    limit: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    if department == "all" {
        return run_all(config, limit, dry_run).await;
    }
    if !config.source.departments.iter().any(|d| d == department) {
        bail!(
            "Unknown department: '{}'. Configured departments: {}",
            department,
            config.source.departments.join(", ")
        );
    }

    let semesters: Vec<String> = match semester {
        Some(s) => vec![s],
        None => config.source.semesters.clone(),
    };
    for sem in &semesters {
        run_batch(config, department, sem, limit, dry_run).await?;
    }
    Ok(())
}

/// Run every configured (department, semester) pair. One failed batch does
/// not stop the rest; the run errors only when every batch failed, which
/// means the site or the database is down rather than one listing.
pub async fn run_all(config: &Config, limit: Option<usize>, dry_run: bool) -> Result<()> {
    let mut ran = 0usize;
    let mut failed = 0usize;

    for department in &config.source.departments {
        for semester in &config.source.semesters {
            ran += 1;
            if let Err(e) = run_batch(config, department, semester, limit, dry_run).await {
                eprintln!("Warning: sync {} {} failed: {:#}", department, semester, e);
                failed += 1;
            }
        }
    }

    if ran > 0 && failed == ran {
        bail!("all {} batches failed; catalog site or database unreachable", ran);
    }
    Ok(())
}

/// Run one (department, semester) batch and print its report.
pub async fn run_batch(
    config: &Config,
    department: &str,
    semester: &str,
    limit: Option<usize>,
    dry_run: bool,
) -> Result<BatchReport> {
    if !config.embedding.is_enabled() {
        bail!(
            "Embedding provider is disabled; dedup needs vectors. \
             Set [embedding] provider in the config."
        );
    }

    let fetcher = Fetcher::new(&config.source)?;
    let mut refs = fetcher.fetch_course_list(department, semester).await?;
    if let Some(limit) = limit {
        refs.truncate(limit);
    }

    if dry_run {
        println!("sync {} {} (dry-run)", department, semester);
        println!("  courses listed: {}", refs.len());
        println!("ok");
        return Ok(BatchReport {
            department: department.to_string(),
            semester: semester.to_string(),
            fetched: refs.len() as u64,
            ..Default::default()
        });
    }

    let pool = db::connect(config).await?;
    let provider: Arc<dyn EmbeddingProvider> = Arc::from(embedding::create_provider(&config.embedding)?);
    let model_name = provider.model_name().to_string();

    let run_id = Uuid::new_v4().to_string();
    let total = refs.len();
    info!(
        "batch {} {} starting: {} courses (run {})",
        department, semester, total, run_id
    );

    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    bar.set_message(format!("{} {}", department, semester));

    let semaphore = Arc::new(Semaphore::new(config.pipeline.concurrency));
    let (tx, mut rx) = mpsc::channel::<CourseOutcome>(config.pipeline.concurrency * 2);
    let fetcher = Arc::new(fetcher);
    let config = Arc::new(config.clone());

    let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(total);
    for listing in refs {
        let semaphore = Arc::clone(&semaphore);
        let tx = tx.clone();
        let fetcher = Arc::clone(&fetcher);
        let config = Arc::clone(&config);
        let provider = Arc::clone(&provider);
        let pool = pool.clone();
        let run_id = run_id.clone();
        let model_name = model_name.clone();

        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            let outcome = process_course(
                &fetcher,
                &config,
                provider.as_ref(),
                &pool,
                &run_id,
                &model_name,
                &listing,
            )
            .await;
            let _ = tx.send(outcome).await;
        }));
    }
    drop(tx);

    let mut report = BatchReport {
        department: department.to_string(),
        semester: semester.to_string(),
        fetched: total as u64,
        ..Default::default()
    };

    while let Some(outcome) = rx.recv().await {
        match outcome {
            CourseOutcome::Committed { decision, commit } => {
                report.extracted += 1;
                match decision {
                    Decision::New => report.new += 1,
                    Decision::UpdateInPlace => report.updated += 1,
                    Decision::SkipDuplicate => report.skipped_duplicate += 1,
                }
                match commit {
                    CommitResult::Committed => report.vectors_written += 1,
                    CommitResult::VectorPending => report.vectors_pending += 1,
                    CommitResult::MetadataMerged | CommitResult::Unchanged => {}
                }
            }
            CourseOutcome::Failed {
                course,
                reason,
                extracted,
            } => {
                if extracted {
                    report.extracted += 1;
                }
                report.failed += 1;
                report.failures.push(CourseFailure { course, reason });
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    for handle in handles {
        let _ = handle.await;
    }
    pool.close().await;

    print_report(&report);
    Ok(report)
}

fn print_report(report: &BatchReport) {
    println!("sync {} {}", report.department, report.semester);
    println!("  fetched: {} courses", report.fetched);
    println!("  extracted: {}", report.extracted);
    println!("  new: {}", report.new);
    println!("  updated: {}", report.updated);
    println!("  skipped duplicate: {}", report.skipped_duplicate);
    println!("  failed: {}", report.failed);
    for failure in &report.failures {
        println!("    - {}: {}", failure.course, failure.reason);
    }
    println!("  vectors written: {}", report.vectors_written);
    println!("  vectors pending: {}", report.vectors_pending);
    println!("ok");
}

/// Take one course through fetch, extract, embed, dedup, and store. Every
/// failure is contained here: the worker records it and the batch carries
/// on.
async fn process_course(
    fetcher: &Fetcher,
    config: &Config,
    provider: &dyn EmbeddingProvider,
    pool: &SqlitePool,
    run_id: &str,
    model_name: &str,
    listing: &CourseListingRef,
) -> CourseOutcome {
    let page = match fetcher.fetch_course_detail(listing).await {
        Ok(page) => page,
        Err(e) => {
            let reason = format!("fetch: {:#}", e);
            record_failure(pool, run_id, listing, &reason, None).await;
            return CourseOutcome::Failed {
                course: listing.course_code.clone(),
                reason,
                extracted: false,
            };
        }
    };

    let record = match extract::extract(&page) {
        Ok(record) => record,
        Err(failure) => {
            let reason = format!("extract: {}", failure);
            record_failure(pool, run_id, listing, &reason, Some(&page.body)).await;
            return CourseOutcome::Failed {
                course: listing.course_code.clone(),
                reason,
                extracted: false,
            };
        }
    };

    let input = embedding::embedding_input(&record);
    let vector = match embedding::embed_query(provider, &config.embedding, &input).await {
        Ok(vector) => vector,
        Err(e) => {
            let reason = format!("embed: {:#}", e);
            record_failure(pool, run_id, listing, &reason, None).await;
            return CourseOutcome::Failed {
                course: record.course_code.clone(),
                reason,
                extracted: true,
            };
        }
    };
    let content_hash = embedding::hash_text(&input);

    let resolution = match dedup::resolve(
        pool,
        &record.course_code,
        &vector,
        config.pipeline.dedup_threshold,
    )
    .await
    {
        Ok(resolution) => resolution,
        Err(e) => {
            let reason = format!("store: {:#}", e);
            record_failure(pool, run_id, listing, &reason, None).await;
            return CourseOutcome::Failed {
                course: record.course_code.clone(),
                reason,
                extracted: true,
            };
        }
    };

    match store::apply(pool, &record, &resolution, model_name, &content_hash, &vector).await {
        Ok(commit) => CourseOutcome::Committed {
            decision: resolution.decision,
            commit,
        },
        Err(e) => {
            let reason = format!("store: {:#}", e);
            record_failure(pool, run_id, listing, &reason, None).await;
            CourseOutcome::Failed {
                course: record.course_code.clone(),
                reason,
                extracted: true,
            }
        }
    }
}

/// Best-effort write to the failure side channel. Losing a failure record
/// must not fail the course twice.
async fn record_failure(
    pool: &SqlitePool,
    run_id: &str,
    listing: &CourseListingRef,
    reason: &str,
    raw_body: Option<&str>,
) {
    let result = sqlx::query(
        r#"
        INSERT INTO scrape_failures
            (id, run_id, department, semester, course, url, reason, raw_body, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(run_id)
    .bind(&listing.department)
    .bind(&listing.semester)
    .bind(&listing.course_code)
    .bind(&listing.url)
    .bind(reason)
    .bind(raw_body)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await;

    if let Err(e) = result {
        warn!("could not record failure for {}: {}", listing.url, e);
    }
}
