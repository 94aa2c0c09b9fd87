use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tempfile::TempDir;

fn harvest_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("harvest");
    path
}

fn run_harvest(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = harvest_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run harvest binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Run one statement against the test database, for fault injection
/// between harvest invocations.
fn exec_sql(db_path: &Path, sql: &str) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}", db_path.display()))
            .await
            .unwrap();
        sqlx::query(sql).execute(&pool).await.unwrap();
        pool.close().await;
    });
}

// ============ Fixture catalog site ============

#[derive(Clone)]
struct Site {
    /// department slug -> listing page HTML
    listings: Arc<HashMap<String, String>>,
    /// detail page slug -> detail page HTML
    pages: Arc<HashMap<String, String>>,
}

async fn listing_route(
    State(site): State<Site>,
    UrlPath(dept): UrlPath<String>,
) -> Result<Html<String>, StatusCode> {
    site.listings
        .get(&dept)
        .cloned()
        .map(Html)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn detail_route(
    State(site): State<Site>,
    UrlPath(slug): UrlPath<String>,
) -> Result<Html<String>, StatusCode> {
    site.pages
        .get(&slug)
        .cloned()
        .map(Html)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Serve a fixture catalog site on an ephemeral port. The server thread
/// lives for the remainder of the test process.
fn start_catalog_site(
    listings: Vec<(&str, String)>,
    pages: Vec<(&str, String)>,
) -> String {
    let listings: HashMap<String, String> = listings
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    let pages: HashMap<String, String> = pages
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let site = Site {
                listings: Arc::new(listings),
                pages: Arc::new(pages),
            };
            let app = Router::new()
                .route("/{dept}/courses", get(listing_route))
                .route("/courses/{slug}", get(detail_route))
                .with_state(site);
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            tx.send(port).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });

    let port = rx.recv().unwrap();
    format!("http://127.0.0.1:{}", port)
}

// ============ Fixture page builders ============

// Long, distinct descriptions so feature-hash vectors separate cleanly.
const DESC_DATA_STRUCTURES: &str = "Abstract data types and their implementations in modern \
    programming languages. Singly and doubly linked lists, stacks, queues, binary trees, \
    balanced search trees, priority queues, heaps, and hash tables. Asymptotic complexity \
    analysis of operations, amortized cost, and space tradeoffs. Choosing an appropriate \
    container for a workload, iterator design, and memory layout considerations for cache \
    friendly code.";

const DESC_OPERATING_SYSTEMS: &str = "Processes, threads, and the kernel interfaces that \
    create and schedule them. CPU scheduling policies, context switching cost, and \
    synchronization primitives such as locks, semaphores, and condition variables. Deadlock \
    detection and avoidance, virtual memory, paging, page replacement policies, file system \
    design, journaling, and input output subsystems. Students write small kernel modules and \
    measure scheduler behavior under load.";

const DESC_SOFTWARE_ARCHITECTURE: &str = "Architectural styles and the quality attributes \
    they trade against each other. Layered, pipe and filter, event driven, microservice, and \
    plugin architectures. Documenting views with component and connector diagrams, evaluating \
    designs with scenario based reviews, recording architectural decisions, and refactoring \
    legacy systems toward a target architecture. A team project delivers an assessed \
    architecture description of an open source system.";

const DESC_CONCURRENT: &str = "Shared memory and message passing concurrency models with an \
    emphasis on reasoning about correctness. Threads, data races, mutual exclusion, lock free \
    techniques, memory consistency models, futures, and asynchronous runtimes. Structured \
    concurrency patterns, cancellation, backpressure, and testing strategies for \
    nondeterministic programs including stress testing and model checking of small protocols.";

fn json_course_page(
    code: &str,
    title: &str,
    description: &str,
    outcomes: &str,
    prereqs: &[&str],
    instructor: &str,
) -> String {
    let payload = serde_json::json!({
        "course": {
            "course_code": code,
            "course_title": title,
            "level": "Undergraduate",
            "credits": 4,
            "ects": 6,
            "catalog_description": description,
            "learning_outcomes": outcomes,
            "prerequisites": prereqs,
            "corequisites": [],
            "instructor": instructor,
        }
    });
    format!(
        "<html><head><script type=\"application/json\">{}</script></head>\
         <body><h1>{}</h1><p>{}</p></body></html>",
        payload, title, description
    )
}

fn html_course_page(code: &str, title: &str, description: &str, prereqs: &str) -> String {
    format!(
        "<html><body>\
         <p>Course Code &amp; Number: {}</p>\
         <p>Course Title: {}</p>\
         <p>Level: Undergraduate</p>\
         <p>Credit Hours/ ECTS Credits: (3+0+2) 4 Credits / 6 ECTS</p>\
         <p>Catalog Description: {}</p>\
         <p>Pre-requisites: {}</p>\
         <p>Instructor: Dr. Grace Hopper</p>\
         <p>Learning Outcomes: Write correct concurrent programs.</p>\
         </body></html>",
        code, title, description, prereqs
    )
}

fn listing_html(entries: &[(&str, &str)]) -> String {
    let items: String = entries
        .iter()
        .map(|(slug, label)| format!("<li><a href=\"/courses/{}\">{}</a></li>", slug, label))
        .collect();
    format!("<html><body><ul>{}</ul></body></html>", items)
}

/// The standard fixture: three cmpe courses (one served as labeled HTML)
/// and one seng course.
fn standard_site() -> String {
    let cmpe_listing = listing_html(&[
        ("cmpe211", "CMPE 211 - Data Structures"),
        ("cmpe322", "CMPE 322 - Operating Systems"),
        ("cmpe417", "CMPE 417 - Concurrent Programming"),
    ]);
    let seng_listing = listing_html(&[("seng301", "SENG 301 - Software Architecture")]);

    start_catalog_site(
        vec![("cmpe", cmpe_listing), ("seng", seng_listing)],
        vec![
            (
                "cmpe211",
                json_course_page(
                    "CMPE 211",
                    "Data Structures",
                    DESC_DATA_STRUCTURES,
                    "Implement and analyze classic container structures.",
                    &["CMPE 112"],
                    "Dr. Jane Doe",
                ),
            ),
            (
                "cmpe322",
                json_course_page(
                    "CMPE 322",
                    "Operating Systems",
                    DESC_OPERATING_SYSTEMS,
                    "Explain scheduling and memory management tradeoffs.",
                    &["CMPE 211"],
                    "Dr. Alan Kay",
                ),
            ),
            (
                "cmpe417",
                html_course_page(
                    "CMPE 417",
                    "Concurrent Programming",
                    DESC_CONCURRENT,
                    "CMPE 322",
                ),
            ),
            (
                "seng301",
                json_course_page(
                    "SENG 301",
                    "Software Architecture",
                    DESC_SOFTWARE_ARCHITECTURE,
                    "Evaluate architectures against quality attributes.",
                    &[],
                    "Dr. Barbara Liskov",
                ),
            ),
        ],
    )
}

// ============ Config fixtures ============

fn write_env(
    base_url: &str,
    departments: &[&str],
    semesters: &[&str],
    embeddings: bool,
) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let dept_list = departments
        .iter()
        .map(|d| format!("\"{}\"", d))
        .collect::<Vec<_>>()
        .join(", ");
    let semester_list = semesters
        .iter()
        .map(|s| format!("\"{}\"", s))
        .collect::<Vec<_>>()
        .join(", ");

    let embedding_section = if embeddings {
        "\n[embedding]\nprovider = \"hash\"\nmodel = \"feature-hash\"\ndims = 256\nbatch_size = 16\n"
    } else {
        ""
    };

    let config_content = format!(
        r#"[db]
path = "{}/data/harvest.sqlite"

[source]
base_url = "{}"
departments = [{}]
semesters = [{}]
timeout_secs = 5
max_retries = 1
base_backoff_ms = 50

[pipeline]
concurrency = 4
dedup_threshold = 0.86
{}"#,
        root.display(),
        base_url,
        dept_list,
        semester_list,
        embedding_section
    );

    let config_path = config_dir.join("harvest.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn setup_test_env(base_url: &str) -> (TempDir, PathBuf) {
    write_env(
        base_url,
        &["cmpe", "seng"],
        &["Fall 2025", "Spring 2026"],
        true,
    )
}

/// Pull the score out of the first result line, "1. [0.9123] CODE / Title".
fn first_hit_score(stdout: &str) -> f32 {
    let line = stdout
        .lines()
        .find(|l| l.starts_with("1. ["))
        .unwrap_or_else(|| panic!("no result line in output: {}", stdout));
    let open = line.find('[').unwrap();
    let close = line.find(']').unwrap();
    line[open + 1..close].parse().unwrap()
}

// ============ Tests ============

#[test]
fn test_init_creates_database() {
    let base = standard_site();
    let (tmp, config_path) = setup_test_env(&base);

    let (stdout, stderr, success) = run_harvest(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("harvest.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    let (_, _, success1) = run_harvest(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_harvest(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_sync_reports_counts() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_harvest(&config_path, &["sync", "cmpe", "--semester", "Fall 2025"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("sync cmpe Fall 2025"));
    assert!(stdout.contains("fetched: 3 courses"), "got: {}", stdout);
    assert!(stdout.contains("extracted: 3"));
    assert!(stdout.contains("new: 3"));
    assert!(stdout.contains("failed: 0"));
    assert!(stdout.contains("vectors written: 3"));
    assert!(stdout.contains("vectors pending: 0"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_sync_skips_unchanged_courses() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    let (stdout1, _, _) = run_harvest(&config_path, &["sync", "cmpe", "--semester", "Fall 2025"]);
    assert!(stdout1.contains("new: 3"));

    // Identical content re-scraped: everything is a duplicate, no writes.
    let (stdout2, stderr2, success) =
        run_harvest(&config_path, &["sync", "cmpe", "--semester", "Fall 2025"]);
    assert!(success, "second sync failed: {}", stderr2);
    assert!(stdout2.contains("new: 0"), "got: {}", stdout2);
    assert!(stdout2.contains("skipped duplicate: 3"), "got: {}", stdout2);
    assert!(stdout2.contains("vectors written: 0"), "got: {}", stdout2);
}

#[test]
fn test_sync_accumulates_semesters() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    run_harvest(&config_path, &["sync", "cmpe", "--semester", "Fall 2025"]);
    let (stdout, _, _) = run_harvest(&config_path, &["sync", "cmpe", "--semester", "Spring 2026"]);
    assert!(stdout.contains("skipped duplicate: 3"), "got: {}", stdout);

    // The duplicate run must still have recorded the new semester.
    let (stdout, stderr, success) = run_harvest(&config_path, &["course", "CMPE211"]);
    assert!(success, "course lookup failed: {}", stderr);
    assert!(
        stdout.contains("Fall 2025, Spring 2026"),
        "expected both semesters, got: {}",
        stdout
    );
}

#[test]
fn test_sync_survives_malformed_page() {
    // Ten courses, one of which serves an unparseable page.
    let mut entries = Vec::new();
    let mut pages = Vec::new();
    for i in 0..9 {
        let code = format!("BULK {}", 100 + i);
        let slug = format!("bulk{}", 100 + i);
        let title = format!("Bulk Course {}", i);
        let desc = format!(
            "Course number {} in a synthetic department used to exercise batch behavior. {}",
            i, DESC_DATA_STRUCTURES
        );
        pages.push((
            slug.clone(),
            json_course_page(&code, &title, &desc, "Pass the course.", &[], "Dr. Bulk"),
        ));
        entries.push((slug, format!("{} - {}", code, title)));
    }
    entries.push(("bulk999".to_string(), "BULK 999 - Broken".to_string()));
    pages.push((
        "bulk999".to_string(),
        "<html><body><p>Internal error, content unavailable.</p></body></html>".to_string(),
    ));

    let entry_refs: Vec<(&str, &str)> = entries
        .iter()
        .map(|(s, l)| (s.as_str(), l.as_str()))
        .collect();
    let listing = listing_html(&entry_refs);
    let page_refs: Vec<(&str, String)> =
        pages.iter().map(|(s, b)| (s.as_str(), b.clone())).collect();

    let base = start_catalog_site(vec![("bulk", listing)], page_refs);
    let (_tmp, config_path) = write_env(&base, &["bulk"], &["Fall 2025"], true);

    run_harvest(&config_path, &["init"]);
    let (stdout, stderr, success) = run_harvest(&config_path, &["sync", "bulk"]);
    assert!(
        success,
        "one bad page must not fail the batch: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("fetched: 10 courses"), "got: {}", stdout);
    assert!(stdout.contains("extracted: 9"), "got: {}", stdout);
    assert!(stdout.contains("new: 9"), "got: {}", stdout);
    assert!(stdout.contains("failed: 1"), "got: {}", stdout);
    assert!(stdout.contains("extract:"), "failure reason missing: {}", stdout);
}

#[test]
fn test_same_code_across_departments_is_deduplicated() {
    // Two departments list the same course under different code spellings.
    let cmpe_listing = listing_html(&[("cmpe211", "CMPE 211 - Data Structures")]);
    let seng_listing = listing_html(&[("shared-cmpe211", "CMPE-211 - Data Structures")]);
    let page = json_course_page(
        "cmpe211",
        "Data Structures",
        DESC_DATA_STRUCTURES,
        "Implement and analyze classic container structures.",
        &["CMPE 112"],
        "Dr. Jane Doe",
    );
    let cross_listed = json_course_page(
        "CMPE-211",
        "Data Structures",
        DESC_DATA_STRUCTURES,
        "Implement and analyze classic container structures.",
        &["CMPE 112"],
        "Dr. Jane Doe",
    );

    let base = start_catalog_site(
        vec![("cmpe", cmpe_listing), ("seng", seng_listing)],
        vec![("cmpe211", page), ("shared-cmpe211", cross_listed)],
    );
    let (_tmp, config_path) = write_env(&base, &["cmpe", "seng"], &["Fall 2025"], true);

    run_harvest(&config_path, &["init"]);
    let (stdout1, _, _) = run_harvest(&config_path, &["sync", "cmpe"]);
    assert!(stdout1.contains("new: 1"));

    let (stdout2, _, _) = run_harvest(&config_path, &["sync", "seng"]);
    assert!(stdout2.contains("skipped duplicate: 1"), "got: {}", stdout2);
    assert!(stdout2.contains("new: 0"), "got: {}", stdout2);

    // Both spellings collapsed to one row.
    let (stats, _, _) = run_harvest(&config_path, &["stats"]);
    assert!(stats.contains("Courses:     1"), "got: {}", stats);
}

#[test]
fn test_search_round_trip_scores_high() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    run_harvest(&config_path, &["sync", "cmpe", "--semester", "Fall 2025"]);

    // Query with the course's own description: it must come back first with
    // a high score.
    let (stdout, stderr, success) =
        run_harvest(&config_path, &["search", DESC_DATA_STRUCTURES, "--top-k", "3"]);
    assert!(success, "search failed: {}", stderr);
    let first = stdout.lines().find(|l| l.starts_with("1. [")).unwrap_or("");
    assert!(
        first.contains("CMPE 211"),
        "expected CMPE 211 first, got: {}",
        stdout
    );
    let score = first_hit_score(&stdout);
    assert!(score > 0.8, "round-trip score too low: {}", score);
}

#[test]
fn test_search_is_deterministic() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    run_harvest(&config_path, &["sync", "cmpe", "--semester", "Fall 2025"]);

    let (stdout1, _, _) = run_harvest(&config_path, &["search", "memory and scheduling"]);
    let (stdout2, _, _) = run_harvest(&config_path, &["search", "memory and scheduling"]);
    assert_eq!(stdout1, stdout2, "search results should be deterministic");
}

#[test]
fn test_search_department_filter() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    run_harvest(&config_path, &["sync", "cmpe", "--semester", "Fall 2025"]);
    run_harvest(&config_path, &["sync", "seng", "--semester", "Fall 2025"]);

    let (stdout, _, success) = run_harvest(
        &config_path,
        &["search", "software architecture", "--department", "seng"],
    );
    assert!(success);
    assert!(stdout.contains("SENG 301"), "got: {}", stdout);
    assert!(!stdout.contains("CMPE"), "filter leaked: {}", stdout);
}

#[test]
fn test_search_empty_query() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    let (stdout, _, success) = run_harvest(&config_path, &["search", ""]);
    assert!(success, "empty query should not panic");
    assert!(stdout.contains("No results"));
}

#[test]
fn test_search_requires_embeddings() {
    let base = standard_site();
    let (_tmp, config_path) = write_env(&base, &["cmpe"], &["Fall 2025"], false);

    run_harvest(&config_path, &["init"]);
    let (_, stderr, success) = run_harvest(&config_path, &["search", "anything"]);
    assert!(!success, "search must fail when embeddings are disabled");
    assert!(
        stderr.contains("embeddings") || stderr.contains("embedding"),
        "should mention embeddings, got: {}",
        stderr
    );
}

#[test]
fn test_sync_requires_embeddings() {
    let base = standard_site();
    let (_tmp, config_path) = write_env(&base, &["cmpe"], &["Fall 2025"], false);

    run_harvest(&config_path, &["init"]);
    let (_, stderr, success) = run_harvest(&config_path, &["sync", "cmpe"]);
    assert!(!success, "sync must fail when embeddings are disabled");
    assert!(
        stderr.contains("disabled"),
        "should mention the disabled provider, got: {}",
        stderr
    );
}

#[test]
fn test_unknown_department_errors() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    let (_, stderr, success) = run_harvest(&config_path, &["sync", "nosuch"]);
    assert!(!success, "unknown department should fail");
    assert!(
        stderr.contains("Unknown department"),
        "got: {}",
        stderr
    );
}

#[test]
fn test_unreachable_listing_fails_batch() {
    // "ghost" is configured but the site serves no listing for it.
    let base = standard_site();
    let (_tmp, config_path) = write_env(&base, &["ghost"], &["Fall 2025"], true);

    run_harvest(&config_path, &["init"]);
    let (_, stderr, success) = run_harvest(&config_path, &["sync", "ghost"]);
    assert!(!success, "missing listing page must fail the batch");
    assert!(
        stderr.contains("listing page unreachable"),
        "got: {}",
        stderr
    );
}

#[test]
fn test_html_fallback_page_is_extracted() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    run_harvest(&config_path, &["sync", "cmpe", "--semester", "Fall 2025"]);

    // cmpe417 is served as a labeled HTML page, not JSON.
    let (stdout, stderr, success) = run_harvest(&config_path, &["course", "CMPE417"]);
    assert!(success, "course lookup failed: {}", stderr);
    assert!(stdout.contains("Concurrent Programming"), "got: {}", stdout);
    assert!(stdout.contains("prerequisites: CMPE 322"), "got: {}", stdout);
    assert!(stdout.contains("credits:       4"), "got: {}", stdout);
}

#[test]
fn test_course_code_is_normalized_in_cli() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    run_harvest(&config_path, &["sync", "cmpe", "--semester", "Fall 2025"]);

    for spelling in ["cmpe211", "CMPE-211", "CMPE 211"] {
        let (stdout, stderr, success) = run_harvest(&config_path, &["course", spelling]);
        assert!(success, "lookup '{}' failed: {}", spelling, stderr);
        assert!(stdout.contains("code:          CMPE 211"), "got: {}", stdout);
    }
}

#[test]
fn test_course_shows_parsed_prerequisites() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    run_harvest(&config_path, &["sync", "cmpe", "--semester", "Fall 2025"]);

    let (stdout, _, success) = run_harvest(&config_path, &["course", "CMPE322"]);
    assert!(success);
    assert!(stdout.contains("prerequisites: CMPE 211"), "got: {}", stdout);
    assert!(stdout.contains("vector:        stored"), "got: {}", stdout);
}

#[test]
fn test_course_not_found() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    let (_, stderr, success) = run_harvest(&config_path, &["course", "CMPE999"]);
    assert!(!success, "missing course should fail");
    assert!(stderr.contains("not found"), "got: {}", stderr);
}

#[test]
fn test_sync_dry_run_writes_nothing() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    let (stdout, _, success) = run_harvest(
        &config_path,
        &["sync", "cmpe", "--semester", "Fall 2025", "--dry-run"],
    );
    assert!(success);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("courses listed: 3"), "got: {}", stdout);

    let (_, stderr, found) = run_harvest(&config_path, &["course", "CMPE211"]);
    assert!(!found, "dry-run must not write rows: {}", stderr);
}

#[test]
fn test_sync_with_limit() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    let (stdout, _, success) = run_harvest(
        &config_path,
        &["sync", "cmpe", "--semester", "Fall 2025", "--limit", "1"],
    );
    assert!(success);
    assert!(stdout.contains("fetched: 1 courses"), "got: {}", stdout);
    assert!(stdout.contains("new: 1"), "got: {}", stdout);
}

#[test]
fn test_embed_pending_after_sync() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    run_harvest(&config_path, &["sync", "cmpe", "--semester", "Fall 2025"]);

    // The sync embedded inline, so nothing is pending.
    let (stdout, stderr, success) = run_harvest(&config_path, &["embed", "pending"]);
    assert!(success, "embed pending failed: {}", stderr);
    assert!(stdout.contains("all courses up to date"), "got: {}", stdout);
}

#[test]
fn test_sync_rewrites_missing_vector() {
    let base = standard_site();
    let (tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    run_harvest(&config_path, &["sync", "cmpe", "--semester", "Fall 2025"]);

    // Simulate an interrupted saga: the row landed but the vector did not.
    let db = tmp.path().join("data").join("harvest.sqlite");
    exec_sql(&db, "DELETE FROM course_vectors WHERE course_code = 'CMPE 211'");
    exec_sql(
        &db,
        "UPDATE courses SET vector_pending = 1 WHERE course_code = 'CMPE 211'",
    );

    // The next sync must treat the vectorless row as changed and re-write
    // both stores, even though the page content is identical.
    let (stdout, stderr, success) =
        run_harvest(&config_path, &["sync", "cmpe", "--semester", "Fall 2025"]);
    assert!(success, "recovery sync failed: {}", stderr);
    assert!(stdout.contains("updated: 1"), "got: {}", stdout);
    assert!(stdout.contains("skipped duplicate: 2"), "got: {}", stdout);
    assert!(stdout.contains("vectors written: 1"), "got: {}", stdout);
    assert!(stdout.contains("vectors pending: 0"), "got: {}", stdout);

    let (stdout, _, success) = run_harvest(&config_path, &["course", "CMPE211"]);
    assert!(success);
    assert!(stdout.contains("vector:        stored"), "got: {}", stdout);
}

#[test]
fn test_embed_pending_picks_up_flagged_row() {
    let base = standard_site();
    let (tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    run_harvest(&config_path, &["sync", "cmpe", "--semester", "Fall 2025"]);

    let db = tmp.path().join("data").join("harvest.sqlite");
    exec_sql(
        &db,
        "UPDATE courses SET vector_pending = 1 WHERE course_code = 'CMPE 322'",
    );

    let (stdout, stderr, success) = run_harvest(&config_path, &["embed", "pending"]);
    assert!(success, "embed pending failed: {}", stderr);
    assert!(stdout.contains("total pending: 1"), "got: {}", stdout);
    assert!(stdout.contains("embedded: 1"), "got: {}", stdout);

    // The flag cleared; a second run finds nothing to do.
    let (stdout, _, _) = run_harvest(&config_path, &["embed", "pending"]);
    assert!(stdout.contains("all courses up to date"), "got: {}", stdout);
}

#[test]
fn test_embed_rebuild_regenerates_vectors() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    run_harvest(&config_path, &["sync", "cmpe", "--semester", "Fall 2025"]);

    let (stdout, stderr, success) = run_harvest(&config_path, &["embed", "rebuild"]);
    assert!(success, "embed rebuild failed: {}", stderr);
    assert!(stdout.contains("embedded: 3"), "got: {}", stdout);

    // Vectors must be queryable again afterwards.
    let (stdout, _, success) = run_harvest(&config_path, &["search", "operating systems kernel"]);
    assert!(success);
    assert!(stdout.contains("CMPE 322"), "got: {}", stdout);
}

#[test]
fn test_embed_requires_enabled_provider() {
    let base = standard_site();
    let (_tmp, config_path) = write_env(&base, &["cmpe"], &["Fall 2025"], false);

    run_harvest(&config_path, &["init"]);
    let (_, stderr, success) = run_harvest(&config_path, &["embed", "pending"]);
    assert!(!success, "embed pending should fail when provider disabled");
    assert!(stderr.contains("disabled"), "got: {}", stderr);
}

#[test]
fn test_sync_all_covers_departments_and_semesters() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    let (stdout, stderr, success) = run_harvest(&config_path, &["sync", "all"]);
    assert!(success, "sync all failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("sync cmpe Fall 2025"), "got: {}", stdout);
    assert!(stdout.contains("sync cmpe Spring 2026"), "got: {}", stdout);
    assert!(stdout.contains("sync seng Fall 2025"), "got: {}", stdout);
    assert!(stdout.contains("sync seng Spring 2026"), "got: {}", stdout);

    // Every course row accumulated both semesters.
    let (stdout, _, _) = run_harvest(&config_path, &["course", "SENG301"]);
    assert!(stdout.contains("Fall 2025, Spring 2026"), "got: {}", stdout);
}

#[test]
fn test_stats_reports_coverage() {
    let base = standard_site();
    let (_tmp, config_path) = setup_test_env(&base);

    run_harvest(&config_path, &["init"]);
    run_harvest(&config_path, &["sync", "cmpe", "--semester", "Fall 2025"]);

    let (stdout, stderr, success) = run_harvest(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Courses:     3"), "got: {}", stdout);
    assert!(stdout.contains("Vectors:     3 / 3 (100%)"), "got: {}", stdout);
    assert!(stdout.contains("cmpe"), "department table missing: {}", stdout);
}
