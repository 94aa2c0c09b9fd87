//! Course detail-page extraction.
//!
//! Two parse paths produce one normalized [`CourseRecord`]: an embedded JSON
//! payload (primary) and labeled plain-text fields scraped out of the
//! rendered HTML (fallback for older static pages). Downstream stages never
//! see which path ran.
//!
//! Extraction failures are values, not panics: a page that cannot be parsed
//! fails that one course and the batch moves on.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::models::{CourseRecord, ExtractionFailure, RawCoursePage};

const MAX_DESCRIPTION_CHARS: usize = 2000;
const MAX_OUTCOMES_CHARS: usize = 1000;
const MAX_ASSESSMENT_CHARS: usize = 500;
const MAX_TEXTBOOKS_CHARS: usize = 500;

static JSON_SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]*type\s*=\s*"application/(?:ld\+)?json"[^>]*>(.*?)</script>"#)
        .unwrap()
});
static SCRIPT_STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(?:script|style)\b[^>]*>.*?</(?:script|style)>").unwrap());
static BLOCK_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</(?:p|div|li|tr|h[1-6]|table|ul|ol)>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

static CODE_EXACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z]{2,4})\s*[-_]?\s*(\d{3})\s*$").unwrap());
static CODE_SCAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{2,4})\s*[-_]?\s*(\d{3})\b").unwrap());

static CREDITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*credits?").unwrap());
static ECTS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*ects").unwrap());
static HOURS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(([\d+\s]+)\)").unwrap());

static SYLLABUS_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<a[^>]+href="([^"]+)"[^>]*>[^<]*syllabus"#).unwrap());
static PDF_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)href="([^"]+\.pdf)""#).unwrap());

/// Which parse path produced the fields for a page.
#[derive(Debug)]
pub enum ParsedPayload {
    /// Embedded JSON payload, decoded as-is.
    Json(Value),
    /// Labeled fields scraped out of the rendered HTML.
    Html(HtmlFields),
}

/// Raw field values pulled from a label-structured page, before
/// normalization.
#[derive(Debug, Default)]
pub struct HtmlFields {
    pub code: Option<String>,
    pub title: Option<String>,
    pub level: Option<String>,
    pub credits: Option<i64>,
    pub ects: Option<i64>,
    pub hours: Option<String>,
    pub description: Option<String>,
    pub prerequisites_text: Option<String>,
    pub corequisites_text: Option<String>,
    pub instructor: Option<String>,
    pub outcomes: Option<String>,
    pub assessment: Option<String>,
    pub textbooks: Option<String>,
    pub syllabus_url: Option<String>,
    pub syllabus_pdf_url: Option<String>,
}

/// Extract one normalized course record from a fetched detail page.
pub fn extract(raw: &RawCoursePage) -> Result<CourseRecord, ExtractionFailure> {
    match parse_payload(&raw.body) {
        ParsedPayload::Json(value) => record_from_json(&value, raw),
        ParsedPayload::Html(fields) => record_from_html(fields, raw),
    }
}

/// Locate the structured payload on a page, falling back to label scraping.
pub fn parse_payload(body: &str) -> ParsedPayload {
    match find_json_payload(body) {
        Some(value) => ParsedPayload::Json(value),
        None => ParsedPayload::Html(parse_html_fields(body)),
    }
}

/// Canonicalize a string that should be exactly one course code.
/// "cmpe211", "CMPE-211", and "CMPE 211 " all become "CMPE 211".
pub fn normalize_course_code(input: &str) -> Option<String> {
    let caps = CODE_EXACT_RE.captures(input)?;
    Some(format!("{} {}", caps[1].to_uppercase(), &caps[2]))
}

/// First course code found anywhere in free text (listing link labels, page
/// headings), normalized. Codes in running text are uppercase on the site.
pub fn find_course_code(text: &str) -> Option<String> {
    CODE_SCAN_RE
        .captures(text)
        .map(|caps| format!("{} {}", &caps[1], &caps[2]))
}

/// Pull recognized course codes out of free-form requisite text.
///
/// "CMPE 102 or consent of instructor" yields ["CMPE 102"]; clauses that are
/// not course codes are discarded rather than guessed at. "NONE" and "N/A"
/// mean no requisites.
pub fn parse_requisite_codes(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("none")
        || trimmed.eq_ignore_ascii_case("n/a")
        || trimmed == "-"
    {
        return Vec::new();
    }
    let mut codes = Vec::new();
    for caps in CODE_SCAN_RE.captures_iter(text) {
        let code = format!("{} {}", &caps[1], &caps[2]);
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    codes
}

fn find_json_payload(body: &str) -> Option<Value> {
    for cap in JSON_SCRIPT_RE.captures_iter(body) {
        let Ok(value) = serde_json::from_str::<Value>(cap[1].trim()) else {
            continue;
        };
        if let Some(course) = locate_course_object(&value) {
            return Some(course.clone());
        }
    }
    None
}

// The payload is either the course object itself or a wrapper with a
// "course" key.
fn locate_course_object(value: &Value) -> Option<&Value> {
    if looks_like_course(value) {
        return Some(value);
    }
    value.get("course").filter(|inner| looks_like_course(inner))
}

fn looks_like_course(value: &Value) -> bool {
    value.is_object()
        && (value.get("course_code").is_some()
            || value.get("code").is_some()
            || value.get("course_title").is_some())
}

fn record_from_json(value: &Value, raw: &RawCoursePage) -> Result<CourseRecord, ExtractionFailure> {
    let code_raw = json_str(value, &["course_code", "code"])
        .ok_or_else(|| fail("detail payload has no course code"))?;
    let course_code = normalize_course_code(&code_raw)
        .or_else(|| find_course_code(&code_raw.to_uppercase()))
        .ok_or_else(|| fail(&format!("unrecognizable course code: '{}'", code_raw)))?;
    let title = json_str(value, &["course_title", "title", "course_name"])
        .ok_or_else(|| fail("detail payload has no course title"))?;

    Ok(CourseRecord {
        course_code,
        title,
        department: raw.department.clone(),
        semester: raw.semester.clone(),
        level: json_str(value, &["level"]),
        credits: json_i64(value, &["credits", "credit_hours"]),
        ects: json_i64(value, &["ects", "ects_credits"]),
        hours: json_str(value, &["hours", "weekly_hours"]),
        catalog_description: json_str(value, &["catalog_description", "description"])
            .map(|s| cap_chars(&s, MAX_DESCRIPTION_CHARS)),
        learning_outcomes: json_str(value, &["learning_outcomes", "outcomes"])
            .map(|s| cap_chars(&s, MAX_OUTCOMES_CHARS)),
        assessment_methods: json_str(value, &["assessment_methods", "assessment"])
            .map(|s| cap_chars(&s, MAX_ASSESSMENT_CHARS)),
        textbooks: json_str(value, &["textbooks", "required_textbooks"])
            .map(|s| cap_chars(&s, MAX_TEXTBOOKS_CHARS)),
        prerequisites: json_requisites(value, &["prerequisites", "pre_requisites"]),
        corequisites: json_requisites(value, &["corequisites", "co_requisites"]),
        instructor: json_instructor(value),
        syllabus_url: json_str(value, &["syllabus_url"]),
        syllabus_pdf_url: json_str(value, &["syllabus_pdf_url", "syllabus_pdf"]),
    })
}

fn record_from_html(
    fields: HtmlFields,
    raw: &RawCoursePage,
) -> Result<CourseRecord, ExtractionFailure> {
    let code_raw = fields
        .code
        .clone()
        .or_else(|| fields.title.as_deref().and_then(find_course_code))
        .ok_or_else(|| fail("page has no recognizable course code"))?;
    let course_code = normalize_course_code(&code_raw)
        .or_else(|| find_course_code(&code_raw.to_uppercase()))
        .ok_or_else(|| fail(&format!("unrecognizable course code: '{}'", code_raw)))?;
    let title = fields
        .title
        .filter(|t| !t.is_empty())
        .ok_or_else(|| fail("page has no course title"))?;

    Ok(CourseRecord {
        course_code,
        title,
        department: raw.department.clone(),
        semester: raw.semester.clone(),
        level: fields.level,
        credits: fields.credits,
        ects: fields.ects,
        hours: fields.hours,
        catalog_description: fields
            .description
            .map(|s| cap_chars(&s, MAX_DESCRIPTION_CHARS)),
        learning_outcomes: fields.outcomes.map(|s| cap_chars(&s, MAX_OUTCOMES_CHARS)),
        assessment_methods: fields.assessment.map(|s| cap_chars(&s, MAX_ASSESSMENT_CHARS)),
        textbooks: fields.textbooks.map(|s| cap_chars(&s, MAX_TEXTBOOKS_CHARS)),
        prerequisites: fields
            .prerequisites_text
            .as_deref()
            .map(parse_requisite_codes)
            .unwrap_or_default(),
        corequisites: fields
            .corequisites_text
            .as_deref()
            .map(parse_requisite_codes)
            .unwrap_or_default(),
        instructor: fields.instructor,
        syllabus_url: fields.syllabus_url,
        syllabus_pdf_url: fields.syllabus_pdf_url,
    })
}

fn fail(reason: &str) -> ExtractionFailure {
    ExtractionFailure {
        reason: reason.to_string(),
    }
}

fn cap_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Field labels that start a section in the rendered page text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Code,
    Title,
    Level,
    CreditLine,
    Credits,
    Ects,
    Description,
    Prerequisites,
    Corequisites,
    Instructor,
    Outcomes,
    Assessment,
    Textbooks,
    Other,
}

// Longer prefixes come before their shorter cousins so "credit hours" wins
// over "credits".
const LABELS: &[(&str, Label)] = &[
    ("course code", Label::Code),
    ("course title", Label::Title),
    ("course name", Label::Title),
    ("credit hours", Label::CreditLine),
    ("credits", Label::Credits),
    ("ects", Label::Ects),
    ("catalog description", Label::Description),
    ("course description", Label::Description),
    ("pre-requisite", Label::Prerequisites),
    ("prerequisite", Label::Prerequisites),
    ("co-requisite", Label::Corequisites),
    ("corequisite", Label::Corequisites),
    ("instructor", Label::Instructor),
    ("learning outcomes", Label::Outcomes),
    ("assessment methods", Label::Assessment),
    ("required textbook", Label::Textbooks),
    ("textbook", Label::Textbooks),
    ("level", Label::Level),
    ("weekly schedule", Label::Other),
    ("learning activities", Label::Other),
    ("teaching methods", Label::Other),
];

/// Sections whose content may span multiple lines, accumulated until the
/// next label.
const MULTILINE: &[Label] = &[
    Label::Description,
    Label::Outcomes,
    Label::Assessment,
    Label::Textbooks,
];

fn match_label(line: &str) -> Option<(Label, String)> {
    let lower = line.to_lowercase();
    for (prefix, label) in LABELS {
        if lower.starts_with(prefix) {
            // A real label line has its colon close to the prefix
            // ("Course Code & Number:"); prose that happens to start with
            // the same words does not.
            let colon = line.find(':')?;
            if colon > prefix.len() + 20 {
                return None;
            }
            return Some((*label, line[colon + 1..].trim().to_string()));
        }
    }
    None
}

fn parse_html_fields(body: &str) -> HtmlFields {
    let text = visible_text(body);
    let mut fields = HtmlFields::default();
    let mut current: Option<Label> = None;
    let mut buf = String::new();

    for line in text.lines() {
        if let Some((label, content)) = match_label(line) {
            flush_section(&mut fields, current.take(), std::mem::take(&mut buf));
            if MULTILINE.contains(&label) {
                current = Some(label);
                buf = content;
            } else {
                assign_single(&mut fields, label, content);
            }
        } else if current.is_some() {
            if !buf.is_empty() {
                buf.push('\n');
            }
            buf.push_str(line);
        }
    }
    flush_section(&mut fields, current.take(), buf);

    fields.syllabus_url = SYLLABUS_LINK_RE
        .captures(body)
        .map(|caps| caps[1].to_string());
    fields.syllabus_pdf_url = PDF_LINK_RE.captures(body).map(|caps| caps[1].to_string());
    fields
}

fn flush_section(fields: &mut HtmlFields, label: Option<Label>, buf: String) {
    let content = buf.trim().to_string();
    if content.is_empty() {
        return;
    }
    match label {
        Some(Label::Description) => fields.description = Some(content),
        Some(Label::Outcomes) => fields.outcomes = Some(content),
        Some(Label::Assessment) => fields.assessment = Some(content),
        Some(Label::Textbooks) => fields.textbooks = Some(content),
        _ => {}
    }
}

fn assign_single(fields: &mut HtmlFields, label: Label, content: String) {
    if content.is_empty() {
        return;
    }
    match label {
        Label::Code => fields.code = Some(content),
        Label::Title => fields.title = Some(content),
        Label::Level => fields.level = Some(content),
        Label::CreditLine => {
            let (hours, credits, ects) = parse_credit_line(&content);
            fields.hours = fields.hours.take().or(hours);
            fields.credits = fields.credits.take().or(credits);
            fields.ects = fields.ects.take().or(ects);
        }
        Label::Credits => {
            fields.credits = fields.credits.take().or_else(|| parse_leading_int(&content));
        }
        Label::Ects => {
            fields.ects = fields.ects.take().or_else(|| parse_leading_int(&content));
        }
        Label::Prerequisites => fields.prerequisites_text = Some(content),
        Label::Corequisites => fields.corequisites_text = Some(content),
        Label::Instructor => fields.instructor = Some(content),
        _ => {}
    }
}

/// Parse a combined credit line like "(3+0+2) 4 Credits / 6 ECTS".
fn parse_credit_line(content: &str) -> (Option<String>, Option<i64>, Option<i64>) {
    let hours = HOURS_RE
        .captures(content)
        .map(|caps| format!("({})", caps[1].trim()));
    let credits = CREDITS_RE
        .captures(content)
        .and_then(|caps| caps[1].parse().ok());
    let ects = ECTS_RE
        .captures(content)
        .and_then(|caps| caps[1].parse().ok());
    // A line that is just a number is a bare credit count.
    let credits = credits.or_else(|| {
        if hours.is_none() && ects.is_none() {
            content.trim().parse().ok()
        } else {
            None
        }
    });
    (hours, credits, ects)
}

fn parse_leading_int(content: &str) -> Option<i64> {
    let digits: String = content
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Render page HTML down to plain text lines: scripts and styles dropped,
/// block boundaries become newlines, entities decoded, whitespace collapsed.
fn visible_text(html: &str) -> String {
    let no_scripts = SCRIPT_STYLE_RE.replace_all(html, " ");
    let with_breaks = BLOCK_BREAK_RE.replace_all(&no_scripts, "\n");
    let no_tags = TAG_RE.replace_all(&with_breaks, " ");
    let decoded = decode_entities(&no_tags);
    decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
}

fn json_str(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = value.get(*key).and_then(Value::as_str) {
            let s = s.trim();
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

fn json_i64(value: &Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        match value.get(*key) {
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    return Some(i);
                }
            }
            Some(Value::String(s)) => {
                if let Ok(i) = s.trim().parse::<i64>() {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// Requisites arrive as either free text or a list of clauses; both reduce
// to recognized codes.
fn json_requisites(value: &Value, keys: &[&str]) -> Vec<String> {
    for key in keys {
        match value.get(*key) {
            Some(Value::Array(items)) => {
                let mut codes = Vec::new();
                for item in items {
                    if let Some(s) = item.as_str() {
                        // A list item may be a bare code in any case, or a
                        // free-text clause.
                        let found = match normalize_course_code(s) {
                            Some(code) => vec![code],
                            None => parse_requisite_codes(s),
                        };
                        for code in found {
                            if !codes.contains(&code) {
                                codes.push(code);
                            }
                        }
                    }
                }
                return codes;
            }
            Some(Value::String(s)) => return parse_requisite_codes(s),
            _ => {}
        }
    }
    Vec::new()
}

fn json_instructor(value: &Value) -> Option<String> {
    if let Some(s) = json_str(value, &["instructor"]) {
        return Some(s);
    }
    if let Some(items) = value.get("instructors").and_then(Value::as_array) {
        let names: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
        if !names.is_empty() {
            return Some(names.join(", "));
        }
    }
    None
}
