//! crates/tutoring_core/src/routing.rs
//!
//! Student records are partitioned into one collection per (grade, subject).
//! The `RoutingTable` makes that mapping explicit so it can be configured and tested.

use once_cell::sync::Lazy;
use regex::Regex;

/// Leading grade markers such as `S2 - ` or `s3 ` found in free-form subject names.
static GRADE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*s[123]\s*-?\s*").expect("grade prefix pattern is valid"));

/// Maps the subject spellings seen in links and upload forms to canonical slugs.
pub fn normalize_subject(subject: &str) -> String {
    let lowered = subject.trim().to_lowercase();
    let stripped = GRADE_PREFIX.replace(&lowered, "");
    let name = stripped.trim();

    match name {
        "math" | "maths" | "mathematics" | "pure math" | "pure maths" | "pure mathematics" => {
            "mathematics".to_string()
        }
        "physics" => "physics".to_string(),
        "mechanics" => "mechanics".to_string(),
        "statistics" | "stat" | "stats" => "statistics".to_string(),
        other => other.to_string(),
    }
}

/// Maps grade spellings (`Senior2`, `senior 2`, `S2`) to `seniorN`.
pub fn normalize_grade(grade: &str) -> String {
    let compact: String = grade
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .collect();

    match compact.strip_prefix('s') {
        Some(digit) if digit.len() == 1 && digit.chars().all(|c| c.is_ascii_digit()) => {
            format!("senior{}", digit)
        }
        _ => compact,
    }
}

/// One `(grade, subject) -> collection` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub grade: String,
    pub subject: String,
    pub collection: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    /// The collection layout used by the platform's enrollment system.
    pub fn standard() -> Self {
        let routes = [
            ("senior1", "mathematics", "senior1_math"),
            ("senior2", "mathematics", "senior2_pure_math"),
            ("senior2", "mechanics", "senior2_mechanics"),
            ("senior2", "physics", "senior2_physics"),
            ("senior3", "mathematics", "senior3_math"),
            ("senior3", "physics", "senior3_physics"),
            ("senior3", "statistics", "senior3_statistics"),
        ];
        Self::from_routes(routes.into_iter().map(|(grade, subject, collection)| Route {
            grade: grade.to_string(),
            subject: subject.to_string(),
            collection: collection.to_string(),
        }))
    }

    /// Builds a table from arbitrary routes. Grades and subjects are normalized;
    /// a later duplicate of a (grade, subject) pair replaces the earlier one.
    pub fn from_routes(routes: impl IntoIterator<Item = Route>) -> Self {
        let mut table = Self { routes: Vec::new() };
        for route in routes {
            let route = Route {
                grade: normalize_grade(&route.grade),
                subject: normalize_subject(&route.subject),
                collection: route.collection,
            };
            match table
                .routes
                .iter_mut()
                .find(|r| r.grade == route.grade && r.subject == route.subject)
            {
                Some(existing) => *existing = route,
                None => table.routes.push(route),
            }
        }
        table
    }

    /// Resolves the collection for a grade and subject, in any accepted spelling.
    pub fn resolve(&self, grade: &str, subject: &str) -> Option<&Route> {
        let grade = normalize_grade(grade);
        let subject = normalize_subject(subject);
        self.routes
            .iter()
            .find(|r| r.grade == grade && r.subject == subject)
    }

    /// All routes of one grade, or of every grade when `grade` is `None`.
    pub fn routes_for(&self, grade: Option<&str>) -> Vec<&Route> {
        let grade = grade.map(normalize_grade);
        self.routes
            .iter()
            .filter(|r| grade.as_deref().map_or(true, |g| r.grade == g))
            .collect()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::standard()
    }
}
