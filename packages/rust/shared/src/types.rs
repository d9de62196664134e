//! Core domain types: scraped course rows and the feedback returned for them.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// CourseRecord
// ---------------------------------------------------------------------------

/// One course row scraped from the class-search grid.
///
/// Serialized with the field names the feedback service expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    /// Course title as displayed in the row.
    #[serde(rename = "courseTitle")]
    pub title: String,
    /// Course identifier, e.g. `COMP_SCI 101`.
    #[serde(rename = "courseId")]
    pub id: String,
    /// Instructor name(s) as displayed.
    pub instructor: String,
    /// Cross-listed course identifiers. Never empty: `[""]` when the row has none.
    #[serde(rename = "otherListings")]
    pub other_listings: Vec<String>,
}

impl CourseRecord {
    /// The key used to pair this row with its feedback.
    pub fn key(&self) -> CourseKey {
        CourseKey::from(self)
    }
}

// ---------------------------------------------------------------------------
// CourseKey
// ---------------------------------------------------------------------------

/// Stable per-row key: course identifier plus instructor.
///
/// Several sections of one course can share an id, so the instructor is
/// part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CourseKey {
    pub course_id: String,
    pub instructor: String,
}

impl From<&CourseRecord> for CourseKey {
    fn from(record: &CourseRecord) -> Self {
        Self {
            course_id: record.id.clone(),
            instructor: record.instructor.clone(),
        }
    }
}

impl std::fmt::Display for CourseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.course_id, self.instructor)
    }
}

// ---------------------------------------------------------------------------
// FeedbackRecord
// ---------------------------------------------------------------------------

/// Aggregated feedback for one course row, as returned by the lookup service.
///
/// Every field defaults when missing, and a value of the wrong type reads as
/// absent, so a short or malformed record still renders with placeholders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    #[serde(default, deserialize_with = "lenient_number")]
    pub professor_rating: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub course_rating: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub professor_course_rating: Option<f64>,
    /// Average weekly hours for the course.
    #[serde(default, deserialize_with = "lenient_number")]
    pub course_hours: Option<f64>,
    /// Average weekly hours for the course when taught by this professor.
    #[serde(default, deserialize_with = "lenient_number")]
    pub professor_course_hours: Option<f64>,
    /// Link to the full feedback report. Empty when the service sent none.
    #[serde(default, rename = "feedback_urls", deserialize_with = "lenient_string")]
    pub feedback_url: String,
}

/// Any JSON number, else `None`.
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    })
}

/// Any JSON string, else `""`.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        _ => String::new(),
    })
}

/// Feedback for one lookup, keyed by row.
pub type FeedbackIndex = HashMap<CourseKey, FeedbackRecord>;

// ---------------------------------------------------------------------------
// FieldKind
// ---------------------------------------------------------------------------

/// The four per-row fields the scraper extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Title,
    CourseId,
    Instructor,
    OtherListings,
}
