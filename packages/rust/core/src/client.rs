//! Feedback lookup: the one outbound call of a reconciliation pass.
//!
//! The service takes the scraped rows as a JSON array. It answers either
//! with an array aligned to the request, or with an object keyed by course
//! id. Both forms are turned into a [`FeedbackIndex`] right here, against
//! the exact rows that were sent, so nothing downstream depends on row order.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use coursefeedback_shared::{
    AppConfig, CourseFeedbackError, CourseRecord, FeedbackIndex, FeedbackRecord, Result,
    validate_endpoint,
};

/// User-Agent string for lookup requests.
const USER_AGENT: &str = concat!("CourseFeedback/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Anything that can answer a feedback lookup for a batch of rows.
#[async_trait(?Send)]
pub trait FeedbackSource {
    /// Look up feedback for `courses`. Rows the source knows nothing about
    /// are simply absent from the index.
    async fn lookup(&self, courses: &[CourseRecord]) -> Result<FeedbackIndex>;
}

// ---------------------------------------------------------------------------
// Response pairing
// ---------------------------------------------------------------------------

/// Response body shapes accepted from the service.
///
/// Entries are parsed one at a time: an entry that is not a record leaves a
/// gap for its row instead of failing the whole body.
#[derive(Debug, Deserialize)]
#[serde(from = "RawResponse")]
pub enum FeedbackResponse {
    /// One entry per requested row, in request order. `None` means no data.
    Positional(Vec<Option<FeedbackRecord>>),
    /// Entries keyed by `courseId`.
    Keyed(HashMap<String, FeedbackRecord>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawResponse {
    Positional(Vec<serde_json::Value>),
    Keyed(HashMap<String, serde_json::Value>),
}

impl From<RawResponse> for FeedbackResponse {
    fn from(raw: RawResponse) -> Self {
        match raw {
            RawResponse::Positional(entries) => Self::Positional(
                entries
                    .into_iter()
                    .enumerate()
                    .map(|(position, entry)| parse_entry(&position.to_string(), entry))
                    .collect(),
            ),
            RawResponse::Keyed(entries) => Self::Keyed(
                entries
                    .into_iter()
                    .filter_map(|(id, entry)| parse_entry(&id, entry).map(|record| (id, record)))
                    .collect(),
            ),
        }
    }
}

fn parse_entry(entry: &str, value: serde_json::Value) -> Option<FeedbackRecord> {
    if value.is_null() {
        return None;
    }
    match FeedbackRecord::deserialize(value) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(entry, error = %e, "ignoring malformed feedback entry");
            None
        }
    }
}

impl FeedbackResponse {
    /// Pair the response with the rows that were sent.
    pub fn into_index(self, courses: &[CourseRecord]) -> FeedbackIndex {
        let mut index = FeedbackIndex::new();

        match self {
            Self::Positional(records) => {
                if records.len() != courses.len() {
                    warn!(
                        sent = courses.len(),
                        received = records.len(),
                        "feedback response length differs from request"
                    );
                }
                for (course, record) in courses.iter().zip(records) {
                    if let Some(record) = record {
                        index.entry(course.key()).or_insert(record);
                    }
                }
            }
            Self::Keyed(by_id) => {
                for course in courses {
                    if let Some(record) = by_id.get(&course.id) {
                        index.entry(course.key()).or_insert_with(|| record.clone());
                    }
                }
            }
        }

        index
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// `reqwest`-backed lookup against the feedback service.
pub struct HttpFeedbackClient {
    client: Client,
    endpoint: Url,
}

impl HttpFeedbackClient {
    /// Create a client posting to `endpoint`.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                CourseFeedbackError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, endpoint })
    }

    /// Create a client from the `[feedback]` config section.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let endpoint = validate_endpoint(config)?;
        Self::new(endpoint, Duration::from_secs(config.feedback.timeout_secs))
    }

    /// The endpoint lookups are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait(?Send)]
impl FeedbackSource for HttpFeedbackClient {
    #[instrument(skip_all, fields(endpoint = %self.endpoint, courses = courses.len()))]
    async fn lookup(&self, courses: &[CourseRecord]) -> Result<FeedbackIndex> {
        let response = self
            .client
            .post(self.endpoint.as_str())
            .json(courses)
            .send()
            .await
            .map_err(|e| CourseFeedbackError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CourseFeedbackError::Network(format!(
                "{}: HTTP {status}",
                self.endpoint
            )));
        }

        let body = response.text().await.map_err(|e| {
            CourseFeedbackError::Network(format!("{}: body read failed: {e}", self.endpoint))
        })?;

        let parsed: FeedbackResponse = serde_json::from_str(&body)
            .map_err(|e| CourseFeedbackError::parse(format!("feedback response: {e}")))?;

        let index = parsed.into_index(courses);
        debug!(matched = index.len(), "feedback lookup complete");
        Ok(index)
    }
}
