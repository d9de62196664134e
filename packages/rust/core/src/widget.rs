//! Feedback widget markup.

use coursefeedback_dom::escape_html;
use coursefeedback_shared::{CourseRecord, FeedbackRecord};

/// Class on the widget root; its presence in a container marks the row as done.
pub const WIDGET_CLASS: &str = "feedback-widget";

/// Shown for any value the service did not return.
pub const NOT_FOUND: &str = "Not Found";

const COURSE_PLACEHOLDER: &str = "Course";
const INSTRUCTOR_PLACEHOLDER: &str = "X";

/// Keeps widget clicks from reaching the row's own click handling.
const STOP_PROPAGATION: &str = "event.stopPropagation()";

/// Display values for one row's widget.
#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub course: String,
    pub instructor: String,
    pub course_rating: String,
    pub course_hours: String,
    pub professor_rating: String,
    pub professor_course_rating: String,
    pub professor_course_hours: String,
    /// Report link, only offered when the course itself has a rating.
    pub link: Option<String>,
}

impl Widget {
    pub fn new(course: &CourseRecord, feedback: &FeedbackRecord) -> Self {
        let link = (feedback.course_rating.is_some() && !feedback.feedback_url.is_empty())
            .then(|| feedback.feedback_url.clone());

        Self {
            course: non_empty_or(&course.id, COURSE_PLACEHOLDER),
            instructor: non_empty_or(&course.instructor, INSTRUCTOR_PLACEHOLDER),
            course_rating: format_rating(feedback.course_rating),
            course_hours: format_hours(feedback.course_hours),
            professor_rating: format_rating(feedback.professor_rating),
            professor_course_rating: format_rating(feedback.professor_course_rating),
            professor_course_hours: format_hours(feedback.professor_course_hours),
            link,
        }
    }

    /// HTML for the widget. All interpolated values are escaped.
    pub fn to_markup(&self) -> String {
        let mut html = format!(r#"<div class="{WIDGET_CLASS}" onclick="{STOP_PROPAGATION}">"#);
        html.push_str(r#"<span class="feedback-widget-title">Feedback:</span>"#);
        html.push_str(r#"<div class="feedback-widget-content">"#);
        html.push_str(&format!("<strong>{}</strong><br>", escape_html(&self.course)));
        push_line(&mut html, "Course Rating", &self.course_rating, true);
        push_line(&mut html, "Avg Hours", &self.course_hours, true);
        html.push_str(r#"<hr class="feedback-widget-divider">"#);
        html.push_str(&format!(
            "<strong>Prof. {}</strong><br>",
            escape_html(&self.instructor)
        ));
        push_line(&mut html, "Prof Rating", &self.professor_rating, true);
        push_line(&mut html, "Prof x Course Rating", &self.professor_course_rating, true);
        push_line(&mut html, "Prof x Course Hours", &self.professor_course_hours, false);
        html.push_str("</div>");

        if let Some(url) = &self.link {
            html.push_str(&format!(
                r#"<a class="feedback-widget-link" href="{}" target="_blank" rel="noopener noreferrer" onclick="{STOP_PROPAGATION}">View Feedback</a>"#,
                escape_html(url)
            ));
        }

        html.push_str("</div>");
        html
    }
}

fn push_line(html: &mut String, label: &str, value: &str, line_break: bool) {
    html.push_str(&format!("{label}: <strong>{}</strong>", escape_html(value)));
    if line_break {
        html.push_str("<br>");
    }
}

fn non_empty_or(value: &str, placeholder: &str) -> String {
    if value.is_empty() {
        placeholder.to_string()
    } else {
        value.to_string()
    }
}

/// `4.5` → `"4.50/5"`.
pub fn format_rating(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}/5"),
        None => NOT_FOUND.to_string(),
    }
}

/// `7.25` → `"7.25 hrs"`.
pub fn format_hours(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2} hrs"),
        None => NOT_FOUND.to_string(),
    }
}
