//! Render step: merge a feedback index into the live page.
//!
//! Each row is re-read at render time and matched by [`CourseKey`], so rows
//! that moved since the scrape still get their own feedback. A row whose
//! container already holds a widget is left alone.
//!
//! [`CourseKey`]: coursefeedback_shared::CourseKey

use scraper::Selector;
use tracing::{debug, trace, warn};

use coursefeedback_dom::{HtmlPage, NodeId, SiteLayout, extract_row};
use coursefeedback_shared::{CourseRecord, FeedbackIndex};

use crate::widget::{WIDGET_CLASS, Widget};

/// What one render step did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderReport {
    /// Widgets appended.
    pub rendered: usize,
    /// Course rows skipped because a widget was already there.
    pub already_present: usize,
    /// Course rows with no matching feedback.
    pub without_feedback: usize,
    /// Course rows whose widget could not be appended.
    pub failed: usize,
}

struct RowPlan {
    index: usize,
    record: CourseRecord,
    container: NodeId,
}

/// Append a widget to every course row that has feedback and no widget yet.
pub fn render(page: &mut HtmlPage, layout: &dyn SiteLayout, feedback: &FeedbackIndex) -> RenderReport {
    let widget_sel = Selector::parse(&format!(".{WIDGET_CLASS}")).unwrap();
    let mut report = RenderReport::default();

    let plans: Vec<RowPlan> = layout
        .locate_rows(page.document())
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let record = extract_row(layout, row, index)?;
            let Some(container) = layout.widget_container(row, index) else {
                trace!(index, "row has no widget container");
                return None;
            };
            Some(RowPlan {
                index,
                record,
                container: container.id(),
            })
        })
        .collect();

    for plan in plans {
        if page.contains(plan.container, &widget_sel) {
            report.already_present += 1;
            continue;
        }

        let Some(record) = feedback.get(&plan.record.key()) else {
            trace!(index = plan.index, key = %plan.record.key(), "no feedback for row");
            report.without_feedback += 1;
            continue;
        };

        let markup = Widget::new(&plan.record, record).to_markup();
        if let Err(e) = page.append_fragment(plan.container, &markup) {
            warn!(index = plan.index, error = %e, "failed to attach feedback widget");
            report.failed += 1;
            continue;
        }
        report.rendered += 1;

        let style = layout.container_style();
        if !style.is_empty() {
            if let Err(e) = page.merge_style(plan.container, style) {
                warn!(index = plan.index, error = %e, "failed to restyle widget container");
            }
        }
    }

    debug!(
        layout = layout.name(),
        rendered = report.rendered,
        already_present = report.already_present,
        without_feedback = report.without_feedback,
        "render step complete"
    );
    report
}
