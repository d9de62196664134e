//! Course row extraction.

use scraper::{ElementRef, Html};
use tracing::{debug, trace};

use coursefeedback_shared::{CourseRecord, FieldKind};

use crate::layouts::SiteLayout;

/// Scrape every course row in `doc`, in document order.
///
/// Rows without a title (headers, filler rows) are left out. Missing fields
/// come back as empty strings; one malformed row never blocks the rest.
pub fn scrape(doc: &Html, layout: &dyn SiteLayout) -> Vec<CourseRecord> {
    let rows = layout.locate_rows(doc);
    let row_count = rows.len();

    let courses: Vec<CourseRecord> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| extract_row(layout, row, index))
        .collect();

    debug!(
        layout = layout.name(),
        rows = row_count,
        courses = courses.len(),
        "scraped course rows"
    );
    courses
}

/// Extract the record for the row at ordinal `index`.
///
/// Returns `None` for rows without a non-empty title.
pub fn extract_row(layout: &dyn SiteLayout, row: ElementRef<'_>, index: usize) -> Option<CourseRecord> {
    let title = field_text(layout, row, index, FieldKind::Title);
    if title.is_empty() {
        trace!(index, "row has no title, skipping");
        return None;
    }

    // The id cell reads like "COMP_SCI 111-0 / 20 - LEC (33214)".
    let id_text = field_text(layout, row, index, FieldKind::CourseId);
    let id = id_text.split('/').next().unwrap_or("").trim().to_string();

    let instructor = field_text(layout, row, index, FieldKind::Instructor);

    let other_listings = field_text(layout, row, index, FieldKind::OtherListings)
        .split(',')
        .map(|listing| listing.trim().to_string())
        .collect();

    Some(CourseRecord {
        title,
        id,
        instructor,
        other_listings,
    })
}

/// Trimmed text content of a field, or `""` when the element is missing.
fn field_text(layout: &dyn SiteLayout, row: ElementRef<'_>, index: usize, kind: FieldKind) -> String {
    layout
        .locate_field(row, index, kind)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layouts::ClassicLayout;

    fn grid(rows: &str) -> Html {
        Html::parse_document(&format!(
            r#"<html><body><table><tbody class="ps_grid-body">{rows}</tbody></table></body></html>"#
        ))
    }

    #[test]
    fn no_titled_rows_yields_nothing() {
        let doc = grid(
            r#"<tr class="ps_grid-row"><td class="ps_grid-cell">
                <div id="win0divUC_CLSRCH_WRK_UC_CLASS_TITLE$0"><span class="ps_box-value">   </span></div>
            </td></tr>
            <tr class="ps_grid-row"><td class="ps_grid-cell">filler</td></tr>"#,
        );
        assert!(scrape(&doc, &ClassicLayout).is_empty());
    }

    #[test]
    fn title_only_row_gets_empty_fields() {
        let doc = grid(
            r#"<tr class="ps_grid-row"><td class="ps_grid-cell">
                <div id="win0divUC_CLSRCH_WRK_UC_CLASS_TITLE$0"><span class="ps_box-value">CS101</span></div>
            </td></tr>"#,
        );
        let courses = scrape(&doc, &ClassicLayout);
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].title, "CS101");
        assert_eq!(courses[0].id, "");
        assert_eq!(courses[0].instructor, "");
        assert_eq!(courses[0].other_listings, vec![String::new()]);
    }

    #[test]
    fn fields_are_matched_by_row_ordinal() {
        // Row 1's title id carries suffix $1 even though row 0 is filtered.
        let doc = grid(
            r#"<tr class="ps_grid-row"><td class="ps_grid-cell"></td></tr>
            <tr class="ps_grid-row"><td class="ps_grid-cell">
                <div id="win0divUC_CLSRCH_WRK_UC_CLASS_TITLE$1"><span class="ps_box-value">Databases</span></div>
                <div id="win0divUC_RSLT_NAV_WRK_HTMLAREA$1">COMP_SCI 339-0 / 1 - LEC (3001)</div>
                <div id="win0divUC_CLSRCH_WRK_SSR_INSTR_LONG$1"><span class="ps_box-value">Jennie Rogers</span></div>
                <div id="win0divUC_CLSRCH_WRK2_DESCRLONG_NOTES$1"><span class="ps_box-value">COMP_ENG 339-0,DATA_SCI 339-0</span></div>
            </td></tr>"#,
        );
        let courses = scrape(&doc, &ClassicLayout);
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].id, "COMP_SCI 339-0");
        assert_eq!(courses[0].instructor, "Jennie Rogers");
        assert_eq!(courses[0].other_listings, vec!["COMP_ENG 339-0", "DATA_SCI 339-0"]);
    }

    #[test]
    fn field_from_another_row_is_not_picked_up() {
        // A title carrying the wrong suffix for its row is ignored.
        let doc = grid(
            r#"<tr class="ps_grid-row"><td class="ps_grid-cell">
                <div id="win0divUC_CLSRCH_WRK_UC_CLASS_TITLE$7"><span class="ps_box-value">Stray</span></div>
            </td></tr>"#,
        );
        assert!(scrape(&doc, &ClassicLayout).is_empty());
    }
}
