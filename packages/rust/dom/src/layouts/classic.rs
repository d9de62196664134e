//! Classic class-search layout.

use scraper::{ElementRef, Selector};

use super::{SiteLayout, SiteVariant};

/// Flex alignment so the widget sits beside the row content.
const CLASSIC_CONTAINER_STYLE: &[(&str, &str)] = &[
    ("height", "fit-content"),
    ("display", "flex"),
    ("align-items", "center"),
    ("justify-content", "space-between"),
];

/// Classic grid: the widget goes into the row's first cell.
pub struct ClassicLayout;

impl SiteLayout for ClassicLayout {
    fn variant(&self) -> SiteVariant {
        SiteVariant::Classic
    }

    fn widget_container<'a>(&self, row: ElementRef<'a>, _index: usize) -> Option<ElementRef<'a>> {
        let cell_sel = Selector::parse("td.ps_grid-cell").unwrap();
        row.select(&cell_sel).next()
    }

    fn container_style(&self) -> &'static [(&'static str, &'static str)] {
        CLASSIC_CONTAINER_STYLE
    }
}
