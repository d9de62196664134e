//! Fluid class-search layout.
//!
//! Rows span several cells, so the widget is attached to the title group
//! and the host's own styling is left alone.

use scraper::{ElementRef, Selector};

use super::{SiteLayout, SiteVariant, TITLE_GROUP_PREFIX};

pub struct FluidLayout;

impl SiteLayout for FluidLayout {
    fn variant(&self) -> SiteVariant {
        SiteVariant::Fluid
    }

    fn widget_container<'a>(&self, row: ElementRef<'a>, index: usize) -> Option<ElementRef<'a>> {
        let group_sel = Selector::parse(&format!(r#"[id="{TITLE_GROUP_PREFIX}{index}"]"#)).ok()?;
        row.select(&group_sel).next()
    }
}
