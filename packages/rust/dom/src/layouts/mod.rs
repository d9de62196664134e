//! Site layout trait and the supported host layouts.
//!
//! The class-search grid assigns element ids per row by numeric suffix
//! (`...$0`, `...$1`), so every field is located positionally. Each
//! supported host gets one [`SiteLayout`]; [`SiteVariant`] picks it by
//! hostname.

mod classic;
mod fluid;

use coursefeedback_shared::{CourseFeedbackError, FieldKind, Result, SitesConfig};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

pub use classic::ClassicLayout;
pub use fluid::FluidLayout;

/// Id prefix of the title group; the row ordinal is appended.
pub(crate) const TITLE_GROUP_PREFIX: &str = "win0divUC_CLSRCH_WRK_UC_CLASS_TITLE$";

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Capability set for one host page layout.
///
/// Row and field lookup default to the class-search grid markup shared by
/// both supported hosts; layouts differ in where widgets go and how the
/// container is styled.
pub trait SiteLayout: Send + Sync {
    /// Which variant this layout implements.
    fn variant(&self) -> SiteVariant;

    /// All result rows in document order.
    fn locate_rows<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>> {
        let row_sel = Selector::parse("tbody.ps_grid-body tr.ps_grid-row").unwrap();
        doc.select(&row_sel).collect()
    }

    /// The element holding `kind` for the row at ordinal `index`.
    fn locate_field<'a>(
        &self,
        row: ElementRef<'a>,
        index: usize,
        kind: FieldKind,
    ) -> Option<ElementRef<'a>> {
        let selector = field_selector(index, kind)?;
        row.select(&selector).next()
    }

    /// The element the feedback widget is appended to.
    fn widget_container<'a>(&self, row: ElementRef<'a>, index: usize) -> Option<ElementRef<'a>>;

    /// Inline style merged into the container when a widget is added.
    fn container_style(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Human-readable layout name for tracing.
    fn name(&self) -> &str {
        self.variant().name()
    }
}

/// Build the positional selector for one field of row `index`.
pub(crate) fn field_selector(index: usize, kind: FieldKind) -> Option<Selector> {
    let css = match kind {
        FieldKind::Title => format!(r#"[id="{TITLE_GROUP_PREFIX}{index}"] .ps_box-value"#),
        FieldKind::CourseId => format!(r#"[id="win0divUC_RSLT_NAV_WRK_HTMLAREA${index}"]"#),
        FieldKind::Instructor => {
            format!(r#"[id="win0divUC_CLSRCH_WRK_SSR_INSTR_LONG${index}"] .ps_box-value"#)
        }
        FieldKind::OtherListings => {
            format!(r#"[id="win0divUC_CLSRCH_WRK2_DESCRLONG_NOTES${index}"] .ps_box-value"#)
        }
    };

    match Selector::parse(&css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            debug!(css, error = ?e, "field selector failed to parse");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Variant detection
// ---------------------------------------------------------------------------

/// The supported host page layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteVariant {
    /// Classic grid: one cell per row, widget placed beside the row content.
    Classic,
    /// Fluid grid: widget placed inside the title group, native layout kept.
    Fluid,
}

impl SiteVariant {
    /// Pick the layout for `url` by hostname substring.
    ///
    /// Classic patterns are tried first.
    pub fn detect(url: &Url, sites: &SitesConfig) -> Result<Self> {
        let host = url.host_str().unwrap_or("");
        let matches = |patterns: &[String]| {
            patterns
                .iter()
                .any(|p| !p.is_empty() && host.contains(p.as_str()))
        };

        if matches(&sites.classic_hosts) {
            Ok(Self::Classic)
        } else if matches(&sites.fluid_hosts) {
            Ok(Self::Fluid)
        } else {
            Err(CourseFeedbackError::UnsupportedSite {
                host: host.to_string(),
            })
        }
    }

    /// The layout implementation for this variant.
    pub fn layout(self) -> &'static dyn SiteLayout {
        match self {
            Self::Classic => &ClassicLayout,
            Self::Fluid => &FluidLayout,
        }
    }

    /// Stable lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Fluid => "fluid",
        }
    }
}

impl std::fmt::Display for SiteVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
