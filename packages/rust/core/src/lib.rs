//! Feedback lookup, widget rendering, and the debounced reconciliation loop.
//!
//! A pass scrapes the page through a [`SiteLayout`](coursefeedback_dom::SiteLayout),
//! asks a [`FeedbackSource`] about the rows it found, and renders widgets
//! into rows that do not have one yet.

pub mod client;
pub mod reconciler;
pub mod relay;
pub mod render;
pub mod widget;

pub use client::{FeedbackResponse, FeedbackSource, HttpFeedbackClient};
pub use reconciler::{
    MutationBatch, PassObserver, PassOutcome, ReconcileStats, Reconciler, ReconcilerState,
    SilentObserver,
};
pub use relay::{RelayMessage, RelayReply, handle_message};
pub use render::{RenderReport, render};
pub use widget::Widget;
