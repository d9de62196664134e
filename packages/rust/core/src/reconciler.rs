//! Debounced reconciliation loop.
//!
//! The page reports structural changes as [`MutationBatch`]es. Each batch
//! (re)arms a single debounce deadline; when the deadline passes without a
//! new batch, one pass runs: scrape, look up, render. Passes run inline on
//! the loop, so at most one lookup is ever in flight and batches that arrive
//! during a pass are picked up once it finishes.
//!
//! Render writes go straight to the page and are never reported back as
//! mutations, so a pass does not schedule another pass by itself.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, instrument, trace, warn};

use coursefeedback_dom::{HtmlPage, SiteLayout, scrape};
use coursefeedback_shared::ReconcilerConfig;

use crate::client::FeedbackSource;
use crate::render::{RenderReport, render};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One mutation callback's worth of child-list changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationBatch {
    /// Number of mutation records coalesced into this batch.
    pub records: usize,
}

impl MutationBatch {
    pub fn new(records: usize) -> Self {
        Self { records }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    Idle,
    Debouncing { deadline: Instant },
    Reconciling,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// The page had no course rows, so no lookup was made.
    NoCourses,
    /// Lookup succeeded and the page was rendered.
    Rendered { courses: usize, report: RenderReport },
    /// Lookup failed; the page was left unchanged.
    Failed { courses: usize, error: String },
}

/// Totals over the lifetime of a reconciler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub passes: usize,
    pub requests: usize,
    pub failures: usize,
    pub widgets_rendered: usize,
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Hook invoked after every pass, with the page as the pass left it.
pub trait PassObserver {
    fn pass_finished(&self, outcome: &PassOutcome, page: &HtmlPage);
}

/// Observer that does nothing.
pub struct SilentObserver;

impl PassObserver for SilentObserver {
    fn pass_finished(&self, _outcome: &PassOutcome, _page: &HtmlPage) {}
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler<F> {
    page: Rc<RefCell<HtmlPage>>,
    layout: &'static dyn SiteLayout,
    source: F,
    debounce: Duration,
    state: ReconcilerState,
    stats: ReconcileStats,
    observer: Box<dyn PassObserver>,
}

impl<F: FeedbackSource> Reconciler<F> {
    pub fn new(
        page: Rc<RefCell<HtmlPage>>,
        layout: &'static dyn SiteLayout,
        source: F,
        config: &ReconcilerConfig,
    ) -> Self {
        Self {
            page,
            layout,
            source,
            debounce: config.debounce,
            state: ReconcilerState::Idle,
            stats: ReconcileStats::default(),
            observer: Box::new(SilentObserver),
        }
    }

    /// Replace the default [`SilentObserver`].
    pub fn with_observer(mut self, observer: impl PassObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn state(&self) -> ReconcilerState {
        self.state
    }

    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// Record a mutation batch and push the deadline out to now + debounce.
    pub fn notify(&mut self, batch: MutationBatch) {
        if batch.records == 0 {
            return;
        }
        let deadline = Instant::now() + self.debounce;
        if let ReconcilerState::Debouncing { .. } = self.state {
            trace!(records = batch.records, "deadline pushed back");
        } else {
            trace!(records = batch.records, "debounce armed");
        }
        self.state = ReconcilerState::Debouncing { deadline };
    }

    /// Drive the loop until `mutations` closes. A pass still waiting on its
    /// deadline at that point is dropped.
    pub async fn run(mut self, mut mutations: UnboundedReceiver<MutationBatch>) -> ReconcileStats {
        info!(
            layout = self.layout.name(),
            debounce_ms = self.debounce.as_millis() as u64,
            "reconciler started"
        );

        loop {
            let deadline = match self.state {
                ReconcilerState::Debouncing { deadline } => Some(deadline),
                _ => None,
            };

            tokio::select! {
                biased;

                batch = mutations.recv() => match batch {
                    Some(batch) => self.notify(batch),
                    None => break,
                },
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.reconcile_now().await;
                }
            }
        }

        if matches!(self.state, ReconcilerState::Debouncing { .. }) {
            debug!("mutation source closed, dropping pending pass");
        }
        self.state = ReconcilerState::Idle;

        info!(
            passes = self.stats.passes,
            requests = self.stats.requests,
            failures = self.stats.failures,
            widgets = self.stats.widgets_rendered,
            "reconciler stopped"
        );
        self.stats
    }

    /// Run one pass right away, ignoring any pending deadline.
    #[instrument(skip_all, fields(layout = self.layout.name(), pass = self.stats.passes + 1))]
    pub async fn reconcile_now(&mut self) -> PassOutcome {
        self.state = ReconcilerState::Reconciling;
        self.stats.passes += 1;

        let outcome = self.pass().await;
        match &outcome {
            PassOutcome::NoCourses => debug!("no course rows, lookup skipped"),
            PassOutcome::Rendered { courses, report } => {
                self.stats.widgets_rendered += report.rendered;
                info!(courses, rendered = report.rendered, "pass complete");
            }
            PassOutcome::Failed { courses, error } => {
                self.stats.failures += 1;
                warn!(courses, error = %error, "feedback lookup failed, page left unchanged");
            }
        }

        self.state = ReconcilerState::Idle;
        self.observer.pass_finished(&outcome, &self.page.borrow());
        outcome
    }

    async fn pass(&mut self) -> PassOutcome {
        let courses = {
            let page = self.page.borrow();
            scrape(page.document(), self.layout)
        };
        if courses.is_empty() {
            return PassOutcome::NoCourses;
        }

        self.stats.requests += 1;
        let index = match self.source.lookup(&courses).await {
            Ok(index) => index,
            Err(e) => {
                return PassOutcome::Failed {
                    courses: courses.len(),
                    error: e.to_string(),
                };
            }
        };

        let report = render(&mut self.page.borrow_mut(), self.layout, &index);
        PassOutcome::Rendered {
            courses: courses.len(),
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FeedbackResponse;
    use async_trait::async_trait;
    use coursefeedback_dom::ClassicLayout;
    use coursefeedback_shared::{CourseFeedbackError, CourseRecord, FeedbackIndex, FeedbackRecord, Result};
    use scraper::Selector;
    use std::cell::Cell;
    use tokio::sync::mpsc;
    use url::Url;

    /// Answers positionally from a canned response; `None` means fail.
    /// Each lookup takes `latency` and is recorded as a start/end span.
    #[derive(Clone, Default)]
    struct StubSource {
        calls: Rc<RefCell<Vec<Vec<CourseRecord>>>>,
        response: Rc<RefCell<Option<Vec<Option<FeedbackRecord>>>>>,
        latency: Duration,
        in_flight: Rc<Cell<usize>>,
        max_in_flight: Rc<Cell<usize>>,
        spans: Rc<RefCell<Vec<(Instant, Instant)>>>,
    }

    impl StubSource {
        fn answering(records: Vec<Option<FeedbackRecord>>) -> Self {
            let stub = Self::default();
            *stub.response.borrow_mut() = Some(records);
            stub
        }

        fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    #[async_trait(?Send)]
    impl FeedbackSource for StubSource {
        async fn lookup(&self, courses: &[CourseRecord]) -> Result<FeedbackIndex> {
            self.calls.borrow_mut().push(courses.to_vec());

            let started = Instant::now();
            self.in_flight.set(self.in_flight.get() + 1);
            self.max_in_flight
                .set(self.max_in_flight.get().max(self.in_flight.get()));
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.in_flight.set(self.in_flight.get() - 1);
            self.spans.borrow_mut().push((started, Instant::now()));

            let response = self.response.borrow().clone();
            match response {
                Some(records) => Ok(FeedbackResponse::Positional(records).into_index(courses)),
                None => Err(CourseFeedbackError::Network("connection refused".into())),
            }
        }
    }

    fn row(index: usize, title: &str) -> String {
        format!(
            r#"<tr class="ps_grid-row"><td class="ps_grid-cell">
                <div id="win0divUC_CLSRCH_WRK_UC_CLASS_TITLE${index}"><span class="ps_box-value">{title}</span></div>
                <div id="win0divUC_RSLT_NAV_WRK_HTMLAREA${index}">{title} / 1 - LEC</div>
            </td></tr>"#
        )
    }

    fn shared_page(rows: &[String]) -> Rc<RefCell<HtmlPage>> {
        let html = format!(
            r#"<html><body><table><tbody class="ps_grid-body">{}</tbody></table></body></html>"#,
            rows.concat()
        );
        let url = Url::parse("https://caesar.ent.northwestern.edu/").unwrap();
        Rc::new(RefCell::new(HtmlPage::parse(&html, url)))
    }

    fn config() -> ReconcilerConfig {
        ReconcilerConfig {
            debounce: Duration::from_millis(1000),
        }
    }

    fn widgets(page: &Rc<RefCell<HtmlPage>>) -> Vec<String> {
        let sel = Selector::parse(".feedback-widget").unwrap();
        page.borrow()
            .document()
            .select(&sel)
            .map(|w| w.text().collect())
            .collect()
    }

    fn rated(course_rating: f64) -> Option<FeedbackRecord> {
        Some(FeedbackRecord {
            course_rating: Some(course_rating),
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_mutations_triggers_one_lookup() {
        let page = shared_page(&[row(0, "CS101"), row(1, "CS102")]);
        let source = StubSource::answering(vec![rated(4.0), rated(3.0)]);
        let reconciler = Reconciler::new(page.clone(), &ClassicLayout, source.clone(), &config());
        let (tx, rx) = mpsc::unbounded_channel();

        let driver = async move {
            for _ in 0..5 {
                tx.send(MutationBatch::new(1)).unwrap();
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            // Last batch at t=800ms; deadline at t=1800ms.
            tokio::time::sleep(Duration::from_millis(1500)).await;
            drop(tx);
        };

        let (stats, ()) = tokio::join!(reconciler.run(rx), driver);
        assert_eq!(source.call_count(), 1);
        assert_eq!(stats.passes, 1);
        assert_eq!(stats.widgets_rendered, 2);
        assert_eq!(widgets(&page).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_pass_before_the_quiet_period_ends() {
        let page = shared_page(&[row(0, "CS101")]);
        let source = StubSource::answering(vec![rated(4.0)]);
        let reconciler = Reconciler::new(page.clone(), &ClassicLayout, source.clone(), &config());
        let (tx, rx) = mpsc::unbounded_channel();

        let driver = async move {
            tx.send(MutationBatch::new(3)).unwrap();
            tokio::time::sleep(Duration::from_millis(900)).await;
            drop(tx);
        };

        let (stats, ()) = tokio::join!(reconciler.run(rx), driver);
        assert_eq!(stats.passes, 0);
        assert_eq!(source.call_count(), 0);
        assert!(widgets(&page).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn page_without_courses_makes_no_request() {
        let page = shared_page(&[row(0, "  ")]);
        let source = StubSource::answering(vec![]);
        let mut reconciler = Reconciler::new(page, &ClassicLayout, source.clone(), &config());

        let outcome = reconciler.reconcile_now().await;
        assert_eq!(outcome, PassOutcome::NoCourses);
        assert_eq!(source.call_count(), 0);
        assert_eq!(reconciler.stats().requests, 0);
        assert_eq!(reconciler.state(), ReconcilerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_lookup_leaves_page_and_next_mutation_retries() {
        let page = shared_page(&[row(0, "CS101")]);
        let source = StubSource::default();
        let reconciler = Reconciler::new(page.clone(), &ClassicLayout, source.clone(), &config());
        let (tx, rx) = mpsc::unbounded_channel();

        let driver = {
            let page = page.clone();
            let source = source.clone();
            async move {
                tx.send(MutationBatch::new(1)).unwrap();
                tokio::time::sleep(Duration::from_millis(1500)).await;
                assert_eq!(source.call_count(), 1);
                assert!(widgets(&page).is_empty());

                *source.response.borrow_mut() = Some(vec![rated(4.5)]);
                tx.send(MutationBatch::new(1)).unwrap();
                tokio::time::sleep(Duration::from_millis(1500)).await;
                drop(tx);
            }
        };

        let (stats, ()) = tokio::join!(reconciler.run(rx), driver);
        assert_eq!(stats.passes, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(source.call_count(), 2);
        assert_eq!(widgets(&page).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn notify_pushes_the_deadline_back() {
        let page = shared_page(&[row(0, "CS101")]);
        let mut reconciler = Reconciler::new(page, &ClassicLayout, StubSource::default(), &config());
        assert_eq!(reconciler.state(), ReconcilerState::Idle);

        reconciler.notify(MutationBatch::new(1));
        let ReconcilerState::Debouncing { deadline: first } = reconciler.state() else {
            panic!("expected debouncing");
        };

        tokio::time::advance(Duration::from_millis(300)).await;
        reconciler.notify(MutationBatch::new(2));
        let ReconcilerState::Debouncing { deadline: second } = reconciler.state() else {
            panic!("expected debouncing");
        };
        assert_eq!(second - first, Duration::from_millis(300));

        reconciler.notify(MutationBatch::new(0));
        assert_eq!(reconciler.state(), ReconcilerState::Debouncing { deadline: second });
    }

    #[tokio::test(start_paused = true)]
    async fn titled_row_renders_and_empty_row_is_skipped() {
        let page = shared_page(&[row(0, "CS101"), row(1, "")]);
        let source = StubSource::answering(vec![Some(FeedbackRecord {
            course_rating: Some(4.5),
            professor_rating: None,
            ..Default::default()
        })]);
        let mut reconciler = Reconciler::new(page.clone(), &ClassicLayout, source.clone(), &config());

        let outcome = reconciler.reconcile_now().await;
        let PassOutcome::Rendered { courses, report } = outcome else {
            panic!("expected a rendered pass, got {outcome:?}");
        };
        assert_eq!(courses, 1);
        assert_eq!(report.rendered, 1);
        assert_eq!(source.calls.borrow()[0][0].title, "CS101");

        let rendered = widgets(&page);
        assert_eq!(rendered.len(), 1);
        assert!(rendered[0].contains("Course Rating: 4.50/5"));
        assert!(rendered[0].contains("Prof Rating: Not Found"));

        let second_row = Selector::parse(r#"tr.ps_grid-row:nth-child(2) .feedback-widget"#).unwrap();
        assert_eq!(page.borrow().document().select(&second_row).count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn mutation_during_lookup_waits_for_the_pass_to_finish() {
        let page = shared_page(&[row(0, "CS101")]);
        let source = StubSource {
            latency: Duration::from_millis(500),
            ..StubSource::answering(vec![rated(4.0)])
        };
        let reconciler = Reconciler::new(page, &ClassicLayout, source.clone(), &config());
        let (tx, rx) = mpsc::unbounded_channel();
        let start = Instant::now();

        let driver = async move {
            tx.send(MutationBatch::new(1)).unwrap();
            // First lookup runs from t=1000ms to t=1500ms.
            tokio::time::sleep(Duration::from_millis(1200)).await;
            tx.send(MutationBatch::new(1)).unwrap();
            tokio::time::sleep(Duration::from_millis(2500)).await;
            drop(tx);
        };

        let (stats, ()) = tokio::join!(reconciler.run(rx), driver);
        assert_eq!(stats.passes, 2);
        assert_eq!(source.max_in_flight.get(), 1);

        let spans = source.spans.borrow();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].0 - start, Duration::from_millis(1000));
        assert_eq!(spans[0].1 - start, Duration::from_millis(1500));
        // The mid-lookup batch is debounced from the end of the first pass.
        assert_eq!(spans[1].0 - spans[0].1, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_run_renders_titled_row_only() {
        let page = shared_page(&[row(0, "CS101"), row(1, "")]);
        let source = StubSource::answering(vec![Some(FeedbackRecord {
            course_rating: Some(4.5),
            professor_rating: None,
            ..Default::default()
        })]);
        let reconciler = Reconciler::new(page.clone(), &ClassicLayout, source.clone(), &config());
        let (tx, rx) = mpsc::unbounded_channel();

        let driver = {
            let page = page.clone();
            async move {
                tx.send(MutationBatch::new(2)).unwrap();
                tokio::time::sleep(Duration::from_millis(999)).await;
                assert!(widgets(&page).is_empty());
                tokio::time::sleep(Duration::from_millis(500)).await;
                drop(tx);
            }
        };

        let (stats, ()) = tokio::join!(reconciler.run(rx), driver);
        assert_eq!(stats.passes, 1);
        assert_eq!(source.call_count(), 1);
        assert_eq!(source.calls.borrow()[0].len(), 1);

        let rendered = widgets(&page);
        assert_eq!(rendered.len(), 1);
        assert!(rendered[0].contains("Course Rating: 4.50/5"));
        assert!(rendered[0].contains("Prof Rating: Not Found"));

        let second_row = Selector::parse("tr.ps_grid-row:nth-child(2) .feedback-widget").unwrap();
        assert_eq!(page.borrow().document().select(&second_row).count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn observer_sees_each_pass() {
        struct Recording(Rc<RefCell<Vec<usize>>>);

        impl PassObserver for Recording {
            fn pass_finished(&self, _outcome: &PassOutcome, page: &HtmlPage) {
                let sel = Selector::parse(".feedback-widget").unwrap();
                self.0.borrow_mut().push(page.document().select(&sel).count());
            }
        }

        let seen = Rc::new(RefCell::new(Vec::new()));
        let page = shared_page(&[row(0, "CS101")]);
        let mut reconciler = Reconciler::new(
            page,
            &ClassicLayout,
            StubSource::answering(vec![rated(4.0)]),
            &config(),
        )
        .with_observer(Recording(seen.clone()));

        reconciler.reconcile_now().await;
        reconciler.reconcile_now().await;
        assert_eq!(*seen.borrow(), vec![1, 1]);
    }
}
