use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::sleep;
use unbanner_core::{
    ActionKind, ActionReport, FixedSettings, ModeSelection, Policy, PolicyOverrides, Reporter, ScanTimings,
    SignatureCatalog,
};
use unbanner_dom::{ElementSpec, MemoryDocument, MutationKind, MutationRecord, NodeId, is_visible};
use unbanner_engine::ScanSession;
use unbanner_scheduler::{PageGuard, PassReason, Scheduler, Trigger, forward_mutations, mutation_stream};
use unbanner_tcf::{MemoryWindow, OverrideMarker, ShimOutcome, ShimTarget, TcfError, TcfShim};

fn child_added(target: NodeId) -> MutationRecord {
    MutationRecord { target, kind: MutationKind::ChildList { added: 1, removed: 0 } }
}

#[tokio::test(start_paused = true)]
async fn fast_polls_then_periodic_fallback() {
    let doc = Arc::new(MemoryDocument::new("a.example"));
    let session = Arc::new(ScanSession::with_policy("a.example", Policy::normal()));
    let (scheduler, rx) = Scheduler::new(doc, session, 8);
    let handle = scheduler.trigger_sender();

    let (stats, ()) = tokio::join!(scheduler.run(rx), async move {
        sleep(Duration::from_millis(5_100)).await;
        drop(handle);
    });

    assert_eq!(stats.count(PassReason::Initial), 1);
    assert_eq!(stats.count(PassReason::FastPoll), 10);
    assert_eq!(stats.count(PassReason::Periodic), 1);
    assert_eq!(stats.acted, 0);
}

#[tokio::test(start_paused = true)]
async fn mutation_bursts_are_debounced() {
    let doc = Arc::new(MemoryDocument::new("a.example"));
    let body = doc.body_id();
    let timings = ScanTimings::default().with_fast_polls(0, 500).with_periodic_interval(60_000);
    let session = Arc::new(ScanSession::with_policy("a.example", Policy::normal().with_timings(timings)));
    let (scheduler, rx) = Scheduler::new(doc, session, 8);
    let handle = scheduler.trigger_sender();

    let (stats, ()) = tokio::join!(scheduler.run(rx), async move {
        for _ in 0..5 {
            handle.send(Trigger::Mutation(child_added(body))).await.unwrap();
            sleep(Duration::from_millis(50)).await;
        }
        sleep(Duration::from_millis(300)).await;

        let text_only = MutationRecord { target: body, kind: MutationKind::CharacterData };
        handle.send(Trigger::Mutation(text_only)).await.unwrap();
        sleep(Duration::from_millis(300)).await;

        handle.send(Trigger::Explicit).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        drop(handle);
    });

    assert_eq!(stats.count(PassReason::Initial), 1);
    assert_eq!(stats.count(PassReason::Mutation), 1);
    assert_eq!(stats.count(PassReason::Explicit), 1);
    assert_eq!(stats.passes(), 3);
}

#[tokio::test(start_paused = true)]
async fn late_banner_is_caught_by_fast_poll() {
    let doc = Arc::new(MemoryDocument::new("a.example"));
    let session = Arc::new(ScanSession::with_policy("a.example", Policy::extreme()));
    let (scheduler, rx) = Scheduler::new(Arc::clone(&doc), session, 8);
    let handle = scheduler.trigger_sender();

    let page = Arc::clone(&doc);
    let (stats, banner) = tokio::join!(scheduler.run(rx), async move {
        sleep(Duration::from_millis(1_200)).await;
        let banner = page
            .append(
                page.body_id(),
                ElementSpec::new("div")
                    .id("consent-layer")
                    .style("position: fixed; z-index: 9999; width: 100%; height: 100%")
                    .text("We and our partners use cookies"),
            )
            .unwrap();
        sleep(Duration::from_millis(600)).await;
        drop(handle);
        banner
    });

    assert!(!is_visible(doc.as_ref(), banner).await);
    assert_eq!(stats.acted, 1);
}

#[tokio::test]
async fn forwarding_stops_when_the_page_closes() {
    let (page_tx, page_rx) = mpsc::unbounded_channel();
    let (tx, mut rx) = mpsc::channel(8);
    page_tx.send(child_added(NodeId(2))).unwrap();
    page_tx.send(child_added(NodeId(3))).unwrap();
    drop(page_tx);

    assert_eq!(forward_mutations(mutation_stream(page_rx), tx).await, 2);
    assert_eq!(rx.recv().await, Some(Trigger::Mutation(child_added(NodeId(2)))));
    assert_eq!(rx.recv().await, Some(Trigger::Mutation(child_added(NodeId(3)))));
    assert_eq!(rx.recv().await, None);
}

#[derive(Default)]
struct RecordingReporter {
    kinds: Mutex<Vec<ActionKind>>,
    details: Mutex<Vec<String>>,
    sites: Mutex<Vec<String>>,
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn report(&self, report: ActionReport) {
        self.kinds.lock().unwrap().push(report.kind);
        self.details.lock().unwrap().push(report.detail);
    }

    async fn site_processed(&self, domain: &str) {
        self.sites.lock().unwrap().push(domain.to_string());
    }
}

#[tokio::test(start_paused = true)]
async fn guard_installs_override_and_reports() {
    let reporter = Arc::new(RecordingReporter::default());
    let guard = PageGuard::new(
        Arc::new(FixedSettings::new(ModeSelection::Extreme)),
        Arc::new(SignatureCatalog::bundled()),
        reporter.clone(),
    );
    let window = Arc::new(MemoryWindow::with_native_cmp());
    let shim = TcfShim::new(Arc::clone(&window));
    let doc = Arc::new(MemoryDocument::new("news.example"));

    let (scheduler, _rx) = guard.attach(doc, &shim).await.expect("guard attached");

    assert!(scheduler.session().policy.is_extreme());
    assert_eq!(*reporter.kinds.lock().unwrap(), vec![ActionKind::TcfOverride, ActionKind::TcfDetected]);
    assert_eq!(*reporter.sites.lock().unwrap(), vec!["news.example".to_string()]);
    assert_eq!(window.messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn allowlisted_page_is_untouched() {
    let reporter = Arc::new(RecordingReporter::default());
    let guard = PageGuard::new(
        Arc::new(FixedSettings::new(ModeSelection::Normal).allowlisted()),
        Arc::new(SignatureCatalog::bundled()),
        reporter.clone(),
    );
    let window = Arc::new(MemoryWindow::new());
    let shim = TcfShim::new(Arc::clone(&window));

    assert!(guard.attach(Arc::new(MemoryDocument::new("bank.example")), &shim).await.is_none());
    assert!(window.messages().is_empty());
    assert!(reporter.kinds.lock().unwrap().is_empty());
    assert!(reporter.sites.lock().unwrap().is_empty());
}

/// A page whose own consent API could not be replaced.
struct RefusedOverride;

#[async_trait]
impl ShimTarget for RefusedOverride {
    async fn install_override(&self) -> Result<Option<ShimOutcome>, TcfError> {
        Ok(Some(ShimOutcome { marker: OverrideMarker::new(false, true), locator_detected: false }))
    }
}

#[tokio::test(start_paused = true)]
async fn refused_override_is_reported_as_fallback() {
    let reporter = Arc::new(RecordingReporter::default());
    let guard = PageGuard::new(
        Arc::new(FixedSettings::new(ModeSelection::Normal)),
        Arc::new(SignatureCatalog::bundled()),
        reporter.clone(),
    );

    guard.attach(Arc::new(MemoryDocument::new("news.example")), &RefusedOverride).await.expect("guard attached");

    assert_eq!(*reporter.kinds.lock().unwrap(), vec![ActionKind::TcfOverride, ActionKind::TcfDetected]);
    assert!(reporter.details.lock().unwrap()[0].contains("falling back"));
}

#[tokio::test(start_paused = true)]
async fn policy_overrides_reach_the_session() {
    let overrides = PolicyOverrides::from_json(r#"{ "actionThreshold": 45, "weights": { "overlay": 30 } }"#).unwrap();
    let guard = PageGuard::new(
        Arc::new(FixedSettings::new(ModeSelection::Normal)),
        Arc::new(SignatureCatalog::bundled()),
        Arc::new(RecordingReporter::default()),
    )
    .with_overrides(overrides);
    let shim = TcfShim::new(Arc::new(MemoryWindow::new()));

    let (scheduler, _rx) = guard.attach(Arc::new(MemoryDocument::new("a.example")), &shim).await.expect("guard attached");

    let policy = &scheduler.session().policy;
    assert!(!policy.is_extreme());
    assert_eq!(policy.action_threshold, 45);
    assert_eq!(policy.force_hide_threshold, 90);
    assert_eq!(policy.weights.overlay, 30);
}
