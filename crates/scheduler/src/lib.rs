//! Decides when a page is scanned: once at start, a short burst of fast polls,
//! after DOM mutations settle, on a slow periodic fallback, and on request.

pub mod guard;

pub use guard::PageGuard;

use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};
use unbanner_dom::{Document, MutationRecord};
use unbanner_engine::{ScanOutcome, ScanSession, scan_page};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Scan now, e.g. once the page finished loading
    Explicit,
    /// A DOM change; scans are debounced
    Mutation(MutationRecord),
}

/// Why a pass ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    Initial,
    FastPoll,
    Mutation,
    Periodic,
    Explicit,
}

/// Pass counts per reason, bounded however long the page lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub initial: usize,
    pub fast_poll: usize,
    pub mutation: usize,
    pub periodic: usize,
    pub explicit: usize,
    /// Passes that clicked or hid something
    pub acted: usize,
}

impl SchedulerStats {
    pub fn count(&self, reason: PassReason) -> usize {
        match reason {
            PassReason::Initial => self.initial,
            PassReason::FastPoll => self.fast_poll,
            PassReason::Mutation => self.mutation,
            PassReason::Periodic => self.periodic,
            PassReason::Explicit => self.explicit,
        }
    }

    pub fn passes(&self) -> usize {
        self.initial + self.fast_poll + self.mutation + self.periodic + self.explicit
    }

    fn record(&mut self, reason: PassReason) {
        let slot = match reason {
            PassReason::Initial => &mut self.initial,
            PassReason::FastPoll => &mut self.fast_poll,
            PassReason::Mutation => &mut self.mutation,
            PassReason::Periodic => &mut self.periodic,
            PassReason::Explicit => &mut self.explicit,
        };
        *slot += 1;
    }
}

pub struct Scheduler<D: Document + ?Sized + 'static> {
    doc: Arc<D>,
    session: Arc<ScanSession>,
    sender: mpsc::Sender<Trigger>,
}

impl<D: Document + ?Sized + 'static> Clone for Scheduler<D> {
    fn clone(&self) -> Self {
        Self {
            doc: Arc::clone(&self.doc),
            session: Arc::clone(&self.session),
            sender: self.sender.clone(),
        }
    }
}

impl<D: Document + ?Sized + 'static> Scheduler<D> {
    pub fn new(doc: Arc<D>, session: Arc<ScanSession>, capacity: usize) -> (Self, mpsc::Receiver<Trigger>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { doc, session, sender: tx }, rx)
    }

    pub fn submit(&self, trigger: Trigger) -> Result<(), mpsc::error::TrySendError<Trigger>> {
        self.sender.try_send(trigger)
    }

    /// A sender for page-side events. The loop ends once every sender is gone.
    pub fn trigger_sender(&self) -> mpsc::Sender<Trigger> {
        self.sender.clone()
    }

    pub fn session(&self) -> &Arc<ScanSession> {
        &self.session
    }

    /// Runs until the page goes away, i.e. every trigger sender is dropped.
    /// Passes never overlap: triggers arriving mid-pass wait for it to finish.
    pub async fn run(self, mut receiver: mpsc::Receiver<Trigger>) -> SchedulerStats {
        let Self { doc, session, sender } = self;
        // only external senders keep the loop alive
        drop(sender);
        let doc = doc.as_ref();
        let session = session.as_ref();
        let timings = session.policy.timings.clone();
        let mut stats = SchedulerStats::default();

        pass(doc, session, PassReason::Initial, &mut stats).await;

        let start = Instant::now();
        let mut fast_remaining = timings.fast_poll_count;
        let mut fast = time::interval_at(start + timings.fast_poll_interval, timings.fast_poll_interval);
        let mut periodic = time::interval_at(start + timings.periodic_interval, timings.periodic_interval);
        periodic.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let debounce = time::sleep(timings.mutation_debounce);
        tokio::pin!(debounce);
        let mut debounce_armed = false;

        loop {
            tokio::select! {
                trigger = receiver.recv() => match trigger {
                    Some(Trigger::Explicit) => {
                        pass(doc, session, PassReason::Explicit, &mut stats).await;
                    }
                    Some(Trigger::Mutation(record)) => {
                        if record.is_significant() {
                            debounce.as_mut().reset(Instant::now() + timings.mutation_debounce);
                            debounce_armed = true;
                        }
                    }
                    None => break,
                },
                _ = fast.tick(), if fast_remaining > 0 => {
                    fast_remaining -= 1;
                    pass(doc, session, PassReason::FastPoll, &mut stats).await;
                }
                _ = &mut debounce, if debounce_armed => {
                    debounce_armed = false;
                    pass(doc, session, PassReason::Mutation, &mut stats).await;
                }
                _ = periodic.tick() => {
                    pass(doc, session, PassReason::Periodic, &mut stats).await;
                }
            }
        }

        info!(domain = %session.domain, passes = stats.passes(), acted = stats.acted, "scheduler stopped");
        stats
    }
}

async fn pass<D: Document + ?Sized>(
    doc: &D,
    session: &ScanSession,
    reason: PassReason,
    stats: &mut SchedulerStats,
) -> ScanOutcome {
    debug!(domain = %session.domain, ?reason, "scan pass");
    let outcome = scan_page(doc, session).await;
    stats.record(reason);
    if outcome.acted() {
        stats.acted += 1;
    }
    outcome
}

/// Feeds DOM mutations into the scheduler until either side closes.
pub async fn forward_mutations<S>(mutations: S, sender: mpsc::Sender<Trigger>) -> usize
where
    S: Stream<Item = MutationRecord>,
{
    let mut forwarded = 0;
    let mut mutations = std::pin::pin!(mutations);
    while let Some(record) = mutations.next().await {
        if sender.send(Trigger::Mutation(record)).await.is_err() {
            break;
        }
        forwarded += 1;
    }
    forwarded
}

/// Adapts a channel of mutation records (as `MemoryDocument::subscribe` hands
/// out) into a stream.
pub fn mutation_stream(receiver: mpsc::UnboundedReceiver<MutationRecord>) -> impl Stream<Item = MutationRecord> {
    stream::unfold(receiver, |mut rx| async move { rx.recv().await.map(|record| (record, rx)) })
}
