use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::channel::ChannelId;
use crate::job::{Bundle, ClientBundle, ServerJob};

use super::super::delivery::{EventDelivery, EventQueueConfig, OverflowPolicy};
use super::super::events::{JobEventKind, JobListener, JobNotification};
use super::*;

struct Recording {
    kinds: Mutex<Vec<JobEventKind>>,
}

impl Recording {
    fn new() -> Arc<Self> {
        Arc::new(Self { kinds: Mutex::new(Vec::new()) })
    }

    fn record(&self, n: &JobNotification) {
        self.kinds.lock().push(n.kind);
    }
}

impl JobListener for Recording {
    fn job_queued(&self, n: &JobNotification) {
        self.record(n);
    }
    fn job_ended(&self, n: &JobNotification) {
        self.record(n);
    }
    fn job_updated(&self, n: &JobNotification) {
        self.record(n);
    }
    fn job_dispatched(&self, n: &JobNotification) {
        self.record(n);
    }
    fn job_returned(&self, n: &JobNotification) {
        self.record(n);
    }
}

fn make_job(name: &str, tasks: usize) -> Arc<ServerJob> {
    let bundle = ClientBundle::new(name, tasks);
    let job = ServerJob::new(&bundle);
    job.merge_bundle(&bundle);
    Arc::new(job)
}

fn tracker_with(listener: Arc<dyn JobListener>) -> (Arc<DispatchTracker>, Arc<EventDelivery>) {
    let delivery = Arc::new(EventDelivery::new(EventQueueConfig::default()));
    delivery.add_listener(listener);
    (Arc::new(DispatchTracker::new(Arc::clone(&delivery))), delivery)
}

#[tokio::test]
async fn dispatch_and_return_bookkeeping() {
    let (tracker, delivery) = tracker_with(Recording::new());
    let job = make_job("bookkeeping", 10);
    let channel = ChannelId::new();

    tracker.job_queued(&job).await;
    assert_eq!(tracker.dispatch_count(job.uuid()).await, 0);

    let bundle = job.create_node_dispatch(4);
    let bundle_id = bundle.id;
    tracker.job_dispatched(&job, channel, Bundle::Node(bundle)).await;

    assert_eq!(tracker.dispatch_count(job.uuid()).await, 1);
    assert_eq!(tracker.nodes_for_job(job.uuid()).await, vec![channel]);
    assert_eq!(tracker.owner_of(bundle_id).await, Some(job.uuid()));
    assert_eq!(job.channel_count(), 1);

    tracker.job_returned(&job, channel, bundle_id).await;
    assert_eq!(tracker.dispatch_count(job.uuid()).await, 0);
    assert_eq!(tracker.owner_of(bundle_id).await, None);
    assert_eq!(job.channel_count(), 0);

    tracker.job_ended(&job).await;
    assert!(tracker.all_job_uuids().await.is_empty());

    delivery.close().await;
}

#[tokio::test]
async fn unmatched_return_is_dropped() {
    let (tracker, delivery) = tracker_with(Recording::new());
    let job = make_job("unmatched", 10);
    let channel = ChannelId::new();

    tracker.job_queued(&job).await;
    let bundle = job.create_node_dispatch(4);
    let bundle_id = bundle.id;
    tracker.job_dispatched(&job, channel, Bundle::Node(bundle)).await;

    // Wrong channel: the outstanding dispatch must survive untouched.
    tracker.job_returned(&job, ChannelId::new(), bundle_id).await;
    assert_eq!(tracker.dispatch_count(job.uuid()).await, 1);
    assert_eq!(job.channel_count(), 1);

    delivery.close().await;
}

#[tokio::test]
async fn events_for_unknown_jobs_are_dropped() {
    let recording = Recording::new();
    let (tracker, delivery) = tracker_with(Arc::clone(&recording) as Arc<dyn JobListener>);
    let job = make_job("unknown", 5);

    // Never queued: nothing below may fire an event or create state.
    tracker.job_updated(&job).await;
    let bundle = job.create_node_dispatch(2);
    tracker.job_dispatched(&job, ChannelId::new(), Bundle::Node(bundle)).await;
    tracker.job_ended(&job).await;

    delivery.close().await;
    assert!(recording.kinds.lock().is_empty());
    assert!(tracker.all_job_uuids().await.is_empty());
}

#[tokio::test]
async fn non_node_bundles_are_rejected_for_dispatch() {
    let (tracker, delivery) = tracker_with(Recording::new());
    let job = make_job("shapes", 5);
    tracker.job_queued(&job).await;

    let client = ClientBundle::new("shapes", 5);
    tracker
        .job_dispatched(&job, ChannelId::new(), Bundle::Client(client))
        .await;
    tracker
        .job_dispatched(
            &job,
            ChannelId::new(),
            Bundle::Job { uuid: job.uuid(), task_count: 5 },
        )
        .await;

    assert_eq!(tracker.dispatch_count(job.uuid()).await, 0);
    assert_eq!(job.channel_count(), 0);
    delivery.close().await;
}

#[tokio::test]
async fn listeners_observe_events_in_firing_order() {
    let recording = Recording::new();
    let (tracker, delivery) = tracker_with(Arc::clone(&recording) as Arc<dyn JobListener>);
    let job = make_job("ordered", 10);
    let channel = ChannelId::new();

    tracker.job_queued(&job).await;
    tracker.job_updated(&job).await;
    let bundle = job.create_node_dispatch(10);
    let bundle_id = bundle.id;
    tracker.job_dispatched(&job, channel, Bundle::Node(bundle)).await;
    tracker.job_returned(&job, channel, bundle_id).await;
    tracker.job_ended(&job).await;

    delivery.close().await;
    assert_eq!(
        *recording.kinds.lock(),
        vec![
            JobEventKind::JobQueued,
            JobEventKind::JobUpdated,
            JobEventKind::JobDispatched,
            JobEventKind::JobReturned,
            JobEventKind::JobEnded,
        ]
    );
}

#[tokio::test]
async fn delivery_close_is_idempotent() {
    let recording = Recording::new();
    let (tracker, delivery) = tracker_with(Arc::clone(&recording) as Arc<dyn JobListener>);
    tracker.job_queued(&make_job("closing", 1)).await;

    delivery.close().await;
    // Second close finds the consumer already taken and returns cleanly.
    delivery.close().await;
    assert_eq!(recording.kinds.lock().len(), 1);
}

struct Panicking;

impl JobListener for Panicking {
    fn job_queued(&self, _n: &JobNotification) {
        panic!("listener failure");
    }
}

struct Counting {
    hits: AtomicUsize,
}

impl JobListener for Counting {
    fn job_queued(&self, _n: &JobNotification) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn panicking_listener_does_not_poison_delivery() {
    let delivery = Arc::new(EventDelivery::new(EventQueueConfig::default()));
    let counting = Arc::new(Counting { hits: AtomicUsize::new(0) });
    delivery.add_listener(Arc::new(Panicking));
    delivery.add_listener(Arc::clone(&counting) as Arc<dyn JobListener>);

    let tracker = DispatchTracker::new(Arc::clone(&delivery));
    let job = make_job("panicky", 3);
    tracker.job_queued(&job).await;
    tracker.job_queued(&make_job("panicky-2", 3)).await;

    delivery.close().await;
    assert_eq!(counting.hits.load(Ordering::SeqCst), 2);
}

struct Gated {
    gate: Mutex<std::sync::mpsc::Receiver<()>>,
    hits: AtomicUsize,
}

impl Gated {
    fn new(gate: std::sync::mpsc::Receiver<()>) -> Arc<Self> {
        Arc::new(Self { gate: Mutex::new(gate), hits: AtomicUsize::new(0) })
    }
}

impl JobListener for Gated {
    fn job_queued(&self, _n: &JobNotification) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let _ = self.gate.lock().recv_timeout(Duration::from_secs(5));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drop_newest_sheds_events_when_full() {
    let (release, gate) = std::sync::mpsc::channel();
    let gated = Gated::new(gate);
    let delivery = Arc::new(EventDelivery::new(EventQueueConfig {
        capacity: 2,
        overflow: OverflowPolicy::DropNewest,
    }));
    delivery.add_listener(Arc::clone(&gated) as Arc<dyn JobListener>);
    let tracker = DispatchTracker::new(Arc::clone(&delivery));

    // First event occupies the consumer; give it time to be picked up.
    tracker.job_queued(&make_job("shed-0", 1)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Two fill the channel, the rest are shed.
    for i in 1..6 {
        tracker.job_queued(&make_job(&format!("shed-{i}"), 1)).await;
    }

    for _ in 0..3 {
        let _ = release.send(());
    }
    delivery.close().await;
    assert_eq!(gated.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn block_policy_applies_backpressure() {
    let (release, gate) = std::sync::mpsc::channel();
    let gated = Gated::new(gate);
    let delivery = Arc::new(EventDelivery::new(EventQueueConfig {
        capacity: 1,
        overflow: OverflowPolicy::Block,
    }));
    delivery.add_listener(Arc::clone(&gated) as Arc<dyn JobListener>);
    let tracker = DispatchTracker::new(Arc::clone(&delivery));

    tracker.job_queued(&make_job("block-0", 1)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    tracker.job_queued(&make_job("block-1", 1)).await;

    // Channel full, consumer blocked: the next publish must wait. The
    // timed-out send abandons its event.
    let pending = tokio::time::timeout(
        Duration::from_millis(100),
        tracker.job_queued(&make_job("block-2", 1)),
    )
    .await;
    assert!(pending.is_err(), "publish should block while the channel is full");

    for _ in 0..2 {
        let _ = release.send(());
    }
    delivery.close().await;
    assert_eq!(gated.hits.load(Ordering::SeqCst), 2);
}
