//! End-to-end routing between sinks and sources through a shared registry

use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio_test::{assert_err, assert_ok};

use interpipe::listener::{Downstream, DropReason, ListenerError};
use interpipe::node::{AllocationPool, AllocationReply, NodeError, Upstream};
use interpipe::registry::RegistryError;
use interpipe::{
    AttachState, Blob, Caps, ClockTime, Event, EventKind, Listener, Node, PipeSink, PipeSource,
    Pulled, Registry, RegistryEvent, SourceConfig, StreamSync,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn caps(s: &str) -> Caps {
    s.parse().unwrap()
}

fn frame(pts: ClockTime) -> Blob {
    Blob::with_pts(Bytes::from_static(b"frame"), pts)
}

/// Producer double recording every upstream event
struct RecordingUpstream {
    accept: bool,
    events: Mutex<Vec<Event>>,
}

impl RecordingUpstream {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            accept: true,
            events: Mutex::new(Vec::new()),
        })
    }

    fn count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Upstream for RecordingUpstream {
    fn send_event(&self, event: Event) -> bool {
        self.events.lock().push(event);
        self.accept
    }
}

/// Consumer double with fixed caps, recording delivered events
struct RecordingDownstream {
    caps: Caps,
    pool_size: u32,
    events: Mutex<Vec<Event>>,
}

impl RecordingDownstream {
    fn new(caps: Caps) -> Arc<Self> {
        Arc::new(Self {
            caps,
            pool_size: 4096,
            events: Mutex::new(Vec::new()),
        })
    }

    fn any() -> Arc<Self> {
        Self::new(Caps::any())
    }
}

impl Downstream for RecordingDownstream {
    fn query_caps(&self) -> Caps {
        self.caps.clone()
    }

    fn push_event(&self, event: Event) -> bool {
        self.events.lock().push(event);
        true
    }

    fn query_allocation(&self, _caps: Option<&Caps>) -> Option<AllocationReply> {
        Some(AllocationReply {
            pools: vec![AllocationPool {
                size: self.pool_size,
                min_buffers: 2,
                max_buffers: 0,
            }],
            ..Default::default()
        })
    }
}

struct Fixture {
    registry: Arc<Registry>,
    upstream: Arc<RecordingUpstream>,
}

impl Fixture {
    fn new() -> Self {
        init_tracing();
        Self {
            registry: Arc::new(Registry::new()),
            upstream: RecordingUpstream::new(),
        }
    }

    fn sink(&self, name: &str) -> Arc<PipeSink> {
        let sink = PipeSink::new(self.registry.clone(), self.upstream.clone());
        sink.publish(name).unwrap();
        sink
    }

    fn source(&self, name: &str, config: SourceConfig) -> Arc<PipeSource> {
        self.source_with(name, config, RecordingDownstream::any())
    }

    fn source_with(
        &self,
        name: &str,
        config: SourceConfig,
        downstream: Arc<RecordingDownstream>,
    ) -> Arc<PipeSource> {
        PipeSource::with_config(name, self.registry.clone(), downstream, config)
    }
}

#[test]
fn test_duplicate_node_name_keeps_first() {
    let fx = Fixture::new();
    let first = fx.sink("cam");

    let second = PipeSink::new(fx.registry.clone(), fx.upstream.clone());
    assert_eq!(
        second.publish("cam"),
        Err(RegistryError::AlreadyExists("cam".into()))
    );

    let found = fx.registry.find_node("cam").unwrap();
    let source = fx.source("out", SourceConfig::default());
    source.start().unwrap();
    assert_ok!(found.add_listener(source.clone()));
    assert_eq!(first.num_listeners(), 1);
    assert_eq!(second.num_listeners(), 0);
    assert_ok!(found.remove_listener(source.as_ref()));
}

#[test]
fn test_deferred_attach_receives_buffers() {
    let fx = Fixture::new();
    let source = fx.source("out", SourceConfig::listening_to("cam"));
    source.start().unwrap();
    assert_eq!(source.attach_state(), AttachState::Pending("cam".into()));

    let sink = fx.sink("cam");
    assert_eq!(source.attach_state(), AttachState::Attached("cam".into()));

    sink.push_buffer(frame(10));
    sink.push_buffer(frame(20));
    assert_eq!(source.pull(), Some(Pulled::Buffer(frame(10))));
    assert_eq!(source.pull(), Some(Pulled::Buffer(frame(20))));
    source.stop();
}

#[test]
fn test_disjoint_caps_rejects_second_listener() {
    let fx = Fixture::new();
    let sink = fx.sink("cam");
    sink.set_capabilities(&caps("video/x-raw,format=I420")).unwrap();

    let first = fx.source("a", SourceConfig::listening_to("cam"));
    first.start().unwrap();
    assert_eq!(first.caps(), Some(caps("video/x-raw,format=I420")));

    let second = fx.source_with(
        "b",
        SourceConfig::listening_to("cam"),
        RecordingDownstream::new(caps("video/x-raw,format=RGB")),
    );
    second.set_capabilities(&caps("video/x-raw,format=RGB")).unwrap();

    let err = second.start().unwrap_err();
    assert!(matches!(
        err,
        ListenerError::Registry(RegistryError::AttachFailed {
            source: NodeError::CapsIncompatible(_),
            ..
        })
    ));
    assert_eq!(second.attach_state(), AttachState::Detached);
    assert_eq!(first.attach_state(), AttachState::Attached("cam".into()));
    assert_eq!(sink.listener_names(), vec!["a".to_string()]);
    first.stop();
}

#[test]
fn test_overlapping_caps_negotiate_intersection() {
    let fx = Fixture::new();
    let sink = fx.sink("cam");
    let config = SourceConfig::listening_to("cam").allow_renegotiation(false);

    let a = fx.source_with(
        "a",
        config.clone(),
        RecordingDownstream::new(caps("video/x-raw,width=[320,1920]")),
    );
    let b = fx.source_with(
        "b",
        config,
        RecordingDownstream::new(caps("video/x-raw,width=[640,3840]")),
    );
    a.start().unwrap();
    b.start().unwrap();

    let expected = caps("video/x-raw,width=[640,1920]");
    assert_eq!(sink.query_capabilities(None), Some(expected.clone()));
    sink.set_capabilities(&expected).unwrap();

    assert_eq!(a.capabilities(), (expected.clone(), true));
    assert_eq!(b.capabilities(), (expected, true));
    a.stop();
    b.stop();
}

#[test]
fn test_conflicting_listeners_detached_on_query() {
    let fx = Fixture::new();
    let sink = fx.sink("cam");

    let a = fx.source_with(
        "a",
        SourceConfig::listening_to("cam"),
        RecordingDownstream::new(caps("audio/x-raw")),
    );
    let b = fx.source_with(
        "b",
        SourceConfig::listening_to("cam"),
        RecordingDownstream::new(caps("video/x-raw")),
    );
    a.start().unwrap();
    b.start().unwrap();

    assert_eq!(sink.query_capabilities(None), None);
    assert_eq!(sink.num_listeners(), 0);
    assert_eq!(a.attach_state(), AttachState::Detached);
    assert_eq!(b.attach_state(), AttachState::Detached);
}

#[test]
fn test_compensate_across_base_times() {
    let fx = Fixture::new();
    let sink = fx.sink("cam");
    let config = SourceConfig::listening_to("cam").stream_sync(StreamSync::Compensate);

    let ahead = fx.source("ahead", config.clone());
    ahead.play(100).unwrap();
    sink.set_base_time(40);
    sink.push_buffer(frame(50));
    match ahead.pull() {
        Some(Pulled::Buffer(blob)) => assert_eq!(blob.pts, Some(110)),
        other => panic!("expected a buffer, got {:?}", other),
    }
    ahead.stop();

    let behind = fx.source("behind", config);
    behind.play(40).unwrap();
    assert_eq!(
        behind.push_buffer(frame(30), 100),
        Err(ListenerError::Dropped(DropReason::TimestampUnderflow {
            pts: 30,
            delta: 60
        }))
    );
    sink.set_base_time(100);
    sink.push_buffer(frame(30));
    assert_eq!(behind.pull(), None);
    assert_eq!(sink.stats().delivery_errors, 1);
    behind.stop();
}

#[test]
fn test_serialized_events_follow_buffers() {
    let fx = Fixture::new();
    let sink = fx.sink("cam");
    let downstream = RecordingDownstream::any();
    let source = fx.source_with("out", SourceConfig::listening_to("cam"), downstream.clone());
    source.start().unwrap();

    sink.push_buffer(frame(10));
    sink.push_event(Event::new(EventKind::Tag("a".into()))).unwrap();
    sink.push_buffer(frame(30));
    sink.push_event(Event::new(EventKind::Tag("b".into()))).unwrap();
    sink.push_buffer(frame(50));
    sink.push_event(Event::new(EventKind::Tag("c".into()))).unwrap();
    sink.push_buffer(frame(70));

    // Events stamped 10, 30, 50; the buffer at 40 lets out only the first two
    assert_eq!(source.pending_events(), 3);
    source.pull().unwrap();
    assert_eq!(source.drain_pending_events(Some(40)), 2);
    assert_eq!(source.pending_events(), 1);

    let stamps: Vec<_> = downstream.events.lock().iter().map(|e| e.timestamp).collect();
    assert_eq!(stamps, vec![Some(10), Some(30)]);
    source.stop();
}

#[test]
fn test_upstream_events_need_single_listener() {
    let fx = Fixture::new();
    let _sink = fx.sink("cam");

    let a = fx.source("a", SourceConfig::listening_to("cam"));
    a.start().unwrap();
    assert_ok!(a.send_upstream_event(Event::reconfigure()));
    assert_eq!(fx.upstream.count(), 1);

    let b = fx.source("b", SourceConfig::listening_to("cam"));
    b.start().unwrap();
    let err = assert_err!(a.send_upstream_event(Event::reconfigure()));
    assert_eq!(
        err,
        ListenerError::Node(NodeError::MultipleSubscribers { count: 2 })
    );
    assert_eq!(fx.upstream.count(), 1);

    b.stop();
    assert_ok!(a.send_upstream_event(Event::new(EventKind::Latency(5))));
    assert_eq!(fx.upstream.count(), 2);
    a.stop();
}

#[test]
fn test_last_listener_leaving_resets_negotiation() {
    let fx = Fixture::new();
    let sink = fx.sink("cam");

    let a = fx.source_with(
        "a",
        SourceConfig::listening_to("cam"),
        RecordingDownstream::new(caps("video/x-raw,format=I420")),
    );
    a.start().unwrap();
    assert_eq!(
        sink.query_capabilities(None),
        Some(caps("video/x-raw,format=I420"))
    );
    a.stop();
    assert!(sink.negotiated_caps().is_none());

    let b = fx.source_with(
        "b",
        SourceConfig::listening_to("cam"),
        RecordingDownstream::new(caps("video/x-raw,format=RGB")),
    );
    b.start().unwrap();
    assert_eq!(
        sink.query_capabilities(None),
        Some(caps("video/x-raw,format=RGB"))
    );
    assert_eq!(b.attach_state(), AttachState::Attached("cam".into()));
    b.stop();
}

#[test]
fn test_rename_detaches_listeners() {
    let fx = Fixture::new();
    let sink = fx.sink("cam");
    let source = fx.source("out", SourceConfig::listening_to("cam"));
    source.start().unwrap();

    sink.rename("cam-hd").unwrap();
    assert_eq!(source.attach_state(), AttachState::Detached);
    assert_eq!(sink.num_listeners(), 0);

    source.set_listen_to(Some("cam-hd")).unwrap();
    assert_eq!(source.attach_state(), AttachState::Attached("cam-hd".into()));
    source.stop();
}

#[test]
fn test_eos_forwarding() {
    let fx = Fixture::new();
    let sink = fx.sink("cam");
    let source = fx.source("out", SourceConfig::listening_to("cam"));
    source.start().unwrap();

    sink.push_buffer(frame(10));
    sink.push_event(Event::eos()).unwrap();
    assert_eq!(source.pull(), Some(Pulled::Buffer(frame(10))));
    assert_eq!(source.pull(), None);

    sink.set_forward_eos(true);
    sink.push_buffer(frame(20));
    sink.send_eos();
    assert_eq!(source.pull(), Some(Pulled::Buffer(frame(20))));
    assert_eq!(source.pull(), Some(Pulled::Eos));
    source.stop();
}

#[test]
fn test_allocation_aggregated_over_listeners() {
    let fx = Fixture::new();
    let sink = fx.sink("cam");
    let a = fx.source("a", SourceConfig::listening_to("cam"));
    let b = fx.source("b", SourceConfig::listening_to("cam"));
    a.start().unwrap();
    b.start().unwrap();

    let plan = sink.propose_allocation(None);
    assert!(plan.is_ok());
    assert_eq!(
        plan.pool,
        Some(AllocationPool {
            size: 4096,
            min_buffers: 3,
            max_buffers: 0
        })
    );
    a.stop();
    b.stop();
}

#[tokio::test]
async fn test_lifecycle_event_feed() {
    let fx = Fixture::new();
    let mut events = fx.registry.subscribe_events();

    let source = fx.source("out", SourceConfig::listening_to("cam"));
    source.start().unwrap();
    let sink = fx.sink("cam");
    source.stop();
    drop(sink);

    let expected = vec![
        RegistryEvent::ListenerPending {
            listener: "out".into(),
            node: "cam".into(),
        },
        RegistryEvent::NodeAdded { node: "cam".into() },
        RegistryEvent::ListenerAttached {
            listener: "out".into(),
            node: "cam".into(),
        },
        RegistryEvent::ListenerDetached {
            listener: "out".into(),
            node: Some("cam".into()),
        },
        RegistryEvent::NodeRemoved { node: "cam".into() },
    ];
    for want in expected {
        assert_eq!(events.recv().await.unwrap(), want);
    }
}

#[test]
fn test_producer_may_use_registry_during_reconfigure() {
    let fx = Fixture::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let upstream = {
        let registry = fx.registry.clone();
        let seen = seen.clone();
        move |event: Event| {
            if matches!(event.kind, EventKind::Reconfigure) {
                let found = registry.find_node("cam").is_some();
                seen.lock().push((registry.subscription_count(), found));
            }
            true
        }
    };
    let sink = PipeSink::new(fx.registry.clone(), Arc::new(upstream));
    sink.publish("cam").unwrap();
    sink.set_capabilities(&caps("video/x-raw,width=640")).unwrap();

    let source = fx.source("out", SourceConfig::listening_to("cam"));
    source.set_capabilities(&caps("video/x-raw,width=1280")).unwrap();
    source.start().unwrap();

    assert_eq!(*seen.lock(), vec![(0, true)]);
    assert_eq!(source.attach_state(), AttachState::Attached("cam".into()));
    assert_eq!(sink.listener_names(), vec!["out".to_string()]);
    source.stop();
}

#[test]
fn test_concurrent_switching_and_renames_stay_consistent() {
    const ROUNDS: usize = 200;
    const BUFFERS: u64 = 400;
    const TARGETS: [&str; 4] = ["cam-0", "cam-1", "cam-2", "cam-2b"];

    let fx = Fixture::new();
    let sinks: Vec<_> = (0..3).map(|i| fx.sink(&format!("cam-{}", i))).collect();
    let sources: Vec<_> = (0..4)
        .map(|i| fx.source(&format!("out-{}", i), SourceConfig::listening_to(TARGETS[i % 3])))
        .collect();
    for source in &sources {
        source.start().unwrap();
    }

    let mut received: Vec<Vec<(u8, ClockTime)>> = thread::scope(|scope| {
        for (origin, sink) in sinks.iter().enumerate() {
            scope.spawn(move || {
                for pts in 0..BUFFERS {
                    sink.push_buffer(Blob::with_pts(Bytes::from(vec![origin as u8]), pts));
                    if pts % 16 == 0 {
                        thread::yield_now();
                    }
                }
            });
        }

        let renamed = &sinks[2];
        scope.spawn(move || {
            for round in 0..ROUNDS {
                let name = if round % 2 == 0 { "cam-2b" } else { "cam-2" };
                renamed.rename(name).unwrap();
            }
        });

        let consumers: Vec<_> = sources
            .iter()
            .enumerate()
            .map(|(i, source)| {
                scope.spawn(move || {
                    let mut seen = Vec::new();
                    for round in 0..ROUNDS {
                        let target = TARGETS[(i + round) % TARGETS.len()];
                        source.set_listen_to(Some(target)).unwrap();
                        while let Some(Pulled::Buffer(blob)) = source.pull() {
                            seen.push((blob.data[0], blob.pts.unwrap()));
                        }
                    }
                    seen
                })
            })
            .collect();

        consumers
            .into_iter()
            .map(|consumer| consumer.join().unwrap())
            .collect()
    });

    // Whatever arrived after the last switch
    for (source, seen) in sources.iter().zip(received.iter_mut()) {
        while let Some(Pulled::Buffer(blob)) = source.pull() {
            seen.push((blob.data[0], blob.pts.unwrap()));
        }
    }

    // Each edge stays in order
    for seen in &received {
        for origin in 0..3u8 {
            let stamps: Vec<_> = seen
                .iter()
                .filter(|(from, _)| *from == origin)
                .map(|(_, pts)| *pts)
                .collect();
            assert!(
                stamps.windows(2).all(|pair| pair[0] < pair[1]),
                "out of order from cam-{}: {:?}",
                origin,
                stamps
            );
        }
    }

    // Registry and nodes agree on who listens to whom
    for source in &sources {
        match source.attach_state() {
            AttachState::Attached(node) => {
                let sink = sinks
                    .iter()
                    .find(|sink| sink.name().as_deref() == Some(node.as_str()))
                    .unwrap();
                assert!(sink.listener_names().contains(&source.name().to_string()));
            }
            AttachState::Pending(node) => assert!(fx.registry.find_node(&node).is_none()),
            AttachState::Detached => {
                assert!(sinks
                    .iter()
                    .all(|sink| !sink.listener_names().contains(&source.name().to_string())));
            }
        }
    }
    for sink in &sinks {
        let name = sink.name().unwrap();
        for listener in sink.listener_names() {
            assert_eq!(fx.registry.attach_state(&listener), AttachState::Attached(name.clone()));
        }
    }

    let forwarded: u64 = sinks.iter().map(|sink| sink.stats().buffers_forwarded).sum();
    assert_eq!(forwarded, 3 * BUFFERS);

    for source in &sources {
        source.stop();
    }
}
