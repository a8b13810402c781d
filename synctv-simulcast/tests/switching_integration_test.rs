//! Integration tests for simulcast layer switching
//!
//! These drive the engine only through its public API, the way the SFU
//! forwarding loop and the bandwidth adaptation logic do.
//!
//! Run with: cargo test -p synctv-simulcast --test switching_integration_test

use std::io::Write;
use std::sync::Arc;
use std::thread;
use synctv_simulcast::test_helpers::{layer_fixture, test_packet, RecordingEndpoint, TestLayer};
use synctv_simulcast::{
    Endpoint, LayerEventKind, LayerHandle, LayerOrder, LayerRegistry, NotificationDispatcher,
    OverrideTarget, SimulcastConfig, SwitchingEngine, SwitchingModeOptions, ThresholdProvider,
    DROPPED_COUNTER_BOUND, MIN_NEXT_SEEN_KEY,
};

struct Relationship {
    engine: SwitchingEngine,
    registry: Arc<LayerRegistry>,
    layers: Vec<(Arc<TestLayer>, LayerHandle)>,
    receiver: Arc<RecordingEndpoint>,
    _sender: Arc<dyn Endpoint>,
}

impl Relationship {
    fn new(orders: u8, thresholds: Arc<dyn ThresholdProvider>) -> Self {
        let (registry, layers) = layer_fixture(orders);
        let receiver = RecordingEndpoint::new("receiver");
        let receiver_dyn: Arc<dyn Endpoint> = receiver.clone();
        let sender: Arc<dyn Endpoint> = RecordingEndpoint::new("sender");

        let engine = SwitchingEngine::new(
            registry.clone(),
            NotificationDispatcher::new(&receiver_dyn, &sender),
            thresholds,
        );

        Self {
            engine,
            registry,
            layers,
            receiver,
            _sender: sender,
        }
    }

    fn with_threshold(orders: u8, min_next_seen: i32) -> Self {
        let mut config = SimulcastConfig::default();
        config.switching.min_next_seen = min_next_seen;
        Self::new(orders, Arc::new(config))
    }

    fn layer(&self, order: usize) -> &Arc<TestLayer> {
        &self.layers[order].0
    }

    /// Forward the lowest layer, forgetting the events it took to get there
    fn settle_on_low(&self) {
        self.engine.initialize();
        self.engine.receive_low(true);
        assert_eq!(self.engine.snapshot().current, Some(LayerOrder::LOWEST));
        self.receiver.clear();
    }
}

#[test]
fn test_receive_high_bridges_then_promotes() {
    let rel = Relationship::with_threshold(2, 125);
    rel.settle_on_low();

    rel.engine.receive_high();

    let snapshot = rel.engine.snapshot();
    assert_eq!(snapshot.current, Some(LayerOrder::LOWEST));
    assert_eq!(snapshot.next, Some(LayerOrder::new(1)));
    assert_eq!(
        rel.receiver.events(),
        vec![(LayerEventKind::Changing, rel.layer(1).ssrc())]
    );

    // 125 * 2^1 = 250 packets must be exceeded
    for i in 1..=251 {
        assert!(rel.engine.accept(&rel.layer(1).packet()));
        let expected = if i < 251 { LayerOrder::LOWEST } else { LayerOrder::new(1) };
        assert_eq!(rel.engine.snapshot().current, Some(expected), "packet {i}");
    }

    assert_eq!(rel.engine.snapshot().next, None);
    assert_eq!(
        rel.receiver.events(),
        vec![
            (LayerEventKind::Changing, rel.layer(1).ssrc()),
            (LayerEventKind::Changed, rel.layer(1).ssrc()),
        ]
    );

    // The old layer now only trickles
    let admitted = (0..DROPPED_COUNTER_BOUND)
        .filter(|_| rel.engine.accept(&rel.layer(0).packet()))
        .count();
    assert_eq!(admitted, 8);
}

#[test]
fn test_promotion_scales_with_order() {
    for (min_next_seen, order) in [(5, 1u8), (3, 2), (1, 3)] {
        let rel = Relationship::with_threshold(order + 1, min_next_seen);
        rel.settle_on_low();

        let target = LayerOrder::new(order);
        rel.engine.configure(Some(
            &SwitchingModeOptions::builder()
                .next_order(target)
                .hard_switch(true)
                .build(),
        ));
        assert_eq!(rel.engine.snapshot().next, Some(target));

        let threshold = min_next_seen << order;
        let layer = rel.layer(usize::from(order));
        for _ in 0..threshold {
            rel.engine.accept(&layer.packet());
        }
        assert_eq!(rel.engine.snapshot().current, Some(LayerOrder::LOWEST));
        assert_eq!(rel.engine.snapshot().seen_next, threshold as u32);

        rel.engine.accept(&layer.packet());
        assert_eq!(rel.engine.snapshot().current, Some(target));
        assert_eq!(rel.engine.snapshot().next, None);
    }
}

#[test]
fn test_receive_low_reports_stopped_next() {
    let rel = Relationship::with_threshold(2, 125);
    rel.settle_on_low();
    rel.engine.receive_high();
    assert_eq!(rel.engine.snapshot().next, Some(LayerOrder::new(1)));
    rel.receiver.clear();

    // The low layer went away and the pending high layer stopped streaming
    rel.registry.remove(rel.layers[0].1);
    rel.layer(1).set_streaming(false);

    rel.engine.receive_low(false);

    let snapshot = rel.engine.snapshot();
    assert_eq!(snapshot.next, None);
    assert_eq!(snapshot.seen_next, 0);
    assert_eq!(
        rel.receiver.events(),
        vec![(LayerEventKind::NextStopped, rel.layer(1).ssrc())]
    );
}

#[test]
fn test_override_precedence_and_release() {
    let rel = Relationship::with_threshold(3, 125);
    rel.settle_on_low();
    rel.engine.receive_high();
    assert_eq!(rel.engine.snapshot().next, Some(LayerOrder::new(2)));

    rel.engine.set_override(OverrideTarget::Layer(LayerOrder::new(1)));

    // Only the override's own packets pass, beyond the trickle
    assert!(rel.engine.accept(&rel.layer(1).packet()));
    for order in [0, 2] {
        let admitted = (0..100)
            .filter(|_| rel.engine.accept(&rel.layer(order).packet()))
            .count();
        assert_eq!(admitted, 8, "layer {order}");
    }

    rel.engine.set_override(OverrideTarget::Clear);
    assert!(rel.engine.accept(&rel.layer(0).packet()));
    assert_eq!(rel.engine.snapshot().override_order, None);
}

#[test]
fn test_trickle_repeats_every_cycle() {
    let rel = Relationship::with_threshold(2, 125);
    rel.settle_on_low();

    let decisions: Vec<bool> = (0..3 * DROPPED_COUNTER_BOUND)
        .map(|i| rel.engine.accept(&test_packet(0x1234, i as u16)))
        .collect();

    for (i, accepted) in decisions.iter().enumerate() {
        assert_eq!(*accepted, i % 2048 < 8, "packet {i}");
    }
}

#[test]
fn test_threshold_from_config_crate() {
    let config = config::Config::builder()
        .set_override(MIN_NEXT_SEEN_KEY, 2)
        .unwrap()
        .build()
        .unwrap();
    let rel = Relationship::new(2, Arc::new(config));
    rel.settle_on_low();
    assert_eq!(rel.engine.snapshot().min_next_seen, 2);

    rel.engine.receive_high();
    for _ in 0..5 {
        rel.engine.accept(&rel.layer(1).packet());
    }
    assert_eq!(rel.engine.snapshot().current, Some(LayerOrder::new(1)));
}

#[test]
fn test_threshold_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("simulcast.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "[switching]\nmin_next_seen = 17").unwrap();

    let config = SimulcastConfig::from_file(path.to_str().unwrap()).unwrap();
    assert_eq!(config.get_int(MIN_NEXT_SEEN_KEY, 125), 17);

    let rel = Relationship::new(2, Arc::new(config));
    rel.engine.initialize();
    assert_eq!(rel.engine.snapshot().min_next_seen, 17);

    // The merged sources answer the same key
    let raw = SimulcastConfig::load_raw(path.to_str()).unwrap();
    let rel = Relationship::new(2, Arc::new(raw));
    rel.engine.initialize();
    assert_eq!(rel.engine.snapshot().min_next_seen, 17);
}

#[test]
fn test_concurrent_accept_and_configure() {
    let rel = Relationship::with_threshold(3, 10);
    rel.settle_on_low();

    thread::scope(|s| {
        for order in 0..3 {
            let rel = &rel;
            s.spawn(move || {
                for _ in 0..5_000 {
                    rel.engine.accept(&rel.layer(order).packet());
                }
            });
        }

        s.spawn(|| {
            for i in 0..200 {
                if i % 2 == 0 {
                    rel.engine.receive_high();
                } else {
                    rel.engine.receive_low(i % 3 == 0);
                }
            }
        });
    });

    let snapshot = rel.engine.snapshot();
    assert!(snapshot.current.is_some());
    if snapshot.next.is_none() {
        assert_eq!(snapshot.seen_next, 0);
    }

    let stats = rel.engine.stats();
    assert_eq!(stats.packets_accepted + stats.packets_dropped, 15_000);
}

#[test]
fn test_engines_are_independent() {
    let first = Relationship::with_threshold(2, 125);
    let second = Relationship::with_threshold(2, 125);
    first.settle_on_low();
    second.settle_on_low();

    first.engine.receive_high();

    assert_eq!(first.engine.snapshot().next, Some(LayerOrder::new(1)));
    assert_eq!(second.engine.snapshot().next, None);
    assert!(second.receiver.messages().is_empty());
}
