//! Relay demo: one consumer switching between two live producers
//!
//! Run with: cargo run --example relay
//!
//! Two producer tasks publish sinks named `camera-1` and `camera-2` and push
//! a buffer every 40ms. A consumer source starts on `camera-1`, switches to
//! `camera-2` after a second, and prints what it pulls. Registry lifecycle
//! events are logged as they happen.
//!
//! Set `RUST_LOG=interpipe=debug` to see the routing internals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use interpipe::listener::Downstream;
use interpipe::{Blob, Event, PipeSink, PipeSource, Pulled, Registry, SourceConfig};

/// Consumer side that counts the events it is handed
struct Printer {
    events: AtomicU64,
}

impl Downstream for Printer {
    fn push_event(&self, event: Event) -> bool {
        self.events.fetch_add(1, Ordering::Relaxed);
        println!("  event: {} at {:?}", event.name(), event.timestamp);
        true
    }
}

fn spawn_producer(registry: Arc<Registry>, name: &'static str) -> Arc<PipeSink> {
    let sink = PipeSink::new(
        registry,
        Arc::new(move |event: Event| {
            println!("[{}] upstream event: {}", name, event.name());
            true
        }),
    );
    if let Err(e) = sink.publish(name) {
        eprintln!("Failed to publish {}: {}", name, e);
    }

    let producer = sink.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(40));
        let mut pts = 0u64;
        loop {
            ticker.tick().await;
            let payload = Bytes::from(format!("{} frame {}", name, pts / 40_000_000));
            producer.push_buffer(Blob::with_pts(payload, pts).duration(40_000_000));
            pts += 40_000_000;
        }
    });

    sink
}

#[tokio::main]
async fn main() -> interpipe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let registry = Arc::new(Registry::new());

    let mut lifecycle = registry.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = lifecycle.recv().await {
            println!("registry: {:?}", event);
        }
    });

    let printer = Arc::new(Printer {
        events: AtomicU64::new(0),
    });
    let source = PipeSource::with_config(
        "monitor",
        registry.clone(),
        printer.clone(),
        SourceConfig::listening_to("camera-1"),
    );
    source.start()?;

    let camera_1 = spawn_producer(registry.clone(), "camera-1");
    let camera_2 = spawn_producer(registry.clone(), "camera-2");

    let mut pulled = 0u64;
    let mut poll = tokio::time::interval(Duration::from_millis(20));
    for tick in 0..100u32 {
        poll.tick().await;

        if tick == 50 {
            println!("switching monitor to camera-2");
            source.set_listen_to(Some("camera-2"))?;
        }

        while let Some(item) = source.pull() {
            match item {
                Pulled::Buffer(blob) => {
                    pulled += 1;
                    println!(
                        "pulled {:?} ({} bytes, pts {:?})",
                        String::from_utf8_lossy(&blob.data),
                        blob.size(),
                        blob.pts
                    );
                }
                Pulled::Eos => println!("end of stream"),
            }
        }
    }

    source.stop();

    let stats = source.stats();
    println!(
        "Stats: pulled={} received={} dropped={} events={}",
        pulled,
        stats.buffers_received,
        stats.buffers_dropped,
        printer.events.load(Ordering::Relaxed),
    );
    println!(
        "camera-1 forwarded {} buffers, camera-2 forwarded {}",
        camera_1.stats().buffers_forwarded,
        camera_2.stats().buffers_forwarded
    );

    Ok(())
}
