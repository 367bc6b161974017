use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;
use tokio::{runtime::Runtime, sync::mpsc};

use deck_core::controller::{
    ActionEventHandler, Dispatcher, InstanceRegistry, NoopPlugin, PluginEventObserver,
    RoutingTable, Sender, key_timing::LongPressFired,
};
use deck_core::protocol::InboundEvent;

struct Quiet(String);

impl PluginEventObserver for Quiet {}

impl ActionEventHandler for Quiet {
    fn action_id(&self) -> &str {
        &self.0
    }
}

struct Harness {
    dispatcher: Dispatcher,
    _outbound: mpsc::UnboundedReceiver<String>,
    _long_presses: mpsc::UnboundedReceiver<LongPressFired>,
}

fn build_harness(actions: usize) -> Harness {
    let mut registry: InstanceRegistry = InstanceRegistry::new();
    for n in 0..actions {
        registry
            .register_action(Quiet(format!("com.bench.action{n}")))
            .unwrap();
    }

    let (sender, outbound) = Sender::channel("bench");

    let (dispatcher, long_presses) = Dispatcher::new(
        Arc::new(RoutingTable::standard().unwrap()),
        Arc::new(registry),
        Arc::new(NoopPlugin),
        sender,
    );
    Harness {
        dispatcher,
        _outbound: outbound,
        _long_presses: long_presses,
    }
}

fn bench_resolve(c: &mut Criterion) {
    let table: RoutingTable = RoutingTable::standard().unwrap();
    let events: Vec<&str> = table.iter().map(|(event, _)| event).collect();

    let mut group = c.benchmark_group("routing");
    group.throughput(Throughput::Elements(events.len() as u64));
    group.bench_function("resolve_all", |b| {
        b.iter(|| {
            for event in &events {
                black_box(table.resolve(black_box(event)));
            }
        });
    });
    group.bench_function("resolve_unknown", |b| {
        b.iter(|| black_box(table.resolve(black_box("somethingNew"))));
    });
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let rt: Runtime = Runtime::new().unwrap();
    let _enter = rt.enter();

    let mut group = c.benchmark_group("dispatch");
    for actions in [1usize, 16, 128] {
        let harness: Harness = build_harness(actions);
        let dispatcher: &Dispatcher = &harness.dispatcher;
        let targeted: InboundEvent = InboundEvent::new("keyUp")
            .with_action("com.bench.action0")
            .with_context("ctx0")
            .with_payload(json!({"settings": {}}));
        let broadcast: InboundEvent = InboundEvent::new("systemDidWakeUp");

        group.bench_with_input(BenchmarkId::new("targeted", actions), &targeted, |b, raw| {
            b.iter(|| black_box(dispatcher.dispatch(raw)));
        });
        group.bench_with_input(BenchmarkId::new("broadcast", actions), &broadcast, |b, raw| {
            b.iter(|| black_box(dispatcher.dispatch(raw)));
        });

        rt.block_on(dispatcher.supervisor().wait_idle());
    }
    group.finish();
}

criterion_group!(benches, bench_resolve, bench_dispatch);
criterion_main!(benches);
