use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use reconciler::test_harness::WorkLoop;
use reconciler::{Child, ContainerId, Element, Lanes, Update};
use serde_json::json;

const SMALL_LIST: usize = 64;
const LARGE_LIST: usize = 10_000;

fn keyed_list(keys: impl IntoIterator<Item = usize>) -> Child {
    let items: Vec<Element> = keys
        .into_iter()
        .map(|key| Element::host("li").keyed(key.to_string()).attr("n", key as u64))
        .collect();
    Element::host("ul").with_children(items).into()
}

fn mounted(len: usize) -> WorkLoop {
    let mut work = WorkLoop::new(ContainerId(1));
    work.render_and_commit(keyed_list(0..len), Lanes::DEFAULT)
        .expect("mount");
    work
}

fn bench_mount_large(c: &mut Criterion) {
    let children = keyed_list(0..LARGE_LIST);
    c.bench_function("bench_mount_large", |b| {
        b.iter_batched(
            || WorkLoop::new(ContainerId(1)),
            |mut work| {
                let report = work.render(black_box(children.clone()), Lanes::DEFAULT).expect("render");
                black_box(report.counters);
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_reverse_small(c: &mut Criterion) {
    let reversed = keyed_list((0..SMALL_LIST).rev());
    c.bench_function("bench_reverse_small", |b| {
        b.iter_batched(
            || mounted(SMALL_LIST),
            |mut work| {
                let report = work.render(black_box(reversed.clone()), Lanes::DEFAULT).expect("render");
                black_box(report.effects.len());
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_rotate_large(c: &mut Criterion) {
    let rotated = keyed_list((1..LARGE_LIST).chain([0]));
    c.bench_function("bench_rotate_large", |b| {
        b.iter_batched(
            || mounted(LARGE_LIST),
            |mut work| {
                let report = work.render(black_box(rotated.clone()), Lanes::DEFAULT).expect("render");
                black_box(report.effects.len());
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_queue_rebase(c: &mut Criterion) {
    c.bench_function("bench_queue_rebase", |b| {
        b.iter_batched(
            || {
                let mut work = WorkLoop::new(ContainerId(1));
                work.render_and_commit(Element::component("Counter"), Lanes::DEFAULT)
                    .expect("mount");
                let node = work.find(&[0]).expect("component");
                for i in 0..256u64 {
                    let lane = if i % 3 == 0 { Lanes::TRANSITION } else { Lanes::SYNC };
                    work.enqueue(node, Update::merge(lane, json!({ "n": i }))).expect("enqueue");
                }
                work
            },
            |mut work| {
                let urgent = work.rerender(Lanes::SYNC).expect("urgent");
                work.commit(&urgent).expect("commit");
                let full = work.rerender(Lanes::SYNC | Lanes::TRANSITION).expect("full");
                black_box(full.skipped_lanes);
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_mount_large,
    bench_reverse_small,
    bench_rotate_large,
    bench_queue_rebase
);
criterion_main!(benches);
