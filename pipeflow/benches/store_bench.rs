//! Benchmarks for the container store.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pipeflow::containers::ContainerStore;
use pipeflow::testing::TestContainer;

fn store_benchmark(c: &mut Criterion) {
    c.bench_function("store_container", |b| {
        let store = ContainerStore::new();
        b.iter(|| black_box(store.store_container(TestContainer::new("item"))));
    });

    c.bench_function("store_container_4_threads", |b| {
        b.iter(|| {
            let store = ContainerStore::new();
            std::thread::scope(|scope| {
                for t in 0..4 {
                    let store = &store;
                    scope.spawn(move || {
                        for i in 0..250 {
                            store.store_container(TestContainer::new(format!("{t}-{i}")));
                        }
                    });
                }
            });
            black_box(store.len())
        });
    });

    c.bench_function("get_containers_1000", |b| {
        let store = ContainerStore::new();
        for i in 0..1000 {
            store.store_container(TestContainer::new(i.to_string()));
        }
        b.iter(|| black_box(store.get_containers::<TestContainer>().len()));
    });
}

criterion_group!(benches, store_benchmark);
criterion_main!(benches);
