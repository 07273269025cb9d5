use criterion::{Criterion, criterion_group, criterion_main};
use desmina_core::*;

fn bench_reference_solver(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver");
    for (name, size, mines, start) in [
        ("beginner", (9u8, 9u8), 10u16, (4u8, 4u8)),
        ("intermediate", (16, 16), 40, (8, 8)),
        ("expert", (30, 16), 99, (15, 8)),
    ] {
        let config = GameConfig::new(size, mines);
        let layout = SolvableLayoutGenerator::new(42, start).generate(config);
        group.bench_function(name, |b| b.iter(|| check_solvable(&layout, start)));
    }
    group.finish();
}

criterion_group!(benches, bench_reference_solver);
criterion_main!(benches);
