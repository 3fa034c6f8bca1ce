//! Criterion benchmarks for theme listing post-processing.
//!
//! Measures [`dedup_by_precedence`] and [`resolve_theme`] over listings the
//! size of a large user collection layered on top of the shipped presets.
//!
//! Run with:
//! ```bash
//! cargo bench --package ftm-core --bench discovery_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ftm_core::{dedup_by_precedence, resolve_theme, ThemeDescriptor, ThemeOrigin};

/// Builds `n` descriptors per origin where every third name collides across origins.
fn build_listing(n: usize) -> Vec<ThemeDescriptor> {
    let mut out = Vec::with_capacity(n * 3);
    for origin in ThemeOrigin::ALL {
        for i in 0..n {
            let name = if i % 3 == 0 {
                format!("shared-{i}")
            } else {
                format!("{origin}-{i}")
            };
            out.push(ThemeDescriptor::new(
                name.clone(),
                format!("/themes/{origin}/{name}.jsonc"),
                origin,
            ));
        }
    }
    out
}

fn bench_dedup(c: &mut Criterion) {
    let mut group = c.benchmark_group("dedup_by_precedence");
    for n in [10usize, 100, 1000] {
        let listing = build_listing(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &listing, |b, listing| {
            b.iter(|| dedup_by_precedence(black_box(listing.clone())))
        });
    }
    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let listing = dedup_by_precedence(build_listing(1000));
    c.bench_function("resolve_theme/qualified_last", |b| {
        b.iter(|| resolve_theme(black_box("user/user-998"), black_box(&listing)))
    });
}

criterion_group!(benches, bench_dedup, bench_resolve);
criterion_main!(benches);
