//! Merge and rule application benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use serde_json::json;

use zs_core::{Config, RuleEngine, Schema, SiteSettings, StyleSheetSet, SITES};

fn bench_merge(c: &mut Criterion) {
    let schema = Schema::builtin();
    let mut group = c.benchmark_group("merge");

    group.bench_function("absent", |b| {
        b.iter(|| schema.merge(black_box(None)));
    });

    let partial = json!({
        "facebook": {"enabled": false},
        "youtube": {"hideComments": true, "legacy": 1},
        "myspace": {"enabled": true},
        "version": 0
    });
    group.bench_function("partial", |b| {
        b.iter(|| schema.merge(black_box(Some(&partial))));
    });

    let complete = schema.defaults().to_value();
    group.bench_function("complete", |b| {
        b.iter(|| schema.merge(black_box(Some(&complete))));
    });

    group.finish();
}

fn bench_apply(c: &mut Criterion) {
    let config = Config::default();
    let document = Schema::builtin().merge(None);
    let mut group = c.benchmark_group("apply");

    group.bench_function("all_sites_fresh", |b| {
        b.iter_batched(
            StyleSheetSet::new,
            |host| {
                let mut host = host;
                for site in SITES {
                    let mut engine = RuleEngine::new(site, host, &config);
                    engine.apply(&document.site(site.key));
                    host = engine.into_host();
                }
                host
            },
            BatchSize::SmallInput,
        );
    });

    let settings = document.site("youtube");
    let mut engine = RuleEngine::for_site("youtube", StyleSheetSet::new(), &config)
        .expect("youtube has rules");
    engine.apply(&settings);
    group.bench_function("reapply_unchanged", |b| {
        b.iter(|| engine.apply(black_box(&settings)));
    });

    let disabled: SiteSettings = serde_json::from_value(json!({"enabled": false})).expect("valid settings");
    group.bench_function("toggle_enabled", |b| {
        b.iter(|| {
            engine.apply(black_box(&disabled));
            engine.apply(black_box(&settings))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_merge, bench_apply);
criterion_main!(benches);
