use std::collections::BTreeSet;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use relgate_core::mapping::{self, MappingRecord};
use relgate_core::{AclEvaluator, CacheSnapshot, RelationTuple, SnapshotVersion, TenantId};

fn make_record(id: usize, path: String, tag: &str) -> MappingRecord {
    MappingRecord {
        id: format!("m{id:05}"),
        method: "GET".to_string(),
        path,
        tags: vec![tag.to_string()],
        tenant: None,
        specificity: 0,
    }
}

fn mixed_mappings(count: usize) -> Vec<MappingRecord> {
    (0..count)
        .map(|i| match i % 3 {
            0 => make_record(i, format!("/svc{i}/items"), "read"),
            1 => make_record(i, format!("/svc{i}/*"), "read"),
            _ => make_record(i, format!("~/svc{i}/items/[0-9]+"), "write"),
        })
        .collect()
}

fn fan_out_tuples(subjects: usize) -> Vec<RelationTuple> {
    (0..subjects)
        .flat_map(|i| {
            [
                RelationTuple::new("acme", format!("user{i}"), "read"),
                RelationTuple::new("acme", format!("user{i}"), format!("extra{i}")),
            ]
        })
        .collect()
}

fn bench_resolve_last_of_300(c: &mut Criterion) {
    let snapshot =
        CacheSnapshot::build(SnapshotVersion::new(1), mixed_mappings(300), vec![]).unwrap();

    c.bench_function("resolve_last_of_300", |b| {
        b.iter(|| mapping::resolve(&snapshot, None, "GET", black_box("/svc299/items/42")))
    });
}

fn bench_resolve_miss(c: &mut Criterion) {
    let snapshot =
        CacheSnapshot::build(SnapshotVersion::new(1), mixed_mappings(300), vec![]).unwrap();

    c.bench_function("resolve_miss_300", |b| {
        b.iter(|| mapping::resolve(&snapshot, None, "GET", black_box("/unmapped")))
    });
}

fn bench_acl_check_10k_subjects(c: &mut Criterion) {
    let snapshot =
        CacheSnapshot::build(SnapshotVersion::new(1), vec![], fan_out_tuples(10_000)).unwrap();
    let evaluator = AclEvaluator::default();
    let tenant = TenantId::new("acme");
    let required: BTreeSet<String> = ["read".to_string(), "write".to_string()].into();

    c.bench_function("acl_check_10k_subjects", |b| {
        b.iter(|| evaluator.check(&snapshot, &tenant, black_box("user9999"), &required))
    });
}

fn bench_snapshot_build_10k(c: &mut Criterion) {
    c.bench_function("snapshot_build_300_mappings_10k_subjects", |b| {
        b.iter(|| {
            CacheSnapshot::build(
                SnapshotVersion::new(1),
                mixed_mappings(300),
                fan_out_tuples(10_000),
            )
            .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_resolve_last_of_300,
    bench_resolve_miss,
    bench_acl_check_10k_subjects,
    bench_snapshot_build_10k
);
criterion_main!(benches);
