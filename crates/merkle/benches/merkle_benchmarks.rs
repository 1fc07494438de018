use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use fieldbook_core::{EntityGuid, EventGuid, SyncLevel, UserId};
use fieldbook_domain::FormSubmission;
use fieldbook_merkle::{MerkleTree, compute_root};
use serde_json::json;

fn make_log(count: usize) -> Vec<FormSubmission> {
    (0..count)
        .map(|i| FormSubmission {
            guid: EventGuid::new(format!("e{i}")),
            entity_guid: EntityGuid::new(format!("p{}", i % 50)),
            event_type: "update-individual".to_string(),
            data: json!({"name": format!("name-{i}"), "visit": i}),
            timestamp: format!("2024-01-01T00:00:{:02}Z", i % 60),
            user_id: UserId::new("u1"),
            sync_level: SyncLevel::Local,
        })
        .collect()
}

/// Full rebuild cost per append, across expected per-tenant log sizes.
fn bench_root_recompute(c: &mut Criterion) {
    let mut group = c.benchmark_group("merkle_root_recompute");
    for size in [100usize, 1_000, 10_000] {
        let log = make_log(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &log, |b, log| {
            b.iter(|| compute_root(black_box(log)));
        });
    }
    group.finish();
}

fn bench_proof_generation(c: &mut Criterion) {
    let log = make_log(1_000);
    let tree = MerkleTree::from_events(&log);
    let target = &log[log.len() / 2];

    c.bench_function("merkle_proof_for", |b| {
        b.iter(|| tree.proof_for(black_box(target)));
    });
}

criterion_group!(benches, bench_root_recompute, bench_proof_generation);
criterion_main!(benches);
