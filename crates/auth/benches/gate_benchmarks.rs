use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use serde_json::json;
use warden_auth::{ClaimsRecord, Permission, authorize, extract_bearer};

fn claims_with(permission_count: usize) -> ClaimsRecord {
    let permissions: Vec<String> = (0..permission_count)
        .map(|i| format!("resource-{i}:read"))
        .collect();

    let value = json!({
        "iss": "https://tenant.example.com/",
        "aud": "movies-api",
        "exp": 4_102_444_800u64,
        "sub": "auth0|bench",
        "permissions": permissions,
    });
    match value {
        serde_json::Value::Object(map) => ClaimsRecord::from_verified(map).unwrap(),
        _ => unreachable!(),
    }
}

fn bench_extract_bearer(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_bearer");

    let header = format!("Bearer {}", "a".repeat(800));
    group.bench_function("valid", |b| {
        b.iter(|| extract_bearer(black_box(Some(header.as_str()))).unwrap());
    });
    group.bench_function("wrong_scheme", |b| {
        b.iter(|| extract_bearer(black_box(Some("Basic dXNlcjpwYXNz"))).unwrap_err());
    });

    group.finish();
}

fn bench_permission_gate(c: &mut Criterion) {
    let mut group = c.benchmark_group("permission_gate");
    let required = Permission::from_static("resource-7:read");
    let missing = Permission::from_static("resource-7:write");

    for size in [8usize, 64, 512] {
        let claims = claims_with(size);
        group.bench_with_input(BenchmarkId::new("granted", size), &claims, |b, claims| {
            b.iter(|| authorize(black_box(claims), black_box(&required)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("denied", size), &claims, |b, claims| {
            b.iter(|| authorize(black_box(claims), black_box(&missing)).unwrap_err());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_extract_bearer, bench_permission_gate);
criterion_main!(benches);
