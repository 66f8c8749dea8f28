use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use etl_guard::prelude::*;
use etl_guard::transformers::{AnomalyDetector, DetectionMethod};
use serde_json::json;

fn batch(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            let amount = if i % 97 == 0 { 10_000.0 } else { 100.0 + (i % 13) as f64 };
            Record::from_json(json!({
                "amount": amount,
                "quantity": (i % 7) as i64,
                "discount": (i % 5) as f64 * 0.05,
            }))
            .unwrap()
        })
        .collect()
}

fn benchmark_detection_methods(c: &mut Criterion) {
    let mut group = c.benchmark_group("anomaly_detection");

    for method in [DetectionMethod::Statistical, DetectionMethod::Iqr, DetectionMethod::Combined] {
        for n in [1_000, 10_000].iter() {
            let records = batch(*n);
            group.throughput(Throughput::Elements(*n as u64));

            group.bench_with_input(
                BenchmarkId::new(method.as_str(), n),
                &records,
                |b, records| {
                    let mut detector = AnomalyDetector::builder()
                        .method(method)
                        .n_estimators(50)
                        .build()
                        .unwrap();
                    b.iter(|| {
                        detector
                            .transform_batch(std::hint::black_box(records.clone()), None)
                            .unwrap()
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, benchmark_detection_methods);
criterion_main!(benches);
