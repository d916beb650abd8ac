use criterion::{Criterion, criterion_group, criterion_main};
use feature_group_core::{
    Dataset, FeatureGroupConfig, FeatureGroupDataset, InMemoryFeatureStore, Session, Table,
};
use std::fs;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn shuttles() -> Table {
    let path = format!("{}/test_data/shuttles.csv", env!("CARGO_MANIFEST_DIR"));
    let csv = fs::read_to_string(path).expect("failed to read shuttles.csv");
    Table::from_csv_reader(csv.as_bytes()).expect("failed to parse shuttles.csv")
}

fn dataset(store: Arc<InMemoryFeatureStore>) -> FeatureGroupDataset {
    let config = FeatureGroupConfig::new(
        "spaceflights-shuttles",
        "s3://spaceflights-feature-store/offline",
        "id",
        "event_time",
        "SELECT * FROM \"{table_name}\"",
        "arn:aws:iam::123456789012:role/FeatureStoreRole",
    );
    FeatureGroupDataset::new(config, Session::in_memory(store)).expect("invalid config")
}

fn bench_dataset(c: &mut Criterion) {
    let runtime = Runtime::new().expect("failed to create tokio runtime");
    let table = shuttles();
    let store = Arc::new(InMemoryFeatureStore::new());
    let dataset = dataset(store);
    runtime
        .block_on(dataset.save(&table))
        .expect("initial save failed");

    c.bench_function("dataset_save_existing_group", |b| {
        b.to_async(&runtime).iter(|| async {
            dataset.save(&table).await.expect("save failed");
        });
    });

    c.bench_function("dataset_exists", |b| {
        b.to_async(&runtime).iter(|| async {
            let exists = dataset.exists().await.expect("describe failed");
            criterion::black_box(exists);
        });
    });
}

criterion_group!(dataset_benches, bench_dataset);
criterion_main!(dataset_benches);
