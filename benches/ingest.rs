use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use csvflow::{open, IngestOptions, Source};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Cursor, Write};

const ROWS: u64 = 50_000;

fn make_gzip_csv(rows: u64) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    writeln!(enc, "# generated").unwrap();
    writeln!(enc, "id,ra,dec,flag,name").unwrap();
    for i in 0..rows {
        writeln!(
            enc,
            "{},{},{},{},\"star {}, field {}\"",
            i,
            (i % 3600) as f64 / 10.0,
            -((i % 900) as f64) / 10.0,
            i % 3 == 0,
            i,
            i % 7
        )
        .unwrap();
    }
    enc.finish().unwrap()
}

fn ingest(data: &[u8], options: &IngestOptions) -> u64 {
    let source = Source::Reader(Box::new(Cursor::new(data.to_vec())));
    let mut count = 0;
    for row in open(source, options).unwrap() {
        black_box(row.unwrap());
        count += 1;
    }
    count
}

fn bench_ingest(c: &mut Criterion) {
    let data = make_gzip_csv(ROWS);
    let mut group = c.benchmark_group("ingest");
    group.throughput(Throughput::Elements(ROWS));

    let defaults = IngestOptions::default();
    group.bench_function("gzip_default", |b| {
        b.iter(|| assert_eq!(ingest(&data, &defaults), ROWS))
    });

    let projected = IngestOptions {
        columns: Some(vec!["id".to_string(), "dec".to_string()]),
        ..Default::default()
    };
    group.bench_function("gzip_projected", |b| {
        b.iter(|| assert_eq!(ingest(&data, &projected), ROWS))
    });

    let small_buffer = IngestOptions {
        buffer_size: 4 * 1024,
        ..Default::default()
    };
    group.bench_function("gzip_4k_buffer", |b| {
        b.iter(|| assert_eq!(ingest(&data, &small_buffer), ROWS))
    });
    group.finish();
}

criterion_group!(benches, bench_ingest);
criterion_main!(benches);
