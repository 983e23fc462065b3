use csvflow::observability::format_thousands;
use csvflow::{open, IngestOptions, Source};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

const ROWS: u64 = 1_000_000;

fn generate(path: &Path) -> anyhow::Result<()> {
    println!("Generating {} rows into {}...", format_thousands(ROWS), path.display());
    let mut enc = GzEncoder::new(BufWriter::new(File::create(path)?), Compression::fast());
    writeln!(enc, "# synthetic catalogue extract")?;
    writeln!(enc, "# columns: source_id, ra, dec, parallax, flag, designation")?;
    writeln!(enc, "source_id,ra,dec,parallax,flag,designation")?;
    for i in 0..ROWS {
        let ra = (i % 36_000) as f64 / 100.0;
        let dec = ((i % 18_000) as f64 / 100.0) - 90.0;
        let parallax = if i % 17 == 0 {
            "null".to_string()
        } else {
            format!("{:.4}", (i % 1_000) as f64 / 250.0)
        };
        writeln!(
            enc,
            "{},{},{},{},{},\"Gaia DR3 {}\"",
            4_295_806_720u64 + i,
            ra,
            dec,
            parallax,
            i % 2 == 0,
            i
        )?;
    }
    enc.finish()?.flush()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let path = Path::new("bench_data.csv.gz");
    if !path.exists() {
        generate(path)?;
    }

    println!("Benchmarking csvflow ingestion...");
    let start = Instant::now();
    let mut rows = open(Source::from(path), &IngestOptions::default())?;
    let mut count: u64 = 0;
    for row in rows.by_ref() {
        row?;
        count += 1;
    }
    let duration = start.elapsed();

    let secs = duration.as_secs_f64().max(1e-6);
    println!("Parsed {} rows in {:.2}s", format_thousands(count), secs);
    println!("Rate: {} rows/sec", format_thousands((count as f64 / secs) as u64));
    println!(
        "Decompressed {:.1} MB",
        rows.stats().bytes_read as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}
