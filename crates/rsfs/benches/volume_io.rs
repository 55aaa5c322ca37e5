use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rsfs::{OpenMode, Volume};
use std::hint::black_box;

const SECTORS: u32 = 8192;

fn write_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential");
    for size in [4096usize, 64 * 1024, 1024 * 1024] {
        let data = vec![0xA5u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("write", size), &data, |b, data| {
            let mut volume = Volume::new_formatted(rsfs::io::image(SECTORS)).unwrap();
            b.iter(|| {
                let file = volume.open("bench", OpenMode::Write).unwrap();
                volume.write(file, black_box(data)).unwrap();
                volume.close(file).unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("read", size), &data, |b, data| {
            let mut volume = Volume::new_formatted(rsfs::io::image(SECTORS)).unwrap();
            let file = volume.open("bench", OpenMode::Write).unwrap();
            volume.write(file, data).unwrap();
            volume.close(file).unwrap();
            b.iter(|| {
                let file = volume.open("bench", OpenMode::Read).unwrap();
                black_box(volume.read(file, size).unwrap());
                volume.close(file).unwrap();
            });
        });
    }
    group.finish();
}

fn create_remove(c: &mut Criterion) {
    c.bench_function("create_remove", |b| {
        let mut volume = Volume::new_formatted(rsfs::io::image(SECTORS)).unwrap();
        b.iter(|| {
            volume.create(black_box("file")).unwrap();
            volume.remove("file").unwrap();
        });
    });
}

criterion_group!(benches, write_read, create_remove);
criterion_main!(benches);
