#[macro_use]
extern crate criterion;

use criterion::Criterion;

use omnifs::{FormatOptions, OmniFileSystem, UserRole};

fn options() -> FormatOptions {
    FormatOptions {
        total_size: 16 * 1024 * 1024,
        block_size: 4096,
        max_users: 4,
        file_table_blocks: 64,
        ..FormatOptions::default()
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let data = vec![0x5au8; 64 * 1024];

    let mut fs = OmniFileSystem::new_memory(&options()).unwrap();
    fs.create_user(None, "bench", "bench", UserRole::Admin)
        .unwrap();
    let session = fs.login("bench", "bench").unwrap();

    c.bench_function("create and delete 64k file", |b| {
        b.iter(|| {
            fs.file_create(Some(&session), "/bench", &data).unwrap();
            fs.file_delete(Some(&session), "/bench").unwrap();
        })
    });

    fs.file_create(Some(&session), "/read", &data).unwrap();
    c.bench_function("read 64k file", |b| {
        b.iter(|| fs.file_read(Some(&session), "/read").unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
