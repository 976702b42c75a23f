use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{GrayImage, Luma};
use rust_qr_rescue::enhance::EnhancementLadder;
use rust_qr_rescue::utils::binarization::{adaptive_mean_threshold, sauvola_threshold};
use rust_qr_rescue::utils::filters::{local_contrast_equalize, unsharp_mask};

/// Low-contrast checkerboard with a soft gradient across it
fn dim_patch(side: u32) -> GrayImage {
    GrayImage::from_fn(side, side, |x, y| {
        let base = 90 + (x * 40 / side) as u8;
        let cell = ((x / 16) + (y / 16)) % 2 == 0;
        Luma([if cell { base } else { base + 35 }])
    })
}

fn bench_full_ladder(c: &mut Criterion) {
    let patch = dim_patch(512);
    c.bench_function("enhancement_ladder_512", |b| {
        b.iter(|| EnhancementLadder::new(black_box(&patch)).count())
    });
}

fn bench_local_contrast(c: &mut Criterion) {
    let patch = dim_patch(512);
    c.bench_function("local_contrast_512", |b| {
        b.iter(|| local_contrast_equalize(black_box(&patch), black_box(8), black_box(2.5)))
    });
}

fn bench_adaptive_mean(c: &mut Criterion) {
    let patch = dim_patch(512);
    c.bench_function("adaptive_mean_512", |b| {
        b.iter(|| adaptive_mean_threshold(black_box(&patch), black_box(15), black_box(7)))
    });
}

fn bench_sauvola(c: &mut Criterion) {
    let patch = dim_patch(512);
    c.bench_function("sauvola_512", |b| {
        b.iter(|| sauvola_threshold(black_box(&patch), black_box(25), black_box(0.34)))
    });
}

fn bench_unsharp(c: &mut Criterion) {
    let patch = dim_patch(512);
    c.bench_function("unsharp_mask_512", |b| {
        b.iter(|| unsharp_mask(black_box(&patch), black_box(1.6), black_box(2)))
    });
}

criterion_group!(
    benches,
    bench_full_ladder,
    bench_local_contrast,
    bench_adaptive_mean,
    bench_sauvola,
    bench_unsharp
);
criterion_main!(benches);
