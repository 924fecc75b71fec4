use criterion::{criterion_group, criterion_main, Criterion};
use image::{Rgb, RgbImage};
use lumen_rtc::media::filter_for_tier;
use lumen_rtc::HardwareTier;

fn test_frame(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

fn bench_tier_filters(c: &mut Criterion) {
    let frame = test_frame(640, 480);

    for tier in [HardwareTier::StandardCpu, HardwareTier::HighCpu, HardwareTier::GpuAccel] {
        let filter = filter_for_tier(tier);
        c.bench_function(&format!("{}_640x480", filter.name()), |b| {
            b.iter(|| {
                let mut image = frame.clone();
                filter.apply(&mut image);
                image
            })
        });
    }
}

criterion_group!(benches, bench_tier_filters);
criterion_main!(benches);
