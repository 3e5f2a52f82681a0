use criterion::{Criterion, criterion_group, criterion_main};
use image::{Rgb, RgbImage};
use std::hint::black_box;
use smartfit_core::{Compositor, GarmentFitter, Landmark, PoseLandmarks};
use smartfit_utils::{laplacian_variance, normalize_variance, quality::TRYON_NORMALIZATION};

fn build_photo() -> RgbImage {
    RgbImage::from_fn(1024, 768, |x, y| {
        let val = ((x + y) % 255) as u8;
        Rgb([val, 255u8.saturating_sub(val), val / 2 + 60])
    })
}

fn build_garment() -> RgbImage {
    RgbImage::from_fn(300, 400, |x, y| {
        if (x / 12 + y / 12) % 2 == 0 {
            Rgb([180, 30, 40])
        } else {
            Rgb([30, 40, 160])
        }
    })
}

fn build_pose() -> PoseLandmarks {
    PoseLandmarks::from_torso(
        Landmark::new(0.62, 0.3),
        Landmark::new(0.38, 0.3),
        Landmark::new(0.58, 0.65),
        Landmark::new(0.42, 0.65),
    )
}

fn bench_tryon_chain(c: &mut Criterion) {
    let photo = build_photo();
    let garment = build_garment();
    let pose = build_pose();
    let fitter = GarmentFitter::new();
    let compositor = Compositor::default();

    c.bench_function("fit_landmarks", |b| {
        b.iter(|| fitter.fit(black_box(&garment), black_box(&photo), Some(&pose)))
    });

    c.bench_function("fit_composite_score", |b| {
        b.iter(|| {
            let fitted = fitter.fit(black_box(&garment), black_box(&photo), None);
            let composite = compositor
                .blend(&photo, &fitted.buffer, None)
                .expect("matching dimensions");
            normalize_variance(laplacian_variance(&composite), TRYON_NORMALIZATION)
        })
    });
}

criterion_group!(benches, bench_tryon_chain);
criterion_main!(benches);
