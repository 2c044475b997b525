//! Paint core benchmarks

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sutu_paintcore::brush::{
    Brush, BrushApplication, BrushCore, Dynamics, DynamicsProvider, FadeOptions, GeneratedShape,
    InterpolationParams, MaskCache, PaintOptions, PressureProfile, StrokeInterpolator,
    TransformParams,
};
use sutu_paintcore::input::Coords;
use sutu_paintcore::paint::{MemoryUndoLog, PaintApplicationMode, PaintMode, PixelLoops};
use sutu_paintcore::surface::{PixelFormat, Surface};

fn generate_stroke(count: usize) -> Vec<Coords> {
    (0..count)
        .map(|i| {
            let t = i as f64 / count as f64;
            Coords::new(
                t * 1000.0 + 12.0,
                (t * std::f64::consts::PI * 4.0).sin() * 100.0 + 500.0,
                0.3 + t * 0.4,
            )
        })
        .collect()
}

fn round_brush(radius: f32, hardness: f32) -> Brush {
    Brush::generated(
        "bench",
        &GeneratedShape {
            radius,
            hardness,
            roundness: 1.0,
        },
    )
    .unwrap()
}

fn benchmark_interpolation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Interpolation");
    let dynamics = Dynamics::off();
    let fade = FadeOptions::default();

    for count in [10, 100, 1000].iter() {
        let points = generate_stroke(*count);
        let params = InterpolationParams {
            x_axis: sutu_paintcore::core::Vector2::new(10.0, 0.0),
            y_axis: sutu_paintcore::core::Vector2::new(0.0, 10.0),
            spacing: 0.1,
            ..InterpolationParams::default()
        };

        group.bench_with_input(BenchmarkId::new("segments", count), &points, |b, points| {
            b.iter(|| {
                let mut interpolator = StrokeInterpolator::new(1);
                interpolator.start(&points[0]);
                let mut stamps = 0;
                for p in &points[1..] {
                    stamps += interpolator
                        .interpolate(p, &params, &dynamics as &dyn DynamicsProvider, &fade)
                        .len();
                }
                stamps
            })
        });
    }

    group.finish();
}

fn benchmark_mask_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("Mask Cache");
    let brush = round_brush(24.0, 0.7);
    let loops = PixelLoops::default();

    group.bench_function("soft_mask_phases", |b| {
        let mut cache = MaskCache::new(PressureProfile::Linear);
        b.iter(|| {
            cache
                .transform_mask(&brush, &TransformParams::default(), &loops)
                .unwrap();
            for i in 0..16 {
                let phase = i as f64 / 16.0;
                cache
                    .dab_mask(BrushApplication::Soft, 100.0 + phase, 100.0 + phase, 1.0, &loops)
                    .unwrap();
            }
        })
    });

    group.bench_function("rotated_transform", |b| {
        let mut cache = MaskCache::new(PressureProfile::Linear);
        let mut angle = 0.0;
        b.iter(|| {
            angle += 0.01;
            let params = TransformParams {
                angle,
                aspect_ratio: 5.0,
                ..TransformParams::default()
            };
            cache.transform_mask(&brush, &params, &loops).unwrap();
        })
    });

    group.finish();
}

fn benchmark_stroke(c: &mut Criterion) {
    let mut group = c.benchmark_group("Full Stroke");
    group.sample_size(20);
    let points = generate_stroke(200);

    for (name, mode) in [
        ("continuous", PaintApplicationMode::Continuous),
        ("incremental", PaintApplicationMode::Incremental),
    ] {
        let options = PaintOptions {
            brush_size: Some(32.0),
            application_mode: mode,
            ..PaintOptions::default()
        };

        group.bench_function(name, |b| {
            b.iter(|| {
                let mut surface = Surface::new(1100, 700, PixelFormat::Rgba8).unwrap();
                let mut core = BrushCore::new(options.clone(), PaintMode::Paintbrush).unwrap();
                core.set_brush(Some(round_brush(16.0, 0.8).into_shared()));
                core.set_dynamics(Some(Arc::new(Dynamics::pressure_size_opacity())));
                let mut log = MemoryUndoLog::new();

                core.start(&mut surface, &points[0]).unwrap();
                for p in &points[1..] {
                    core.motion(&mut surface, p).unwrap();
                }
                core.finish(&mut surface, &mut log).unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_interpolation,
    benchmark_mask_cache,
    benchmark_stroke
);
criterion_main!(benches);
