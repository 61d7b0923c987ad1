//! Criterion benchmarks for the BOLD loading and preview path.
//!
//! Run with: cargo bench --bench nifti_io
//!
//! - load() for gzip-compressed series of typical sizes
//! - slice() extraction along each axis
//! - render_previews() end to end

use boldcheck::nifti::{self, NiftiImage};
use boldcheck::preview::render_previews;
use boldcheck::ValidationReport;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::{ArrayD, IxDyn};
use tempfile::tempdir;

fn create_test_series(shape: &[usize]) -> NiftiImage {
    let numel: usize = shape.iter().product();
    let data: Vec<f32> = (0..numel).map(|i| (i % 997) as f32).collect();
    let data = ArrayD::from_shape_vec(IxDyn(shape), data).unwrap();
    let affine = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    NiftiImage::from_array(data, affine)
}

const SHAPES: [[usize; 4]; 3] = [[64, 64, 32, 10], [64, 64, 40, 50], [96, 96, 60, 20]];

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_gzip");
    group.sample_size(10);

    for shape in SHAPES {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bold.nii.gz");
        nifti::save(&create_test_series(&shape), &path).unwrap();

        let bytes = shape.iter().product::<usize>() * 4;
        group.throughput(Throughput::Bytes(bytes as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", shape)),
            &path,
            |b, path| b.iter(|| black_box(nifti::load(path).unwrap())),
        );
    }
    group.finish();
}

fn bench_slice(c: &mut Criterion) {
    let mut group = c.benchmark_group("slice");
    let img = create_test_series(&SHAPES[1]);

    for axis in 0..3 {
        let mid = img.shape()[axis] / 2;
        group.bench_with_input(BenchmarkId::from_parameter(axis), &axis, |b, &axis| {
            b.iter(|| black_box(img.slice(axis, mid, 0).unwrap()))
        });
    }
    group.finish();
}

fn bench_render_previews(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let img = create_test_series(&SHAPES[2]);

    c.bench_function("render_previews", |b| {
        b.iter(|| {
            let mut report = ValidationReport::new();
            black_box(render_previews(&img, dir.path(), &mut report).unwrap())
        })
    });
}

criterion_group!(benches, bench_load, bench_slice, bench_render_previews);
criterion_main!(benches);
