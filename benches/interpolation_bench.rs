// Benchmark for segment interpolation throughput
// Run with: cargo bench

use criterion::{Criterion, criterion_group, criterion_main};
use robot_motion_sim::{SplineSegment, Waypoint};
use std::hint::black_box;

fn waypoints(dof: usize) -> (Waypoint, Waypoint) {
    let prev = Waypoint::new(vec![0.0; dof], vec![0.0; dof], vec![0.5; dof], 0.0).unwrap();
    let cur = Waypoint::new(vec![1.0; dof], vec![0.0; dof], vec![-0.5; dof], 1.0).unwrap();
    (prev, cur)
}

fn bench_segment_positions(c: &mut Criterion) {
    let (prev, cur) = waypoints(6);
    let segment = SplineSegment::new(&prev, &cur).unwrap();
    c.bench_function("1000 sub-steps x 6 joints (positions)", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for step in 0..1000 {
                let t = step as f64 * 0.001;
                for joint in 0..6 {
                    sum += segment.position(joint, black_box(t));
                }
            }
            black_box(sum)
        });
    });
}

fn bench_segment_samples(c: &mut Criterion) {
    let (prev, cur) = waypoints(7);
    let segment = SplineSegment::new(&prev, &cur).unwrap();
    c.bench_function("1000 full samples x 7 joints", |b| {
        b.iter(|| {
            for step in 0..1000 {
                black_box(segment.sample(black_box(step as f64 * 0.001)));
            }
        });
    });
}

criterion_group!(benches, bench_segment_positions, bench_segment_samples);
criterion_main!(benches);
