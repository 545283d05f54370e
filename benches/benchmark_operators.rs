use criterion::{criterion_group, criterion_main, Criterion};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rustdg::fe::DgSpace;
use rustdg::grid::Grid;
use rustdg::operators::{
    apply, BoundaryDescriptor, CellKernel, ConvectiveOperator, LaplaceOperator, MassOperator,
};
use rustdg::types::DofVector;
use std::sync::Arc;

const SIZES: [(usize, usize); 3] = [(3, 2), (4, 4), (5, 6)];

fn periodic_space(n_refine: usize, degree: usize, n_components: usize) -> DgSpace {
    let grid = Grid::hyper_cube(n_refine, 0., 1.)
        .with_periodicity(0)
        .with_periodicity(1);
    DgSpace::new(Arc::new(grid), degree, n_components)
}

fn random_vector(space: &DgSpace) -> DofVector {
    DofVector::random(space.n_dofs(), Uniform::new(-1., 1.))
}

fn bench_kernel<K: CellKernel>(c: &mut Criterion, name: &str, kernel: &K) {
    let space = kernel.row_space();
    let src = random_vector(space);
    let mut dst = space.zero_vector();
    c.bench_function(name, |b| b.iter(|| apply(kernel, &src, &mut dst)));
}

pub fn bench_laplace(c: &mut Criterion) {
    for (n_refine, degree) in SIZES {
        let space = periodic_space(n_refine, degree, 1);
        let laplace = LaplaceOperator::new(&space, BoundaryDescriptor::new(), 1., 1.);
        let name = format!("Laplace apply: refine {} degree {}", n_refine, degree);
        bench_kernel(c, &name, &laplace);
    }
}

pub fn bench_mass(c: &mut Criterion) {
    for (n_refine, degree) in SIZES {
        let space = periodic_space(n_refine, degree, 2);
        let name = format!("Mass apply: refine {} degree {}", n_refine, degree);
        bench_kernel(c, &name, &MassOperator::new(&space));
    }
}

pub fn bench_convective(c: &mut Criterion) {
    for (n_refine, degree) in SIZES {
        let space = periodic_space(n_refine, degree, 2);
        let convective = ConvectiveOperator::new(&space, BoundaryDescriptor::new(), 1.);
        let src = random_vector(&space);
        let mut dst = space.zero_vector();
        let name = format!("Convective evaluate: refine {} degree {}", n_refine, degree);
        c.bench_function(&name, |b| b.iter(|| convective.evaluate(&mut dst, &src, 0.)));
        let linearized = convective.linearized(&src, 0.);
        let name = format!("Convective linearized: refine {} degree {}", n_refine, degree);
        bench_kernel(c, &name, &linearized);
    }
}

criterion_group!(benches, bench_laplace, bench_mass, bench_convective);
criterion_main!(benches);
