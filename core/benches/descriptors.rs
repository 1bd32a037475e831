use std::collections::HashMap;

use criterion::{criterion_group, criterion_main, Criterion};
use kliff::{
    descriptors::{CutoffFunction, Descriptor, SymmetryFunction, SymmetryFunctionTerm},
    neighbor::{NeighborList, PaddingAtoms},
    testing,
};

fn symmetry_function() -> SymmetryFunction {
    let cutoffs = HashMap::from([("Si-Si".to_string(), 4.5)]);
    let terms = vec![
        SymmetryFunctionTerm::G1,
        SymmetryFunctionTerm::G2 { eta: 0.0009, rs: 0.0 },
        SymmetryFunctionTerm::G2 { eta: 0.01, rs: 0.0 },
        SymmetryFunctionTerm::G3 { kappa: 0.03214 },
        SymmetryFunctionTerm::G4 { zeta: 1.0, lambda: -1.0, eta: 0.0001 },
        SymmetryFunctionTerm::G4 { zeta: 2.0, lambda: 1.0, eta: 0.003 },
        SymmetryFunctionTerm::G5 { zeta: 1.0, lambda: -1.0, eta: 0.0001 },
        SymmetryFunctionTerm::G5 { zeta: 2.0, lambda: 1.0, eta: 0.003 },
    ];
    SymmetryFunction::new(&cutoffs, CutoffFunction::Cos, terms).expect("valid descriptor")
}

fn bench_padding(c: &mut Criterion) {
    for reps in [1, 3] {
        let config = testing::diamond_silicon(5.43, reps);

        c.bench_function(&format!("Padding Si{}", config.num_atoms()), |b| {
            b.iter(|| {
                PaddingAtoms::generate(
                    config.cell(),
                    config.pbc(),
                    config.species(),
                    config.coords(),
                    4.5,
                )
            })
        });

        c.bench_function(&format!("Neighbor list Si{}", config.num_atoms()), |b| {
            b.iter(|| NeighborList::new(&config, 4.5, false))
        });
    }
}

fn bench_symmetry_functions(c: &mut Criterion) {
    let descriptor = symmetry_function();

    for reps in [1, 2] {
        let config = testing::diamond_silicon(5.43, reps);

        c.bench_function(&format!("Symmetry functions Si{}", config.num_atoms()), |b| {
            b.iter(|| descriptor.transform(&config, false, false))
        });

        c.bench_function(
            &format!("Symmetry functions with derivatives Si{}", config.num_atoms()),
            |b| b.iter(|| descriptor.transform(&config, true, true)),
        );
    }
}

criterion_group!(benches, bench_padding, bench_symmetry_functions);
criterion_main!(benches);
