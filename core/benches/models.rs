use criterion::{criterion_group, criterion_main, Criterion};
use kliff::{
    calculator::ComputeArguments,
    models::{LennardJones, Model, StillingerWeber},
    testing,
};

fn bench_compute(c: &mut Criterion, model: &impl Model, config: kliff::configuration::Configuration) {
    let mut ca = ComputeArguments::new(config, model, true, true, true).expect("supported configuration");
    let natoms = ca.configuration().num_atoms();

    c.bench_function(&format!("{} {natoms} atoms", model.name()), |b| {
        b.iter(|| ca.compute(model))
    });
}

fn bench_models(c: &mut Criterion) {
    bench_compute(c, &StillingerWeber::silicon(), testing::diamond_silicon(5.43, 3));
    bench_compute(c, &LennardJones::argon(), testing::fcc_argon(5.26, 3));
}

criterion_group!(benches, bench_models);
criterion_main!(benches);
