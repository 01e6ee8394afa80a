use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pipevolve::rng::RandomNumberGenerator;
use pipevolve::selection::{
    DominatedTournament, NsgaIISurvival, ParentSelector, SurvivalSelector, WeightedRow,
};

fn random_matrix(rng: &mut RandomNumberGenerator, n_rows: usize, n_objectives: usize) -> Vec<WeightedRow> {
    (0..n_rows)
        .map(|_| Some((0..n_objectives).map(|_| rng.uniform() * 10.0).collect()))
        .collect()
}

fn bench_survival_selection(c: &mut Criterion) {
    let mut rng = RandomNumberGenerator::from_seed(42);
    let rows = random_matrix(&mut rng, 200, 3);
    let survival = NsgaIISurvival::new();

    c.bench_function("nsga2_survival_200x3_keep_50", |b| {
        b.iter(|| {
            let selected = survival
                .select(black_box(&rows), black_box(50), &mut rng)
                .unwrap();
            black_box(selected)
        })
    });
}

fn bench_parent_selection(c: &mut Criterion) {
    let mut rng = RandomNumberGenerator::from_seed(42);
    let rows = random_matrix(&mut rng, 200, 3);
    let tournament = DominatedTournament::default();

    c.bench_function("dominated_tournament_200x3_pick_2", |b| {
        b.iter(|| {
            let selected = tournament
                .select(black_box(&rows), black_box(2), &mut rng)
                .unwrap();
            black_box(selected)
        })
    });
}

criterion_group!(benches, bench_survival_selection, bench_parent_selection);
criterion_main!(benches);
