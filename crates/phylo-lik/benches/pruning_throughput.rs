use criterion::{criterion_group, criterion_main, Criterion};

use phylo_lik::{Alignment, Model, RateCategory, SiteModel, SubstModel, YulePrior};
use phylo_state::{RealParameter, State, Tree, NO_NODE};

fn caterpillar_state(leaves: usize) -> State {
    let labels: Vec<String> = (0..leaves).map(|i| format!("t{i}")).collect();
    let node_count = 2 * leaves - 1;
    let mut parents = vec![NO_NODE; node_count];
    let mut heights = vec![0.0; node_count];
    // Leaves 0 and 1 join at the first internal node, every further leaf
    // joins the spine one node up.
    parents[0] = leaves;
    parents[1] = leaves;
    for (step, leaf) in (2..leaves).enumerate() {
        parents[leaf] = leaves + step + 1;
    }
    for internal in leaves..node_count - 1 {
        parents[internal] = internal + 1;
    }
    for (step, internal) in (leaves..node_count).enumerate() {
        heights[internal] = 0.05 * (step + 1) as f64;
    }
    let mut state = State::new(Tree::from_arrays(labels, parents, heights).unwrap());
    state.add_param(RealParameter::new("birthRate", vec![1.0], 1e-8, 1e8).unwrap());
    state
}

fn random_alignment(leaves: usize, sites: usize) -> Alignment {
    // Deterministic pseudo-data; the bench only needs realistic shapes.
    let rows = (0..leaves)
        .map(|taxon| {
            let seq = (0..sites)
                .map(|site| ((site * 31 + taxon * 7 + site * taxon) % 4) as u8)
                .collect();
            (format!("t{taxon}"), seq)
        })
        .collect();
    Alignment::from_sequences(4, rows).unwrap()
}

fn bench_full_and_incremental(c: &mut Criterion) {
    let leaves = 32;
    let mut state = caterpillar_state(leaves);
    let model = Model {
        alignment: random_alignment(leaves, 500),
        subst: SubstModel::JukesCantor { state_count: 4 },
        sites: SiteModel::new(vec![
            RateCategory { rate: 0.5, weight: 0.5 },
            RateCategory { rate: 1.5, weight: 0.5 },
        ])
        .unwrap(),
        tree_prior: YulePrior::new(state.param_id("birthRate").unwrap()),
        param_priors: vec![],
        use_scaling: true,
    };
    let mut posterior = model.build(state.tree()).unwrap();
    posterior.evaluate_full(&mut state).unwrap();

    c.bench_function("full_recompute", |b| {
        b.iter(|| posterior.evaluate_full(&mut state).unwrap().total())
    });

    c.bench_function("single_height_edit", |b| {
        b.iter(|| {
            state.store();
            posterior.store();
            let node = state.tree().leaf_count();
            let height = state.tree().height(node);
            state.tree_mut().set_height(node, height * 0.999);
            let value = posterior.evaluate(&state).unwrap().total();
            state.restore();
            posterior.restore();
            value
        })
    });
}

criterion_group!(benches, bench_full_and_incremental);
criterion_main!(benches);
