use phylo_lik::{
    Alignment, Model, ParamPrior, PriorKind, RateCategory, SiteModel, SubstModel, YulePrior,
};
use phylo_state::{RealParameter, State, Tree, NO_NODE};

const GAP: u8 = 4;

fn two_taxon_state(t1: f64, t2: f64) -> State {
    let labels = vec!["A".to_string(), "B".to_string()];
    // Leaves at heights chosen so the root-to-leaf paths are t1 and t2.
    let root_height = t1.max(t2);
    let parents = vec![2, 2, NO_NODE];
    let heights = vec![root_height - t1, root_height - t2, root_height];
    let mut state = State::new(Tree::from_arrays(labels, parents, heights).unwrap());
    state.add_param(RealParameter::new("birthRate", vec![1.0], 1e-8, 1e8).unwrap());
    state
}

/// Dense 4x4 matrix exponential by scaling and squaring with a Taylor
/// series, used as the reference for the closed-form transition matrix.
fn mat_exp_4(q: &[[f64; 4]; 4], t: f64) -> [[f64; 4]; 4] {
    let scaling = 20u32;
    let factor = t / f64::from(1u32 << scaling);
    let mut term = [[0.0; 4]; 4];
    let mut result = [[0.0; 4]; 4];
    for i in 0..4 {
        term[i][i] = 1.0;
        result[i][i] = 1.0;
    }
    for n in 1..30 {
        let mut next = [[0.0; 4]; 4];
        for i in 0..4 {
            for j in 0..4 {
                for l in 0..4 {
                    next[i][j] += term[i][l] * q[l][j] * factor / n as f64;
                }
            }
        }
        term = next;
        for i in 0..4 {
            for j in 0..4 {
                result[i][j] += term[i][j];
            }
        }
    }
    for _ in 0..scaling {
        let mut sq = [[0.0; 4]; 4];
        for i in 0..4 {
            for j in 0..4 {
                for l in 0..4 {
                    sq[i][j] += result[i][l] * result[l][j];
                }
            }
        }
        result = sq;
    }
    result
}

#[test]
fn jc_transition_matrix_matches_matrix_exponential() {
    // Normalized Jukes-Cantor generator: off-diagonal 1/3, diagonal -1.
    let mut q = [[1.0 / 3.0; 4]; 4];
    for i in 0..4 {
        q[i][i] = -1.0;
    }
    let reference = mat_exp_4(&q, 0.1);

    let state = two_taxon_state(0.05, 0.05);
    let model = SubstModel::JukesCantor { state_count: 4 };
    let mut out = vec![0.0; 16];
    model.transition_probabilities(&state, 0.1, &mut out);

    for i in 0..4 {
        for j in 0..4 {
            assert!(
                (out[i * 4 + j] - reference[i][j]).abs() < 1e-10,
                "P[{i}][{j}] = {} vs exp(Qt) = {}",
                out[i * 4 + j],
                reference[i][j]
            );
        }
    }
}

#[test]
fn two_taxon_jc_matches_closed_form() {
    // Total path length 0.1 split unevenly between the two branches.
    let state = two_taxon_state(0.03, 0.07);
    let seq_a = vec![0u8, 1, 2, 3, 0, 0, 2];
    let seq_b = vec![0u8, 1, 3, 3, 1, 0, 2];
    let alignment = Alignment::from_sequences(
        4,
        vec![("A".to_string(), seq_a.clone()), ("B".to_string(), seq_b.clone())],
    )
    .unwrap();

    let model = Model {
        alignment,
        subst: SubstModel::JukesCantor { state_count: 4 },
        sites: SiteModel::single(),
        tree_prior: YulePrior::new(state.param_id("birthRate").unwrap()),
        param_priors: vec![],
        use_scaling: false,
    };
    let mut posterior = model.build(state.tree()).unwrap();
    let mut state = state;
    let density = posterior.evaluate_full(&mut state).unwrap();

    // By reversibility the two-taxon site likelihood collapses to
    // pi * P(t1 + t2)[a, b].
    let decay = (-4.0 / 3.0 * 0.1f64).exp();
    let p_same = 0.25 + 0.75 * decay;
    let p_diff = 0.25 * (1.0 - decay);
    let expected: f64 = seq_a
        .iter()
        .zip(seq_b.iter())
        .map(|(&a, &b)| {
            let p = if a == b { p_same } else { p_diff };
            (0.25 * p).ln()
        })
        .sum();

    assert!(
        (density.log_likelihood - expected).abs() < 1e-10,
        "pruning {} vs closed form {}",
        density.log_likelihood,
        expected
    );
}

#[test]
fn hky_rows_sum_to_one_and_balance_details() {
    let mut state = two_taxon_state(0.05, 0.05);
    let kappa = state.add_param(RealParameter::new("kappa", vec![3.0], 0.0, 100.0).unwrap());
    let freqs = [0.3, 0.2, 0.25, 0.25];
    let model = SubstModel::hky(kappa, freqs).unwrap();

    let mut out = vec![0.0; 16];
    model.transition_probabilities(&state, 0.37, &mut out);
    state.accept();

    for i in 0..4 {
        let row: f64 = (0..4).map(|j| out[i * 4 + j]).sum();
        assert!((row - 1.0).abs() < 1e-12, "row {i} sums to {row}");
        for j in 0..4 {
            // Detailed balance of a reversible model.
            let forward = freqs[i] * out[i * 4 + j];
            let backward = freqs[j] * out[j * 4 + i];
            assert!((forward - backward).abs() < 1e-12);
        }
    }
}

fn five_taxon_state() -> State {
    let labels = vec!["t1", "t2", "t3", "t4", "t5"]
        .into_iter()
        .map(String::from)
        .collect();
    let parents = vec![5, 5, 6, 7, 8, 6, 7, 8, NO_NODE];
    let heights = vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.05, 0.12, 0.3, 0.6];
    let mut state = State::new(Tree::from_arrays(labels, parents, heights).unwrap());
    state.add_param(RealParameter::new("birthRate", vec![2.0], 1e-8, 1e8).unwrap());
    state
}

fn five_taxon_alignment(extra_gap_column: bool) -> Alignment {
    let mut rows = vec![
        ("t1".to_string(), vec![0u8, 1, 2, 3, 0, 1, 2, 0, GAP, 1]),
        ("t2".to_string(), vec![0u8, 1, 2, 3, 1, 1, 2, 0, 2, 1]),
        ("t3".to_string(), vec![0u8, 1, 2, 0, 1, 3, 2, 0, 2, 1]),
        ("t4".to_string(), vec![0u8, 2, 2, 0, 1, 3, 1, 0, 2, 3]),
        ("t5".to_string(), vec![0u8, 2, 3, 0, 1, 3, 1, 0, GAP, 3]),
    ];
    if extra_gap_column {
        for (_, seq) in rows.iter_mut() {
            seq.push(GAP);
        }
    }
    Alignment::from_sequences(4, rows).unwrap()
}

fn five_taxon_model(use_scaling: bool) -> (State, Model) {
    let state = five_taxon_state();
    let sites = SiteModel::new(vec![
        RateCategory { rate: 0.5, weight: 0.5 },
        RateCategory { rate: 1.5, weight: 0.5 },
    ])
    .unwrap();
    let model = Model {
        alignment: five_taxon_alignment(false),
        subst: SubstModel::JukesCantor { state_count: 4 },
        sites,
        tree_prior: YulePrior::new(state.param_id("birthRate").unwrap()),
        param_priors: vec![ParamPrior::new(
            state.param_id("birthRate").unwrap(),
            PriorKind::Exponential { mean: 1.0 },
        )],
        use_scaling,
    };
    (state, model)
}

#[test]
fn scaling_does_not_change_the_log_likelihood() {
    let (state, model_plain) = five_taxon_model(false);
    let (_, model_scaled) = five_taxon_model(true);

    let mut state_a = state.clone();
    let mut state_b = state;
    let mut plain = model_plain.build(state_a.tree()).unwrap();
    let mut scaled = model_scaled.build(state_b.tree()).unwrap();

    let lik_plain = plain.evaluate_full(&mut state_a).unwrap().log_likelihood;
    let lik_scaled = scaled.evaluate_full(&mut state_b).unwrap().log_likelihood;

    assert!(
        (lik_plain - lik_scaled).abs() < 1e-9,
        "unscaled {lik_plain} vs scaled {lik_scaled}"
    );
}

#[test]
fn all_gap_column_multiplies_through_as_identity() {
    let (state, mut model) = five_taxon_model(true);

    let mut state_a = state.clone();
    let mut posterior = model.build(state_a.tree()).unwrap();
    let without = posterior.evaluate_full(&mut state_a).unwrap().log_likelihood;

    model.alignment = five_taxon_alignment(true);
    let mut state_b = state;
    let mut with_gap = model.build(state_b.tree()).unwrap();
    let with = with_gap.evaluate_full(&mut state_b).unwrap().log_likelihood;

    assert!((without - with).abs() < 1e-12);
}

#[test]
fn all_gap_column_is_identity_under_invariant_proportion() {
    let (mut state, mut model) = five_taxon_model(false);
    let p_inv = state.add_param(RealParameter::new("pInv", vec![0.3], 0.0, 0.999).unwrap());
    model.sites = model.sites.with_prop_invariant(p_inv);

    let mut state_a = state.clone();
    let mut posterior = model.build(state_a.tree()).unwrap();
    let without = posterior.evaluate_full(&mut state_a).unwrap().log_likelihood;

    model.alignment = five_taxon_alignment(true);
    let mut with_gap = model.build(state.tree()).unwrap();
    let with = with_gap.evaluate_full(&mut state).unwrap().log_likelihood;

    // A fully ambiguous column is compatible with every invariant state, so
    // its invariant term sums to p_inv and the site likelihood stays at one.
    assert!(
        (without - with).abs() < 1e-12,
        "without gap column {without} vs with {with}"
    );
}

#[test]
fn invariant_proportion_shifts_constant_sites_only() {
    let (mut state, mut model) = five_taxon_model(false);
    let p_inv = state.add_param(RealParameter::new("pInv", vec![0.0], 0.0, 0.999).unwrap());
    model.sites = model.sites.with_prop_invariant(p_inv);

    let mut posterior = model.build(state.tree()).unwrap();
    let at_zero = posterior.evaluate_full(&mut state).unwrap().log_likelihood;

    state.store();
    posterior.store();
    state.param_mut(p_inv).set_value(0, 0.3);
    let at_point_three = posterior.evaluate(&state).unwrap().log_likelihood;

    // Raising the invariant proportion must change the likelihood (the
    // alignment has constant columns) and must do so smoothly.
    assert!(at_zero.is_finite() && at_point_three.is_finite());
    assert!((at_zero - at_point_three).abs() > 1e-12);
}
