use phylo_lik::{Alignment, Model, RateCategory, SiteModel, SubstModel, YulePrior};
use phylo_state::{RealParameter, State, Tree, NO_NODE};

fn setup() -> (State, Model) {
    let labels = vec!["t1", "t2", "t3", "t4"].into_iter().map(String::from).collect();
    let parents = vec![4, 4, 5, 6, 5, 6, NO_NODE];
    let heights = vec![0.0, 0.0, 0.0, 0.0, 0.1, 0.25, 0.5];
    let mut state = State::new(Tree::from_arrays(labels, parents, heights).unwrap());
    let birth = state.add_param(RealParameter::new("birthRate", vec![1.5], 1e-8, 1e8).unwrap());

    let alignment = Alignment::from_sequences(
        4,
        vec![
            ("t1".to_string(), vec![0, 1, 2, 3, 0, 1, 0, 2]),
            ("t2".to_string(), vec![0, 1, 2, 3, 1, 1, 0, 2]),
            ("t3".to_string(), vec![0, 1, 3, 3, 1, 2, 0, 1]),
            ("t4".to_string(), vec![0, 2, 3, 0, 1, 2, 0, 1]),
        ],
    )
    .unwrap();
    let sites = SiteModel::new(vec![
        RateCategory { rate: 0.4, weight: 0.25 },
        RateCategory { rate: 0.8, weight: 0.25 },
        RateCategory { rate: 1.2, weight: 0.25 },
        RateCategory { rate: 1.6, weight: 0.25 },
    ])
    .unwrap();
    let model = Model {
        alignment,
        subst: SubstModel::JukesCantor { state_count: 4 },
        sites,
        tree_prior: YulePrior::new(birth),
        param_priors: vec![],
        use_scaling: true,
    };
    (state, model)
}

fn assert_incremental_matches_full(
    state: &mut State,
    posterior: &mut phylo_lik::Posterior,
    incremental: f64,
) {
    let mut fresh_state = state.clone();
    let (_, model) = setup();
    // A brand-new engine sees the same state from scratch.
    let mut from_scratch = model.build(fresh_state.tree()).unwrap();
    let full = from_scratch.evaluate_full(&mut fresh_state).unwrap().total();
    assert!(
        (incremental - full).abs() < 1e-6,
        "incremental {incremental} vs full {full}"
    );
    // The engine's own forced recompute must agree as well.
    let own_full = posterior.evaluate_full(state).unwrap().total();
    assert!((incremental - own_full).abs() < 1e-9);
}

#[test]
fn height_edit_accept_then_reject_stays_consistent() {
    let (mut state, model) = setup();
    let mut posterior = model.build(state.tree()).unwrap();
    let initial = posterior.evaluate_full(&mut state).unwrap().total();
    assert!(initial.is_finite());

    // Accepted height change on an internal node.
    state.store();
    posterior.store();
    state.tree_mut().set_height(4, 0.17);
    let accepted = posterior.evaluate(&state).unwrap().total();
    state.accept();
    posterior.accept();
    state.set_everything_dirty(false);
    assert_incremental_matches_full(&mut state, &mut posterior, accepted);

    // Rejected root height change rolls back to the accepted value.
    state.store();
    posterior.store();
    state.tree_mut().set_height(6, 0.9);
    let _proposed = posterior.evaluate(&state).unwrap().total();
    state.restore();
    posterior.restore();
    let after_reject = posterior.evaluate(&state).unwrap().total();
    assert!((after_reject - accepted).abs() < 1e-12);
    assert_incremental_matches_full(&mut state, &mut posterior, after_reject);
}

#[test]
fn topology_edit_reject_restores_cached_value() {
    let (mut state, model) = setup();
    let mut posterior = model.build(state.tree()).unwrap();
    let initial = posterior.evaluate_full(&mut state).unwrap().total();

    // Swap t3 under node 4 and t1 under node 5, then reject.
    state.store();
    posterior.store();
    state.tree_mut().replace_child(4, 0, 2).unwrap();
    state.tree_mut().replace_child(5, 2, 0).unwrap();
    let proposed = posterior.evaluate(&state).unwrap().total();
    assert!(proposed.is_finite());
    state.restore();
    posterior.restore();

    let after = posterior.evaluate(&state).unwrap().total();
    assert!((after - initial).abs() < 1e-12);
    assert_incremental_matches_full(&mut state, &mut posterior, after);
}

#[test]
fn parameter_only_edit_skips_tree_caches_but_matches_full() {
    let (mut state, model) = setup();
    let birth = state.param_id("birthRate").unwrap();
    let mut posterior = model.build(state.tree()).unwrap();
    posterior.evaluate_full(&mut state).unwrap();

    state.store();
    posterior.store();
    state.param_mut(birth).set_value(0, 3.0);
    let value = posterior.evaluate(&state).unwrap().total();
    state.accept();
    posterior.accept();
    state.set_everything_dirty(false);
    assert_incremental_matches_full(&mut state, &mut posterior, value);
}

#[test]
fn repeated_evaluation_is_idempotent() {
    let (mut state, model) = setup();
    let mut posterior = model.build(state.tree()).unwrap();
    posterior.evaluate_full(&mut state).unwrap();

    state.store();
    posterior.store();
    state.tree_mut().set_height(5, 0.3);
    let first = posterior.evaluate(&state).unwrap().total();
    let second = posterior.evaluate(&state).unwrap().total();
    assert_eq!(first, second);
}
