use std::fs;

use phylo_mcmc::RunConfig;
use tempfile::tempdir;

#[test]
fn minimal_yaml_fills_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.yaml");
    fs::write(&path, "chain_length: 5000\n").unwrap();

    let config = RunConfig::load_yaml(&path).unwrap();
    assert_eq!(config.chain_length, 5000);
    assert_eq!(config.burn_in, 0);
    assert_eq!(config.log_every, 10);
    assert_eq!(config.verify.budget, 1000);
    assert_eq!(config.verify.every, 10);
    assert_eq!(config.checkpoint.interval, 0);
    assert_eq!(config.checkpoint.max_to_keep, 4);
    assert!(config.output.run_directory.is_none());
}

#[test]
fn full_yaml_roundtrips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.yaml");
    let yaml = r#"
chain_length: 200
burn_in: 50
log_every: 2
verify:
  budget: 100
  every: 5
  tolerance: 1.0e-8
max_numeric_warnings: 7
checkpoint:
  interval: 20
  max_to_keep: 2
seed_policy:
  master_seed: 777
  label: bench-a
output:
  run_directory: out/run-a
  trace_file: chain.tsv
"#;
    fs::write(&path, yaml).unwrap();

    let config = RunConfig::load_yaml(&path).unwrap();
    assert_eq!(config.chain_length, 200);
    assert_eq!(config.burn_in, 50);
    assert_eq!(config.verify.every, 5);
    assert_eq!(config.verify.tolerance, 1e-8);
    assert_eq!(config.max_numeric_warnings, 7);
    assert_eq!(config.checkpoint.interval, 20);
    assert_eq!(config.seed_policy.master_seed, 777);
    assert_eq!(config.seed_policy.label.as_deref(), Some("bench-a"));
    assert_eq!(
        config.output.run_directory.as_deref(),
        Some(std::path::Path::new("out/run-a"))
    );
    assert_eq!(
        config.output.trace_file,
        std::path::PathBuf::from("chain.tsv")
    );
}

#[test]
fn missing_file_reports_the_path() {
    let err = RunConfig::load_yaml(std::path::Path::new("/nonexistent/run.yaml")).unwrap_err();
    assert!(err.to_string().contains("config-read") || err.info().code == "config-read");
}

#[test]
fn verify_window_applies_only_inside_budget() {
    let config = RunConfig::default();
    assert!(config.verify.applies(0));
    assert!(config.verify.applies(10));
    assert!(!config.verify.applies(5));
    assert!(!config.verify.applies(-10));
    assert!(!config.verify.applies(1000));
    assert!(!config.verify.applies(1500));
}
