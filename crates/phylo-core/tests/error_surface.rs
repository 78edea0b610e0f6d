use phylo_core::errors::{ErrorInfo, PhyloError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("node", "5")
        .with_context("reason", "example")
}

#[test]
fn state_error_surface() {
    let err = PhyloError::State(sample_info("ST001", "restore without store"));
    assert_eq!(err.info().code, "ST001");
    assert!(err.info().context.contains_key("node"));
}

#[test]
fn tree_error_surface() {
    let err = PhyloError::Tree(sample_info("TR001", "height inversion"));
    assert_eq!(err.info().code, "TR001");
    assert!(err.info().context.contains_key("reason"));
}

#[test]
fn likelihood_error_surface() {
    let err = PhyloError::Likelihood(sample_info("L001", "empty alignment"));
    assert_eq!(err.info().code, "L001");
}

#[test]
fn numeric_error_is_the_budgeted_tier() {
    let err = PhyloError::Numeric(sample_info("N001", "non-finite density"));
    assert!(err.is_numeric());
    assert!(!PhyloError::Verify(sample_info("V001", "divergence")).is_numeric());
}

#[test]
fn rng_error_surface() {
    let err = PhyloError::Rng(sample_info("RN001", "invalid seed"));
    assert_eq!(err.info().code, "RN001");
}

#[test]
fn serde_error_surface() {
    let err = PhyloError::Serde(sample_info("S001", "schema mismatch"));
    assert_eq!(err.info().code, "S001");
}

#[test]
fn display_includes_code_and_hint() {
    let err = PhyloError::Verify(
        ErrorInfo::new("incremental-divergence", "caches disagree")
            .with_hint("re-run with verification enabled"),
    );
    let rendered = err.to_string();
    assert!(rendered.contains("incremental-divergence"));
    assert!(rendered.contains("re-run with verification enabled"));
}
