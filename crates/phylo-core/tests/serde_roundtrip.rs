use phylo_core::errors::{ErrorInfo, PhyloError};
use phylo_core::provenance::{RunProvenance, SchemaVersion};

#[test]
fn provenance_round_trips_json() {
    let provenance = RunProvenance {
        seed: 99,
        data_digest: "00000000deadbeef".into(),
        created_at: "2026-01-15T00:00:00Z".into(),
        tool_versions: [("phylo-core".into(), "0.1.0".into())].into_iter().collect(),
    };

    let json = serde_json::to_string_pretty(&provenance).expect("serialize");
    let decoded: RunProvenance = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(decoded, provenance);
}

#[test]
fn schema_version_orders_numerically() {
    assert!(SchemaVersion::new(1, 2, 0) > SchemaVersion::new(1, 1, 9));
    assert_eq!(SchemaVersion::default(), SchemaVersion::new(1, 0, 0));
}

#[test]
fn errors_round_trip_with_family_tag() {
    let err = PhyloError::Numeric(
        ErrorInfo::new("log-of-zero", "density is zero at the proposed state")
            .with_context("param", "kappa")
            .with_hint("tighten the prior support"),
    );

    let json = serde_json::to_string(&err).expect("serialize");
    assert!(json.contains("\"family\":\"Numeric\""));

    let decoded: PhyloError = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(decoded, err);
    assert!(decoded.is_numeric());
}

#[test]
fn error_context_defaults_when_absent() {
    let json = r#"{"family":"State","detail":{"code":"ST001","message":"bad"}}"#;
    let decoded: PhyloError = serde_json::from_str(json).expect("deserialize");
    assert!(decoded.info().context.is_empty());
    assert!(decoded.info().hint.is_none());
}
