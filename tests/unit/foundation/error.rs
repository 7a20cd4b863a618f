use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert_eq!(
        RecipeError::validation("x").to_string(),
        "validation error: x"
    );
    assert_eq!(RecipeError::engine("x").to_string(), "engine error: x");
    assert_eq!(
        RecipeError::missing_payload("f.csv").to_string(),
        "missing payload: f.csv"
    );
    assert_eq!(
        RecipeError::UnresolvedReference("bars".into()).to_string(),
        "unresolved reference: call 'bars' has not produced a result"
    );
    assert_eq!(
        RecipeError::UnsupportedVersion {
            found: "2.0".into(),
            supported: 1
        }
        .to_string(),
        "unsupported schema version '2.0' (this build reads major version 1)"
    );
}

#[test]
fn argument_context_wraps_and_root_unwraps() {
    let e = RecipeError::schema_mismatch("no column").in_argument("ax_0_0", "plot_000", "y");
    let msg = e.to_string();
    assert!(msg.contains("ax_0_0/plot_000"), "{msg}");
    assert!(msg.contains("'y'"), "{msg}");
    assert!(matches!(e.root(), RecipeError::SchemaMismatch(_)));
}

#[test]
fn anyhow_errors_convert() {
    let e: RecipeError = anyhow::anyhow!("disk full").into();
    assert_eq!(e.to_string(), "disk full");
}
