use assert_matches::assert_matches;
use serde_json::json;

use metadata_registration::error::RegistrationError;
use metadata_registration::steps::StepKind;
use metadata_registration::validation::{FieldKind, FieldRule, FormSet, validate_record};

fn forms() -> FormSet {
    FormSet::new()
        .with_form(
            StepKind::Sample,
            vec![
                FieldRule::new("sample_id", FieldKind::Text).mandatory(),
                FieldRule::new("parent_sample_id", FieldKind::List),
                FieldRule::new("weight", FieldKind::Number),
            ],
        )
        .with_form(
            StepKind::Individual,
            vec![
                FieldRule::new("individual_id", FieldKind::Text).mandatory(),
                FieldRule::new("is_healthy", FieldKind::Boolean).mandatory(),
            ],
        )
}

#[test]
fn valid_record_passes() {
    let record = json!({
        "sample_id": "S1",
        "uuid": "u1",
        "parent_sample_id": ["P1"],
        "individual": {"individual_id": "I1", "is_healthy": "on"}
    });
    validate_record(&record, &[StepKind::Sample, StepKind::Individual], &forms()).unwrap();
}

#[test]
fn every_failing_step_is_reported() {
    let record = json!({
        "uuid": "u1",
        "weight": "heavy",
        "individual": {"individual_id": "I1", "is_healthy": "no"}
    });
    let err = validate_record(&record, &[StepKind::Individual, StepKind::Sample], &forms())
        .unwrap_err();
    assert_matches!(&err, RegistrationError::ValidationFailed { subject, messages } => {
        assert_eq!(subject, "Sample u1");
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0],
            "Step 'individual' did not validate: Field 'is_healthy' did not validate: [\"This field is required.\"]"
        );
        assert!(messages[1].starts_with("Step 'sample' did not validate: Field 'sample_id'"));
        assert!(messages[1].contains(" / Field 'weight'"));
    });
    assert!(err.to_string().starts_with("Sample u1 did not validate: ERR: Step 'individual'"));
}

#[test]
fn steps_not_requested_are_skipped() {
    let record = json!({"sample_id": "S1", "individual": {"is_healthy": true}});
    validate_record(&record, &[StepKind::Sample], &forms()).unwrap();
}

#[test]
fn missing_form_is_a_configuration_error() {
    let record = json!({"sample_id": "S1", "treatment": {"treatment_id": "T1"}});
    assert_matches!(
        validate_record(&record, &[StepKind::TreatmentSample], &forms()),
        Err(RegistrationError::Configuration(_))
    );
}
