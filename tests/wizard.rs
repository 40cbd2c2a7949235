use std::collections::HashMap;

use serde_json::json;

use metadata_registration::reconcile::{IdentifierSource, reconcile};
use metadata_registration::steps::StepKind;
use metadata_registration::validation::{
    FieldKind, FieldRule, FormRegistry, FormSet, validate_record,
};
use metadata_registration::wizard::{SampleWizard, StepTable};

struct Sequence(usize);

impl IdentifierSource for Sequence {
    fn mint(&mut self) -> String {
        self.0 += 1;
        format!("id-{}", self.0)
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn table(header: &[&str], rows: &[&[&str]]) -> StepTable {
    StepTable::new(strings(header), rows.iter().map(|row| strings(row)).collect())
}

#[test]
fn rows_are_keyed_by_tmp_id() {
    let mut wizard = SampleWizard::with_source(Sequence(0));
    let entities = wizard
        .load_rows(
            StepKind::TreatmentIndividual,
            &table(
                &["treatment_id", "dose"],
                &[&["T1", "some_value"], &["T2", "some_value_2"]],
            ),
            &["treatment_id", "dose"],
        )
        .unwrap();

    let keys: Vec<_> = entities.keys().cloned().collect();
    assert_eq!(keys, vec!["T1", "T2"]);
    assert_eq!(
        entities["T1"],
        json!({"treatment_id": "T1", "dose": "some_value", "uuid": "id-1"})
    );
    assert_eq!(
        entities["T2"],
        json!({"treatment_id": "T2", "dose": "some_value_2", "uuid": "id-2"})
    );
}

#[test]
fn references_nest_earlier_entities() {
    let mut wizard = SampleWizard::with_source(Sequence(0));
    wizard
        .load_rows(
            StepKind::TreatmentIndividual,
            &table(&["treatment_id"], &[&["TI"]]),
            &["treatment_id"],
        )
        .unwrap();
    wizard
        .load_rows(
            StepKind::Individual,
            &table(&["individual_id", "treatment_ind"], &[&["I1", "TI"], &["I2", ""]]),
            &["individual_id"],
        )
        .unwrap();
    wizard
        .load_rows(
            StepKind::Sample,
            &table(
                &["sample_id", "individual", "treatment_sam", "parent_sample_id"],
                &[&["S1", "I1", "unknown", "P1; P2,"], &["S2", "I2", "", ""]],
            ),
            &["sample_id"],
        )
        .unwrap();

    let samples = wizard.samples();
    assert_eq!(samples.len(), 2);
    assert_eq!(
        samples[0],
        json!({
            "sample_id": "S1",
            "individual": {
                "individual_id": "I1",
                "treatment": {"treatment_id": "TI", "uuid": "id-1"},
                "uuid": "id-2"
            },
            "parent_sample_id": ["P1", "P2"],
            "uuid": "id-4"
        })
    );
    assert_eq!(
        samples[1],
        json!({
            "sample_id": "S2",
            "individual": {"individual_id": "I2", "uuid": "id-3"},
            "uuid": "id-5"
        })
    );
}

#[test]
fn known_identifiers_are_reused() {
    let known = HashMap::from([("S1".to_string(), "registered".to_string())]);
    let mut wizard =
        SampleWizard::with_source(Sequence(0)).with_known_identifiers(StepKind::Sample, known);
    wizard
        .load_rows(
            StepKind::Sample,
            &table(&["sample_id"], &[&["S1"], &["S2"]]),
            &["sample_id"],
        )
        .unwrap();
    assert_eq!(
        wizard.entity(StepKind::Sample, "S1").unwrap()["uuid"],
        json!("registered")
    );
    assert_eq!(
        wizard.entity(StepKind::Sample, "S2").unwrap()["uuid"],
        json!("id-1")
    );
}

#[test]
fn wizard_output_reconciles_and_validates() {
    let mut wizard = SampleWizard::new();
    wizard.set_default_individual().unwrap();
    wizard
        .load_rows(
            StepKind::Sample,
            &table(
                &["sample_id", "individual", "is_control"],
                &[&["S1", "no_individual", "yes"]],
            ),
            &["sample_id", "is_control"],
        )
        .unwrap();

    let forms = FormSet::new()
        .with_form(
            StepKind::Sample,
            vec![
                FieldRule::new("sample_id", FieldKind::Text).mandatory(),
                FieldRule::new("is_control", FieldKind::Boolean),
            ],
        )
        .with_form(
            StepKind::Individual,
            vec![FieldRule::new(
                "sex",
                FieldKind::Choice(strings(&["female", "male", "na"])),
            )],
        );
    let sample_fields = forms.fields(StepKind::Sample).unwrap();
    wizard.validate_step(StepKind::Sample, sample_fields).unwrap();

    let samples = reconcile(&[], &wizard.samples());
    for sample in &samples {
        validate_record(sample, &[StepKind::Individual, StepKind::Sample], &forms).unwrap();
    }
    assert_eq!(
        wizard.entity(StepKind::Sample, "S1").unwrap()["is_control"],
        json!(true)
    );
}
