use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RegistrationError;

pub const IDENTIFIER_FIELD: &str = "uuid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    #[serde(rename = "treatment_ind")]
    TreatmentIndividual,
    Individual,
    #[serde(rename = "treatment_sam")]
    TreatmentSample,
    Sample,
}

impl StepKind {
    pub fn descriptor(self) -> &'static StepDescriptor {
        match self {
            StepKind::TreatmentIndividual => &STEPS[0],
            StepKind::Individual => &STEPS[1],
            StepKind::TreatmentSample => &STEPS[2],
            StepKind::Sample => &STEPS[3],
        }
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for StepKind {
    type Err = RegistrationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        step_by_name(value.trim()).map(|step| step.kind)
    }
}

#[derive(Debug)]
pub struct StepDescriptor {
    pub kind: StepKind,
    pub number: u8,
    pub name: &'static str,
    pub prop_name_in_db: &'static str,
    pub prop_name_for_tmp_id: &'static str,
    pub form_name: &'static str,
    pub name_prefix: &'static str,
    pub label: &'static str,
    pub label_prefix: &'static str,
    pub optional: bool,
    pub is_final: bool,
    pub nested_steps: &'static [StepKind],
    pub prop_names_multiple: &'static [&'static str],
    pub slot: &'static [&'static str],
}

pub static STEPS: [StepDescriptor; 4] = [
    StepDescriptor {
        kind: StepKind::TreatmentIndividual,
        number: 1,
        name: "treatment_ind",
        prop_name_in_db: "treatment",
        prop_name_for_tmp_id: "treatment_id",
        form_name: "treatment",
        name_prefix: "treatment_individual",
        label: "Treatment(s) on individual(s)",
        label_prefix: "TRE > IND",
        optional: true,
        is_final: false,
        nested_steps: &[],
        prop_names_multiple: &[],
        slot: &["individual", "treatment"],
    },
    StepDescriptor {
        kind: StepKind::Individual,
        number: 2,
        name: "individual",
        prop_name_in_db: "individual",
        prop_name_for_tmp_id: "individual_id",
        form_name: "individual",
        name_prefix: "individual",
        label: "Individual(s)",
        label_prefix: "IND",
        optional: true,
        is_final: false,
        nested_steps: &[StepKind::TreatmentIndividual],
        prop_names_multiple: &[],
        slot: &["individual"],
    },
    StepDescriptor {
        kind: StepKind::TreatmentSample,
        number: 3,
        name: "treatment_sam",
        prop_name_in_db: "treatment",
        prop_name_for_tmp_id: "treatment_id",
        form_name: "treatment",
        name_prefix: "treatment_sample",
        label: "Treatment(s) on sample(s)",
        label_prefix: "TRE > SAM",
        optional: true,
        is_final: false,
        nested_steps: &[],
        prop_names_multiple: &[],
        slot: &["treatment"],
    },
    StepDescriptor {
        kind: StepKind::Sample,
        number: 4,
        name: "sample",
        prop_name_in_db: "samples",
        prop_name_for_tmp_id: "sample_id",
        form_name: "sample",
        name_prefix: "sample",
        label: "Sample(s)",
        label_prefix: "SAM",
        optional: false,
        is_final: true,
        nested_steps: &[StepKind::TreatmentSample, StepKind::Individual],
        prop_names_multiple: &["parent_sample_id"],
        slot: &[],
    },
];

impl StepDescriptor {
    pub fn previous(&self) -> Option<&'static StepDescriptor> {
        let index = usize::from(self.number);
        (index >= 2).then(|| &STEPS[index - 2])
    }

    pub fn next(&self) -> Option<&'static StepDescriptor> {
        STEPS.get(usize::from(self.number))
    }

    pub fn nested(&self) -> impl Iterator<Item = &'static StepDescriptor> {
        self.nested_steps.iter().map(|kind| kind.descriptor())
    }

    pub fn is_multiple(&self, prop_name: &str) -> bool {
        self.prop_names_multiple.contains(&prop_name)
    }

    pub fn bare_entity(&self, record: &Value) -> Option<Map<String, Value>> {
        let mut current = record;
        for key in self.slot {
            current = current.get(*key)?;
        }
        let mut entity = current.as_object()?.clone();
        for nested in self.nested() {
            entity.shift_remove(nested.prop_name_in_db);
        }
        Some(entity)
    }

    pub fn set_identifier(&self, record: &mut Value, identifier: &str) -> bool {
        let mut current = record;
        for key in self.slot {
            match current.get_mut(*key) {
                Some(next) => current = next,
                None => return false,
            }
        }
        match current.as_object_mut() {
            Some(entity) => {
                entity.insert(
                    IDENTIFIER_FIELD.to_string(),
                    Value::String(identifier.to_string()),
                );
                true
            }
            None => false,
        }
    }
}

pub fn steps() -> &'static [StepDescriptor] {
    &STEPS
}

pub fn step_by_number(number: u8) -> Result<&'static StepDescriptor, RegistrationError> {
    STEPS
        .iter()
        .find(|step| step.number == number)
        .ok_or_else(|| RegistrationError::UnknownStep(format!("number {number}")))
}

pub fn step_by_name(name: &str) -> Result<&'static StepDescriptor, RegistrationError> {
    STEPS
        .iter()
        .find(|step| step.name == name)
        .ok_or_else(|| RegistrationError::UnknownStep(name.to_string()))
}

pub fn step_by_name_prefix(prefix: &str) -> Result<&'static StepDescriptor, RegistrationError> {
    STEPS
        .iter()
        .find(|step| step.name_prefix == prefix)
        .ok_or_else(|| RegistrationError::UnknownStep(format!("prefix {prefix}")))
}
