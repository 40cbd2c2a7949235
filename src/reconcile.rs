use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::steps::{IDENTIFIER_FIELD, steps};

pub trait IdentifierSource {
    fn mint(&mut self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidSource;

impl IdentifierSource for UuidSource {
    fn mint(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Bare entity content to identifier, first registration wins. Entities are compared
/// structurally, so the registry is a list rather than a hash map.
#[derive(Debug, Default)]
struct Registry {
    entities: Vec<(Map<String, Value>, String)>,
}

impl Registry {
    fn lookup(&self, entity: &Map<String, Value>) -> Option<&str> {
        self.entities
            .iter()
            .find(|(known, _)| known == entity)
            .map(|(_, identifier)| identifier.as_str())
    }

    fn register(&mut self, entity: Map<String, Value>, identifier: String) {
        if self.lookup(&entity).is_none() {
            self.entities.push((entity, identifier));
        }
    }
}

fn take_identifier(entity: &mut Map<String, Value>) -> Option<String> {
    entity
        .shift_remove(IDENTIFIER_FIELD)
        .and_then(|value| value.as_str().map(str::to_string))
}

pub fn reconcile(existing: &[Value], new: &[Value]) -> Vec<Value> {
    reconcile_with(existing, new, &mut UuidSource)
}

pub fn reconcile_with<S: IdentifierSource + ?Sized>(
    existing: &[Value],
    new: &[Value],
    source: &mut S,
) -> Vec<Value> {
    let mut registry = Registry::default();

    for record in existing {
        for step in steps() {
            let Some(mut entity) = step.bare_entity(record) else {
                continue;
            };
            if let Some(identifier) = take_identifier(&mut entity) {
                registry.register(entity, identifier);
            }
        }
    }

    new.iter()
        .map(|record| {
            let mut updated = record.clone();
            for step in steps() {
                let Some(mut entity) = step.bare_entity(record) else {
                    continue;
                };
                let candidate = take_identifier(&mut entity);
                let identifier = match registry.lookup(&entity) {
                    Some(known) => {
                        debug!(step = step.name, identifier = known, "reused identifier");
                        known.to_string()
                    }
                    None => {
                        let identifier = candidate.unwrap_or_else(|| source.mint());
                        debug!(step = step.name, identifier = %identifier, "registered identifier");
                        registry.register(entity, identifier.clone());
                        identifier
                    }
                };
                step.set_identifier(&mut updated, &identifier);
            }
            updated
        })
        .collect()
}
