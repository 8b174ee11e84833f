use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::biosamples::{AttributeValue, SampleRecord};

/// An attribute the portal has no canonical field for, exported verbatim so
/// no submitted metadata is lost.
#[derive(Debug, Clone, Serialize)]
pub struct CustomField {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(rename = "ontologyTerms", skip_serializing_if = "Option::is_none")]
    pub ontology_terms: Option<String>,
}

/// Builds a sample document from a raw registry record, mapping inconsistent
/// source attribute names onto canonical fields and tracking which source
/// names have been consumed.
#[derive(Debug, Default)]
pub struct SampleDocBuilder {
    root: Map<String, Value>,
    consumed: BTreeSet<String>,
}

impl SampleDocBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: &str, value: Value) {
        self.root.insert(field.to_string(), value);
    }

    /// Marks a source attribute name as handled without mapping it, so the
    /// residual pass will not re-export it.
    pub fn mark_consumed(&mut self, name: &str) {
        self.consumed.insert(name.to_string());
    }

    /// Tries `candidates` in order against the record's attribute bag and
    /// writes the first match as `{text, ontologyTerms?}` under `canonical`,
    /// nested inside `section` when one is given. Returns whether a
    /// candidate matched.
    pub fn extract(
        &mut self,
        record: &SampleRecord,
        canonical: &str,
        candidates: &[&str],
        section: Option<&str>,
    ) -> bool {
        let Some(key) = record.attribute_key(candidates) else {
            return false;
        };
        let Some(attribute) = record.first_attribute(key) else {
            return false;
        };
        self.consumed.insert(key.to_string());
        let value = label_value(attribute);
        match section {
            Some(section) => {
                let entry = self
                    .root
                    .entry(section.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(map) = entry {
                    map.insert(canonical.to_string(), value);
                }
            }
            None => {
                self.root.insert(canonical.to_string(), value);
            }
        }
        true
    }

    /// Residual pass: every attribute no canonical field consumed is kept as
    /// an opaque custom field.
    pub fn push_custom_fields(&mut self, record: &SampleRecord) {
        let mut custom_fields = Vec::new();
        for (name, values) in &record.characteristics {
            if self.consumed.contains(name) {
                continue;
            }
            let Some(attribute) = values.first() else {
                continue;
            };
            custom_fields.push(CustomField {
                name: name.clone(),
                value: attribute.text.clone(),
                unit: attribute.unit.clone(),
                ontology_terms: attribute.ontology_terms.first().cloned(),
            });
        }
        let serialized = custom_fields
            .into_iter()
            .map(|field| serde_json::to_value(&field).unwrap_or(Value::Null))
            .collect();
        self.root
            .insert("customField".to_string(), Value::Array(serialized));
    }

    pub fn finish(self) -> Value {
        Value::Object(self.root)
    }
}

fn label_value(attribute: &AttributeValue) -> Value {
    match attribute.ontology_terms.first() {
        Some(term) => json!({"text": attribute.text, "ontologyTerms": term}),
        None => json!({"text": attribute.text}),
    }
}
