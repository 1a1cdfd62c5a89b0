//! Outputs published by provisioned resources

use std::collections::HashMap;

use crate::error::GraphError;
use crate::graph::node::{OutputField, OutputRef};

/// Fields published by one resource after it is provisioned.
#[derive(Debug, Clone, Default)]
pub struct ResourceOutputs {
    values: HashMap<OutputField, String>,
}

impl ResourceOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: OutputField, value: impl Into<String>) -> &mut Self {
        self.values.insert(field, value.into());
        self
    }

    pub fn get(&self, field: OutputField) -> Option<&str> {
        self.values.get(&field).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Outputs of all completed resources, keyed by role.
///
/// Each execution wave gets an immutable snapshot of this store. Nodes in the
/// same wave never depend on each other, so a snapshot taken between waves is
/// always complete for every reference a wave can hold.
#[derive(Debug, Clone, Default)]
pub struct OutputStore {
    by_role: HashMap<String, ResourceOutputs>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, role: impl Into<String>, outputs: ResourceOutputs) {
        self.by_role.insert(role.into(), outputs);
    }

    pub fn get(&self, role: &str, field: OutputField) -> Option<&str> {
        self.by_role.get(role).and_then(|o| o.get(field))
    }

    /// Resolve a reference against completed resources.
    pub fn resolve(&self, reference: &OutputRef) -> Result<String, GraphError> {
        self.get(&reference.role, reference.field)
            .map(|v| v.to_string())
            .ok_or_else(|| GraphError::MissingOutput {
                role: reference.role.clone(),
                field: reference.field.as_str().to_string(),
            })
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.by_role.keys().map(|r| r.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_output() {
        let mut outputs = ResourceOutputs::new();
        outputs.set(OutputField::Email, "fleet-sa@demo.iam.gserviceaccount.com");

        let mut store = OutputStore::new();
        store.insert("fleet-sa", outputs);

        let resolved = store.resolve(&OutputRef::email("fleet-sa")).unwrap();
        assert_eq!(resolved, "fleet-sa@demo.iam.gserviceaccount.com");
    }

    #[test]
    fn test_resolve_missing_field_names_role_and_field() {
        let mut store = OutputStore::new();
        store.insert("fleet-sa", ResourceOutputs::new());

        let err = store.resolve(&OutputRef::email("fleet-sa")).unwrap_err();
        assert!(matches!(
            err,
            GraphError::MissingOutput { ref role, ref field }
                if role == "fleet-sa" && field == "email"
        ));
    }

    #[test]
    fn test_resolve_missing_role() {
        let store = OutputStore::new();
        assert!(store.resolve(&OutputRef::self_link("absent")).is_err());
    }
}
