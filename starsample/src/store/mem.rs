//! In-memory stores.

use super::{attribute_values, NodeStore, PointStore, StoreError};
use crate::{
    aggregate::SampleRecord,
    attrs::{AttributeSchema, FieldDef, FieldValue, Variable},
    node::{Node, NodeId, NodeRow},
};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
struct Row {
    node: Node,
    values: BTreeMap<String, FieldValue>,
}

/// A node store held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemNodeStore {
    spatial_ref: Option<String>,
    meters_per_unit: Option<f64>,
    rows: BTreeMap<NodeId, Row>,
    fields: Vec<FieldDef>,
    /// Number of `write_nodes` calls so far.
    writes: usize,
}

impl MemNodeStore {
    /// Returns an empty store in a projected system whose unit is
    /// `meters_per_unit` meters long.
    pub fn new(meters_per_unit: f64) -> Self {
        Self {
            meters_per_unit: Some(meters_per_unit),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_spatial_ref(mut self, name: impl Into<String>) -> Self {
        self.spatial_ref = Some(name.into());
        self
    }

    /// Adds `node`, dropping any attributes it carries.
    pub fn insert(&mut self, mut node: Node) {
        node.attrs.clear();
        self.rows.insert(
            node.id,
            Row {
                node,
                values: BTreeMap::new(),
            },
        );
    }

    pub fn value(&self, id: NodeId, field: &str) -> Option<&FieldValue> {
        self.rows.get(&id).and_then(|row| row.values.get(field))
    }

    /// Overwrites a single stored field.
    pub fn set_value(&mut self, id: NodeId, field: &str, value: FieldValue) {
        if let Some(row) = self.rows.get_mut(&id) {
            row.values.insert(field.to_owned(), value);
        }
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl NodeStore for MemNodeStore {
    fn spatial_ref(&self) -> Option<&str> {
        self.spatial_ref.as_deref()
    }

    fn meters_per_unit(&self) -> Option<f64> {
        self.meters_per_unit
    }

    fn ensure_fields(&mut self, fields: &[FieldDef]) -> Result<(), StoreError> {
        let existing: BTreeSet<String> = self.fields.iter().map(|f| f.name.clone()).collect();
        for field in fields {
            if !existing.contains(&field.name) {
                self.fields.push(field.clone());
                for row in self.rows.values_mut() {
                    row.values.insert(field.name.clone(), FieldValue::Null);
                }
            }
        }
        Ok(())
    }

    fn read_nodes(&self, indicator: Option<&str>) -> Result<Vec<NodeRow>, StoreError> {
        Ok(self
            .rows
            .values()
            .map(|row| NodeRow {
                node: row.node.clone(),
                indicator: indicator
                    .and_then(|name| row.values.get(name))
                    .and_then(FieldValue::as_f64),
            })
            .collect())
    }

    fn write_nodes(&mut self, nodes: &[&Node], schema: &AttributeSchema) -> Result<(), StoreError> {
        for node in nodes {
            let row = self
                .rows
                .get_mut(&node.id)
                .ok_or(StoreError::UnknownNode(node.id))?;
            row.values.extend(attribute_values(node, schema));
        }
        self.writes += 1;
        Ok(())
    }
}

/// A sample point store held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemPointStore {
    variables: Vec<Variable>,
    records: Vec<SampleRecord>,
    resets: usize,
}

impl MemPointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[SampleRecord] {
        &self.records
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn resets(&self) -> usize {
        self.resets
    }
}

impl PointStore for MemPointStore {
    fn reset(&mut self) -> Result<(), StoreError> {
        self.records.clear();
        self.resets += 1;
        Ok(())
    }

    fn ensure_schema(&mut self, variables: &[Variable]) -> Result<(), StoreError> {
        self.variables = variables.to_vec();
        Ok(())
    }

    fn delete_nodes(&mut self, ids: &[NodeId]) -> Result<(), StoreError> {
        let ids: BTreeSet<NodeId> = ids.iter().copied().collect();
        self.records.retain(|record| !ids.contains(&record.node));
        Ok(())
    }

    fn insert(&mut self, records: &[SampleRecord]) -> Result<(), StoreError> {
        self.records.extend_from_slice(records);
        Ok(())
    }
}
