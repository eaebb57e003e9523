//! Node and sample point persistence.
//!
//! The engine only talks to the [NodeStore] and [PointStore] traits.
//! [mem] holds in-memory stores, [file] GeoJSON backed ones.

pub mod file;
pub mod mem;

use crate::{
    aggregate::SampleRecord,
    attrs::{AttributeSchema, FieldDef, FieldValue, Variable},
    node::{Node, NodeId, NodeRow},
};
use std::path::PathBuf;
use thiserror::Error;

pub const NODE_ID: &str = "NODE_ID";
pub const STREAM_ID: &str = "STREAM_ID";
pub const STREAM_KM: &str = "STREAM_KM";
pub const STREAM_AZIMUTH: &str = "STRM_AZMTH";

/// Fixed leading columns of the sample point output, followed by one
/// column per sampled variable.
pub const POINT_FIELDS: [&str; 9] = [
    "X",
    "Y",
    STREAM_ID,
    NODE_ID,
    "SAMPLE_ID",
    "TRANS_AZI",
    "TRANSECT",
    "SAMPLE",
    "KEY",
];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    GeoJson(#[from] geojson::Error),

    #[error("{0} does not exist")]
    NotFound(PathBuf),

    #[error("invalid store {path}, {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("node {0} is not in the node store")]
    UnknownNode(NodeId),
}

/// The dataset stream nodes are read from and sampled values are
/// written back to.
pub trait NodeStore: Send {
    /// Returns the name of the nodes' spatial reference, if known.
    fn spatial_ref(&self) -> Option<&str>;

    /// Returns the length of one native unit in meters, or `None` if
    /// the nodes are not in a projected coordinate system.
    fn meters_per_unit(&self) -> Option<f64>;

    /// Creates any of `fields` that don't exist yet.
    fn ensure_fields(&mut self, fields: &[FieldDef]) -> Result<(), StoreError>;

    /// Returns every node along with the value of its `indicator`
    /// field.
    fn read_nodes(&self, indicator: Option<&str>) -> Result<Vec<NodeRow>, StoreError>;

    /// Writes every attribute in `schema` for each of `nodes`.
    fn write_nodes(&mut self, nodes: &[&Node], schema: &AttributeSchema) -> Result<(), StoreError>;
}

/// The flat dataset of individual sample points.
pub trait PointStore: Send {
    /// Removes every existing sample point.
    fn reset(&mut self) -> Result<(), StoreError>;

    /// Creates the store, if needed, with a value column per variable.
    fn ensure_schema(&mut self, variables: &[Variable]) -> Result<(), StoreError>;

    /// Removes the sample points of the given nodes.
    fn delete_nodes(&mut self, ids: &[NodeId]) -> Result<(), StoreError>;

    fn insert(&mut self, records: &[SampleRecord]) -> Result<(), StoreError>;
}

/// Returns `(field name, value)` for each attribute in `schema`, as
/// `node` should store them.
pub fn attribute_values<'a>(
    node: &'a Node,
    schema: &'a AttributeSchema,
) -> impl Iterator<Item = (String, FieldValue)> + 'a {
    schema.attrs().iter().map(move |attr| {
        (
            attr.to_string(),
            schema.render(*attr, node.attrs.get(attr).copied()),
        )
    })
}
