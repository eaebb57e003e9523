//! Stream nodes.

use crate::attrs::AttrId;
use geo::geometry::Coord;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

pub type NodeId = i64;

/// Identifier of the stream a node lies on, carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamId {
    Int(i64),
    Text(String),
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

/// A sample origin on a stream, and the values sampled around it.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,

    pub stream_id: StreamId,

    /// Distance along the stream, in kilometres.
    pub stream_km: Option<f64>,

    /// Direction the stream flows at this node, in compass degrees.
    pub azimuth: Option<f64>,

    /// Location in the node store's native units.
    pub origin: Coord<f64>,

    /// Values sampled so far in this run.
    pub attrs: BTreeMap<AttrId, f64>,
}

impl Node {
    pub fn new(id: NodeId, stream_id: StreamId, origin: Coord<f64>) -> Self {
        Self {
            id,
            stream_id,
            stream_km: None,
            azimuth: None,
            origin,
            attrs: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_azimuth(mut self, degrees: f64) -> Self {
        self.azimuth = Some(degrees);
        self
    }

    #[must_use]
    pub fn with_stream_km(mut self, km: f64) -> Self {
        self.stream_km = Some(km);
        self
    }
}

/// A node as read from a node store, along with the current value of
/// its processed indicator field.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub node: Node,
    pub indicator: Option<f64>,
}
