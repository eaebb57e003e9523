//! Accumulation of sampled values into nodes and sample records.

use crate::{
    attrs::{AttrId, Variable},
    blocks::Site,
    lattice::{SampleKey, SamplePoint},
    node::{Node, NodeId, NodeRow, StreamId},
};
use geo::geometry::Coord;
use log::debug;
use std::collections::BTreeMap;

/// Indicator values below this mark a node as never sampled.
pub const RESUME_THRESHOLD: f64 = -9998.0;

/// Returns `true` when a node whose processed indicator holds
/// `indicator` still has to be sampled in resume mode.
pub fn needs_sampling(indicator: Option<f64>) -> bool {
    match indicator {
        None => true,
        Some(v) => v == 0.0 || v < RESUME_THRESHOLD || v.is_nan(),
    }
}

/// One row of the flat sample point output.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub coord: Coord<f64>,
    pub stream_id: StreamId,
    pub node: NodeId,
    pub sample_id: i64,
    /// Bearing of the sample's transect.
    pub azimuth: f64,
    pub key: SampleKey,
    /// One value per sampled variable, in processing order.
    pub values: Vec<f64>,
}

/// Everything sampled for a single block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSamples {
    pub block: usize,
    pub points: Vec<SamplePoint>,
    /// Values for each variable in processing order, parallel to
    /// `points`.
    pub values: Vec<(Variable, Vec<f64>)>,
}

impl BlockSamples {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// The nodes of one run and everything sampled for them so far.
#[derive(Debug, Default)]
pub struct Aggregator {
    nodes: BTreeMap<NodeId, Node>,
}

impl Aggregator {
    pub fn new(nodes: impl IntoIterator<Item = Node>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|node| (node.id, node)).collect(),
        }
    }

    /// Returns an aggregator over the rows that need sampling, and the
    /// number of rows skipped.
    ///
    /// With `resume` off every row is kept.
    pub fn from_rows(rows: Vec<NodeRow>, resume: bool) -> (Self, usize) {
        let total = rows.len();
        let aggregator = Self::new(
            rows.into_iter()
                .filter(|row| !resume || needs_sampling(row.indicator))
                .map(|row| row.node),
        );
        let skipped = total - aggregator.len();
        debug!("{skipped} of {total} nodes already sampled");
        (aggregator, skipped)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Returns every node's lattice site, sorted by id.
    pub fn sites(&self) -> Vec<Site> {
        self.nodes.values().map(Site::from).collect()
    }

    /// Returns the nodes with the given ids, skipping unknown ids.
    pub fn nodes(&self, ids: &[NodeId]) -> Vec<&Node> {
        ids.iter().filter_map(|id| self.nodes.get(id)).collect()
    }

    /// Drops the given nodes once their block has been written.
    pub fn release(&mut self, ids: &[NodeId]) {
        for id in ids {
            self.nodes.remove(id);
        }
    }

    /// Stores `samples` on their nodes and returns them as flat records.
    pub fn merge(&mut self, samples: &BlockSamples) -> Vec<SampleRecord> {
        let mut records = Vec::with_capacity(samples.points.len());
        for (i, point) in samples.points.iter().enumerate() {
            let Some(node) = self.nodes.get_mut(&point.node) else {
                continue;
            };
            let mut values = Vec::with_capacity(samples.values.len());
            for (variable, sampled) in &samples.values {
                let value = sampled[i];
                node.attrs.insert(AttrId::new(*variable, point.key), value);
                values.push(value);
            }
            records.push(SampleRecord {
                coord: point.coord,
                stream_id: node.stream_id.clone(),
                node: point.node,
                sample_id: point.sample_id,
                azimuth: point.azimuth,
                key: point.key,
                values,
            });
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::{needs_sampling, Aggregator, BlockSamples};
    use crate::{
        attrs::{AttrId, Variable},
        lattice::{SampleKey, SamplePoint},
        node::{Node, NodeRow, StreamId},
    };
    use geo::geometry::Coord;

    fn node(id: i64) -> Node {
        Node::new(id, StreamId::Int(9), Coord { x: id as f64, y: 0.0 })
    }

    #[test]
    fn test_needs_sampling() {
        assert!(needs_sampling(None));
        assert!(needs_sampling(Some(0.0)));
        assert!(needs_sampling(Some(-9999.0)));
        assert!(!needs_sampling(Some(-9998.0)));
        assert!(!needs_sampling(Some(12.5)));
        assert!(!needs_sampling(Some(-3.0)));
    }

    #[test]
    fn test_from_rows_resume() {
        let rows = vec![
            NodeRow {
                node: node(1),
                indicator: Some(3.0),
            },
            NodeRow {
                node: node(2),
                indicator: None,
            },
            NodeRow {
                node: node(3),
                indicator: Some(-9999.0),
            },
        ];
        let (aggregator, skipped) = Aggregator::from_rows(rows.clone(), true);
        assert_eq!(skipped, 1);
        assert!(aggregator.node(1).is_none());
        assert_eq!(
            aggregator.sites().iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![2, 3]
        );

        let (aggregator, skipped) = Aggregator::from_rows(rows, false);
        assert_eq!((aggregator.len(), skipped), (3, 0));
    }

    #[test]
    fn test_merge() {
        let mut aggregator = Aggregator::new([node(1), node(2)]);
        let key = SampleKey { direction: 2, zone: 1 };
        let samples = BlockSamples {
            block: 0,
            points: vec![
                SamplePoint {
                    node: 2,
                    key: SampleKey::EMERGENT,
                    coord: Coord { x: 2.0, y: 0.0 },
                    azimuth: 0.0,
                    sample_id: 10,
                },
                SamplePoint {
                    node: 2,
                    key,
                    coord: Coord { x: 2.0, y: -5.0 },
                    azimuth: 180.0,
                    sample_id: 13,
                },
            ],
            values: vec![
                (Variable::LandCover, vec![4.0, 5.0]),
                (Variable::Elevation, vec![100.0, 101.0]),
            ],
        };
        let records = aggregator.merge(&samples);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].values, vec![5.0, 101.0]);
        assert_eq!(records[1].key, key);
        assert_eq!(records[1].stream_id, StreamId::Int(9));

        let node = aggregator.node(2).unwrap();
        assert_eq!(node.attrs.len(), 4);
        assert_eq!(
            node.attrs.get(&AttrId::new(Variable::Elevation, key)),
            Some(&101.0)
        );
        assert!(aggregator.node(1).unwrap().attrs.is_empty());
        assert_eq!(aggregator.nodes(&[2, 77]).len(), 1);

        aggregator.release(&[2]);
        assert_eq!(aggregator.len(), 1);
    }
}
