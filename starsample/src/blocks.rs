//! Spatial partitioning of nodes into memory-bounded blocks.

use crate::node::{Node, NodeId};
use geo::geometry::{Coord, Rect};
use log::debug;
use std::collections::BTreeMap;

/// The parts of a node lattice generation needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Site {
    pub id: NodeId,
    pub origin: Coord<f64>,
    pub azimuth: Option<f64>,
}

impl From<&Node> for Site {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            origin: node.origin,
            azimuth: node.azimuth,
        }
    }
}

/// A buffered tile and the nodes whose lattices it fully contains.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Position of this block in processing order.
    pub index: usize,

    /// Bounding box of this block's nodes grown by the lattice radius.
    pub extent: Rect<f64>,

    /// This block's nodes, sorted by id.
    pub sites: Vec<Site>,
}

impl Block {
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.sites.iter().map(|site| site.id).collect()
    }
}

/// Splits nodes into square candidate cells of `block_size` and buffers
/// each occupied cell by the lattice radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockPartitioner {
    /// Candidate cell edge length, in native units.
    block_size: f64,

    /// Distance every lattice sample lies within.
    radius: f64,
}

impl BlockPartitioner {
    /// `block_size` must be positive and finite.
    pub fn new(block_size: f64, radius: f64) -> Self {
        debug_assert!(block_size > 0.0 && block_size.is_finite());
        Self { block_size, radius }
    }

    /// Returns blocks in X-major, then Y, candidate cell order.
    ///
    /// Every site lands in exactly one block: the half-open candidate
    /// cell `[min + i·size, min + (i+1)·size)` containing its origin.
    pub fn partition(&self, sites: &[Site]) -> Vec<Block> {
        let Some(bounds) = bounding_rect(sites.iter().map(|site| site.origin)) else {
            return Vec::new();
        };
        let min = bounds.min();

        let mut cells: BTreeMap<(u64, u64), Vec<Site>> = BTreeMap::new();
        for site in sites {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let cell = (
                ((site.origin.x - min.x) / self.block_size).floor() as u64,
                ((site.origin.y - min.y) / self.block_size).floor() as u64,
            );
            cells.entry(cell).or_default().push(*site);
        }

        let blocks: Vec<Block> = cells
            .into_values()
            .filter_map(|mut sites| {
                sites.sort_by_key(|site| site.id);
                let tight = bounding_rect(sites.iter().map(|site| site.origin))?;
                let extent = Rect::new(
                    Coord {
                        x: tight.min().x - self.radius,
                        y: tight.min().y - self.radius,
                    },
                    Coord {
                        x: tight.max().x + self.radius,
                        y: tight.max().y + self.radius,
                    },
                );
                Some((extent, sites))
            })
            .enumerate()
            .map(|(index, (extent, sites))| Block {
                index,
                extent,
                sites,
            })
            .collect();

        debug!(
            "partitioned {} nodes into {} blocks of size {}",
            sites.len(),
            blocks.len(),
            self.block_size
        );

        blocks
    }
}

fn bounding_rect(mut coords: impl Iterator<Item = Coord<f64>>) -> Option<Rect<f64>> {
    let first = coords.next()?;
    let (min, max) = coords.fold((first, first), |(min, max), c| {
        (
            Coord {
                x: min.x.min(c.x),
                y: min.y.min(c.y),
            },
            Coord {
                x: max.x.max(c.x),
                y: max.y.max(c.y),
            },
        )
    });
    Some(Rect::new(min, max))
}
