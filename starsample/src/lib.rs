//! # Star pattern raster sampling
//!
//! `starsample` samples raster surfaces (land cover, elevation, canopy)
//! along transects radiating out from stream nodes.
//!
//! Nodes are split into square blocks so that only a small window of
//! each raster is ever read at once. For every block:
//!
//! 1. [lattice] lays out each node's sample points,
//! 2. [extract] reads a cell-aligned window of each raster,
//! 3. [resolve] looks up the cell under every sample point,
//! 4. [aggregate] folds the values back into node attributes and flat
//!    sample records, which are written to a [NodeStore] and
//!    [PointStore].
//!
//! [Sampler::run] drives the whole process.

pub mod aggregate;
pub mod attrs;
pub mod blocks;
mod config;
mod error;
pub mod extract;
pub mod lattice;
pub mod node;
pub mod resolve;
mod run;
pub mod store;
pub mod units;

pub use {
    crate::{
        attrs::{CanopyMode, Variable},
        config::{
            SampleConfig, SampleConfigBuilder, Surface, Surfaces, SurfacesBuilder,
            DEFAULT_BLOCK_SIZE_KM,
        },
        error::SampleError,
        lattice::AzimuthMode,
        node::{Node, NodeId, StreamId},
        run::{RunObserver, RunStats, Sampler},
        store::{NodeStore, PointStore, StoreError},
        units::ZUnits,
    },
    geo, rastergrid,
};
