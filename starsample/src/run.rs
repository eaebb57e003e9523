//! Block by block sampling runs.

use crate::{
    aggregate::{Aggregator, BlockSamples},
    attrs::{AttributeSchema, Variable},
    blocks::{Block, BlockPartitioner},
    config::{SampleConfig, Surfaces},
    extract::{extract, NODATA},
    lattice::Lattice,
    resolve::resolve,
    store::{NodeStore, PointStore},
    SampleError,
};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::{
    fmt,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

/// Receives progress notifications during a run.
pub trait RunObserver: Send {
    /// Called once sampling is about to start.
    fn on_start(&mut self, _blocks: usize, _nodes: usize) {}

    /// Called after each block has been written.
    fn on_block(&mut self, _block: usize, _samples: usize) {}
}

impl RunObserver for () {}

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStats {
    pub blocks: usize,
    /// Nodes sampled.
    pub nodes: usize,
    /// Nodes left alone because they were already sampled.
    pub skipped: usize,
    /// Sample points written.
    pub samples: usize,
    pub elapsed: Duration,
}

impl RunStats {
    pub fn micros_per_sample(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let samples = self.samples as f64;
            self.elapsed.as_secs_f64() * 1e6 / samples
        }
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sampled {} nodes ({} skipped) in {} blocks, {} samples in {:.2} minutes, {:.3} µs per sample",
            self.nodes,
            self.skipped,
            self.blocks,
            self.samples,
            self.elapsed.as_secs_f64() / 60.0,
            self.micros_per_sample()
        )
    }
}

/// Everything a block's results are written to.
struct Sink<'a> {
    aggregator: Aggregator,
    schema: &'a AttributeSchema,
    resume: bool,
    nodes: &'a mut dyn NodeStore,
    points: &'a mut dyn PointStore,
    observer: &'a mut dyn RunObserver,
    samples: usize,
}

impl Sink<'_> {
    /// Applies one block's samples. Nothing is written unless the whole
    /// block was sampled.
    fn commit(&mut self, block: &Block, samples: &BlockSamples) -> Result<(), SampleError> {
        let write = |source| SampleError::Write {
            block: block.index,
            source,
        };

        let records = self.aggregator.merge(samples);
        let ids = block.node_ids();
        self.nodes
            .write_nodes(&self.aggregator.nodes(&ids), self.schema)
            .map_err(write)?;
        if self.resume {
            self.points.delete_nodes(&ids).map_err(write)?;
        }
        self.points.insert(&records).map_err(write)?;
        self.aggregator.release(&ids);

        self.samples += records.len();
        self.observer.on_block(block.index, records.len());
        Ok(())
    }
}

/// Samples a set of raster surfaces around every node of a node store.
#[derive(Debug, Clone)]
pub struct Sampler {
    config: SampleConfig,
    surfaces: Surfaces,
}

impl Sampler {
    pub fn new(config: SampleConfig, surfaces: Surfaces) -> Self {
        Self { config, surfaces }
    }

    pub fn config(&self) -> &SampleConfig {
        &self.config
    }

    /// Samples every qualifying node in `nodes`, writing attributes
    /// back to `nodes` and individual samples to `points`.
    pub fn run(
        &self,
        nodes: &mut dyn NodeStore,
        points: &mut dyn PointStore,
        observer: &mut dyn RunObserver,
    ) -> Result<RunStats, SampleError> {
        let start = Instant::now();
        let config = &self.config;
        let variables = config.variables();

        let meters_per_unit = nodes.meters_per_unit().ok_or(SampleError::NotProjected)?;
        let con_from_m = 1.0 / meters_per_unit;
        self.check_surfaces(nodes.spatial_ref(), &variables)?;

        let lattice = Lattice::new(config.azimuth, config.zones, config.spacing_m * con_from_m);
        let schema = AttributeSchema::new(
            &variables,
            lattice.directions(),
            lattice.zones(),
            config.lc_codes,
        );
        nodes.ensure_fields(&schema.fields())?;

        let indicator = schema
            .indicator_where(|variable| self.surfaces.get(variable).is_some())
            .map(|attr| attr.to_string());
        debug!("resume indicator {indicator:?}");
        let rows = nodes.read_nodes(indicator.as_deref())?;
        let (aggregator, skipped) = Aggregator::from_rows(rows, config.resume);
        if config.resume && aggregator.is_empty() {
            return Err(SampleError::NothingToProcess);
        }

        if !config.resume {
            points.reset()?;
        }
        points.ensure_schema(&variables)?;

        let block_size = config.block_size_km * 1000.0 * con_from_m;
        let blocks = BlockPartitioner::new(block_size, lattice.radius()).partition(&aggregator.sites());
        let node_count = aggregator.len();

        info!(
            "sampling {node_count} nodes in {} blocks, {} samples per node",
            blocks.len(),
            lattice.zones_per_node()
        );
        observer.on_start(blocks.len(), node_count);

        let mut sink = Sink {
            aggregator,
            schema: &schema,
            resume: config.resume,
            nodes,
            points,
            observer,
            samples: 0,
        };

        if config.jobs > 1 && blocks.len() > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.jobs)
                .build()?;
            let shared = Mutex::new(sink);
            pool.install(|| {
                blocks.par_iter().try_for_each(|block| {
                    let samples = self.sample_block(&lattice, block, &variables)?;
                    shared
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .commit(block, &samples)
                })
            })?;
            sink = shared.into_inner().unwrap_or_else(PoisonError::into_inner);
        } else {
            for block in &blocks {
                let samples = self.sample_block(&lattice, block, &variables)?;
                sink.commit(block, &samples)?;
            }
        }

        let stats = RunStats {
            blocks: blocks.len(),
            nodes: node_count,
            skipped,
            samples: sink.samples,
            elapsed: start.elapsed(),
        };
        info!("{stats}");
        Ok(stats)
    }

    /// Fails if any sampled raster is in a different spatial reference
    /// than the node store. Unnamed references are assumed to match.
    fn check_surfaces(&self, store: Option<&str>, variables: &[Variable]) -> Result<(), SampleError> {
        for &variable in variables {
            let Some(surface) = self.surfaces.get(variable) else {
                warn!("no {variable} raster, its samples will be {NODATA}");
                continue;
            };
            if let (Some(store), Some(raster)) = (store, surface.raster.spatial_ref()) {
                if store != raster {
                    return Err(SampleError::SpatialRefMismatch {
                        variable,
                        store: store.to_owned(),
                        raster: raster.to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Samples every variable for `block`'s nodes.
    fn sample_block(
        &self,
        lattice: &Lattice,
        block: &Block,
        variables: &[Variable],
    ) -> Result<BlockSamples, SampleError> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let mut points = Vec::with_capacity(block.sites.len() * lattice.zones_per_node() as usize);
        for site in &block.sites {
            lattice.extend_points(site, &mut points)?;
        }

        let mut values = Vec::with_capacity(variables.len());
        for &variable in variables {
            let sampled = match self.surfaces.get(variable) {
                Some(surface) => {
                    let array = extract(
                        surface.raster.as_ref(),
                        block.extent,
                        surface.units.to_meters(),
                        NODATA,
                    )
                    .map_err(|e| SampleError::extraction(block.index, variable, e))?;
                    if array.is_all_nodata(NODATA) {
                        debug!("block {}: no {variable} data", block.index);
                    }
                    resolve(block.index, &points, &array, NODATA)?
                }
                None => vec![NODATA; points.len()],
            };
            values.push((variable, sampled));
        }

        debug!(
            "block {}: {} nodes, {} samples",
            block.index,
            block.sites.len(),
            points.len()
        );

        Ok(BlockSamples {
            block: block.index,
            points,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{RunObserver, RunStats, Sampler};
    use crate::{
        attrs::{CanopyMode, FieldValue},
        config::{SampleConfig, Surface, Surfaces},
        extract::NODATA,
        node::{Node, StreamId},
        store::{
            mem::{MemNodeStore, MemPointStore},
            NodeStore,
        },
        units::ZUnits,
        SampleError,
    };
    use approx::assert_abs_diff_eq;
    use geo::geometry::Coord;
    use rastergrid::{CellSize, MemGrid};
    use std::{sync::Arc, time::Duration};

    const ORIGIN: Coord<f64> = Coord { x: 0.0, y: 0.0 };

    /// Land cover whose value is the cell's western edge.
    fn land_cover() -> MemGrid {
        MemGrid::from_fn(ORIGIN, CellSize::square(1.0), (1200, 1200), |c| c.x.floor())
    }

    fn elevation(value: f64) -> MemGrid {
        MemGrid::filled(ORIGIN, CellSize::square(1.0), (1200, 1200), value)
    }

    fn surfaces(canopy: Option<CanopyMode>) -> Surfaces {
        Surfaces::builder()
            .land_cover(Surface::raw(Arc::new(land_cover())))
            .elevation(Surface::new(Arc::new(elevation(100.0)), ZUnits::Meters))
            .build(canopy)
            .unwrap()
    }

    fn config(canopy: Option<CanopyMode>, resume: bool) -> SampleConfig {
        SampleConfig::builder()
            .transects(4)
            .samples(2)
            .spacing(10.0)
            .canopy(canopy)
            .resume(resume)
            .build()
            .unwrap()
    }

    fn node(id: i64, x: f64, y: f64) -> Node {
        Node::new(id, StreamId::Int(1), Coord { x, y })
    }

    fn spread_nodes(store: &mut MemNodeStore, count: i64) {
        for i in 0..count {
            #[allow(clippy::cast_precision_loss)]
            let f = i as f64;
            store.insert(node(i, 40.0 + (f * 97.3) % 1100.0, 40.0 + (f * 41.9) % 1100.0));
        }
    }

    #[derive(Default)]
    struct Counter {
        blocks: usize,
        done: Vec<usize>,
        samples: usize,
    }

    impl RunObserver for Counter {
        fn on_start(&mut self, blocks: usize, _nodes: usize) {
            self.blocks = blocks;
        }

        fn on_block(&mut self, block: usize, samples: usize) {
            self.done.push(block);
            self.samples += samples;
        }
    }

    #[test]
    fn test_single_node_run() {
        let mut nodes = MemNodeStore::new(1.0);
        nodes.insert(node(3, 1000.0, 1000.0));
        let mut points = MemPointStore::new();
        let mut counter = Counter::default();

        let sampler = Sampler::new(
            config(Some(CanopyMode::Lai), false),
            surfaces(Some(CanopyMode::Lai)),
        );
        let stats = sampler.run(&mut nodes, &mut points, &mut counter).unwrap();
        assert_eq!((stats.blocks, stats.nodes, stats.samples), (1, 1, 9));
        assert_eq!((counter.blocks, counter.samples), (1, 9));

        let records = points.records();
        let ids: Vec<i64> = records.iter().map(|r| r.sample_id).collect();
        assert_eq!(ids, (27..=35).collect::<Vec<_>>());
        assert_eq!(points.variables().len(), 5);
        for record in records {
            // LC, ELE, LAI, k, OH
            assert_eq!(record.values[1], 100.0);
            assert_eq!(&record.values[2..], &[NODATA; 3]);
        }

        // Direction 1 points east.
        let east = &records[1];
        assert_eq!(east.azimuth, 90.0);
        assert_abs_diff_eq!(east.coord.x, 1010.0, epsilon = 1e-9);
        assert_abs_diff_eq!(east.coord.y, 1000.0, epsilon = 1e-9);
        assert_eq!(east.values[0], 1010.0);

        assert_eq!(nodes.value(3, "LC_T0_S0"), Some(&FieldValue::Double(1000.0)));
        assert_eq!(nodes.value(3, "LC_T1_S2"), Some(&FieldValue::Double(1020.0)));
        assert_eq!(nodes.value(3, "LC_T2_S1"), Some(&FieldValue::Double(1000.0)));
        assert_eq!(nodes.value(3, "LC_T3_S1"), Some(&FieldValue::Double(990.0)));
        assert_eq!(nodes.value(3, "ELE_T4_S2"), Some(&FieldValue::Double(100.0)));
        assert_eq!(nodes.value(3, "OH_T4_S2"), Some(&FieldValue::Double(NODATA)));
    }

    #[test]
    fn test_resume_after_overwrite() {
        let mut nodes = MemNodeStore::new(1.0);
        spread_nodes(&mut nodes, 12);
        let mut points = MemPointStore::new();

        let sampler = Sampler::new(config(None, false), surfaces(None));
        let first = sampler.run(&mut nodes, &mut points, &mut ()).unwrap();
        assert_eq!(first.samples, 12 * 9);
        let before = points.records().to_vec();

        let resume = Sampler::new(config(None, true), surfaces(None));
        assert!(matches!(
            resume.run(&mut nodes, &mut points, &mut ()),
            Err(SampleError::NothingToProcess)
        ));
        assert_eq!(points.records(), &before[..]);
        assert_eq!(points.resets(), 1);

        // Clearing one node's indicator resamples only that node.
        nodes.set_value(5, "ELE_T4_S2", FieldValue::Null);
        let stats = resume.run(&mut nodes, &mut points, &mut ()).unwrap();
        assert_eq!((stats.nodes, stats.skipped, stats.samples), (1, 11, 9));
        assert_eq!(points.records().len(), before.len());
        assert_eq!(points.resets(), 1);
        assert_eq!(nodes.value(5, "ELE_T4_S2"), Some(&FieldValue::Double(100.0)));
    }

    #[test]
    fn test_resume_without_optional_rasters() {
        let mut nodes = MemNodeStore::new(1.0);
        spread_nodes(&mut nodes, 5);
        let mut points = MemPointStore::new();

        let lai = Some(CanopyMode::Lai);
        let first = Sampler::new(config(lai, false), surfaces(lai))
            .run(&mut nodes, &mut points, &mut ())
            .unwrap();
        assert_eq!((first.nodes, first.samples), (5, 45));
        assert_eq!(nodes.value(2, "OH_T4_S2"), Some(&FieldValue::Double(NODATA)));
        let before = points.records().to_vec();

        let resume = Sampler::new(config(lai, true), surfaces(lai));
        assert!(matches!(
            resume.run(&mut nodes, &mut points, &mut ()),
            Err(SampleError::NothingToProcess)
        ));
        assert_eq!(points.records(), &before[..]);

        nodes.set_value(2, "ELE_T4_S2", FieldValue::Null);
        let stats = resume.run(&mut nodes, &mut points, &mut ()).unwrap();
        assert_eq!((stats.nodes, stats.skipped), (1, 4));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let run = |jobs: usize| {
            let mut nodes = MemNodeStore::new(1.0);
            spread_nodes(&mut nodes, 60);
            let mut points = MemPointStore::new();
            let config = SampleConfig::builder()
                .transects(8)
                .samples(3)
                .spacing(5.0)
                .block_size_km(Some(0.2))
                .jobs(jobs)
                .build()
                .unwrap();
            let mut counter = Counter::default();
            let stats = Sampler::new(config, surfaces(None))
                .run(&mut nodes, &mut points, &mut counter)
                .unwrap();
            assert!(stats.blocks > 1);
            assert_eq!(counter.done.len(), stats.blocks);
            let mut records = points.records().to_vec();
            records.sort_by_key(|r| r.sample_id);
            (records, nodes)
        };

        let (sequential, seq_nodes) = run(1);
        let (parallel, par_nodes) = run(4);
        assert_eq!(sequential, parallel);
        for id in 0..60 {
            assert_eq!(
                seq_nodes.value(id, "LC_T8_S3"),
                par_nodes.value(id, "LC_T8_S3")
            );
        }
    }

    #[test]
    fn test_feet_store_and_surface() {
        let mut nodes = MemNodeStore::new(0.3048);
        nodes.insert(node(1, 500.0, 500.0));
        let mut points = MemPointStore::new();

        let surfaces = Surfaces::builder()
            .land_cover(Surface::raw(Arc::new(land_cover())))
            .elevation(Surface::new(Arc::new(elevation(100.0)), ZUnits::Feet))
            .build(None)
            .unwrap();
        Sampler::new(config(None, false), surfaces)
            .run(&mut nodes, &mut points, &mut ())
            .unwrap();

        let east = &points.records()[1];
        assert_abs_diff_eq!(east.coord.x, 500.0 + 10.0 / 0.3048, epsilon = 1e-9);
        assert_abs_diff_eq!(east.values[1], 30.48, epsilon = 1e-9);
    }

    #[test]
    fn test_spatial_ref_mismatch() {
        let mut nodes = MemNodeStore::new(1.0).with_spatial_ref("UTM 10N");
        nodes.insert(node(1, 500.0, 500.0));
        let mut points = MemPointStore::new();

        let surfaces = Surfaces::builder()
            .land_cover(Surface::raw(Arc::new(land_cover().with_spatial_ref("UTM 11N"))))
            .elevation(Surface::raw(Arc::new(elevation(1.0).with_spatial_ref("UTM 10N"))))
            .build(None)
            .unwrap();
        let res = Sampler::new(config(None, false), surfaces).run(&mut nodes, &mut points, &mut ());
        assert!(matches!(res, Err(SampleError::SpatialRefMismatch { .. })));
        assert!(nodes.fields().is_empty());
        assert_eq!(points.resets(), 0);
    }

    #[test]
    fn test_not_projected() {
        let mut nodes = MemNodeStore::default();
        let res = Sampler::new(config(None, false), surfaces(None)).run(
            &mut nodes,
            &mut MemPointStore::new(),
            &mut (),
        );
        assert!(matches!(res, Err(SampleError::NotProjected)));
    }

    #[test]
    fn test_perpendicular_requires_azimuth() {
        let mut nodes = MemNodeStore::new(1.0);
        nodes.insert(node(1, 500.0, 500.0).with_azimuth(30.0));
        nodes.insert(node(2, 600.0, 500.0));
        let config = SampleConfig::builder()
            .perpendicular(true)
            .samples(2)
            .spacing(10.0)
            .build()
            .unwrap();
        let res = Sampler::new(config, surfaces(None)).run(
            &mut nodes,
            &mut MemPointStore::new(),
            &mut (),
        );
        assert!(matches!(res, Err(SampleError::MissingAzimuth(2))));
        assert_eq!(nodes.writes(), 0);
    }

    #[test]
    fn test_empty_store() {
        let mut nodes = MemNodeStore::new(1.0);
        let stats = Sampler::new(config(None, false), surfaces(None))
            .run(&mut nodes, &mut MemPointStore::new(), &mut ())
            .unwrap();
        assert_eq!((stats.blocks, stats.samples), (0, 0));
        assert_eq!(stats.micros_per_sample(), 0.0);
        assert!(nodes.read_nodes(None).unwrap().is_empty());
    }

    #[test]
    fn test_stats_display() {
        let stats = RunStats {
            blocks: 2,
            nodes: 10,
            skipped: 0,
            samples: 90,
            elapsed: Duration::from_secs(90),
        };
        assert_abs_diff_eq!(stats.micros_per_sample(), 1e6, epsilon = 1e-6);
        assert!(stats.to_string().contains("1.50 minutes"));
    }
}
