use crate::{options::Cli, progress::BlockProgress};
use anyhow::Result;
use log::info;
use rastergrid::GridCatalog;
use starsample::{
    store::file::{GeoJsonNodeStore, GeoJsonSeqPointStore},
    SampleConfig, Sampler, Surface, Surfaces, ZUnits,
};
use std::path::Path;

impl Cli {
    pub fn run(&self) -> Result<()> {
        let config = SampleConfig::builder()
            .transects(self.transects)
            .samples(self.samples)
            .spacing(self.spacing)
            .heatsource8(self.heatsource8)
            .perpendicular(self.perpendicular)
            .block_size_km(self.block_size)
            .canopy(self.canopy_type.map(Into::into))
            .lc_codes(self.lc_codes)
            .resume(self.resume)
            .jobs(self.jobs)
            .build()?;

        // Grids shared by several variables are only mapped once.
        let catalog = GridCatalog::new();
        let surface = |path: &Path, units: ZUnits| -> Result<Surface> {
            Ok(Surface::new(catalog.open(path)?, units))
        };
        let optional = |path: Option<&Path>| path.map(|p| surface(p, ZUnits::Other)).transpose();

        let surfaces = Surfaces::builder()
            .land_cover(surface(&self.lc, self.lc_units)?)
            .elevation(surface(&self.ele, self.ele_units)?)
            .canopy(optional(self.canopy.as_deref())?)
            .k(optional(self.k.as_deref())?)
            .overhang(optional(self.oh.as_deref())?)
            .build(config.canopy)?;
        info!("opened {} rasters", catalog.len());

        let mut nodes = GeoJsonNodeStore::open(&self.nodes)?;
        let mut points = GeoJsonSeqPointStore::new(&self.out);
        let mut progress = BlockProgress::default();

        let stats = Sampler::new(config, surfaces).run(&mut nodes, &mut points, &mut progress)?;
        progress.finish();
        println!("{stats}");
        Ok(())
    }
}
