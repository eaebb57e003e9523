//! Run configuration and the raster surfaces sampled during a run.

use crate::{
    attrs::{variable_plan, CanopyMode, Variable},
    lattice::AzimuthMode,
    units::ZUnits,
    SampleError,
};
use log::warn;
use rastergrid::Raster;
use std::sync::Arc;

/// Candidate block edge used when none is configured, in kilometres.
pub const DEFAULT_BLOCK_SIZE_KM: f64 = 5.0;

/// Validated parameters of a sampling run.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleConfig {
    pub azimuth: AzimuthMode,

    /// Samples per transect, not counting the emergent sample.
    pub zones: u16,

    /// Distance between samples along a transect (meters).
    pub spacing_m: f64,

    /// Candidate block edge length (kilometres).
    pub block_size_km: f64,

    pub canopy: Option<CanopyMode>,

    /// Store land cover attributes as text codes.
    pub lc_codes: bool,

    /// Only sample nodes without results, keeping existing output.
    pub resume: bool,

    /// Number of blocks sampled at once.
    pub jobs: usize,
}

impl SampleConfig {
    pub fn builder() -> SampleConfigBuilder {
        SampleConfigBuilder {
            transects: None,
            samples: None,
            spacing_m: None,
            heatsource8: false,
            perpendicular: false,
            block_size_km: None,
            canopy: None,
            lc_codes: false,
            resume: false,
            jobs: 1,
        }
    }

    /// Returns the sampled variables in processing order.
    pub fn variables(&self) -> Vec<Variable> {
        variable_plan(self.canopy)
    }
}

#[derive(Debug, Clone)]
pub struct SampleConfigBuilder {
    transects: Option<u16>,
    samples: Option<u16>,
    spacing_m: Option<f64>,
    heatsource8: bool,
    perpendicular: bool,
    block_size_km: Option<f64>,
    canopy: Option<CanopyMode>,
    lc_codes: bool,
    resume: bool,
    jobs: usize,
}

impl SampleConfigBuilder {
    /// Number of evenly spaced transects.
    ///
    /// Ignored when a fixed azimuth mode is chosen.
    pub fn transects(mut self, count: u16) -> Self {
        self.transects = Some(count);
        self
    }

    /// Number of samples along each transect.
    pub fn samples(mut self, count: u16) -> Self {
        self.samples = Some(count);
        self
    }

    pub fn spacing(mut self, meters: f64) -> Self {
        self.spacing_m = Some(meters);
        self
    }

    pub fn heatsource8(mut self, enable: bool) -> Self {
        self.heatsource8 = enable;
        self
    }

    pub fn perpendicular(mut self, enable: bool) -> Self {
        self.perpendicular = enable;
        self
    }

    /// Candidate block edge length, [DEFAULT_BLOCK_SIZE_KM] when `None`.
    pub fn block_size_km(mut self, km: Option<f64>) -> Self {
        self.block_size_km = km;
        self
    }

    pub fn canopy(mut self, mode: Option<CanopyMode>) -> Self {
        self.canopy = mode;
        self
    }

    pub fn lc_codes(mut self, enable: bool) -> Self {
        self.lc_codes = enable;
        self
    }

    pub fn resume(mut self, enable: bool) -> Self {
        self.resume = enable;
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn build(&self) -> Result<SampleConfig, SampleError> {
        let azimuth = match (self.heatsource8, self.perpendicular) {
            (true, true) => {
                return Err(SampleError::Config(
                    "heat source 8 and perpendicular transects are mutually exclusive".into(),
                ))
            }
            (true, false) => AzimuthMode::HeatSource8,
            (false, true) => AzimuthMode::Perpendicular,
            (false, false) => {
                let transects = self.transects.ok_or(SampleError::Builder("transects"))?;
                if transects == 0 {
                    return Err(SampleError::Config("transect count must be at least 1".into()));
                }
                AzimuthMode::Uniform(transects)
            }
        };

        let zones = self.samples.ok_or(SampleError::Builder("samples"))?;
        if zones == 0 {
            return Err(SampleError::Config("sample count must be at least 1".into()));
        }

        let spacing_m = self.spacing_m.ok_or(SampleError::Builder("spacing"))?;
        if !(spacing_m.is_finite() && spacing_m > 0.0) {
            return Err(SampleError::Config(format!(
                "sample spacing must be positive, got {spacing_m}"
            )));
        }

        let block_size_km = self.block_size_km.unwrap_or(DEFAULT_BLOCK_SIZE_KM);
        if !(block_size_km.is_finite() && block_size_km > 0.0) {
            return Err(SampleError::Config(format!(
                "block size must be positive, got {block_size_km}"
            )));
        }

        Ok(SampleConfig {
            azimuth,
            zones,
            spacing_m,
            block_size_km,
            canopy: self.canopy,
            lc_codes: self.lc_codes,
            resume: self.resume,
            jobs: self.jobs.max(1),
        })
    }
}

/// A raster and the unit its values are stored in.
#[derive(Clone)]
pub struct Surface {
    pub raster: Arc<dyn Raster>,
    pub units: ZUnits,
}

impl Surface {
    pub fn new(raster: Arc<dyn Raster>, units: ZUnits) -> Self {
        Self { raster, units }
    }

    /// A surface whose values are used as-is.
    pub fn raw(raster: Arc<dyn Raster>) -> Self {
        Self::new(raster, ZUnits::Other)
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("extent", &self.raster.extent())
            .field("cell_size", &self.raster.cell_size())
            .field("units", &self.units)
            .finish()
    }
}

/// The rasters backing each variable of a run.
#[derive(Debug, Clone)]
pub struct Surfaces {
    lc: Surface,
    ele: Surface,
    canopy: Option<Surface>,
    k: Option<Surface>,
    overhang: Option<Surface>,
}

impl Surfaces {
    pub fn builder() -> SurfacesBuilder {
        SurfacesBuilder::default()
    }

    /// Returns the surface backing `variable`, if any.
    ///
    /// LAI and canopy cover share the canopy raster.
    pub fn get(&self, variable: Variable) -> Option<&Surface> {
        match variable {
            Variable::LandCover => Some(&self.lc),
            Variable::Elevation => Some(&self.ele),
            Variable::Lai | Variable::Canopy => self.canopy.as_ref(),
            Variable::K => self.k.as_ref(),
            Variable::Overhang => self.overhang.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SurfacesBuilder {
    lc: Option<Surface>,
    ele: Option<Surface>,
    canopy: Option<Surface>,
    k: Option<Surface>,
    overhang: Option<Surface>,
}

impl SurfacesBuilder {
    pub fn land_cover(mut self, surface: Surface) -> Self {
        self.lc = Some(surface);
        self
    }

    pub fn elevation(mut self, surface: Surface) -> Self {
        self.ele = Some(surface);
        self
    }

    /// Canopy cover or LAI, depending on the canopy mode.
    pub fn canopy(mut self, surface: Option<Surface>) -> Self {
        self.canopy = surface;
        self
    }

    pub fn k(mut self, surface: Option<Surface>) -> Self {
        self.k = surface;
        self
    }

    pub fn overhang(mut self, surface: Option<Surface>) -> Self {
        self.overhang = surface;
        self
    }

    /// Builds the surfaces used under `canopy`.
    ///
    /// Optional rasters that `canopy` doesn't sample are dropped.
    pub fn build(self, canopy: Option<CanopyMode>) -> Result<Surfaces, SampleError> {
        let lc = self.lc.ok_or(SampleError::Builder("land cover raster"))?;
        let ele = self.ele.ok_or(SampleError::Builder("elevation raster"))?;
        let plan = variable_plan(canopy);

        let keep = |surface: Option<Surface>, variables: &[Variable], name: &str| {
            surface.and_then(|surface| {
                if variables.iter().any(|v| plan.contains(v)) {
                    Some(surface)
                } else {
                    warn!("ignoring {name} raster, the canopy mode does not sample it");
                    None
                }
            })
        };

        Ok(Surfaces {
            lc,
            ele,
            canopy: keep(self.canopy, &[Variable::Lai, Variable::Canopy], "canopy"),
            k: keep(self.k, &[Variable::K], "k"),
            overhang: keep(self.overhang, &[Variable::Overhang], "overhang"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{SampleConfig, Surface, Surfaces, DEFAULT_BLOCK_SIZE_KM};
    use crate::{
        attrs::{CanopyMode, Variable},
        lattice::AzimuthMode,
        SampleError,
    };
    use geo::geometry::Coord;
    use rastergrid::{CellSize, MemGrid};
    use std::sync::Arc;

    fn surface() -> Surface {
        Surface::raw(Arc::new(MemGrid::filled(
            Coord { x: 0.0, y: 0.0 },
            CellSize::square(1.0),
            (2, 2),
            1.0,
        )))
    }

    #[test]
    fn test_build_defaults() {
        let config = SampleConfig::builder()
            .transects(8)
            .samples(4)
            .spacing(8.0)
            .build()
            .unwrap();
        assert_eq!(config.azimuth, AzimuthMode::Uniform(8));
        assert_eq!(config.block_size_km, DEFAULT_BLOCK_SIZE_KM);
        assert_eq!(config.jobs, 1);
        assert!(!config.resume);
        assert_eq!(config.variables(), vec![Variable::LandCover, Variable::Elevation]);
    }

    #[test]
    fn test_fixed_modes_ignore_transects() {
        let builder = SampleConfig::builder().samples(2).spacing(5.0);
        let config = builder.clone().heatsource8(true).build().unwrap();
        assert_eq!(config.azimuth, AzimuthMode::HeatSource8);
        let config = builder.clone().perpendicular(true).build().unwrap();
        assert_eq!(config.azimuth, AzimuthMode::Perpendicular);
        assert!(matches!(
            builder.heatsource8(true).perpendicular(true).build(),
            Err(SampleError::Config(_))
        ));
    }

    #[test]
    fn test_build_rejects() {
        let builder = SampleConfig::builder().transects(4).samples(2).spacing(5.0);
        assert!(matches!(
            SampleConfig::builder().samples(2).spacing(5.0).build(),
            Err(SampleError::Builder("transects"))
        ));
        assert!(matches!(
            builder.clone().transects(0).build(),
            Err(SampleError::Config(_))
        ));
        assert!(matches!(
            builder.clone().spacing(0.0).build(),
            Err(SampleError::Config(_))
        ));
        assert!(matches!(
            builder.clone().block_size_km(Some(f64::NAN)).build(),
            Err(SampleError::Config(_))
        ));
        assert!(matches!(
            builder.block_size_km(Some(-1.0)).build(),
            Err(SampleError::Config(_))
        ));
    }

    #[test]
    fn test_surfaces() {
        assert!(matches!(
            Surfaces::builder().land_cover(surface()).build(None),
            Err(SampleError::Builder(_))
        ));

        let surfaces = Surfaces::builder()
            .land_cover(surface())
            .elevation(surface())
            .canopy(Some(surface()))
            .k(Some(surface()))
            .build(Some(CanopyMode::CanopyCover))
            .unwrap();
        assert!(surfaces.get(Variable::Canopy).is_some());
        assert!(surfaces.get(Variable::K).is_none());
        assert!(surfaces.get(Variable::Overhang).is_none());

        let surfaces = Surfaces::builder()
            .land_cover(surface())
            .elevation(surface())
            .canopy(Some(surface()))
            .build(None)
            .unwrap();
        assert!(surfaces.get(Variable::Lai).is_none());
    }
}
