//! Star pattern sample lattice around a node.
//!
//! Directions are compass bearings: 0° is north and angles increase
//! clockwise, so a sample `d` map units away at bearing `θ` sits at
//! `(x0 + d·sin θ, y0 + d·cos θ)`.

use crate::{blocks::Site, node::NodeId, SampleError};
use geo::geometry::Coord;
use std::fmt;

/// The fixed Heat Source 8 bearings (eight directions, north omitted).
const HEAT_SOURCE_8: [f64; 7] = [45.0, 90.0, 135.0, 180.0, 225.0, 270.0, 315.0];

/// Position of a sample within its node's lattice.
///
/// Direction 0 / zone 0 is the emergent sample at the node itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleKey {
    /// 1-based transect index.
    pub direction: u16,
    /// 1-based distance step along the transect.
    pub zone: u16,
}

impl SampleKey {
    pub const EMERGENT: Self = Self {
        direction: 0,
        zone: 0,
    };

    pub fn is_emergent(self) -> bool {
        self == Self::EMERGENT
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}_S{}", self.direction, self.zone)
    }
}

/// How transect bearings are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AzimuthMode {
    /// `n` bearings evenly spaced around the compass, the first at
    /// `360/n` degrees.
    Uniform(u16),

    /// The seven Heat Source 8 bearings.
    HeatSource8,

    /// Two bearings perpendicular to the stream at each node.
    Perpendicular,
}

impl AzimuthMode {
    pub fn direction_count(self) -> u16 {
        match self {
            Self::Uniform(n) => n,
            Self::HeatSource8 => 7,
            Self::Perpendicular => 2,
        }
    }

    /// Returns the transect bearings, each in `[0, 360)`.
    ///
    /// Returns `None` in perpendicular mode when the stream azimuth is
    /// unknown.
    pub fn azimuths(self, stream_azimuth: Option<f64>) -> Option<Vec<f64>> {
        match self {
            Self::Uniform(n) => {
                let step = 360.0 / f64::from(n);
                Some(
                    (1..=n)
                        .map(|i| normalize_azimuth(f64::from(i) * step))
                        .collect(),
                )
            }
            Self::HeatSource8 => Some(HEAT_SOURCE_8.to_vec()),
            Self::Perpendicular => stream_azimuth.map(|azimuth| {
                vec![
                    normalize_azimuth(azimuth - 90.0),
                    normalize_azimuth(azimuth + 90.0),
                ]
            }),
        }
    }
}

/// Returns `degrees` wrapped into `[0, 360)`.
pub fn normalize_azimuth(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// A single sample location.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePoint {
    pub node: NodeId,
    pub key: SampleKey,
    pub coord: Coord<f64>,
    /// Bearing of this sample's transect, 0 for the emergent sample.
    pub azimuth: f64,
    pub sample_id: i64,
}

/// Generates sample points for nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lattice {
    mode: AzimuthMode,
    zones: u16,
    /// Distance between zones, in native units.
    spacing: f64,
}

impl Lattice {
    pub fn new(mode: AzimuthMode, zones: u16, spacing: f64) -> Self {
        Self {
            mode,
            zones,
            spacing,
        }
    }

    pub fn mode(&self) -> AzimuthMode {
        self.mode
    }

    pub fn zones(&self) -> u16 {
        self.zones
    }

    pub fn directions(&self) -> u16 {
        self.mode.direction_count()
    }

    /// Returns the number of samples (and sample ids) per node.
    pub fn zones_per_node(&self) -> i64 {
        i64::from(self.directions()) * i64::from(self.zones) + 1
    }

    /// Returns a distance from a node that every one of its samples
    /// lies strictly within.
    pub fn radius(&self) -> f64 {
        (f64::from(self.zones) + 1.0) * self.spacing
    }

    pub fn sample_id(&self, node: NodeId, key: SampleKey) -> i64 {
        let base = node * self.zones_per_node();
        if key.is_emergent() {
            base
        } else {
            base + (i64::from(key.direction) - 1) * i64::from(self.zones) + i64::from(key.zone)
        }
    }

    /// Returns `site`'s samples: the emergent sample first, then each
    /// transect's zones, nearest first.
    pub fn points(&self, site: &Site) -> Result<Vec<SamplePoint>, SampleError> {
        let mut points = Vec::new();
        self.extend_points(site, &mut points)?;
        Ok(points)
    }

    /// Appends `site`'s samples to `out`, in the order of [Lattice::points].
    pub fn extend_points(&self, site: &Site, out: &mut Vec<SamplePoint>) -> Result<(), SampleError> {
        let azimuths = self
            .mode
            .azimuths(site.azimuth)
            .ok_or(SampleError::MissingAzimuth(site.id))?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        out.reserve(self.zones_per_node() as usize);

        out.push(SamplePoint {
            node: site.id,
            key: SampleKey::EMERGENT,
            coord: site.origin,
            azimuth: 0.0,
            sample_id: self.sample_id(site.id, SampleKey::EMERGENT),
        });

        for (direction, azimuth) in (1..).zip(azimuths) {
            let (sin, cos) = azimuth.to_radians().sin_cos();
            for zone in 1..=self.zones {
                let distance = f64::from(zone) * self.spacing;
                let key = SampleKey { direction, zone };
                out.push(SamplePoint {
                    node: site.id,
                    key,
                    coord: Coord {
                        x: site.origin.x + distance * sin,
                        y: site.origin.y + distance * cos,
                    },
                    azimuth,
                    sample_id: self.sample_id(site.id, key),
                });
            }
        }

        Ok(())
    }
}
