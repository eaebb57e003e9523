//! Sampled variables and the node attributes they produce.

use crate::lattice::SampleKey;
use std::fmt;

/// A raster surface sampled at every lattice point.
///
/// Declaration order is processing order, and also the order of
/// attribute fields on nodes and value columns on sample points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variable {
    /// Land cover height or code.
    LandCover,
    Elevation,
    /// Leaf area index.
    Lai,
    /// Canopy light extinction coefficient.
    K,
    Overhang,
    /// Canopy cover fraction.
    Canopy,
}

impl Variable {
    /// Returns the short name used in field names.
    pub fn name(self) -> &'static str {
        match self {
            Self::LandCover => "LC",
            Self::Elevation => "ELE",
            Self::Lai => "LAI",
            Self::K => "k",
            Self::Overhang => "OH",
            Self::Canopy => "CAN",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which canopy description accompanies land cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanopyMode {
    /// Leaf area index with extinction coefficient and overhang.
    Lai,
    /// Canopy cover with overhang.
    CanopyCover,
}

impl CanopyMode {
    pub fn variables(self) -> &'static [Variable] {
        match self {
            Self::Lai => &[Variable::Lai, Variable::K, Variable::Overhang],
            Self::CanopyCover => &[Variable::Canopy, Variable::Overhang],
        }
    }
}

/// Returns the variables sampled for `canopy`, in processing order.
pub fn variable_plan(canopy: Option<CanopyMode>) -> Vec<Variable> {
    let mut plan = vec![Variable::LandCover, Variable::Elevation];
    if let Some(mode) = canopy {
        plan.extend_from_slice(mode.variables());
    }
    plan
}

/// One node attribute: a variable sampled at one lattice position.
///
/// Renders as `{variable}_T{direction}_S{zone}`, e.g. `ELE_T3_S2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrId {
    pub variable: Variable,
    pub key: SampleKey,
}

impl AttrId {
    pub fn new(variable: Variable, key: SampleKey) -> Self {
        Self { variable, key }
    }
}

impl fmt::Display for AttrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.variable, self.key)
    }
}

/// Storage type of a node attribute field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Double,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

/// A node attribute value as handed to a node store.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Double(f64),
    Text(String),
}

impl FieldValue {
    /// Returns this value as a number, parsing text if needed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Null => None,
            Self::Double(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// The ordered set of attributes a run writes to every node.
///
/// Layout per variable: the emergent sample first, then each
/// direction's zones, nearest first.
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    attrs: Vec<AttrId>,
    lc_codes: bool,
}

impl AttributeSchema {
    pub fn new(variables: &[Variable], directions: u16, zones: u16, lc_codes: bool) -> Self {
        let mut attrs =
            Vec::with_capacity(variables.len() * (usize::from(directions) * usize::from(zones) + 1));
        for &variable in variables {
            attrs.push(AttrId::new(variable, SampleKey::EMERGENT));
            for direction in 1..=directions {
                for zone in 1..=zones {
                    attrs.push(AttrId::new(variable, SampleKey { direction, zone }));
                }
            }
        }
        Self { attrs, lc_codes }
    }

    pub fn attrs(&self) -> &[AttrId] {
        &self.attrs
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Returns the attribute whose presence marks a node as already
    /// processed.
    ///
    /// This is the last attribute written, since the emergent sample
    /// of the first variable is frequently zero.
    pub fn indicator(&self) -> Option<AttrId> {
        self.attrs.last().copied()
    }

    /// Returns the last attribute of the variables `sampled` accepts.
    ///
    /// Variables without a raster always hold nodata, which would mark
    /// every node as unprocessed.
    pub fn indicator_where<F>(&self, sampled: F) -> Option<AttrId>
    where
        F: Fn(Variable) -> bool,
    {
        self.attrs
            .iter()
            .rev()
            .find(|attr| sampled(attr.variable))
            .copied()
    }

    pub fn kind(&self, attr: AttrId) -> FieldKind {
        if self.lc_codes && attr.variable == Variable::LandCover {
            FieldKind::Text
        } else {
            FieldKind::Double
        }
    }

    pub fn fields(&self) -> Vec<FieldDef> {
        self.attrs
            .iter()
            .map(|attr| FieldDef {
                name: attr.to_string(),
                kind: self.kind(*attr),
            })
            .collect()
    }

    /// Returns `value` in the representation `attr`'s field stores.
    pub fn render(&self, attr: AttrId, value: Option<f64>) -> FieldValue {
        match (value, self.kind(attr)) {
            (None, _) => FieldValue::Null,
            (Some(v), FieldKind::Double) => FieldValue::Double(v),
            (Some(v), FieldKind::Text) => FieldValue::Text(format!("{}", v.round())),
        }
    }
}
