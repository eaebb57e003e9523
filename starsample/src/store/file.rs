//! GeoJSON backed stores.
//!
//! Nodes live in a single FeatureCollection of Point features, which
//! is rewritten whole on every write. Sample points are appended to a
//! GeoJSON text sequence, one Feature per line.

use super::{
    attribute_values, NodeStore, PointStore, StoreError, NODE_ID, POINT_FIELDS, STREAM_AZIMUTH,
    STREAM_ID, STREAM_KM,
};
use crate::{
    aggregate::SampleRecord,
    attrs::{AttributeSchema, FieldDef, FieldKind, FieldValue, Variable},
    node::{Node, NodeId, NodeRow, StreamId},
};
use geo::geometry::Coord;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue};
use log::debug;
use serde_json::json;
use std::{
    collections::{HashMap, HashSet},
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

/// Foreign member naming the collection's spatial reference.
pub const SPATIAL_REFERENCE: &str = "spatial_reference";

/// Foreign member holding the length of one coordinate unit in meters.
pub const METERS_PER_UNIT: &str = "meters_per_unit";

/// Foreign member recording the kind of every created attribute field.
pub const FIELDS: &str = "fields";

fn open(path: &Path) -> Result<File, StoreError> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => StoreError::NotFound(path.to_owned()),
        _ => StoreError::Io(e),
    })
}

/// Writes to a sibling temporary file then renames it over `path`.
fn replace<F>(path: &Path, write: F) -> Result<(), StoreError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), StoreError>,
{
    let tmp_path = path.with_extension("tmp");
    {
        let mut wtr = BufWriter::new(File::create(&tmp_path)?);
        write(&mut wtr)?;
        wtr.flush()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn to_json(value: FieldValue) -> JsonValue {
    match value {
        FieldValue::Null => JsonValue::Null,
        FieldValue::Double(v) => json!(v),
        FieldValue::Text(s) => JsonValue::String(s),
    }
}

fn as_f64(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A node store kept in a GeoJSON FeatureCollection file.
#[derive(Debug)]
pub struct GeoJsonNodeStore {
    path: PathBuf,
    collection: FeatureCollection,
    /// Position of each node's feature in `collection`.
    index: HashMap<NodeId, usize>,
}

impl GeoJsonNodeStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_owned();
        let collection = match GeoJson::from_reader(BufReader::new(open(&path)?))? {
            GeoJson::FeatureCollection(collection) => collection,
            _ => {
                return Err(StoreError::Invalid {
                    path,
                    reason: "expected a FeatureCollection".into(),
                })
            }
        };

        let mut index = HashMap::with_capacity(collection.features.len());
        for (i, feature) in collection.features.iter().enumerate() {
            let id = feature_node_id(feature).ok_or_else(|| StoreError::Invalid {
                path: path.clone(),
                reason: format!("feature {i} has no integer {NODE_ID}"),
            })?;
            if index.insert(id, i).is_some() {
                return Err(StoreError::Invalid {
                    path,
                    reason: format!("duplicate {NODE_ID} {id}"),
                });
            }
        }
        debug!("opened {} with {} nodes", path.display(), index.len());

        Ok(Self {
            path,
            collection,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns the stored value of `field` for node `id`.
    pub fn property(&self, id: NodeId, field: &str) -> Option<&JsonValue> {
        let feature = &self.collection.features[*self.index.get(&id)?];
        feature.properties.as_ref()?.get(field)
    }

    fn foreign_member(&self, name: &str) -> Option<&JsonValue> {
        self.collection.foreign_members.as_ref()?.get(name)
    }

    fn flush(&self) -> Result<(), StoreError> {
        replace(&self.path, |wtr| {
            serde_json::to_writer(wtr, &self.collection)?;
            Ok(())
        })
    }

    fn read_node(&self, feature: &Feature, id: NodeId) -> Result<Node, StoreError> {
        let origin = match feature.geometry.as_ref().map(|g| &g.value) {
            Some(geojson::Value::Point(position)) if position.len() >= 2 => Coord {
                x: position[0],
                y: position[1],
            },
            _ => {
                return Err(StoreError::Invalid {
                    path: self.path.clone(),
                    reason: format!("node {id} is not a point"),
                })
            }
        };

        let stream_id = match feature.property(STREAM_ID) {
            Some(JsonValue::Number(n)) if n.is_i64() => StreamId::Int(n.as_i64().unwrap_or_default()),
            Some(JsonValue::String(s)) => StreamId::Text(s.clone()),
            Some(JsonValue::Null) | None => StreamId::Text(String::new()),
            Some(other) => StreamId::Text(other.to_string()),
        };

        let mut node = Node::new(id, stream_id, origin);
        node.stream_km = feature.property(STREAM_KM).and_then(as_f64);
        node.azimuth = feature.property(STREAM_AZIMUTH).and_then(as_f64);
        Ok(node)
    }
}

fn feature_node_id(feature: &Feature) -> Option<NodeId> {
    match feature.property(NODE_ID)? {
        JsonValue::Number(n) => n.as_i64().or_else(|| {
            let v = n.as_f64()?;
            #[allow(clippy::cast_possible_truncation)]
            (v.fract() == 0.0).then_some(v as i64)
        }),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl NodeStore for GeoJsonNodeStore {
    fn spatial_ref(&self) -> Option<&str> {
        self.foreign_member(SPATIAL_REFERENCE)
            .and_then(JsonValue::as_str)
    }

    fn meters_per_unit(&self) -> Option<f64> {
        self.foreign_member(METERS_PER_UNIT)
            .and_then(JsonValue::as_f64)
            .filter(|v| *v > 0.0)
    }

    fn ensure_fields(&mut self, fields: &[FieldDef]) -> Result<(), StoreError> {
        let members = self
            .collection
            .foreign_members
            .get_or_insert_with(JsonObject::new);
        let kinds = members
            .entry(FIELDS)
            .or_insert_with(|| JsonValue::Object(JsonObject::new()));
        if let JsonValue::Object(kinds) = kinds {
            for field in fields {
                let kind = match field.kind {
                    FieldKind::Double => "double",
                    FieldKind::Text => "text",
                };
                kinds
                    .entry(field.name.clone())
                    .or_insert_with(|| json!(kind));
            }
        }

        for feature in &mut self.collection.features {
            let properties = feature.properties.get_or_insert_with(JsonObject::new);
            for field in fields {
                properties
                    .entry(field.name.clone())
                    .or_insert(JsonValue::Null);
            }
        }
        self.flush()
    }

    fn read_nodes(&self, indicator: Option<&str>) -> Result<Vec<NodeRow>, StoreError> {
        let mut rows = Vec::with_capacity(self.index.len());
        for (&id, &i) in &self.index {
            let feature = &self.collection.features[i];
            rows.push(NodeRow {
                node: self.read_node(feature, id)?,
                indicator: indicator
                    .and_then(|name| feature.property(name))
                    .and_then(as_f64),
            });
        }
        rows.sort_by_key(|row| row.node.id);
        Ok(rows)
    }

    fn write_nodes(&mut self, nodes: &[&Node], schema: &AttributeSchema) -> Result<(), StoreError> {
        for node in nodes {
            let i = *self
                .index
                .get(&node.id)
                .ok_or(StoreError::UnknownNode(node.id))?;
            let properties = self.collection.features[i]
                .properties
                .get_or_insert_with(JsonObject::new);
            for (name, value) in attribute_values(node, schema) {
                properties.insert(name, to_json(value));
            }
        }
        self.flush()
    }
}

/// A sample point store kept as a GeoJSON text sequence.
#[derive(Debug)]
pub struct GeoJsonSeqPointStore {
    path: PathBuf,
    variables: Vec<Variable>,
}

impl GeoJsonSeqPointStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_owned(),
            variables: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads back every stored feature.
    pub fn features(&self) -> Result<Vec<Feature>, StoreError> {
        let rdr = BufReader::new(open(&self.path)?);
        let mut features = Vec::new();
        for line in rdr.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                features.push(serde_json::from_str(&line)?);
            }
        }
        Ok(features)
    }

    fn feature(&self, record: &SampleRecord) -> Feature {
        let values = [
            json!(record.coord.x),
            json!(record.coord.y),
            json!(record.stream_id),
            json!(record.node),
            json!(record.sample_id),
            json!(record.azimuth),
            json!(record.key.direction),
            json!(record.key.zone),
            json!(record.key.to_string()),
        ];
        let mut properties: JsonObject = POINT_FIELDS
            .iter()
            .map(|name| (*name).to_owned())
            .zip(values)
            .collect();
        for (variable, value) in self.variables.iter().zip(&record.values) {
            properties.insert(variable.name().to_owned(), json!(value));
        }

        Feature {
            bbox: None,
            geometry: Some(Geometry::new(geojson::Value::Point(vec![
                record.coord.x,
                record.coord.y,
            ]))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

impl PointStore for GeoJsonSeqPointStore {
    fn reset(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("removed {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_schema(&mut self, variables: &[Variable]) -> Result<(), StoreError> {
        self.variables = variables.to_vec();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        Ok(())
    }

    fn delete_nodes(&mut self, ids: &[NodeId]) -> Result<(), StoreError> {
        if ids.is_empty() || !self.path.exists() {
            return Ok(());
        }
        let ids: HashSet<NodeId> = ids.iter().copied().collect();
        let rdr = BufReader::new(open(&self.path)?);
        replace(&self.path, |wtr| {
            for line in rdr.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let value: JsonValue = serde_json::from_str(&line)?;
                let node = value
                    .get("properties")
                    .and_then(|p| p.get(NODE_ID))
                    .and_then(JsonValue::as_i64);
                if !node.is_some_and(|id| ids.contains(&id)) {
                    wtr.write_all(line.as_bytes())?;
                    wtr.write_all(b"\n")?;
                }
            }
            Ok(())
        })
    }

    fn insert(&mut self, records: &[SampleRecord]) -> Result<(), StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut wtr = BufWriter::new(file);
        for record in records {
            serde_json::to_writer(&mut wtr, &self.feature(record))?;
            wtr.write_all(b"\n")?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{GeoJsonNodeStore, GeoJsonSeqPointStore};
    use crate::{
        aggregate::SampleRecord,
        attrs::{AttrId, AttributeSchema, Variable},
        lattice::SampleKey,
        node::StreamId,
        store::{NodeStore, PointStore, StoreError},
    };
    use geo::geometry::Coord;
    use serde_json::json;
    use std::{fs, path::Path};
    use tempfile::tempdir;

    fn write_nodes(path: &Path) {
        let collection = json!({
            "type": "FeatureCollection",
            "spatial_reference": "NAD83 / UTM zone 10N",
            "meters_per_unit": 1.0,
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [500.0, 250.0] },
                    "properties": { "NODE_ID": 2, "STREAM_ID": "S1", "STREAM_KM": 0.05, "STRM_AZMTH": 90.0 }
                },
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [100.0, 200.0] },
                    "properties": { "NODE_ID": 1, "STREAM_ID": 7 }
                }
            ]
        });
        fs::write(path, collection.to_string()).unwrap();
    }

    #[test]
    fn test_open_missing() {
        let dir = tempdir().unwrap();
        let res = GeoJsonNodeStore::open(dir.path().join("nope.geojson"));
        assert!(matches!(res, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_read_nodes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nodes.geojson");
        write_nodes(&path);

        let store = GeoJsonNodeStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.spatial_ref(), Some("NAD83 / UTM zone 10N"));
        assert_eq!(store.meters_per_unit(), Some(1.0));

        let rows = store.read_nodes(None).unwrap();
        assert_eq!(rows[0].node.id, 1);
        assert_eq!(rows[0].node.stream_id, StreamId::Int(7));
        assert_eq!(rows[0].node.origin, Coord { x: 100.0, y: 200.0 });
        assert_eq!(rows[1].node.stream_id, StreamId::Text("S1".into()));
        assert_eq!(rows[1].node.azimuth, Some(90.0));
        assert_eq!(rows[1].node.stream_km, Some(0.05));
    }

    #[test]
    fn test_write_nodes_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nodes.geojson");
        write_nodes(&path);

        let schema = AttributeSchema::new(&[Variable::LandCover, Variable::Elevation], 1, 1, true);
        let indicator = schema.indicator().unwrap().to_string();
        let mut store = GeoJsonNodeStore::open(&path).unwrap();
        store.ensure_fields(&schema.fields()).unwrap();

        let mut node = store.read_nodes(None).unwrap().remove(0).node;
        node.attrs
            .insert(AttrId::new(Variable::LandCover, SampleKey::EMERGENT), 412.0);
        node.attrs.insert(
            AttrId::new(Variable::Elevation, SampleKey { direction: 1, zone: 1 }),
            101.5,
        );
        store.write_nodes(&[&node], &schema).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let store = GeoJsonNodeStore::open(&path).unwrap();
        assert_eq!(store.property(1, "LC_T0_S0"), Some(&json!("412")));
        assert_eq!(store.property(2, "LC_T0_S0"), Some(&json!(null)));
        let rows = store.read_nodes(Some(&indicator)).unwrap();
        assert_eq!(rows[0].indicator, Some(101.5));
        assert_eq!(rows[1].indicator, None);
    }

    #[test]
    fn test_point_store() {
        let dir = tempdir().unwrap();
        let mut store = GeoJsonSeqPointStore::new(dir.path().join("points.geojsons"));
        store.reset().unwrap();
        store
            .ensure_schema(&[Variable::LandCover, Variable::Elevation])
            .unwrap();

        let record = |node: i64| SampleRecord {
            coord: Coord { x: 1.0, y: 2.0 },
            stream_id: StreamId::Int(3),
            node,
            sample_id: node * 5,
            azimuth: 90.0,
            key: SampleKey { direction: 1, zone: 2 },
            values: vec![11.0, -9999.0],
        };
        store.insert(&[record(1), record(2)]).unwrap();
        store.insert(&[record(3)]).unwrap();
        assert_eq!(store.features().unwrap().len(), 3);

        store.delete_nodes(&[2]).unwrap();
        let features = store.features().unwrap();
        assert_eq!(features.len(), 2);
        let properties = features[1].properties.as_ref().unwrap();
        assert_eq!(properties["NODE_ID"], json!(3));
        assert_eq!(properties["SAMPLE_ID"], json!(15));
        assert_eq!(properties["KEY"], json!("T1_S2"));
        assert_eq!(properties["TRANSECT"], json!(1));
        assert_eq!(properties["ELE"], json!(-9999.0));

        store.reset().unwrap();
        assert!(matches!(store.features(), Err(StoreError::NotFound(_))));
    }
}
