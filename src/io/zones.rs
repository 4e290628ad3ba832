use crate::types::{AggError, AggResult, ZoneStats};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{
    Defn, Feature, FieldDefn, FieldValue, Geometry, LayerAccess, OGRFieldType,
};
use gdal::{Dataset, DatasetOptions, DriverManager, GdalOpenFlags, LayerOptions};
use std::path::Path;

/// One polygon zone from the external partition, with its identifier
#[derive(Debug)]
pub struct Zone {
    pub id: String,
    pub geometry: Geometry,
}

/// A set of zones plus the spatial reference of the layer they came from
#[derive(Debug)]
pub struct ZoneSet {
    pub zones: Vec<Zone>,
    pub srs_wkt: Option<String>,
}

/// Read zone polygons from a vector layer.
///
/// The zone layer is expected to share the rasters' spatial reference;
/// this engine does not reproject.
pub fn read_zones<P: AsRef<Path>>(
    store: P,
    layer_name: &str,
    id_field: &str,
) -> AggResult<ZoneSet> {
    log::info!(
        "Reading zones from {} layer {}",
        store.as_ref().display(),
        layer_name
    );

    let dataset = Dataset::open(store.as_ref())?;
    let mut layer = dataset.layer_by_name(layer_name)?;
    let srs_wkt = layer
        .spatial_ref()
        .and_then(|srs| srs.to_wkt().ok());

    let mut zones = Vec::new();
    for feature in layer.features() {
        let id = match feature.field(id_field)? {
            Some(FieldValue::StringValue(s)) => s,
            Some(FieldValue::IntegerValue(i)) => i.to_string(),
            Some(FieldValue::Integer64Value(i)) => i.to_string(),
            Some(other) => {
                return Err(AggError::Config(format!(
                    "zone identifier field {} has unsupported type: {:?}",
                    id_field, other
                )))
            }
            None => {
                return Err(AggError::Config(format!(
                    "zone feature is missing identifier field {}",
                    id_field
                )))
            }
        };
        let geometry = feature
            .geometry()
            .ok_or_else(|| {
                AggError::Processing(format!("zone {} has no geometry", id))
            })?
            .clone();
        zones.push(Zone { id, geometry });
    }

    log::info!("Read {} zones", zones.len());
    Ok(ZoneSet { zones, srs_wkt })
}

/// Open the output vector store for appending, creating it when absent
fn open_output_store(store: &Path) -> AggResult<Dataset> {
    if store.exists() {
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_VECTOR | GdalOpenFlags::GDAL_OF_UPDATE,
            ..Default::default()
        };
        Ok(Dataset::open_ex(store, options)?)
    } else {
        let driver = DriverManager::get_driver_by_name("GPKG")?;
        Ok(driver.create_vector_only(store)?)
    }
}

fn set_optional_real(feature: &mut Feature, name: &str, value: Option<f64>) -> AggResult<()> {
    // Absent statistics stay NULL rather than becoming a sentinel number
    if let Some(v) = value {
        feature.set_field(name, &FieldValue::RealValue(v))?;
    }
    Ok(())
}

/// Append a zone persistence-statistics layer to the output store.
///
/// One feature per zone, carrying the zone's original geometry and
/// identifier, the range label, and the requested summary statistics.
/// Each run writes its own named layer; existing layers are never
/// rewritten in place.
pub fn write_persistence_stats<P: AsRef<Path>>(
    store: P,
    layer_name: &str,
    id_field: &str,
    label: &str,
    zones: &[Zone],
    stats: &[ZoneStats],
    srs_wkt: Option<&str>,
) -> AggResult<()> {
    if zones.len() != stats.len() {
        return Err(AggError::Processing(format!(
            "zone count {} does not match statistics count {}",
            zones.len(),
            stats.len()
        )));
    }
    log::info!(
        "Writing persistence statistics layer {} ({} zones)",
        layer_name,
        zones.len()
    );

    let mut dataset = open_output_store(store.as_ref())?;
    let srs = match srs_wkt {
        Some(wkt) => Some(SpatialRef::from_wkt(wkt)?),
        None => None,
    };
    let layer = dataset.create_layer(LayerOptions {
        name: layer_name,
        srs: srs.as_ref(),
        ..Default::default()
    })?;

    FieldDefn::new(id_field, OGRFieldType::OFTString)?.add_to_layer(&layer)?;
    FieldDefn::new("period", OGRFieldType::OFTString)?.add_to_layer(&layer)?;
    FieldDefn::new("pstcount", OGRFieldType::OFTInteger64)?.add_to_layer(&layer)?;
    FieldDefn::new("pstmin", OGRFieldType::OFTReal)?.add_to_layer(&layer)?;
    FieldDefn::new("pstmax", OGRFieldType::OFTReal)?.add_to_layer(&layer)?;
    FieldDefn::new("pstmean", OGRFieldType::OFTReal)?.add_to_layer(&layer)?;
    FieldDefn::new("pstmedian", OGRFieldType::OFTReal)?.add_to_layer(&layer)?;

    let defn = Defn::from_layer(&layer);
    for (zone, zone_stats) in zones.iter().zip(stats) {
        let mut feature = Feature::new(&defn)?;
        feature.set_geometry(zone.geometry.clone())?;
        feature.set_field(id_field, &FieldValue::StringValue(zone.id.clone()))?;
        feature.set_field("period", &FieldValue::StringValue(label.to_string()))?;
        feature.set_field(
            "pstcount",
            &FieldValue::Integer64Value(zone_stats.count as i64),
        )?;
        set_optional_real(&mut feature, "pstmin", zone_stats.min)?;
        set_optional_real(&mut feature, "pstmax", zone_stats.max)?;
        set_optional_real(&mut feature, "pstmean", zone_stats.mean)?;
        set_optional_real(&mut feature, "pstmedian", zone_stats.median)?;
        feature.create(&layer)?;
    }

    Ok(())
}

/// Append a zone area-statistics layer to the output store: pixel count
/// per zone and the equivalent ground area in square meters.
pub fn write_area_stats<P: AsRef<Path>>(
    store: P,
    layer_name: &str,
    id_field: &str,
    label: &str,
    zones: &[Zone],
    stats: &[ZoneStats],
    pixel_area_m2: f64,
    srs_wkt: Option<&str>,
) -> AggResult<()> {
    if zones.len() != stats.len() {
        return Err(AggError::Processing(format!(
            "zone count {} does not match statistics count {}",
            zones.len(),
            stats.len()
        )));
    }
    log::info!(
        "Writing area statistics layer {} ({} zones, {} m2/pixel)",
        layer_name,
        zones.len(),
        pixel_area_m2
    );

    let mut dataset = open_output_store(store.as_ref())?;
    let srs = match srs_wkt {
        Some(wkt) => Some(SpatialRef::from_wkt(wkt)?),
        None => None,
    };
    let layer = dataset.create_layer(LayerOptions {
        name: layer_name,
        srs: srs.as_ref(),
        ..Default::default()
    })?;

    FieldDefn::new(id_field, OGRFieldType::OFTString)?.add_to_layer(&layer)?;
    FieldDefn::new("period", OGRFieldType::OFTString)?.add_to_layer(&layer)?;
    FieldDefn::new("pxlcount", OGRFieldType::OFTInteger64)?.add_to_layer(&layer)?;
    FieldDefn::new("area_m2", OGRFieldType::OFTReal)?.add_to_layer(&layer)?;

    let defn = Defn::from_layer(&layer);
    for (zone, zone_stats) in zones.iter().zip(stats) {
        let mut feature = Feature::new(&defn)?;
        feature.set_geometry(zone.geometry.clone())?;
        feature.set_field(id_field, &FieldValue::StringValue(zone.id.clone()))?;
        feature.set_field("period", &FieldValue::StringValue(label.to_string()))?;
        feature.set_field(
            "pxlcount",
            &FieldValue::Integer64Value(zone_stats.count as i64),
        )?;
        feature.set_field(
            "area_m2",
            &FieldValue::RealValue(zone_stats.count as f64 * pixel_area_m2),
        )?;
        feature.create(&layer)?;
    }

    Ok(())
}
