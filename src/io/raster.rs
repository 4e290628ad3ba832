use crate::types::{AggError, AggResult, GeoTransform, RasterGrid};
use gdal::raster::{Buffer, GdalType};
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::Path;

/// Spatial metadata of a raster on disk, read without touching pixel data
#[derive(Debug, Clone)]
pub struct RasterInfo {
    pub transform: GeoTransform,
    pub projection: String,
    pub width: usize,
    pub height: usize,
    pub nodata: Option<f64>,
}

/// Read the spatial reference information of a single-band raster
pub fn read_info<P: AsRef<Path>>(path: P) -> AggResult<RasterInfo> {
    let dataset = Dataset::open(path.as_ref())?;
    let gt = dataset.geo_transform()?;
    let (width, height) = dataset.raster_size();
    let nodata = dataset.rasterband(1)?.no_data_value();

    Ok(RasterInfo {
        transform: GeoTransform::from_gdal(&gt),
        projection: dataset.projection(),
        width,
        height,
        nodata,
    })
}

/// Read a whole single-band raster into memory
pub fn read_grid<T, P>(path: P) -> AggResult<RasterGrid<T>>
where
    T: Copy + GdalType,
    P: AsRef<Path>,
{
    log::debug!("Reading raster: {}", path.as_ref().display());

    let dataset = Dataset::open(path.as_ref())?;
    let gt = dataset.geo_transform()?;
    let (width, height) = dataset.raster_size();

    let rasterband = dataset.rasterband(1)?;
    let nodata = rasterband.no_data_value();
    let band_data = rasterband.read_as::<T>((0, 0), (width, height), (width, height), None)?;

    // Convert to ndarray
    let data = Array2::from_shape_vec((height, width), band_data.data).map_err(|e| {
        AggError::Processing(format!(
            "Failed to reshape raster data from {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;

    Ok(RasterGrid {
        data,
        transform: GeoTransform::from_gdal(&gt),
        projection: dataset.projection(),
        nodata,
    })
}

/// Write a grid as a single-band GeoTIFF
pub fn write_grid<T, P>(grid: &RasterGrid<T>, path: P) -> AggResult<()>
where
    T: Copy + GdalType,
    P: AsRef<Path>,
{
    log::debug!("Writing raster: {}", path.as_ref().display());

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (height, width) = grid.shape();

    let mut dataset =
        driver.create_with_band_type::<T, _>(path.as_ref(), width as isize, height as isize, 1)?;

    dataset.set_geo_transform(&grid.transform.to_gdal())?;
    if !grid.projection.is_empty() {
        dataset.set_projection(&grid.projection)?;
    }

    let mut rasterband = dataset.rasterband(1)?;
    let flat_data: Vec<T> = grid.data.iter().cloned().collect();
    let buffer = Buffer::new((width, height), flat_data);
    rasterband.write((0, 0), (width, height), &buffer)?;

    if let Some(nodata) = grid.nodata {
        rasterband.set_no_data_value(Some(nodata))?;
    }

    Ok(())
}
