//! Zonal statistics over a fixed polygon partition.
//!
//! Zones are rasterized onto the value grid's geometry (pixel-center
//! semantics) and each zone's cell values are summarized. Nodata cells
//! never contribute. A zone with no contributing pixels is a normal
//! result, not an error.

use crate::io::zones::Zone;
use crate::types::{AggResult, RasterGrid, ZoneStats};
use gdal::raster::{rasterize, GdalType};
use gdal::DriverManager;

/// The summary statistics a caller can request per zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZonalStatistic {
    Min,
    Max,
    Mean,
    Median,
}

/// All summary statistics, for persistence-style rollups
pub const ALL_STATISTICS: [ZonalStatistic; 4] = [
    ZonalStatistic::Min,
    ZonalStatistic::Max,
    ZonalStatistic::Mean,
    ZonalStatistic::Median,
];

/// Compute per-zone statistics of a raster.
///
/// Returns one record per input zone, in input order, preserving the
/// zone identifier. The pixel count is always reported; the other
/// statistics only when requested, and never for empty zones.
pub fn zonal_statistics<T>(
    grid: &RasterGrid<T>,
    zones: &[Zone],
    requested: &[ZonalStatistic],
) -> AggResult<Vec<ZoneStats>>
where
    T: Copy + GdalType + Into<f64>,
{
    log::debug!("Zonal statistics over {} zones", zones.len());

    let zone_index = rasterize_zones(grid, zones)?;
    let (rows, cols) = grid.shape();

    // Gather the values under each zone, skipping nodata cells
    let mut zone_values: Vec<Vec<f64>> = vec![Vec::new(); zones.len()];
    for row in 0..rows {
        for col in 0..cols {
            let zone = zone_index[row * cols + col];
            if zone == 0 {
                continue;
            }
            let value: f64 = grid.data[[row, col]].into();
            if value.is_nan() {
                continue;
            }
            if let Some(nodata) = grid.nodata {
                if (value - nodata).abs() < f64::EPSILON {
                    continue;
                }
            }
            zone_values[(zone - 1) as usize].push(value);
        }
    }

    let results = zones
        .iter()
        .zip(zone_values)
        .map(|(zone, mut values)| summarize(&zone.id, &mut values, requested))
        .collect();
    Ok(results)
}

/// Burn zone ordinals (1-based; 0 = outside every zone) onto the grid's
/// geometry using an in-memory dataset
fn rasterize_zones<T>(grid: &RasterGrid<T>, zones: &[Zone]) -> AggResult<Vec<i32>>
where
    T: Copy + GdalType,
{
    let (rows, cols) = grid.shape();
    let driver = DriverManager::get_driver_by_name("MEM")?;
    let mut dataset =
        driver.create_with_band_type::<i32, _>("", cols as isize, rows as isize, 1)?;
    dataset.set_geo_transform(&grid.transform.to_gdal())?;
    if !grid.projection.is_empty() {
        dataset.set_projection(&grid.projection)?;
    }

    for (ordinal, zone) in zones.iter().enumerate() {
        rasterize(
            &mut dataset,
            &[1],
            &[zone.geometry.clone()],
            &[(ordinal + 1) as f64],
            None,
        )?;
    }

    let band = dataset.rasterband(1)?;
    let buffer = band.read_as::<i32>((0, 0), (cols, rows), (cols, rows), None)?;
    Ok(buffer.data)
}

fn summarize(zone_id: &str, values: &mut Vec<f64>, requested: &[ZonalStatistic]) -> ZoneStats {
    let mut stats = ZoneStats {
        zone_id: zone_id.to_string(),
        count: values.len() as u64,
        min: None,
        max: None,
        mean: None,
        median: None,
    };
    if values.is_empty() {
        return stats;
    }

    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let count = values.len();

    for statistic in requested {
        match statistic {
            ZonalStatistic::Min => stats.min = Some(values[0]),
            ZonalStatistic::Max => stats.max = Some(values[count - 1]),
            ZonalStatistic::Mean => {
                stats.mean = Some(values.iter().sum::<f64>() / count as f64)
            }
            ZonalStatistic::Median => {
                let median = if count % 2 == 0 {
                    (values[count / 2 - 1] + values[count / 2]) / 2.0
                } else {
                    values[count / 2]
                };
                stats.median = Some(median);
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use approx::assert_relative_eq;
    use gdal::vector::Geometry;
    use ndarray::array;

    fn north_up(size: f64) -> GeoTransform {
        GeoTransform {
            top_left_x: 0.0,
            pixel_width: size,
            rotation_x: 0.0,
            top_left_y: 40.0,
            rotation_y: 0.0,
            pixel_height: -size,
        }
    }

    fn square(min_x: f64, min_y: f64, w: f64, h: f64) -> Geometry {
        let wkt = format!(
            "POLYGON(({x0} {y0},{x1} {y0},{x1} {y1},{x0} {y1},{x0} {y0}))",
            x0 = min_x,
            y0 = min_y,
            x1 = min_x + w,
            y1 = min_y + h,
        );
        Geometry::from_wkt(&wkt).unwrap()
    }

    fn zone(id: &str, geometry: Geometry) -> Zone {
        Zone {
            id: id.to_string(),
            geometry,
        }
    }

    fn pct_grid(data: crate::types::PctArray) -> RasterGrid<f32> {
        RasterGrid {
            data,
            transform: north_up(10.0),
            projection: String::new(),
            nodata: Some(-1.0),
        }
    }

    #[test]
    fn test_two_zone_partition() {
        // 4x4 grid over x 0..40, y 0..40; west and east halves
        let grid = pct_grid(array![
            [10.0, 20.0, 30.0, 40.0],
            [10.0, 20.0, 30.0, 40.0],
            [10.0, 20.0, 30.0, 40.0],
            [10.0, 20.0, 30.0, 40.0],
        ]);
        let zones = vec![
            zone("west", square(0.0, 0.0, 20.0, 40.0)),
            zone("east", square(20.0, 0.0, 20.0, 40.0)),
        ];

        let stats = zonal_statistics(&grid, &zones, &ALL_STATISTICS).unwrap();
        assert_eq!(stats.len(), 2);

        assert_eq!(stats[0].zone_id, "west");
        assert_eq!(stats[0].count, 8);
        assert_relative_eq!(stats[0].mean.unwrap(), 15.0, max_relative = 1e-9);
        assert_relative_eq!(stats[0].min.unwrap(), 10.0, max_relative = 1e-9);
        assert_relative_eq!(stats[0].max.unwrap(), 20.0, max_relative = 1e-9);
        assert_relative_eq!(stats[0].median.unwrap(), 15.0, max_relative = 1e-9);

        assert_eq!(stats[1].count, 8);
        assert_relative_eq!(stats[1].mean.unwrap(), 35.0, max_relative = 1e-9);
    }

    #[test]
    fn test_partition_conserves_valid_cell_count() {
        let mut data = crate::types::PctArray::from_elem((4, 4), 5.0);
        data[[0, 0]] = -1.0;
        data[[3, 3]] = -1.0;
        let grid = pct_grid(data);

        let zones = vec![
            zone("west", square(0.0, 0.0, 20.0, 40.0)),
            zone("east", square(20.0, 0.0, 20.0, 40.0)),
        ];
        let stats = zonal_statistics(&grid, &zones, &[]).unwrap();

        let total: u64 = stats.iter().map(|s| s.count).sum();
        let valid = grid.data.iter().filter(|&&v| v != -1.0).count() as u64;
        assert_eq!(total, valid);
    }

    #[test]
    fn test_empty_zone_reports_zero_count_and_nulls() {
        let grid = pct_grid(crate::types::PctArray::from_elem((4, 4), 5.0));
        let zones = vec![zone("offshore", square(5000.0, 5000.0, 100.0, 100.0))];

        let stats = zonal_statistics(&grid, &zones, &ALL_STATISTICS).unwrap();
        assert_eq!(stats[0].count, 0);
        assert_eq!(stats[0].min, None);
        assert_eq!(stats[0].max, None);
        assert_eq!(stats[0].mean, None);
        assert_eq!(stats[0].median, None);
    }

    #[test]
    fn test_nodata_cells_excluded() {
        let grid = pct_grid(array![[5.0, -1.0], [-1.0, 5.0]]);
        let zones = vec![zone("all", square(-10.0, 0.0, 100.0, 100.0))];

        let stats = zonal_statistics(&grid, &zones, &[ZonalStatistic::Mean]).unwrap();
        assert_eq!(stats[0].count, 2);
        assert_relative_eq!(stats[0].mean.unwrap(), 5.0, max_relative = 1e-9);
    }

    #[test]
    fn test_unrequested_statistics_absent() {
        let grid = pct_grid(crate::types::PctArray::from_elem((2, 2), 5.0));
        let zones = vec![zone("all", square(-10.0, 0.0, 100.0, 100.0))];

        let stats = zonal_statistics(&grid, &zones, &[ZonalStatistic::Mean]).unwrap();
        assert_eq!(stats[0].count, 4);
        assert!(stats[0].mean.is_some());
        assert!(stats[0].min.is_none());
        assert!(stats[0].median.is_none());
    }

    #[test]
    fn test_occurrence_counts_for_area() {
        // Occurrence rasters carry 1/nodata; the count is the area basis
        let grid = RasterGrid::<i16> {
            data: array![[1, -1], [1, -1]],
            transform: north_up(10.0),
            projection: String::new(),
            nodata: Some(-1.0),
        };
        let zones = vec![zone("seg", square(-10.0, 0.0, 100.0, 100.0))];

        let stats = zonal_statistics(&grid, &zones, &[]).unwrap();
        assert_eq!(stats[0].count, 2);
    }
}
