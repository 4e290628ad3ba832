//! Grid alignment for multi-date raster stacks.
//!
//! Pixel-wise aggregation is only legal over rasters sharing one grid.
//! This stage reconciles a list of source rasters to the first input's
//! resolution and origin, clipped to the intersection of all extents,
//! resampling by nearest neighbor. Resampled copies land in a caller
//! supplied scratch directory; the originals are never touched.

use crate::io::raster::{read_grid, read_info, write_grid};
use crate::types::{AggError, AggResult, BoundingBox, CellCode, GeoTransform, RasterGrid};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Fallback nodata for sources that do not declare one; matches the
/// classified-raster convention where -1 marks unobserved cells.
const DEFAULT_NODATA: f64 = -1.0;

/// The common target grid all inputs are resampled onto
#[derive(Debug, Clone, Copy)]
struct TargetGrid {
    transform: GeoTransform,
    width: usize,
    height: usize,
}

/// Align a stack of single-band rasters onto a common grid.
///
/// The reference resolution and cell origin come from the first input;
/// the output extent is the intersection of all input extents. Returns
/// the paths of the aligned copies, one per input, in input order.
pub fn align_rasters(inputs: &[PathBuf], scratch_dir: &Path) -> AggResult<Vec<PathBuf>> {
    if inputs.is_empty() {
        return Err(AggError::Alignment("no input rasters given".to_string()));
    }
    log::info!("Aligning {} rasters", inputs.len());

    let infos = inputs
        .iter()
        .map(read_info)
        .collect::<AggResult<Vec<_>>>()?;

    for (path, info) in inputs.iter().zip(&infos) {
        if !info.transform.is_north_up() {
            return Err(AggError::Alignment(format!(
                "rotated geotransform not supported: {}",
                path.display()
            )));
        }
    }

    let reference = &infos[0];
    let mut intersection = reference.transform.extent(reference.width, reference.height);
    for info in &infos[1..] {
        intersection = intersection
            .intersection(&info.transform.extent(info.width, info.height))
            .ok_or_else(|| {
                AggError::Alignment("input raster extents do not intersect".to_string())
            })?;
    }

    let target = snap_to_reference(&reference.transform, &intersection)?;
    log::debug!(
        "Target grid: {}x{} at ({}, {})",
        target.width,
        target.height,
        target.transform.top_left_x,
        target.transform.top_left_y
    );

    std::fs::create_dir_all(scratch_dir)?;

    inputs
        .par_iter()
        .map(|path| {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("raster");
            let aligned_path = scratch_dir.join(format!("{}_aligned.tif", stem));
            resample_nearest(path, &target, &aligned_path)?;
            Ok(aligned_path)
        })
        .collect()
}

/// Snap an intersection box onto the reference grid's cell lattice,
/// shrinking inward so every target cell lies inside the intersection
fn snap_to_reference(reference: &GeoTransform, bbox: &BoundingBox) -> AggResult<TargetGrid> {
    const EPS: f64 = 1e-9;
    let pw = reference.pixel_width;
    let ph = reference.pixel_height; // negative for north-up grids

    let cols_in = ((bbox.min_x - reference.top_left_x) / pw - EPS).ceil();
    let left = reference.top_left_x + cols_in * pw;

    let rows_down = ((reference.top_left_y - bbox.max_y) / -ph - EPS).ceil();
    let top = reference.top_left_y + rows_down * ph;

    let width = ((bbox.max_x - left) / pw + EPS).floor() as i64;
    let height = ((top - bbox.min_y) / -ph + EPS).floor() as i64;

    if width <= 0 || height <= 0 {
        return Err(AggError::Alignment(
            "intersection of input extents is empty at the reference resolution".to_string(),
        ));
    }

    Ok(TargetGrid {
        transform: GeoTransform {
            top_left_x: left,
            pixel_width: pw,
            rotation_x: 0.0,
            top_left_y: top,
            rotation_y: 0.0,
            pixel_height: ph,
        },
        width: width as usize,
        height: height as usize,
    })
}

/// Nearest-neighbor resample one source raster onto the target grid
fn resample_nearest(source: &Path, target: &TargetGrid, out_path: &Path) -> AggResult<()> {
    let grid = read_grid::<CellCode, _>(source)?;
    let nodata = grid.nodata.unwrap_or(DEFAULT_NODATA);
    let fill = nodata as CellCode;

    let (src_rows, src_cols) = grid.shape();
    let src = &grid.transform;

    let mut data = ndarray::Array2::<CellCode>::from_elem((target.height, target.width), fill);
    for row in 0..target.height {
        for col in 0..target.width {
            let (x, y) = target.transform.pixel_center(col, row);
            let src_col = ((x - src.top_left_x) / src.pixel_width).floor() as i64;
            let src_row = ((y - src.top_left_y) / src.pixel_height).floor() as i64;
            if src_row >= 0
                && src_col >= 0
                && (src_row as usize) < src_rows
                && (src_col as usize) < src_cols
            {
                data[[row, col]] = grid.data[[src_row as usize, src_col as usize]];
            }
        }
    }

    let aligned = RasterGrid {
        data,
        transform: target.transform,
        projection: grid.projection,
        nodata: Some(nodata),
    };
    write_grid(&aligned, out_path)
}
