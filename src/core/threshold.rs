//! Threshold extraction: a minimum-detection-count rule turning a
//! presence-count raster into a binary occurrence raster.

use crate::types::{CellCode, CodeArray, RasterGrid};

/// Nodata for occurrence rasters; the only valid cell value is 1
pub const OCCURRENCE_NODATA: CellCode = -1;

/// Cells with `presence_count > threshold` become 1; every other cell is
/// nodata. Cells at or below the threshold are excluded from any area
/// accounting entirely, which is not the same as contributing zero area.
pub fn threshold_occurrence(
    presence_count: &RasterGrid<CellCode>,
    threshold: CellCode,
) -> RasterGrid<CellCode> {
    log::debug!("Thresholding presence counts at > {}", threshold);

    let count_nodata = presence_count.nodata.map(|nd| nd as CellCode);
    let mut data = CodeArray::from_elem(presence_count.shape(), OCCURRENCE_NODATA);
    for (out, &count) in data.iter_mut().zip(presence_count.data.iter()) {
        if count_nodata != Some(count) && count > threshold {
            *out = 1;
        }
    }

    RasterGrid {
        data,
        transform: presence_count.transform,
        projection: presence_count.projection.clone(),
        nodata: Some(OCCURRENCE_NODATA as f64),
    }
}
