//! Persistence percentage: the share of valid observations at a cell
//! that detected the feature.

use crate::core::reduce::StateCounts;
use crate::types::{AggError, AggResult, CellCode, PctArray, RasterGrid};

/// Nodata sentinel for persistence rasters; valid values are [0, 100]
pub const PERSISTENCE_NODATA: f32 = -1.0;

/// Derive `100 * presence / (n - invalid)` per cell.
///
/// Cells with no valid observations (denominator zero) and cells that are
/// nodata in the counts become nodata. Count rasters inconsistent with
/// each other or with `n` are rejected.
pub fn persistence_pct(counts: &StateCounts) -> AggResult<RasterGrid<f32>> {
    let presence = &counts.presence_count;
    let invalid = &counts.invalid_count;
    let n = counts.n_dates as CellCode;

    if !presence.same_grid(invalid) {
        return Err(AggError::Alignment(
            "presence and invalid count rasters are on different grids".to_string(),
        ));
    }

    let presence_nodata = presence.nodata.map(|nd| nd as CellCode);
    let invalid_nodata = invalid.nodata.map(|nd| nd as CellCode);

    let mut data = PctArray::from_elem(presence.shape(), PERSISTENCE_NODATA);
    for ((out, &p), &i) in data
        .iter_mut()
        .zip(presence.data.iter())
        .zip(invalid.data.iter())
    {
        if presence_nodata == Some(p) || invalid_nodata == Some(i) {
            continue;
        }
        if i > n || p + i > n {
            return Err(AggError::Processing(format!(
                "counts exceed the {} dates in range (presence {}, invalid {})",
                n, p, i
            )));
        }
        let valid_obs = n - i;
        if valid_obs > 0 {
            *out = 100.0 * p as f32 / valid_obs as f32;
        }
    }

    Ok(RasterGrid {
        data,
        transform: presence.transform,
        projection: presence.projection.clone(),
        nodata: Some(PERSISTENCE_NODATA as f64),
    })
}
