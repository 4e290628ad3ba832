//! Streaming per-pixel reduction of a canonical observation series.
//!
//! The reducer folds one date's raster at a time into two running count
//! arrays sized to the grid; the full stack is never resident in memory,
//! whatever the series length.

use crate::io::raster::read_grid;
use crate::types::{
    AggError, AggResult, CellCode, CodeArray, GeoTransform, Observation, PixelState, RasterGrid,
};
use std::path::Path;
use std::time::Instant;

/// Nodata value for count rasters. Counts start at zero, so a negative
/// sentinel never collides with a valid count.
pub const COUNT_NODATA: CellCode = -1;

/// Per-pixel aggregate counts over a date range
#[derive(Debug)]
pub struct StateCounts {
    /// Number of dates observed `Present` per cell
    pub presence_count: RasterGrid<CellCode>,
    /// Number of dates observed `Invalid` per cell
    pub invalid_count: RasterGrid<CellCode>,
    /// Total number of dates in the reduced range
    pub n_dates: usize,
}

/// Running accumulator over same-grid canonical rasters.
///
/// Every folded raster must match the first raster's grid exactly; the
/// alignment precondition is enforced here, never assumed.
pub struct CountAccumulator {
    transform: GeoTransform,
    projection: String,
    presence: CodeArray,
    invalid: CodeArray,
    observed: CodeArray,
    n_dates: usize,
}

impl CountAccumulator {
    /// Start accumulating on the grid of the first observation
    pub fn new(first: &RasterGrid<CellCode>) -> Self {
        let shape = first.shape();
        Self {
            transform: first.transform,
            projection: first.projection.clone(),
            presence: CodeArray::zeros(shape),
            invalid: CodeArray::zeros(shape),
            observed: CodeArray::zeros(shape),
            n_dates: 0,
        }
    }

    /// Fold one date's canonical raster into the running counts.
    ///
    /// `Present` cells add to the presence count, `Invalid` cells to the
    /// invalid count, `Absent` cells to neither; all three mark the cell
    /// as observed. Cells equal to a non-canonical nodata value are
    /// unobserved. Any other value is a hard error naming the file.
    pub fn accumulate(
        &mut self,
        grid: &RasterGrid<CellCode>,
        source: &Path,
    ) -> AggResult<()> {
        if grid.shape() != self.presence.dim() || !grid.transform.approx_eq(&self.transform) {
            return Err(AggError::Alignment(format!(
                "raster grid differs from the series grid: {}",
                source.display()
            )));
        }

        // A declared nodata inside the canonical domain (the usual -1)
        // is a real observation state, not an undefined cell
        let undefined = grid
            .nodata
            .map(|nd| nd as CellCode)
            .filter(|nd| PixelState::from_code(*nd).is_none());

        for ((cell, presence), (invalid, observed)) in grid
            .data
            .iter()
            .zip(self.presence.iter_mut())
            .zip(self.invalid.iter_mut().zip(self.observed.iter_mut()))
        {
            if undefined == Some(*cell) {
                continue;
            }
            match PixelState::from_code(*cell) {
                Some(PixelState::Present) => {
                    *presence += 1;
                    *observed += 1;
                }
                Some(PixelState::Absent) => {
                    *observed += 1;
                }
                Some(PixelState::Invalid) => {
                    *invalid += 1;
                    *observed += 1;
                }
                None => {
                    return Err(AggError::UnmappedValue {
                        path: source.to_path_buf(),
                        code: *cell,
                    })
                }
            }
        }

        self.n_dates += 1;
        Ok(())
    }

    /// Close the accumulation and produce the two count rasters.
    ///
    /// Cells where no date carried a defined value become nodata; a zero
    /// count at an observed cell stays zero, never the nodata sentinel.
    pub fn finish(self) -> StateCounts {
        let mut presence = self.presence;
        let mut invalid = self.invalid;

        for ((p, i), obs) in presence
            .iter_mut()
            .zip(invalid.iter_mut())
            .zip(self.observed.iter())
        {
            if *obs == 0 {
                *p = COUNT_NODATA;
                *i = COUNT_NODATA;
            }
        }

        let presence_count = RasterGrid {
            data: presence,
            transform: self.transform,
            projection: self.projection.clone(),
            nodata: Some(COUNT_NODATA as f64),
        };
        let invalid_count = RasterGrid {
            data: invalid,
            transform: self.transform,
            projection: self.projection,
            nodata: Some(COUNT_NODATA as f64),
        };

        StateCounts {
            presence_count,
            invalid_count,
            n_dates: self.n_dates,
        }
    }
}

/// Reduce an aligned, reclassified observation slice to per-pixel counts,
/// streaming one raster at a time off disk.
///
/// A raster that fails to read or breaks a precondition aborts the whole
/// range; dates are never silently skipped.
pub fn reduce_series(observations: &[Observation]) -> AggResult<StateCounts> {
    if observations.is_empty() {
        return Err(AggError::DateRange(
            "cannot reduce an empty observation range".to_string(),
        ));
    }

    let start = Instant::now();
    log::info!(
        "Reducing {} observations ({}..{})",
        observations.len(),
        observations.first().map(|o| o.token.as_str()).unwrap_or(""),
        observations.last().map(|o| o.token.as_str()).unwrap_or(""),
    );

    let first = read_grid::<CellCode, _>(&observations[0].path)?;
    let mut accumulator = CountAccumulator::new(&first);
    accumulator.accumulate(&first, &observations[0].path)?;
    drop(first);

    for obs in &observations[1..] {
        log::debug!("Accumulating {}", obs.path.display());
        let grid = read_grid::<CellCode, _>(&obs.path)?;
        accumulator.accumulate(&grid, &obs.path)?;
    }

    let counts = accumulator.finish();
    log::info!(
        "Reduced {} dates in {:.2}s",
        counts.n_dates,
        start.elapsed().as_secs_f64()
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::path::PathBuf;

    fn north_up() -> GeoTransform {
        GeoTransform {
            top_left_x: 0.0,
            pixel_width: 10.0,
            rotation_x: 0.0,
            top_left_y: 20.0,
            rotation_y: 0.0,
            pixel_height: -10.0,
        }
    }

    fn canonical(data: CodeArray) -> RasterGrid<CellCode> {
        RasterGrid {
            data,
            transform: north_up(),
            projection: String::new(),
            nodata: Some(-1.0),
        }
    }

    fn src(n: usize) -> PathBuf {
        PathBuf::from(format!("obs_{}.tif", n))
    }

    #[test]
    fn test_three_date_counts() {
        let dates = [
            canonical(array![[1, 0], [-1, 0]]),
            canonical(array![[1, 1], [0, -1]]),
            canonical(array![[0, 0], [1, 0]]),
        ];

        let mut acc = CountAccumulator::new(&dates[0]);
        for (i, grid) in dates.iter().enumerate() {
            acc.accumulate(grid, &src(i)).unwrap();
        }
        let counts = acc.finish();

        assert_eq!(counts.n_dates, 3);
        assert_eq!(counts.presence_count.data, array![[2, 1], [1, 0]]);
        assert_eq!(counts.invalid_count.data, array![[0, 0], [1, 1]]);
    }

    #[test]
    fn test_zero_count_is_not_nodata() {
        // All dates absent at every cell: counts are defined zeros
        let dates = [
            canonical(array![[0, 0], [0, 0]]),
            canonical(array![[0, 0], [0, 0]]),
        ];
        let mut acc = CountAccumulator::new(&dates[0]);
        for (i, grid) in dates.iter().enumerate() {
            acc.accumulate(grid, &src(i)).unwrap();
        }
        let counts = acc.finish();

        assert!(counts.presence_count.data.iter().all(|&c| c == 0));
        assert!(counts.invalid_count.data.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_all_undefined_cell_becomes_nodata() {
        // A nodata value outside the canonical domain marks undefined
        // cells; a cell undefined on every date has no count at all
        let excluded = CellCode::MIN;
        let make = |data| RasterGrid {
            data,
            transform: north_up(),
            projection: String::new(),
            nodata: Some(excluded as f64),
        };
        let dates = [
            make(array![[excluded, 1], [0, 0]]),
            make(array![[excluded, 0], [excluded, 1]]),
        ];

        let mut acc = CountAccumulator::new(&dates[0]);
        for (i, grid) in dates.iter().enumerate() {
            acc.accumulate(grid, &src(i)).unwrap();
        }
        let counts = acc.finish();

        assert_eq!(counts.presence_count.data[[0, 0]], COUNT_NODATA);
        assert_eq!(counts.invalid_count.data[[0, 0]], COUNT_NODATA);
        // Partially undefined cells keep their defined counts
        assert_eq!(counts.presence_count.data[[1, 0]], 0);
        assert_eq!(counts.presence_count.data[[1, 1]], 1);
    }

    #[test]
    fn test_canonical_minus_one_is_invalid_not_undefined() {
        // The classified rasters declare nodata=-1, which is the invalid
        // state; those cells are observed-invalid, not missing
        let dates = [canonical(array![[-1, -1], [-1, -1]])];
        let mut acc = CountAccumulator::new(&dates[0]);
        acc.accumulate(&dates[0], &src(0)).unwrap();
        let counts = acc.finish();

        assert!(counts.invalid_count.data.iter().all(|&c| c == 1));
        assert!(counts.presence_count.data.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_counts_bounded_by_date_total() {
        let dates = [
            canonical(array![[1, -1], [0, 1]]),
            canonical(array![[1, 1], [-1, 0]]),
            canonical(array![[-1, 0], [0, 1]]),
        ];
        let mut acc = CountAccumulator::new(&dates[0]);
        for (i, grid) in dates.iter().enumerate() {
            acc.accumulate(grid, &src(i)).unwrap();
        }
        let counts = acc.finish();
        let n = counts.n_dates as CellCode;

        for (&p, &i) in counts
            .presence_count
            .data
            .iter()
            .zip(counts.invalid_count.data.iter())
        {
            assert!(p >= 0 && i >= 0);
            assert!(p + i <= n);
        }
    }

    #[test]
    fn test_misaligned_grid_rejected() {
        let a = canonical(array![[1, 0], [0, 1]]);
        let mut shifted = canonical(array![[1, 0], [0, 1]]);
        shifted.transform.top_left_x += 10.0;

        let mut acc = CountAccumulator::new(&a);
        acc.accumulate(&a, &src(0)).unwrap();
        let err = acc.accumulate(&shifted, &src(1)).unwrap_err();
        assert!(matches!(err, AggError::Alignment(_)));
    }

    #[test]
    fn test_non_canonical_value_rejected() {
        let bad = canonical(array![[1, 0], [5, 0]]);
        let mut acc = CountAccumulator::new(&bad);
        let err = acc.accumulate(&bad, &src(0)).unwrap_err();
        match err {
            AggError::UnmappedValue { code, .. } => assert_eq!(code, 5),
            other => panic!("expected UnmappedValue, got {:?}", other),
        }
    }

    #[test]
    fn test_reduce_empty_range_is_error() {
        let err = reduce_series(&[]).unwrap_err();
        assert!(matches!(err, AggError::DateRange(_)));
    }
}
