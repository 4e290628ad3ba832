//! Category reclassification: raw classifier codes to the canonical
//! three-state domain {present, absent, invalid}.
//!
//! The mapping is configuration, not a constant; any raw code without an
//! entry aborts the run instead of passing through.

use crate::config::ReclassConfig;
use crate::io::raster::{read_grid, write_grid};
use crate::types::{AggError, AggResult, CellCode, CodeArray, PixelState, RasterGrid};
use std::path::Path;

/// Output cell value for observations dropped under
/// `PremaskedPolicy::Exclude`; outside the canonical code domain so the
/// reducer can tell excluded cells from invalid ones.
pub const EXCLUDED_CODE: CellCode = CellCode::MIN;

/// Reclassify one array of raw codes to canonical codes.
///
/// `source` only labels errors; the array is not read from disk here.
pub fn reclassify_array(
    data: &CodeArray,
    config: &ReclassConfig,
    source: &Path,
) -> AggResult<CodeArray> {
    let mut out = CodeArray::zeros(data.dim());
    for (cell, out_cell) in data.iter().zip(out.iter_mut()) {
        let resolved = config.resolve(*cell).ok_or(AggError::UnmappedValue {
            path: source.to_path_buf(),
            code: *cell,
        })?;
        *out_cell = match resolved {
            Some(state) => state.code(),
            None => EXCLUDED_CODE,
        };
    }
    Ok(out)
}

/// Reclassify a raw classified raster into a canonical raster on disk.
///
/// The output nodata is the canonical invalid code (-1) under the default
/// fold-to-absent policy, or `EXCLUDED_CODE` when pre-masked cells are
/// excluded, so excluded cells read back as nodata.
pub fn reclassify_raster(
    source: &Path,
    target: &Path,
    config: &ReclassConfig,
) -> AggResult<()> {
    log::debug!(
        "Reclassifying {} to {}",
        source.display(),
        target.display()
    );

    let grid = read_grid::<CellCode, _>(source)?;
    let data = reclassify_array(&grid.data, config, source)?;

    // Nodata follows the policy, not this date's cell content, so every
    // raster in a series declares the same sentinel
    let nodata = if config.premasked_code.is_some()
        && config.premasked_policy == crate::config::PremaskedPolicy::Exclude
    {
        EXCLUDED_CODE as f64
    } else {
        PixelState::Invalid.code() as f64
    };

    let reclassified = RasterGrid {
        data,
        transform: grid.transform,
        projection: grid.projection,
        nodata: Some(nodata),
    };
    write_grid(&reclassified, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PremaskedPolicy;
    use ndarray::array;
    use std::path::PathBuf;

    fn src() -> PathBuf {
        PathBuf::from("s2qr_20170112_mosaic.tif")
    }

    #[test]
    fn test_domain_mapping() {
        // Raw domain {-9999, -1, 0, 1} maps to {0, -1, 0, 1}
        let raw = array![[-9999, -1], [0, 1]];
        let out = reclassify_array(&raw, &ReclassConfig::sargassum(), &src()).unwrap();
        assert_eq!(out, array![[0, -1], [0, 1]]);
    }

    #[test]
    fn test_identity_mapping_is_noop() {
        let canonical = array![[1, 0, -1], [-1, 0, 1]];
        let out = reclassify_array(&canonical, &ReclassConfig::identity(), &src()).unwrap();
        assert_eq!(out, canonical);
    }

    #[test]
    fn test_unmapped_code_carries_file_and_value() {
        let raw = array![[0, 1], [7, 0]];
        let err = reclassify_array(&raw, &ReclassConfig::sargassum(), &src()).unwrap_err();
        match err {
            AggError::UnmappedValue { path, code } => {
                assert_eq!(path, src());
                assert_eq!(code, 7);
            }
            other => panic!("expected UnmappedValue, got {:?}", other),
        }
    }

    #[test]
    fn test_exclude_policy_marks_premasked_cells() {
        let mut config = ReclassConfig::sargassum();
        config.premasked_policy = PremaskedPolicy::Exclude;

        let raw = array![[-9999, 1], [0, -1]];
        let out = reclassify_array(&raw, &config, &src()).unwrap();
        assert_eq!(out, array![[EXCLUDED_CODE, 1], [0, -1]]);
    }

    #[test]
    fn test_reclassify_raster_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("raw_20170112.tif");
        let target = dir.path().join("canonical_20170112.tif");

        let grid = RasterGrid {
            data: array![[-9999_i16, -1], [0, 1]],
            transform: crate::types::GeoTransform {
                top_left_x: 0.0,
                pixel_width: 10.0,
                rotation_x: 0.0,
                top_left_y: 20.0,
                rotation_y: 0.0,
                pixel_height: -10.0,
            },
            projection: String::new(),
            nodata: None,
        };
        write_grid(&grid, &source).unwrap();

        reclassify_raster(&source, &target, &ReclassConfig::sargassum()).unwrap();

        let out = read_grid::<CellCode, _>(&target).unwrap();
        assert_eq!(out.data, array![[0, -1], [0, 1]]);
        assert_eq!(out.nodata, Some(-1.0));
    }
}
