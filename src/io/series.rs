use crate::types::{AggError, AggResult, Observation};
use chrono::NaiveDate;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Raster file extensions considered when scanning a source directory
const RASTER_EXTENSIONS: [&str; 2] = ["tif", "vrt"];

/// An ordered, duplicate-free sequence of dated classified rasters.
///
/// Built once per analysis run from a directory listing; immutable after
/// construction. Holds paths, not pixel data; rasters are streamed off
/// disk one at a time by the consumers.
#[derive(Debug, Clone)]
pub struct ObservationSeries {
    observations: Vec<Observation>,
}

impl ObservationSeries {
    /// Scan a directory for single-band classified rasters with an 8-digit
    /// date token (YYYYMMDD) in the file name.
    ///
    /// Files without a parseable token are skipped with a warning; two
    /// files carrying the same date are a configuration error.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> AggResult<Self> {
        let dir = dir.as_ref();
        log::info!("Scanning for classified rasters in: {}", dir.display());

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_raster = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| RASTER_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false);
            if is_raster {
                paths.push(path);
            }
        }

        Self::from_paths(paths)
    }

    /// Build a series from an explicit list of raster paths
    pub fn from_paths(paths: Vec<PathBuf>) -> AggResult<Self> {
        let token_re = Regex::new(r"(\d{8})").map_err(|e| AggError::Config(e.to_string()))?;

        let mut observations = Vec::new();
        for path in paths {
            let stem = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem,
                None => continue,
            };
            let token = match token_re.find(stem) {
                Some(m) => m.as_str().to_string(),
                None => {
                    log::warn!("No date token in file name, skipping: {}", path.display());
                    continue;
                }
            };
            let date = match NaiveDate::parse_from_str(&token, "%Y%m%d") {
                Ok(date) => date,
                Err(_) => {
                    log::warn!(
                        "Token {} is not a calendar date, skipping: {}",
                        token,
                        path.display()
                    );
                    continue;
                }
            };
            observations.push(Observation { date, token, path });
        }

        observations.sort_by_key(|obs| obs.date);

        for pair in observations.windows(2) {
            if pair[0].date == pair[1].date {
                return Err(AggError::Config(format!(
                    "duplicate observation date {}: {} and {}",
                    pair[0].token,
                    pair[0].path.display(),
                    pair[1].path.display()
                )));
            }
        }

        log::info!("Found {} dated observations", observations.len());
        Ok(Self { observations })
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Resolve an inclusive date range against the series by exact token
    /// match. A boundary token with no matching observation is an error,
    /// never silently clamped to the nearest available date.
    pub fn subset(&self, start_token: &str, end_token: &str) -> AggResult<&[Observation]> {
        let start = self
            .observations
            .iter()
            .position(|obs| obs.token == start_token)
            .ok_or_else(|| {
                AggError::DateRange(format!(
                    "start date {} not found among {} observations",
                    start_token,
                    self.observations.len()
                ))
            })?;
        let end = self
            .observations
            .iter()
            .position(|obs| obs.token == end_token)
            .ok_or_else(|| {
                AggError::DateRange(format!(
                    "end date {} not found among {} observations",
                    end_token,
                    self.observations.len()
                ))
            })?;

        if end < start {
            return Err(AggError::DateRange(format!(
                "end date {} precedes start date {}",
                end_token, start_token
            )));
        }

        let slice = &self.observations[start..=end];
        log::debug!(
            "Date range {}..{} resolved to {} observations",
            start_token,
            end_token,
            slice.len()
        );
        Ok(slice)
    }

    /// Replace every observation's path, keeping dates and order. Used
    /// when preprocessing writes derived copies keyed by the same dates.
    pub fn with_paths(&self, paths: Vec<PathBuf>) -> AggResult<Self> {
        if paths.len() != self.observations.len() {
            return Err(AggError::Processing(format!(
                "path count {} does not match series length {}",
                paths.len(),
                self.observations.len()
            )));
        }
        let observations = self
            .observations
            .iter()
            .zip(paths)
            .map(|(obs, path)| Observation {
                date: obs.date,
                token: obs.token.clone(),
                path,
            })
            .collect();
        Ok(Self { observations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series_from_names(names: &[&str]) -> AggResult<ObservationSeries> {
        ObservationSeries::from_paths(names.iter().map(PathBuf::from).collect())
    }

    #[test]
    fn test_series_sorted_by_date() {
        let series = series_from_names(&[
            "s2qr_20190315_sargassum.tif",
            "s2qr_20160427_sargassum.tif",
            "s2qr_20171201_sargassum.tif",
        ])
        .unwrap();

        let tokens: Vec<&str> = series
            .observations()
            .iter()
            .map(|o| o.token.as_str())
            .collect();
        assert_eq!(tokens, ["20160427", "20171201", "20190315"]);
    }

    #[test]
    fn test_files_without_token_skipped() {
        let series = series_from_names(&[
            "s2qr_20160427_sargassum.tif",
            "segments_buffered.tif",
        ])
        .unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_duplicate_date_is_config_error() {
        let err = series_from_names(&[
            "a_20160427_mosaic.tif",
            "b_20160427_mosaic.tif",
        ])
        .unwrap_err();
        assert!(matches!(err, AggError::Config(_)));
    }

    #[test]
    fn test_subset_inclusive_bounds() {
        let series = series_from_names(&[
            "x_20160427.tif",
            "x_20170112.tif",
            "x_20180112.tif",
            "x_20191228.tif",
        ])
        .unwrap();

        let subset = series.subset("20170112", "20180112").unwrap();
        assert_eq!(subset.len(), 2);
        assert_eq!(subset[0].token, "20170112");
        assert_eq!(subset[1].token, "20180112");
    }

    #[test]
    fn test_subset_missing_start_is_date_range_error() {
        // An absent boundary token must fail, not clamp to a neighbor
        let series = series_from_names(&["x_20160427.tif", "x_20191228.tif"]).unwrap();
        let err = series.subset("20160101", "20191228").unwrap_err();
        assert!(matches!(err, AggError::DateRange(_)));
    }

    #[test]
    fn test_subset_reversed_range_rejected() {
        let series = series_from_names(&["x_20160427.tif", "x_20191228.tif"]).unwrap();
        let err = series.subset("20191228", "20160427").unwrap_err();
        assert!(matches!(err, AggError::DateRange(_)));
    }

    #[test]
    fn test_invalid_calendar_token_skipped() {
        let series = series_from_names(&["x_20161341.tif", "x_20160427.tif"]).unwrap();
        assert_eq!(series.len(), 1);
    }
}
