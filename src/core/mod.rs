//! Core aggregation stages

pub mod align;
pub mod persistence;
pub mod reclassify;
pub mod reduce;
pub mod threshold;
pub mod zonal;

// Re-export main types and functions
pub use align::align_rasters;
pub use persistence::{persistence_pct, PERSISTENCE_NODATA};
pub use reclassify::{reclassify_array, reclassify_raster, EXCLUDED_CODE};
pub use reduce::{reduce_series, CountAccumulator, StateCounts, COUNT_NODATA};
pub use threshold::{threshold_occurrence, OCCURRENCE_NODATA};
pub use zonal::{zonal_statistics, ZonalStatistic, ALL_STATISTICS};
