//! Sargasso: a temporal aggregation engine for classified coastal
//! remote-sensing rasters.
//!
//! Ingests an ordered series of same-grid, categorically coded rasters
//! (one per observation date) and produces per-pixel presence counts,
//! invalid-observation counts, and persistence percentages over arbitrary
//! date ranges, plus zonal rollups against a fixed polygon partition.

pub mod config;
pub mod core;
pub mod io;
pub mod pipeline;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    AggError, AggResult, BoundingBox, CellCode, GeoTransform, Observation, PixelState,
    RasterGrid, ZoneStats,
};

pub use config::{PremaskedPolicy, ReclassConfig};
pub use self::core::{
    align_rasters, persistence_pct, reclassify_raster, reduce_series, threshold_occurrence,
    zonal_statistics, StateCounts, ZonalStatistic,
};
pub use io::{ObservationSeries, Zone, ZoneSet};
pub use pipeline::{
    prepare_series, run_jobs, run_metrics, JobOutputs, JobReport, MetricsJob, ZoneSource,
};
