//! I/O modules for rasters, dated observation series, and zone layers

pub mod raster;
pub mod series;
pub mod zones;

pub use raster::{read_grid, read_info, write_grid, RasterInfo};
pub use series::ObservationSeries;
pub use zones::{read_zones, write_area_stats, write_persistence_stats, Zone, ZoneSet};
