use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Integer cell type for categorical and count rasters
pub type CellCode = i16;

/// 2D categorical/count raster data (rows x cols)
pub type CodeArray = Array2<CellCode>;

/// 2D floating-point raster data (rows x cols), e.g. persistence percent
pub type PctArray = Array2<f32>;

/// Canonical per-pixel observation state after reclassification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelState {
    /// Feature detected in this observation
    Present,
    /// Observed, feature not present
    Absent,
    /// Unobserved (cloud, off-swath, otherwise unusable)
    Invalid,
}

impl PixelState {
    /// Canonical integer code written to reclassified rasters
    pub fn code(self) -> CellCode {
        match self {
            PixelState::Present => 1,
            PixelState::Absent => 0,
            PixelState::Invalid => -1,
        }
    }

    /// Decode a canonical cell value
    pub fn from_code(code: CellCode) -> Option<Self> {
        match code {
            1 => Some(PixelState::Present),
            0 => Some(PixelState::Absent),
            -1 => Some(PixelState::Invalid),
            _ => None,
        }
    }
}

impl std::fmt::Display for PixelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelState::Present => write!(f, "present"),
            PixelState::Absent => write!(f, "absent"),
            PixelState::Invalid => write!(f, "invalid"),
        }
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: &[f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// True when the transform has no rotation terms
    pub fn is_north_up(&self) -> bool {
        self.rotation_x == 0.0 && self.rotation_y == 0.0
    }

    /// Map pixel indices (col, row) to the coordinates of the cell's center
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        let x = self.top_left_x + (col as f64 + 0.5) * self.pixel_width;
        let y = self.top_left_y + (row as f64 + 0.5) * self.pixel_height;
        (x, y)
    }

    /// Extent of a grid with the given dimensions under this transform
    pub fn extent(&self, width: usize, height: usize) -> BoundingBox {
        let x0 = self.top_left_x;
        let x1 = self.top_left_x + width as f64 * self.pixel_width;
        let y0 = self.top_left_y;
        let y1 = self.top_left_y + height as f64 * self.pixel_height;
        BoundingBox {
            min_x: x0.min(x1),
            max_x: x0.max(x1),
            min_y: y0.min(y1),
            max_y: y0.max(y1),
        }
    }

    /// Ground area covered by one cell, in square map units
    pub fn pixel_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs()
    }

    /// Float-tolerant equality, the shared grid-identity test
    pub fn approx_eq(&self, other: &GeoTransform) -> bool {
        const EPS: f64 = 1e-6;
        (self.top_left_x - other.top_left_x).abs() < EPS
            && (self.top_left_y - other.top_left_y).abs() < EPS
            && (self.pixel_width - other.pixel_width).abs() < EPS
            && (self.pixel_height - other.pixel_height).abs() < EPS
            && (self.rotation_x - other.rotation_x).abs() < EPS
            && (self.rotation_y - other.rotation_y).abs() < EPS
    }
}

/// Projected bounding box in map units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Intersection of two extents, or None when they do not overlap
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let min_x = self.min_x.max(other.min_x);
        let max_x = self.max_x.min(other.max_x);
        let min_y = self.min_y.max(other.min_y);
        let max_y = self.max_y.min(other.max_y);
        if min_x < max_x && min_y < max_y {
            Some(BoundingBox {
                min_x,
                max_x,
                min_y,
                max_y,
            })
        } else {
            None
        }
    }
}

/// One single-band raster held in memory with its spatial reference
#[derive(Debug, Clone)]
pub struct RasterGrid<T> {
    pub data: Array2<T>,
    pub transform: GeoTransform,
    pub projection: String,
    pub nodata: Option<f64>,
}

impl<T> RasterGrid<T> {
    /// (rows, cols) of the underlying array
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    /// Alignment predicate: identical geotransform and dimensions.
    ///
    /// Pixel-wise combination of two grids is only legal when this holds;
    /// callers check it explicitly rather than assuming it downstream.
    pub fn same_grid<U>(&self, other: &RasterGrid<U>) -> bool {
        self.shape() == other.shape() && self.transform.approx_eq(&other.transform)
    }
}

/// One dated observation in a series: the date, its 8-digit token as it
/// appears in the file name, and the raster path
#[derive(Debug, Clone)]
pub struct Observation {
    pub date: NaiveDate,
    pub token: String,
    pub path: PathBuf,
}

/// Summary statistics for one zone of the polygon partition.
///
/// A zone with no contributing pixels is a valid result: `count` is zero
/// and the summary statistics are absent, distinct from a failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneStats {
    pub zone_id: String,
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
}

/// Error types for aggregation processing
#[derive(Debug, thiserror::Error)]
pub enum AggError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Alignment error: {0}")]
    Alignment(String),

    #[error("Unmapped raster value {code} in {path}")]
    UnmappedValue { path: PathBuf, code: CellCode },

    #[error("Date range error: {0}")]
    DateRange(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for aggregation operations
pub type AggResult<T> = Result<T, AggError>;
