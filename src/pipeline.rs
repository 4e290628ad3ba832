//! Job orchestration: preprocessing a source directory into a canonical
//! series, then running independent date-range metrics jobs over it.
//!
//! Every entry point takes explicit paths and parameters; nothing depends
//! on the process working directory. Jobs are independently reproducible,
//! so a failed job is reported and its siblings continue.

use crate::config::ReclassConfig;
use crate::core::{
    align_rasters, persistence_pct, reclassify_raster, reduce_series, threshold_occurrence,
    zonal_statistics, ALL_STATISTICS,
};
use crate::io::raster::write_grid;
use crate::io::series::ObservationSeries;
use crate::io::zones::{read_zones, write_area_stats, write_persistence_stats};
use crate::types::{AggError, AggResult, CellCode};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

/// Minimum detection count used by the shoreline area workflow
pub const DEFAULT_THRESHOLD: CellCode = 4;

/// Where the zone polygons live and how features are identified
#[derive(Debug, Clone)]
pub struct ZoneSource {
    /// Vector store holding the zone layer; statistics layers are
    /// appended to this same store
    pub store: PathBuf,
    pub layer: String,
    pub id_field: String,
}

/// One independent metrics job over a prepared observation series
#[derive(Debug, Clone)]
pub struct MetricsJob {
    /// Inclusive range boundaries, 8-digit date tokens
    pub start_token: String,
    pub end_token: String,
    /// Range tag carried into output layers (e.g. a year or season)
    pub label: String,
    pub out_dir: PathBuf,
    /// File-name prefix for output rasters and layers
    pub prefix: String,
    /// Occurrence threshold: cells need more than this many detections
    pub threshold: CellCode,
    /// Zonal rollups are skipped when no zone source is given
    pub zones: Option<ZoneSource>,
}

impl MetricsJob {
    pub fn new(
        start_token: impl Into<String>,
        end_token: impl Into<String>,
        label: impl Into<String>,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            start_token: start_token.into(),
            end_token: end_token.into(),
            label: label.into(),
            out_dir: out_dir.into(),
            prefix: "s2qr".to_string(),
            threshold: DEFAULT_THRESHOLD,
            zones: None,
        }
    }
}

/// Output artifacts of one completed job
#[derive(Debug, Clone)]
pub struct JobOutputs {
    pub presence_count_path: PathBuf,
    pub invalid_count_path: PathBuf,
    pub persistence_path: PathBuf,
    pub occurrence_path: PathBuf,
    pub persistence_layer: Option<String>,
    pub area_layer: Option<String>,
}

/// Outcome of one job in a batch; failures carry the error alongside the
/// job so the caller can re-run exactly what failed
#[derive(Debug)]
pub struct JobReport {
    pub job: MetricsJob,
    pub outcome: AggResult<JobOutputs>,
}

/// Align and reclassify every raster in a source directory, producing a
/// canonical observation series ready for reduction.
///
/// Alignment copies land in `<scratch>/aligned`, canonical rasters in
/// `<scratch>/reclassified`; source rasters are never modified.
pub fn prepare_series(
    source_dir: &Path,
    scratch_dir: &Path,
    config: &ReclassConfig,
) -> AggResult<ObservationSeries> {
    let start = Instant::now();
    let series = ObservationSeries::from_dir(source_dir)?;
    if series.is_empty() {
        return Err(AggError::Config(format!(
            "no dated rasters found in {}",
            source_dir.display()
        )));
    }

    let paths: Vec<PathBuf> = series
        .observations()
        .iter()
        .map(|obs| obs.path.clone())
        .collect();
    let aligned = align_rasters(&paths, &scratch_dir.join("aligned"))?;

    let reclass_dir = scratch_dir.join("reclassified");
    std::fs::create_dir_all(&reclass_dir)?;

    let canonical = aligned
        .par_iter()
        .map(|path| {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("raster");
            let target = reclass_dir.join(format!("{}_reclass.tif", stem));
            reclassify_raster(path, &target, config)?;
            Ok(target)
        })
        .collect::<AggResult<Vec<_>>>()?;

    let prepared = series.with_paths(canonical)?;
    log::info!(
        "Prepared {} observations in {:.2}s",
        prepared.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(prepared)
}

/// Run a single metrics job. Writes the count, persistence, and
/// occurrence rasters for the job's date range, then the zonal
/// statistics layers when a zone source is configured.
pub fn run_metrics(job: &MetricsJob, series: &ObservationSeries) -> AggResult<JobOutputs> {
    let store_lock = Mutex::new(());
    execute_job(job, series, &store_lock)
}

/// Run a batch of independent jobs over one series on a fixed-size
/// worker pool. Jobs fail soft: each failure is logged and reported
/// without aborting the rest of the batch.
pub fn run_jobs(
    jobs: Vec<MetricsJob>,
    series: &ObservationSeries,
    workers: usize,
) -> AggResult<Vec<JobReport>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| AggError::Config(format!("failed to build worker pool: {}", e)))?;

    log::info!("Running {} jobs on {} workers", jobs.len(), workers);
    // Writes into the shared statistics store must not interleave
    let store_lock = Mutex::new(());

    let reports = pool.install(|| {
        jobs.into_par_iter()
            .map(|job| {
                let outcome = execute_job(&job, series, &store_lock);
                if let Err(err) = &outcome {
                    log::error!(
                        "Job {} ({}..{}) failed: {}",
                        job.label,
                        job.start_token,
                        job.end_token,
                        err
                    );
                }
                JobReport { job, outcome }
            })
            .collect()
    });

    Ok(reports)
}

fn execute_job(
    job: &MetricsJob,
    series: &ObservationSeries,
    store_lock: &Mutex<()>,
) -> AggResult<JobOutputs> {
    let start = Instant::now();
    let subset = series.subset(&job.start_token, &job.end_token)?;
    let range = format!("{}_{}", job.start_token, job.end_token);

    let counts = reduce_series(subset)?;
    let pct = persistence_pct(&counts)?;
    let occurrence = threshold_occurrence(&counts.presence_count, job.threshold);

    std::fs::create_dir_all(&job.out_dir)?;
    let presence_count_path = job
        .out_dir
        .join(format!("{}_presentcnt_{}.tif", job.prefix, range));
    let invalid_count_path = job
        .out_dir
        .join(format!("{}_invalidcnt_{}.tif", job.prefix, range));
    let persistence_path = job
        .out_dir
        .join(format!("{}_persistpct_{}.tif", job.prefix, range));
    let occurrence_path = job.out_dir.join(format!(
        "{}_presentcnt_gt{}_{}.tif",
        job.prefix, job.threshold, range
    ));

    write_grid(&counts.presence_count, &presence_count_path)?;
    write_grid(&counts.invalid_count, &invalid_count_path)?;
    write_grid(&pct, &persistence_path)?;
    write_grid(&occurrence, &occurrence_path)?;

    let mut outputs = JobOutputs {
        presence_count_path,
        invalid_count_path,
        persistence_path,
        occurrence_path,
        persistence_layer: None,
        area_layer: None,
    };

    if let Some(zone_source) = &job.zones {
        let zone_set = read_zones(&zone_source.store, &zone_source.layer, &zone_source.id_field)?;

        let persistence_stats = zonal_statistics(&pct, &zone_set.zones, &ALL_STATISTICS)?;
        let area_stats = zonal_statistics(&occurrence, &zone_set.zones, &[])?;
        let pixel_area = counts.presence_count.transform.pixel_area();

        let persistence_layer = format!("{}_persistence_{}", job.prefix, range);
        let area_layer = format!("{}_area_{}", job.prefix, range);

        let _guard = store_lock
            .lock()
            .map_err(|_| AggError::Processing("statistics store lock poisoned".to_string()))?;
        write_persistence_stats(
            &zone_source.store,
            &persistence_layer,
            &zone_source.id_field,
            &job.label,
            &zone_set.zones,
            &persistence_stats,
            zone_set.srs_wkt.as_deref(),
        )?;
        write_area_stats(
            &zone_source.store,
            &area_layer,
            &zone_source.id_field,
            &job.label,
            &zone_set.zones,
            &area_stats,
            pixel_area,
            zone_set.srs_wkt.as_deref(),
        )?;

        outputs.persistence_layer = Some(persistence_layer);
        outputs.area_layer = Some(area_layer);
    }

    log::info!(
        "Job {} ({}) finished in {:.2}s",
        job.label,
        range,
        start.elapsed().as_secs_f64()
    );
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_defaults() {
        let job = MetricsJob::new("20170112", "20171228", "2017", "/tmp/out");
        assert_eq!(job.threshold, DEFAULT_THRESHOLD);
        assert_eq!(job.prefix, "s2qr");
        assert!(job.zones.is_none());
    }
}
