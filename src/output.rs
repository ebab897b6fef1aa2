//! Flat-file run persistence
//!
//! Each run gets its own timestamped directory. The directory path is
//! returned to the caller; nothing records a process-wide "latest run".

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use csv::{ReaderBuilder, Writer};
use serde::Serialize;

use crate::ensemble::TrajectoryEnsemble;
use crate::{DecayError, Result};

pub const SERIES_FILE: &str = "series.csv";
pub const TRAJECTORIES_FILE: &str = "trajectories.csv";
pub const META_FILE: &str = "meta.json";
pub const FIT_FILE: &str = "fit.json";

/// Create `<root>/run_<UTC timestamp>`. A name already taken within the same
/// second gets a `-01`, `-02`, ... suffix.
pub fn create_run_dir(root: &Path) -> Result<PathBuf> {
    fs::create_dir_all(root)?;
    let stamp = Utc::now().format("run_%Y%m%d-%H%M%S").to_string();

    let mut attempt = 0_u32;
    loop {
        let run_dir = match attempt {
            0 => root.join(&stamp),
            n => root.join(format!("{stamp}-{n:02}")),
        };
        match fs::create_dir(&run_dir) {
            Ok(()) => return Ok(run_dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

fn check_column(context: &'static str, times: &[f64], values_len: usize) -> Result<()> {
    if times.len() != values_len {
        return Err(DecayError::LengthMismatch {
            context,
            expected: times.len(),
            got: values_len,
        });
    }
    Ok(())
}

/// Write `t` plus one column per named series.
pub fn write_series_csv(path: &Path, times: &[f64], columns: &[(&str, &[f64])]) -> Result<()> {
    for (_, values) in columns {
        check_column("series column", times, values.len())?;
    }

    let mut writer = Writer::from_path(path)?;
    let mut header = vec!["t".to_string()];
    header.extend(columns.iter().map(|(name, _)| name.to_string()));
    writer.write_record(&header)?;

    for (idx, &t) in times.iter().enumerate() {
        let mut record = Vec::with_capacity(columns.len() + 1);
        record.push(t.to_string());
        record.extend(columns.iter().map(|(_, values)| values[idx].to_string()));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write one row per realization: `realization, step_0, step_1, ...`.
pub fn write_ensemble_csv(path: &Path, ensemble: &TrajectoryEnsemble) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    let mut header = vec!["realization".to_string()];
    header.extend((0..ensemble.n_steps()).map(|k| format!("step_{k}")));
    writer.write_record(&header)?;

    for (r, row) in ensemble.rows().enumerate() {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(r.to_string());
        record.extend(row.iter().map(u64::to_string));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Time series recovered from a saved run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSeries {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
    /// Where `values` came from: a series column name or `trajectories`.
    pub source: String,
}

/// Load the count series of a run: the `mean` or `n` column of `series.csv`,
/// falling back to the per-step mean of `trajectories.csv`.
pub fn load_series(run_dir: &Path) -> Result<LoadedSeries> {
    let series_path = run_dir.join(SERIES_FILE);
    if !series_path.exists() {
        return Err(DecayError::InsufficientData(format!(
            "no {SERIES_FILE} in {}",
            run_dir.display()
        )));
    }

    let (headers, rows) = read_numeric_csv(&series_path)?;
    let column = |name: &str| headers.iter().position(|h| h == name);

    let t_idx = column("t").ok_or_else(|| {
        DecayError::InsufficientData(format!("{SERIES_FILE} has no 't' column"))
    })?;
    let times: Vec<f64> = rows.iter().map(|row| row[t_idx]).collect();

    for name in ["mean", "n"] {
        if let Some(idx) = column(name) {
            return Ok(LoadedSeries {
                values: rows.iter().map(|row| row[idx]).collect(),
                times,
                source: name.to_string(),
            });
        }
    }

    let traj_path = run_dir.join(TRAJECTORIES_FILE);
    if !traj_path.exists() {
        return Err(DecayError::InsufficientData(format!(
            "{} has neither a 'mean'/'n' column nor a {TRAJECTORIES_FILE}",
            run_dir.display()
        )));
    }

    let (_, traj_rows) = read_numeric_csv(&traj_path)?;
    let n_steps = traj_rows.first().map_or(0, |row| row.len().saturating_sub(1));
    check_column("trajectory steps", &times, n_steps)?;

    let mut values = vec![0.0; n_steps];
    for row in &traj_rows {
        if row.len() != n_steps + 1 {
            return Err(DecayError::LengthMismatch {
                context: "trajectory row",
                expected: n_steps + 1,
                got: row.len(),
            });
        }
        for (acc, v) in values.iter_mut().zip(&row[1..]) {
            *acc += v;
        }
    }
    let n = traj_rows.len().max(1) as f64;
    values.iter_mut().for_each(|v| *v /= n);

    Ok(LoadedSeries {
        times,
        values,
        source: "trajectories".to_string(),
    })
}

fn read_numeric_csv(path: &Path) -> Result<(Vec<String>, Vec<Vec<f64>>)> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = record
            .iter()
            .map(|field| {
                field.trim().parse::<f64>().map_err(|e| {
                    DecayError::InvalidConfig(format!(
                        "non-numeric value '{field}' in {}: {e}",
                        path.display()
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }

    Ok((headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    #[test]
    fn test_run_dirs_are_unique() {
        let root = tempdir().unwrap();
        let a = create_run_dir(root.path()).unwrap();
        let b = create_run_dir(root.path()).unwrap();
        assert_ne!(a, b);
        assert!(a.is_dir() && b.is_dir());
    }

    #[test]
    fn test_series_round_trip() {
        let dir = tempdir().unwrap();
        let times = [0.0, 0.5, 1.0];
        let mean = [100.0, 60.5, 36.25];
        write_series_csv(&dir.path().join(SERIES_FILE), &times, &[("mean", &mean[..])]).unwrap();

        let loaded = load_series(dir.path()).unwrap();
        assert_eq!(loaded.source, "mean");
        assert_eq!(loaded.times, times.to_vec());
        assert_eq!(loaded.values, mean.to_vec());
    }

    #[test]
    fn test_tail_values_survive_reload() {
        let dir = tempdir().unwrap();
        let times = [0.0, 100.0, 200.0];
        let n = [1_000.0, 3.7e-14, 1.2345678901234567e-41];
        write_series_csv(&dir.path().join(SERIES_FILE), &times, &[("n", &n[..])]).unwrap();

        let loaded = load_series(dir.path()).unwrap();
        assert_eq!(loaded.source, "n");
        assert_eq!(loaded.values, n.to_vec());
        assert!(loaded.values.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_falls_back_to_trajectories() {
        let dir = tempdir().unwrap();
        let times = [0.0, 1.0];
        let analytic = [10.0, 5.0];
        write_series_csv(&dir.path().join(SERIES_FILE), &times, &[("analytic", &analytic[..])])
            .unwrap();
        let ens = TrajectoryEnsemble::from_rows(vec![vec![10, 4], vec![10, 7]]).unwrap();
        write_ensemble_csv(&dir.path().join(TRAJECTORIES_FILE), &ens).unwrap();

        let loaded = load_series(dir.path()).unwrap();
        assert_eq!(loaded.source, "trajectories");
        assert_relative_eq!(loaded.values[1], 5.5);
    }

    #[test]
    fn test_mismatched_columns_rejected() {
        let dir = tempdir().unwrap();
        let err = write_series_csv(&dir.path().join("x.csv"), &[0.0, 1.0], &[("n", &[1.0][..])])
            .unwrap_err();
        assert!(matches!(err, DecayError::LengthMismatch { .. }));
    }

    #[test]
    fn test_missing_series_is_reported() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            load_series(dir.path()),
            Err(DecayError::InsufficientData(_))
        ));
    }
}
