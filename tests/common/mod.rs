//! Shared fixtures for pipeline integration tests
//!
//! Synthetic flight-pattern tables written to a temp directory. Values are
//! derived arithmetically from the row index so every run sees the same data.

#![allow(dead_code)]

use spyplane_classifier::Config;
use std::fmt::Write as _;
use std::path::PathBuf;
use tempfile::TempDir;

pub const TYPES: [&str; 7] = ["C172", "PA28", "C208", "B350", "GLF4", "SR22", "BE20"];

/// Input files in a temp directory that lives as long as the fixture
pub struct Fixture {
    pub dir: TempDir,
    pub features_path: PathBuf,
    pub labels_path: PathBuf,
    pub output_path: PathBuf,
}

impl Fixture {
    /// Config pointing at this fixture's files
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.input.features_path = self.features_path.clone();
        config.input.labels_path = self.labels_path.clone();
        config.scoring.output_path = self.output_path.clone();
        config
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Transponder code of row `i`
pub fn key(i: usize) -> String {
    format!("{:06X}", 0xA0_0000 + i)
}

fn noise(i: usize, salt: usize) -> f64 {
    ((i * salt) % 101) as f64 / 100.0
}

/// Ground truth of the synthetic data (about one row in six)
pub fn is_surveillance(i: usize) -> bool {
    (i * 7919) % 97 < 16
}

/// CSV text of `n` feature rows
///
/// Surveillance rows fly slower and turn more; the ranges overlap so no
/// feature separates the classes perfectly.
pub fn features_csv(n: usize) -> String {
    let mut out = String::from("adshex,duration1,speed1,steer1,altitude1,type\n");
    for i in 0..n {
        let surveillance = is_surveillance(i);
        let (speed, steer, altitude) = if surveillance {
            (90.0 + noise(i, 13) * 60.0, 0.3 + noise(i, 17) * 0.3, 6.0 + noise(i, 19) * 2.0)
        } else {
            (120.0 + noise(i, 13) * 200.0, 0.05 + noise(i, 17) * 0.35, 3.0 + noise(i, 19) * 30.0)
        };
        let aircraft = if surveillance {
            TYPES[2 + i % 2]
        } else {
            TYPES[(i * 13) % TYPES.len()]
        };
        let duration = 0.5 + noise(i, 37) * 2.5;
        let _ = writeln!(
            out,
            "{},{:.3},{:.2},{:.4},{:.3},{}",
            key(i),
            duration,
            speed,
            steer,
            altitude,
            aircraft
        );
    }
    out
}

/// CSV text labeling the given rows from the ground truth
pub fn labels_csv(rows: impl IntoIterator<Item = usize>) -> String {
    let mut out = String::from("adshex,class\n");
    for i in rows {
        let class = if is_surveillance(i) { "surveillance" } else { "other" };
        let _ = writeln!(out, "{},{}", key(i), class);
    }
    out
}

/// Write the given table texts into a fresh temp directory
pub fn write_fixture(features: &str, labels: &str) -> Fixture {
    let dir = tempfile::tempdir().expect("create temp dir");
    let features_path = dir.path().join("planes_features.csv");
    let labels_path = dir.path().join("train.csv");
    let output_path = dir.path().join("candidates.csv");

    std::fs::write(&features_path, features).expect("write features");
    std::fs::write(&labels_path, labels).expect("write labels");

    Fixture {
        dir,
        features_path,
        labels_path,
        output_path,
    }
}

/// `n` feature rows with every `stride`-th row labeled, `n_labeled` in total
pub fn strided_fixture(n: usize, stride: usize, n_labeled: usize) -> Fixture {
    assert!(stride * (n_labeled - 1) < n, "not enough rows for {n_labeled} labels");
    write_fixture(
        &features_csv(n),
        &labels_csv((0..n_labeled).map(|j| j * stride)),
    )
}

/// Parse a written score file into (key, prediction, probability)
pub fn read_scores(path: &std::path::Path) -> Vec<(String, usize, f64)> {
    let mut reader = csv::Reader::from_path(path).expect("open scores");
    reader
        .records()
        .map(|record| {
            let record = record.expect("score record");
            (
                record[0].to_string(),
                record[1].parse().expect("prediction"),
                record[2].parse().expect("probability"),
            )
        })
        .collect()
}
