//! Shared fixtures for integration tests.

#![allow(dead_code)]

use job_success_predictor::types::record::{FeatureRecord, LabeledRow};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const JOB_TYPES: [&str; 3] = ["Electrical", "HVAC", "Plumbing"];
pub const PRIORITIES: [&str; 3] = ["High", "Low", "Medium"];

/// Labeled rows where success favours skilled, experienced engineers close to the site.
pub fn synthetic_rows(n: usize, seed: u64) -> Vec<LabeledRow> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let features = FeatureRecord {
                job_type: JOB_TYPES[rng.gen_range(0..JOB_TYPES.len())].to_string(),
                job_priority: PRIORITIES[rng.gen_range(0..PRIORITIES.len())].to_string(),
                engineer_skill_level: rng.gen_range(1..=5),
                engineer_experience_years: rng.gen_range(0..=20),
                distance_km: (rng.gen_range(0.0..50.0_f64) * 10.0).round() / 10.0,
            };
            let score = features.engineer_skill_level as f64 * 0.8
                + features.engineer_experience_years as f64 * 0.1
                - features.distance_km * 0.06
                + rng.gen_range(-1.0..1.0);
            LabeledRow::new(features, score > 2.0)
        })
        .collect()
}

pub fn to_csv(rows: &[LabeledRow]) -> String {
    let mut out = String::from(
        "job_type,job_priority,engineer_skill_level,engineer_experience_years,distance_km,success\n",
    );
    for row in rows {
        let f = &row.features;
        let _ = writeln!(
            out,
            "{},{},{},{},{},{}",
            f.job_type,
            f.job_priority,
            f.engineer_skill_level,
            f.engineer_experience_years,
            f.distance_km,
            u8::from(row.success)
        );
    }
    out
}

/// Write a synthetic dataset into `dir` and return its path.
pub fn write_dataset(dir: &Path, n: usize, seed: u64) -> PathBuf {
    let path = dir.join("jobs.csv");
    std::fs::write(&path, to_csv(&synthetic_rows(n, seed))).unwrap();
    path
}

pub fn sample_request() -> FeatureRecord {
    FeatureRecord {
        job_type: "Plumbing".to_string(),
        job_priority: "High".to_string(),
        engineer_skill_level: 3,
        engineer_experience_years: 5,
        distance_km: 15.5,
    }
}
