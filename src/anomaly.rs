//! Per-commit anomaly scoring: z-scores of file/line churn against a
//! bounded same-author history window, plus an off-hours heuristic.

use crate::graph::{AnomalyResult, HistoryPoint};

const DEFAULT_WINDOW: usize = 200;
const OFF_HOURS_FRACTION_THRESHOLD: f64 = 0.95;
const SPIKE_Z_THRESHOLD: f64 = 3.0;

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

fn z_score(value: f64, mean: f64, std: f64) -> f64 {
    if std == 0.0 {
        0.0
    } else {
        (value - mean) / std
    }
}

/// Circular distance between two hours of day, in `[0, 12]`.
fn hour_distance(a: u32, b: u32) -> u32 {
    let diff = (a as i32 - b as i32).unsigned_abs();
    diff.min(24 - diff)
}

/// Scores `(files_changed, lines_changed, hour)` for the current commit
/// against `history`, the up-to-`window` strictly-earlier same-author
/// commits on the same branch (already filtered and ordered by the caller
/// via `GraphStore::anomaly_window`).
pub fn score_commit(
    files_changed: u32,
    lines_changed: u64,
    hour: u32,
    history: &[HistoryPoint],
    window: Option<usize>,
) -> AnomalyResult {
    let window = window.unwrap_or(DEFAULT_WINDOW);
    let history = if history.len() > window {
        &history[..window]
    } else {
        history
    };

    if history.is_empty() {
        return AnomalyResult::default();
    }

    let files: Vec<f64> = history.iter().map(|h| h.files_changed as f64).collect();
    let lines: Vec<f64> = history.iter().map(|h| h.lines_changed as f64).collect();

    let (mu_f, sigma_f) = mean_std(&files);
    let (mu_l, sigma_l) = mean_std(&lines);

    let z_files = z_score(files_changed as f64, mu_f, sigma_f);
    let z_lines = z_score(lines_changed as f64, mu_l, sigma_l);

    let within_hour_window = history
        .iter()
        .filter(|h| hour_distance(h.hour, hour) <= 1)
        .count();
    let off_hours_fraction = 1.0 - (within_hour_window as f64 / history.len() as f64);
    let off_hours = off_hours_fraction > OFF_HOURS_FRACTION_THRESHOLD;

    let anomaly_score = (z_files.abs() + 0.5 * z_lines.abs() + if off_hours { 2.0 } else { 0.0 })
        .min(10.0);

    let mut flags = Vec::new();
    if z_files >= SPIKE_Z_THRESHOLD {
        flags.push("files_spike".to_string());
    }
    if z_lines >= SPIKE_Z_THRESHOLD {
        flags.push("lines_spike".to_string());
    }
    if off_hours {
        flags.push("off_hours".to_string());
    }

    AnomalyResult {
        z_files,
        z_lines,
        off_hours,
        anomaly_score,
        flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(files: u32, lines: u64, hour: u32) -> HistoryPoint {
        HistoryPoint {
            files_changed: files,
            lines_changed: lines,
            hour,
        }
    }

    #[test]
    fn empty_history_yields_zero_score() {
        let result = score_commit(5, 100, 14, &[], None);
        assert_eq!(result.anomaly_score, 0.0);
        assert!(result.flags.is_empty());
    }

    #[test]
    fn zero_variance_history_yields_zero_z() {
        let history: Vec<HistoryPoint> = (0..10).map(|_| point(2, 50, 14)).collect();
        let result = score_commit(2, 50, 14, &history, None);
        assert_eq!(result.z_files, 0.0);
        assert_eq!(result.z_lines, 0.0);
    }

    #[test]
    fn large_spike_sets_flags_and_caps_score() {
        let history: Vec<HistoryPoint> = (0..50).map(|_| point(2, 50, 14)).collect();
        let result = score_commit(500, 50_000, 14, &history, None);
        assert!(result.z_files >= 3.0);
        assert!(result.flags.contains(&"files_spike".to_string()));
        assert!(result.anomaly_score <= 10.0);
    }

    #[test]
    fn off_hours_detected_when_history_clusters_elsewhere() {
        let history: Vec<HistoryPoint> = (0..20).map(|_| point(2, 50, 9)).collect();
        let result = score_commit(2, 50, 3, &history, None);
        assert!(result.off_hours);
        assert!(result.flags.contains(&"off_hours".to_string()));
    }

    #[test]
    fn window_truncates_history_to_k() {
        let mut history: Vec<HistoryPoint> = (0..300).map(|_| point(2, 50, 14)).collect();
        history.push(point(2, 50, 14));
        let result = score_commit(2, 50, 14, &history, Some(200));
        assert_eq!(result.z_files, 0.0);
    }

    #[test]
    fn score_is_finite_and_bounded_for_random_inputs() {
        use rand::RngExt;
        let mut rng = rand::rng();
        for _ in 0..200 {
            let history: Vec<HistoryPoint> = (0..rng.random_range(0..50))
                .map(|_| point(rng.random_range(0..20), rng.random_range(0..5000), rng.random_range(0..24)))
                .collect();
            let files = rng.random_range(0..50);
            let lines = rng.random_range(0..5000);
            let hour = rng.random_range(0..24);
            let result = score_commit(files, lines, hour, &history, None);
            assert!(result.anomaly_score.is_finite());
            assert!(result.anomaly_score >= 0.0 && result.anomaly_score <= 10.0);
        }
    }
}
