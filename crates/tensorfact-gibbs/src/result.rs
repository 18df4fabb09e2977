//! Test-set prediction aggregation.
//!
//! Each held-out entry accumulates its posterior-mean prediction and a
//! running variance over the collected samples (Welford update). Metrics
//! come in two flavours: `*_1sample` from the latest draw alone and
//! `*_avg` from the running aggregate.

use std::io::Write;

use serde::{Deserialize, Serialize};

use tensorfact_core::Block;

use crate::model::Model;

/// One held-out observation and its accumulated predictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionEntry {
    pub coords: Vec<usize>,
    pub observed: f64,
    /// Prediction from the latest posterior sample.
    pub pred_1sample: f64,
    /// Running mean over all collected samples.
    pub pred_avg: f64,
    /// Welford M2 accumulator.
    var_m2: f64,
    pub num_samples: usize,
    /// Samples whose prediction exceeded the classification threshold.
    above_threshold: usize,
}

impl PredictionEntry {
    pub fn new(coords: Vec<usize>, observed: f64) -> Self {
        Self {
            coords,
            observed,
            pred_1sample: f64::NAN,
            pred_avg: f64::NAN,
            var_m2: 0.0,
            num_samples: 0,
            above_threshold: 0,
        }
    }

    /// Build a single-sample entry from a point prediction.
    pub fn from_point(coords: Vec<usize>, observed: f64, pred: f64) -> Self {
        let mut entry = Self::new(coords, observed);
        entry.record(pred, None);
        entry
    }

    /// Fold one posterior sample into the aggregate.
    fn record(&mut self, pred: f64, threshold: Option<f64>) {
        self.pred_1sample = pred;
        if self.num_samples == 0 {
            self.pred_avg = pred;
        } else {
            let delta = pred - self.pred_avg;
            self.pred_avg += delta / (self.num_samples + 1) as f64;
            self.var_m2 += delta * (pred - self.pred_avg);
        }
        self.num_samples += 1;
        if let Some(t) = threshold {
            if pred > t {
                self.above_threshold += 1;
            }
        }
    }

    /// Unbiased sample variance of the collected predictions.
    pub fn variance(&self) -> f64 {
        if self.num_samples < 2 {
            0.0
        } else {
            self.var_m2 / (self.num_samples - 1) as f64
        }
    }

    /// Posterior probability of exceeding the classification threshold.
    pub fn prob_above(&self) -> Option<f64> {
        if self.num_samples == 0 {
            None
        } else {
            Some(self.above_threshold as f64 / self.num_samples as f64)
        }
    }
}

/// Aggregated test-set state and metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predictions {
    dims: Vec<usize>,
    entries: Vec<PredictionEntry>,
    threshold: Option<f64>,
    sample_iter: usize,
    pub rmse_1sample: f64,
    pub rmse_avg: f64,
    pub auc_1sample: Option<f64>,
    pub auc_avg: Option<f64>,
}

impl Predictions {
    /// Snapshot the explicit entries of a test block.
    pub fn from_block(test: &Block, threshold: Option<f64>) -> Self {
        let entries = test
            .entries()
            .map(|(coords, value)| PredictionEntry::new(coords, value))
            .collect();
        Self {
            dims: test.dims().to_vec(),
            entries,
            threshold,
            sample_iter: 0,
            rmse_1sample: f64::NAN,
            rmse_avg: f64::NAN,
            auc_1sample: None,
            auc_avg: None,
        }
    }

    pub fn entries(&self) -> &[PredictionEntry] {
        &self.entries
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of collected posterior samples.
    pub fn num_samples(&self) -> usize {
        self.sample_iter
    }

    /// Fold the current model into the aggregate.
    ///
    /// During burn-in only the single-sample metrics are refreshed; after
    /// burn-in each call also grows the running averages by one sample.
    pub fn update(&mut self, model: &Model, burnin: bool) {
        if self.entries.is_empty() {
            return;
        }
        if burnin {
            let mut se = 0.0;
            for entry in &mut self.entries {
                entry.pred_1sample = model.predict(&entry.coords);
                let r = entry.observed - entry.pred_1sample;
                se += r * r;
            }
            self.rmse_1sample = (se / self.entries.len() as f64).sqrt();
            if let Some(t) = self.threshold {
                self.auc_1sample =
                    calc_auc(self.entries.iter().map(|e| (e.pred_1sample, e.observed > t)));
            }
            return;
        }

        let mut se_1sample = 0.0;
        let mut se_avg = 0.0;
        for entry in &mut self.entries {
            let pred = model.predict(&entry.coords);
            entry.record(pred, self.threshold);
            let r1 = entry.observed - entry.pred_1sample;
            se_1sample += r1 * r1;
            let ra = entry.observed - entry.pred_avg;
            se_avg += ra * ra;
        }
        self.sample_iter += 1;

        let n = self.entries.len() as f64;
        self.rmse_1sample = (se_1sample / n).sqrt();
        self.rmse_avg = (se_avg / n).sqrt();
        if let Some(t) = self.threshold {
            self.auc_1sample =
                calc_auc(self.entries.iter().map(|e| (e.pred_1sample, e.observed > t)));
            self.auc_avg = calc_auc(self.entries.iter().map(|e| (e.pred_avg, e.observed > t)));
        }
    }

    /// Write the per-entry aggregate as CSV.
    pub fn to_csv<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        write!(w, "coords,observed,pred_1sample,pred_avg,var")?;
        if self.threshold.is_some() {
            write!(w, ",prob_above")?;
        }
        writeln!(w)?;
        for entry in &self.entries {
            let coords = entry
                .coords
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join("-");
            write!(
                w,
                "{coords},{},{},{},{}",
                entry.observed,
                entry.pred_1sample,
                entry.pred_avg,
                entry.variance()
            )?;
            if self.threshold.is_some() {
                write!(w, ",{}", entry.prob_above().unwrap_or(f64::NAN))?;
            }
            writeln!(w)?;
        }
        Ok(())
    }
}

/// Rank-sum AUC over `(score, is_positive)` pairs.
///
/// Returns `None` when either class is empty. Tied scores share their
/// average rank.
pub fn calc_auc<I>(items: I) -> Option<f64>
where
    I: Iterator<Item = (f64, bool)>,
{
    let mut scored: Vec<(f64, bool)> = items.collect();
    let num_pos = scored.iter().filter(|(_, p)| *p).count();
    let num_neg = scored.len() - num_pos;
    if num_pos == 0 || num_neg == 0 {
        return None;
    }
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < scored.len() {
        let mut j = i;
        while j < scored.len() && scored[j].0 == scored[i].0 {
            j += 1;
        }
        // ranks are 1-based; ties share the mean rank of their run
        let mean_rank = (i + 1 + j) as f64 / 2.0;
        for item in &scored[i..j] {
            if item.1 {
                rank_sum += mean_rank;
            }
        }
        i = j;
    }

    let np = num_pos as f64;
    let nn = num_neg as f64;
    Some((rank_sum - np * (np + 1.0) / 2.0) / (np * nn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::array;

    #[test]
    fn welford_tracks_mean_and_variance() {
        let mut entry = PredictionEntry::new(vec![0, 0], 1.0);
        for &p in &[1.0, 2.0, 3.0, 4.0] {
            entry.record(p, None);
        }
        assert!((entry.pred_avg - 2.5).abs() < 1e-12);
        assert!((entry.variance() - 5.0 / 3.0).abs() < 1e-12);
        assert_eq!(entry.pred_1sample, 4.0);
        assert_eq!(entry.num_samples, 4);
    }

    #[test]
    fn burnin_updates_do_not_aggregate() {
        let test = Block::sparse(vec![vec![0, 0]], vec![1.0], vec![2, 2], true).unwrap();
        let mut pred = Predictions::from_block(&test, None);
        let model = Model::from_factors(1, vec![array![[1.0], [0.0]], array![[2.0], [0.0]]]);

        pred.update(&model, true);
        assert_eq!(pred.num_samples(), 0);
        assert!((pred.rmse_1sample - 1.0).abs() < 1e-12);
        assert!(pred.rmse_avg.is_nan());

        pred.update(&model, false);
        assert_eq!(pred.num_samples(), 1);
        assert!((pred.rmse_avg - 1.0).abs() < 1e-12);
    }

    #[test]
    fn auc_orders_scores() {
        // Perfect separation.
        let auc = calc_auc(
            [(0.1, false), (0.2, false), (0.8, true), (0.9, true)]
                .into_iter(),
        )
        .unwrap();
        assert_eq!(auc, 1.0);

        // Interleaved classes land on one half.
        let auc = calc_auc(
            [(0.1, false), (0.2, true), (0.8, true), (0.9, false)]
                .into_iter(),
        )
        .unwrap();
        assert!((auc - 0.5).abs() < 1e-12);

        // Single class gives no AUC.
        assert!(calc_auc([(0.5, true)].into_iter()).is_none());
    }

    #[test]
    fn ties_share_average_rank() {
        let auc = calc_auc(
            [(0.5, true), (0.5, false), (0.9, true)].into_iter(),
        )
        .unwrap();
        // Tied pair contributes 0.5 of one comparison: (1*1 + 0.5) / 2
        assert!((auc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn csv_has_header_and_rows() {
        let test = Block::sparse(
            vec![vec![0, 1], vec![1, 0]],
            vec![1.0, 0.0],
            vec![2, 2],
            true,
        )
        .unwrap();
        let mut pred = Predictions::from_block(&test, Some(0.5));
        let model = Model::from_factors(1, vec![array![[1.0], [0.5]], array![[1.0], [1.0]]]);
        pred.update(&model, false);

        let mut buf = Vec::new();
        pred.to_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("coords,observed"));
        assert!(lines[0].ends_with("prob_above"));
        assert!(lines[1].starts_with("0-1,1"));
    }
}
