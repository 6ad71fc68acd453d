//! Multinomial segment datasets.
//!
//! Each row samples its predictors, scores every outcome linearly and draws
//! the outcome from the softmax of the scores.

use crate::config::{CategoricalPredictor, ContinuousPredictor, MultinomialConfig};
use crate::dataset::{Dataset, Record};
use crate::model::Value;
use crate::stats::softmax;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_distr::{Normal, weighted::WeightedIndex};

/// Generate a multinomial segment dataset.
pub fn generate<R: Rng>(cfg: &MultinomialConfig, rng: &mut R) -> Result<Dataset> {
    let columns = [cfg.id_column.clone(), cfg.outcome_column.clone()]
        .into_iter()
        .chain(cfg.categorical.iter().map(|pred| pred.name.clone()))
        .chain(cfg.continuous.iter().map(|pred| pred.name.clone()));
    let mut dataset = Dataset::new(columns);

    let mut level_dists = Vec::with_capacity(cfg.categorical.len());
    for pred in &cfg.categorical {
        let dist = WeightedIndex::new(pred.levels.iter().map(|lvl| lvl.weight))
            .with_context(|| format!("invalid {:?} weights", pred.name))?;
        level_dists.push(dist);
    }
    let mut value_dists = Vec::with_capacity(cfg.continuous.len());
    for pred in &cfg.continuous {
        value_dists.push(Normal::new(pred.mean, pred.std_dev)?);
    }
    let mut noise_dists = Vec::with_capacity(cfg.outcomes.len());
    for out in &cfg.outcomes {
        noise_dists.push(Normal::new(out.base, out.std_dev)?);
    }

    let mut counts = vec![0_usize; cfg.outcomes.len()];
    for i_row in 0..cfg.n_rows {
        let i_lvls: Vec<_> = level_dists.iter().map(|dist| dist.sample(rng)).collect();

        let mut vals = Vec::with_capacity(cfg.continuous.len());
        for (pred, dist) in cfg.continuous.iter().zip(&value_dists) {
            let mut val = dist.sample(rng);
            if let Some(draw_min) = pred.draw_min {
                val = val.max(draw_min);
            }
            val += shift(pred, &cfg.categorical, &i_lvls);
            vals.push(match pred.min {
                Some(min) => val.max(min),
                None => val,
            });
        }

        let mut scores: Vec<_> = noise_dists.iter().map(|dist| dist.sample(rng)).collect();
        for (i_out, score) in scores.iter_mut().enumerate() {
            for (pred, &i_lvl) in cfg.categorical.iter().zip(&i_lvls) {
                *score += effect(&pred.levels[i_lvl].effects, i_out);
            }
            for (pred, &val) in cfg.continuous.iter().zip(&vals) {
                *score += effect(&pred.effects, i_out) * (val - pred.center);
            }
        }

        let out_dist = WeightedIndex::new(softmax(&scores)).context("invalid outcome scores")?;
        let i_out = out_dist.sample(rng);
        counts[i_out] += 1;

        let mut record = Record::new();
        let id = format!("{}{:0width$}", cfg.id_prefix, i_row + 1, width = cfg.id_width);
        record.insert(cfg.id_column.clone(), id.into());
        record.insert(
            cfg.outcome_column.clone(),
            cfg.outcomes[i_out].label.clone().into(),
        );
        for (pred, &i_lvl) in cfg.categorical.iter().zip(&i_lvls) {
            record.insert(pred.name.clone(), pred.levels[i_lvl].value.clone().into());
        }
        for (pred, &val) in cfg.continuous.iter().zip(&vals) {
            record.insert(pred.name.clone(), Value::Float(round(val, pred.decimals)));
        }
        dataset.push(record);
    }

    for (out, count) in cfg.outcomes.iter().zip(counts) {
        log::info!("outcome {:?} drawn {count} times", out.label);
    }

    Ok(dataset)
}

/// Sum of the shifts whose categorical level was drawn.
fn shift(
    pred: &ContinuousPredictor,
    categorical: &[CategoricalPredictor],
    i_lvls: &[usize],
) -> f64 {
    let is_drawn = |name: &str, level: &str| {
        categorical
            .iter()
            .zip(i_lvls)
            .any(|(cat, &i_lvl)| cat.name == name && cat.levels[i_lvl].value == level)
    };
    pred.shifts
        .iter()
        .filter(|shift| is_drawn(&shift.predictor, &shift.level))
        .map(|shift| shift.delta)
        .sum()
}

fn effect(effects: &[f64], i_out: usize) -> f64 {
    effects.get(i_out).copied().unwrap_or(0.0)
}

fn round(val: f64, decimals: usize) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (val * factor).round() / factor
}
