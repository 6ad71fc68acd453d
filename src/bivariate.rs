//! Bivariate input/output scenarios.
//!
//! Outputs follow a response curve of the input, perturbed until the linear
//! fit of every resource is visibly imperfect.

use crate::config::{BivariateConfig, Curve, Resource};
use crate::dataset::{Dataset, Record};
use crate::model::Value;
use crate::stats::r_squared;
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_distr::{Bernoulli, Uniform};

pub const RESOURCE_COLUMN: &str = "resource_id";
pub const INPUT_COLUMN: &str = "input";
pub const OUTPUT_COLUMN: &str = "output";

impl Curve {
    /// Noiseless output for input `x` at the given rate.
    pub fn eval(self, rate: f64, x: f64) -> f64 {
        match self {
            Curve::Linear => rate * x,
            Curve::Saturating => rate * 1.2 * x.powf(0.85),
            Curve::Sqrt => rate * x.sqrt() * 10.0,
            Curve::Log => rate * x.ln() * 30.0,
            Curve::WeakLog => rate * x.ln() * 15.0,
        }
    }
}

/// Generate a bivariate scenario dataset.
pub fn generate<R: Rng>(cfg: &BivariateConfig, rng: &mut R) -> Result<Dataset> {
    let mut dataset = Dataset::new([RESOURCE_COLUMN, INPUT_COLUMN, OUTPUT_COLUMN]);

    for res in &cfg.resources {
        let (outputs, r2) =
            perturb(cfg, res, rng).with_context(|| format!("failed to perturb {:?}", res.id))?;
        log::info!("{}: R² = {r2:.3}", res.id);

        for (&input, &output) in res.inputs.iter().zip(&outputs) {
            let mut record = Record::new();
            record.insert(RESOURCE_COLUMN.to_string(), res.id.clone().into());
            record.insert(INPUT_COLUMN.to_string(), Value::Int(input as i64));
            record.insert(OUTPUT_COLUMN.to_string(), Value::Int(output as i64));
            dataset.push(record);
        }
    }

    Ok(dataset)
}

/// Draw noisy outputs of a resource until their R² is below the maximum.
fn perturb<R: Rng>(
    cfg: &BivariateConfig,
    res: &Resource,
    rng: &mut R,
) -> Result<(Vec<f64>, f64)> {
    let base: Vec<_> = res
        .inputs
        .iter()
        .map(|&x| res.curve.eval(res.rate, x))
        .collect();

    let pct_dist = Uniform::new(0.6 * cfg.noise_factor, cfg.noise_factor)?;
    let shock_dist = Bernoulli::new(cfg.prob_shock)?;

    for _ in 0..cfg.max_attempts {
        let mut outputs = Vec::with_capacity(base.len());
        for (i_pt, &y) in base.iter().enumerate() {
            let pct = pct_dist.sample(rng);
            // Alternate under- and over-shooting to break the line.
            let rel_dist = if i_pt % 2 == 0 {
                Uniform::new(-pct, -0.3 * pct)?
            } else {
                Uniform::new(0.3 * pct, pct)?
            };
            let mut noise = y * rel_dist.sample(rng);
            if shock_dist.sample(rng) {
                noise *= cfg.shock_factor;
            }
            outputs.push((y + noise).max(cfg.floor));
        }

        let r2 = r_squared(&res.inputs, &outputs);
        if r2 < cfg.max_r2 {
            return Ok((outputs, r2));
        }
    }

    bail!(
        "R² stayed at or above {} after {} attempts",
        cfg.max_r2,
        cfg.max_attempts
    );
}
