use crate::config::Config;
use crate::dataset::Dataset;
use crate::{bivariate, conjoint, multinomial};
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use std::path::Path;

/// Dataset generation engine.
///
/// Holds the configuration and a random number generator seeded once from it,
/// so the same configuration always produces the same dataset.
pub struct Engine {
    cfg: Config,
    rng: ChaCha12Rng,
}

impl Engine {
    pub fn new(cfg: Config) -> Self {
        let rng = ChaCha12Rng::seed_from_u64(cfg.seed());
        Self { cfg, rng }
    }

    /// Generate the dataset described by the configuration.
    pub fn generate(&mut self) -> Result<Dataset> {
        let dataset = match &self.cfg {
            Config::Conjoint(cfg) => conjoint::generate(cfg, &mut self.rng)
                .context("failed to generate conjoint dataset")?,
            Config::Multinomial(cfg) => multinomial::generate(cfg, &mut self.rng)
                .context("failed to generate multinomial dataset")?,
            Config::Bivariate(cfg) => bivariate::generate(cfg, &mut self.rng)
                .context("failed to generate bivariate dataset")?,
        };
        log::info!("generated {} records", dataset.len());
        Ok(dataset)
    }

    /// Generate the dataset and write it to a CSV file.
    pub fn generate_to_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let dataset = self.generate()?;
        dataset
            .write_csv(file)
            .with_context(|| format!("failed to write {file:?}"))?;
        log::info!("wrote {file:?}");
        Ok(())
    }
}
