use crate::analysis::Analyzer;
use crate::config::Config;
use crate::dataset;
use crate::engine::Engine;
use anyhow::{Context, Result};
use glob::glob;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Runs the commands of one scenario directory.
pub struct Manager {
    scenario_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(scenario_dir: P) -> Result<Self> {
        let scenario_dir = scenario_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(scenario_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { scenario_dir, cfg })
    }

    pub fn generate_dataset(&self) -> Result<()> {
        let mut engine = Engine::new(self.cfg.clone());
        engine
            .generate_to_file(self.dataset_file())
            .context("failed to generate dataset")?;
        Ok(())
    }

    pub fn subset_dataset(&self, n_keys: usize) -> Result<()> {
        let key_column = self.cfg.key_column();
        let small_file = self.small_dataset_file();
        let (n_kept, n_read) =
            dataset::subset_csv(self.dataset_file(), &small_file, key_column, n_keys)
                .context("failed to subset dataset")?;
        log::info!("kept {n_kept} of {n_read} records ({n_keys} {key_column} values)");
        log::info!("wrote {small_file:?}");
        Ok(())
    }

    pub fn analyze_dataset(&self) -> Result<()> {
        let mut analyzer = Analyzer::new(&self.cfg);
        analyzer
            .add_file(self.dataset_file())
            .context("failed to add file")?;

        let summary_file = self.summary_file();
        analyzer
            .save_results(&summary_file)
            .context("failed to save results")?;
        log::info!("wrote {summary_file:?}");
        Ok(())
    }

    pub fn clean_scenario(&self) -> Result<()> {
        let mut files = self.dataset_files().context("failed to glob dataset files")?;
        let summary_file = self.summary_file();
        if summary_file.is_file() {
            files.push(summary_file);
        }

        for file in files {
            fs::remove_file(&file).with_context(|| format!("failed to remove {file:?}"))?;
            log::info!("removed {file:?}");
        }
        Ok(())
    }

    fn dataset_files(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.scenario_dir.join("dataset*.csv");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let files = glob(pattern)
            .context("failed to glob dataset files")?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();
        Ok(files)
    }

    fn dataset_file(&self) -> PathBuf {
        self.scenario_dir.join("dataset.csv")
    }

    fn small_dataset_file(&self) -> PathBuf {
        self.scenario_dir.join("dataset-small.csv")
    }

    fn summary_file(&self) -> PathBuf {
        self.scenario_dir.join("summary.toml")
    }
}
