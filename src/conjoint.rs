//! Choice-based conjoint simulation.
//!
//! Each respondent draws a preference vector once and answers every one of
//! its tasks with it. Alternatives receive a deterministic utility plus an
//! independent Gumbel(0, 1) shock and the first arg-max is chosen, which is
//! the multinomial logit choice rule.

use crate::config::{Assignment, Attribute, ConjointConfig, ContinuousAttribute, Heterogeneity};
use crate::dataset::{Dataset, Record};
use crate::model::{AltKind, Alternative, ChoiceTask, Preferences, Value, Weight};
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_distr::{Bernoulli, Gumbel, Normal, Uniform, weighted::WeightedIndex};

pub const RESP_COLUMN: &str = "respondent_id";
pub const TASK_COLUMN: &str = "task_id";
pub const ALT_COLUMN: &str = "alternative_id";
pub const CHOSEN_COLUMN: &str = "chosen";
pub const ID_COLUMNS: [&str; 4] = [RESP_COLUMN, TASK_COLUMN, ALT_COLUMN, CHOSEN_COLUMN];

/// Products are labelled with single letters.
pub const MAX_PRODUCTS: usize = 26;

/// Generate the choice dataset of a conjoint study.
pub fn generate<R: Rng>(cfg: &ConjointConfig, rng: &mut R) -> Result<Dataset> {
    let sim = Simulator::new(cfg).context("failed to construct simulator")?;
    let tasks = sim.simulate(rng).context("failed to simulate tasks")?;
    Ok(to_dataset(cfg, &tasks))
}

/// Conjoint study simulator.
pub struct Simulator<'a> {
    cfg: &'a ConjointConfig,
    level_dists: Vec<Uniform<usize>>,
    shock_dist: Gumbel<f64>,
    none_dist: Option<Bernoulli>,
    comp_dist: Bernoulli,
    segment_dist: Option<WeightedIndex<f64>>,
}

impl<'a> Simulator<'a> {
    pub fn new(cfg: &'a ConjointConfig) -> Result<Self> {
        let mut level_dists = Vec::with_capacity(cfg.attributes.len());
        for attr in &cfg.attributes {
            let n_levels = match attr {
                Attribute::Discrete(attr) => attr.levels.len(),
                Attribute::Continuous(attr) => attr.values.len(),
            };
            level_dists.push(Uniform::new(0, n_levels)?);
        }

        let none_dist = match &cfg.none {
            Some(none) => Some(Bernoulli::new(none.prob)?),
            None => None,
        };

        let segment_dist = match cfg.segment_assignment {
            Assignment::Random if !cfg.segments.is_empty() => {
                Some(WeightedIndex::new(cfg.segments.iter().map(|seg| seg.share))?)
            }
            _ => None,
        };

        Ok(Self {
            cfg,
            level_dists,
            shock_dist: Gumbel::new(0.0, 1.0)?,
            none_dist,
            comp_dist: Bernoulli::new(cfg.prob_competitor)?,
            segment_dist,
        })
    }

    /// Simulate every task of every respondent, in respondent then task order.
    pub fn simulate<R: Rng>(&self, rng: &mut R) -> Result<Vec<ChoiceTask>> {
        let n_resp = self.cfg.n_resp;
        let mut tasks = Vec::with_capacity(n_resp * self.cfg.n_tasks);

        let resp_per_log = n_resp.div_ceil(10);
        for i_resp in 0..n_resp {
            let prefs = self
                .draw_preferences(i_resp, rng)
                .context("failed to draw preferences")?;
            log::debug!("respondent {i_resp} has segment {:?}", prefs.segment);

            for i_task in 0..self.cfg.n_tasks {
                let task = self
                    .simulate_task(i_resp, i_task, &prefs, rng)
                    .context("failed to simulate task")?;
                tasks.push(task);
            }

            if (i_resp + 1) % resp_per_log == 0 || i_resp + 1 == n_resp {
                let progress = 100.0 * (i_resp + 1) as f64 / n_resp as f64;
                log::info!("completed {progress:06.2}%");
            }
        }

        Ok(tasks)
    }

    fn assign_segment<R: Rng>(&self, i_resp: usize, rng: &mut R) -> Option<usize> {
        let n_seg = self.cfg.segments.len();
        if n_seg == 0 {
            return None;
        }
        match &self.segment_dist {
            Some(dist) => Some(dist.sample(rng)),
            None => Some(i_resp % n_seg),
        }
    }

    fn draw_preferences<R: Rng>(&self, i_resp: usize, rng: &mut R) -> Result<Preferences> {
        let i_seg = self.assign_segment(i_resp, rng);
        let seg = i_seg.map(|i_seg| &self.cfg.segments[i_seg]);

        let mut weights = Vec::with_capacity(self.cfg.attributes.len());
        for attr in &self.cfg.attributes {
            let noise_dist = Normal::new(0.0, attr.std_dev())?;
            let mult = match (seg, attr.group()) {
                (Some(seg), Some(group)) => seg.multipliers.get(group).copied().unwrap_or(1.0),
                _ => 1.0,
            };

            let weight = match attr {
                Attribute::Discrete(attr) => {
                    let utils = seg
                        .and_then(|seg| seg.utilities.get(&attr.name))
                        .unwrap_or(&attr.utilities);
                    let levels = match self.cfg.heterogeneity {
                        Heterogeneity::Offset => utils
                            .iter()
                            .map(|&util| util * mult + noise_dist.sample(rng))
                            .collect(),
                        Heterogeneity::Scale => {
                            let eps = noise_dist.sample(rng);
                            utils.iter().map(|&util| util * mult * (1.0 + eps)).collect()
                        }
                    };
                    Weight::Levels(levels)
                }
                Attribute::Continuous(attr) => {
                    let coef = seg
                        .and_then(|seg| seg.coefs.get(&attr.name))
                        .copied()
                        .unwrap_or(attr.coef);
                    let eps = noise_dist.sample(rng);
                    let coef = match self.cfg.heterogeneity {
                        Heterogeneity::Offset => coef * mult + eps,
                        Heterogeneity::Scale => coef * mult * (1.0 + eps),
                    };
                    Weight::Linear(coef)
                }
            };
            weights.push(weight);
        }

        let none_asc = match &self.cfg.none {
            Some(none) => {
                let asc = seg.and_then(|seg| seg.none_asc).unwrap_or(none.asc);
                asc + Normal::new(0.0, none.std_dev)?.sample(rng)
            }
            None => 0.0,
        };

        let mut competitor_ascs = Vec::with_capacity(self.cfg.competitors.len());
        for comp in &self.cfg.competitors {
            competitor_ascs.push(comp.asc + Normal::new(0.0, comp.std_dev)?.sample(rng));
        }

        Ok(Preferences {
            segment: i_seg,
            weights,
            none_asc,
            competitor_ascs,
        })
    }

    fn simulate_task<R: Rng>(
        &self,
        i_resp: usize,
        i_task: usize,
        prefs: &Preferences,
        rng: &mut R,
    ) -> Result<ChoiceTask> {
        let &n_products = self
            .cfg
            .n_products
            .choose(rng)
            .context("failed to choose the number of products")?;

        let mut alternatives = Vec::with_capacity(n_products + 2);

        // Full-profile random design: levels drawn independently and uniformly.
        for i_alt in 0..n_products {
            let product = self
                .sample_product(i_alt, prefs, rng)
                .with_context(|| format!("failed to sample product {i_alt}"))?;
            alternatives.push(product);
        }

        if let (Some(none), Some(none_dist)) = (&self.cfg.none, &self.none_dist) {
            if none_dist.sample(rng) {
                let noise = Normal::new(0.0, none.task_std_dev)?.sample(rng);
                alternatives.push(Alternative {
                    label: none.label.clone(),
                    kind: AltKind::NoChoice,
                    profile: Vec::new(),
                    utility: prefs.none_asc + noise,
                    shock: 0.0,
                    chosen: false,
                });
            }
        }

        if !self.cfg.competitors.is_empty() && self.comp_dist.sample(rng) {
            let i_comp = rng.random_range(0..self.cfg.competitors.len());
            let comp = &self.cfg.competitors[i_comp];
            let utility =
                prefs.competitor_ascs[i_comp] + self.linear_utility(&comp.profile, prefs)?;
            alternatives.push(Alternative {
                label: comp.label.clone(),
                kind: AltKind::Competitor(i_comp),
                profile: comp.profile.clone(),
                utility,
                shock: 0.0,
                chosen: false,
            });
        }

        for alt in &mut alternatives {
            alt.shock = self.shock_dist.sample(rng);
        }
        let i_chosen = choose(&alternatives).context("task has no alternatives")?;
        alternatives[i_chosen].chosen = true;

        Ok(ChoiceTask {
            i_resp,
            i_task,
            alternatives,
        })
    }

    fn sample_product<R: Rng>(
        &self,
        i_alt: usize,
        prefs: &Preferences,
        rng: &mut R,
    ) -> Result<Alternative> {
        let mut profile = Vec::with_capacity(self.cfg.attributes.len());
        let mut utility = 0.0;

        let iter = self
            .cfg
            .attributes
            .iter()
            .zip(&prefs.weights)
            .zip(&self.level_dists);
        for ((attr, weight), level_dist) in iter {
            let i_lvl = level_dist.sample(rng);
            match (attr, weight) {
                (Attribute::Discrete(attr), Weight::Levels(utils)) => {
                    utility += utils[i_lvl];
                    profile.push(attr.levels[i_lvl].clone());
                }
                (Attribute::Continuous(attr), &Weight::Linear(coef)) => {
                    let value = &attr.values[i_lvl];
                    utility += linear_term(attr, coef, value)?;
                    profile.push(value.clone());
                }
                _ => bail!("weight of {:?} does not match its kind", attr.name()),
            }
        }

        Ok(Alternative {
            label: product_label(i_alt),
            kind: AltKind::Product,
            profile,
            utility,
            shock: 0.0,
            chosen: false,
        })
    }

    /// Utility of the continuous attributes of a fixed profile.
    fn linear_utility(&self, profile: &[Value], prefs: &Preferences) -> Result<f64> {
        let mut utility = 0.0;
        let iter = self.cfg.attributes.iter().zip(&prefs.weights).zip(profile);
        for ((attr, weight), value) in iter {
            if let (Attribute::Continuous(attr), &Weight::Linear(coef)) = (attr, weight) {
                utility += linear_term(attr, coef, value)?;
            }
        }
        Ok(utility)
    }
}

fn linear_term(attr: &ContinuousAttribute, coef: f64, value: &Value) -> Result<f64> {
    let num = value
        .as_f64()
        .with_context(|| format!("{:?} value {value:?} is not numeric", attr.name))?;
    Ok(coef * (num - attr.reference) / attr.scale)
}

/// Index of the alternative with the highest total utility.
///
/// Ties go to the first alternative.
pub fn choose(alternatives: &[Alternative]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i_alt, alt) in alternatives.iter().enumerate() {
        let total = alt.total_utility();
        if best.is_none_or(|(_, best_total)| total > best_total) {
            best = Some((i_alt, total));
        }
    }
    best.map(|(i_alt, _)| i_alt)
}

fn product_label(i_alt: usize) -> String {
    char::from(b'A' + i_alt as u8).to_string()
}

/// Flatten choice tasks into one record per alternative.
pub fn to_dataset(cfg: &ConjointConfig, tasks: &[ChoiceTask]) -> Dataset {
    let columns = ID_COLUMNS
        .iter()
        .map(|col| col.to_string())
        .chain(cfg.attributes.iter().map(|attr| attr.name().to_string()));
    let mut dataset = Dataset::new(columns);

    for task in tasks {
        let resp_id = format!(
            "{}{:0width$}",
            cfg.resp_prefix,
            task.i_resp + 1,
            width = cfg.resp_width
        );
        for alt in &task.alternatives {
            let mut record = Record::new();
            record.insert(RESP_COLUMN.to_string(), resp_id.clone().into());
            record.insert(TASK_COLUMN.to_string(), (task.i_task + 1).into());
            record.insert(ALT_COLUMN.to_string(), alt.label.clone().into());
            record.insert(CHOSEN_COLUMN.to_string(), Value::Int(alt.chosen as i64));
            for (attr, value) in cfg.attributes.iter().zip(&alt.profile) {
                record.insert(attr.name().to_string(), value.clone());
            }
            dataset.push(record);
        }
    }

    dataset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Competitor, DiscreteAttribute, NoneOption, Segment};
    use rand_chacha::ChaCha12Rng;
    use std::collections::BTreeMap;

    fn config() -> ConjointConfig {
        ConjointConfig {
            seed: 42,
            n_resp: 6,
            n_tasks: 20,
            resp_prefix: "R".to_string(),
            resp_width: 3,
            n_products: vec![3],
            heterogeneity: Heterogeneity::Offset,
            attributes: vec![
                Attribute::Discrete(DiscreteAttribute {
                    name: "brand".to_string(),
                    group: Some("brand".to_string()),
                    std_dev: 0.3,
                    levels: vec!["BrandX".into(), "BrandY".into()],
                    utilities: vec![0.0, 0.8],
                }),
                Attribute::Continuous(ContinuousAttribute {
                    name: "price".to_string(),
                    group: Some("price".to_string()),
                    std_dev: 0.001,
                    values: vec![Value::Int(499), Value::Int(599)],
                    coef: -0.003,
                    reference: 0.0,
                    scale: 1.0,
                }),
            ],
            none: Some(NoneOption {
                label: "None".to_string(),
                asc: -1.0,
                std_dev: 0.5,
                task_std_dev: 0.0,
                prob: 0.7,
            }),
            competitors: vec![Competitor {
                label: "Rival".to_string(),
                asc: 1.5,
                std_dev: 0.0,
                profile: vec!["Rival".into(), Value::Int(799)],
            }],
            prob_competitor: 0.3,
            segments: Vec::new(),
            segment_assignment: Assignment::Cyclic,
        }
    }

    fn bare_config() -> ConjointConfig {
        ConjointConfig {
            n_resp: 1,
            n_tasks: 1,
            none: None,
            competitors: Vec::new(),
            prob_competitor: 0.0,
            ..config()
        }
    }

    fn simulate(cfg: &ConjointConfig, seed: u64) -> Vec<ChoiceTask> {
        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        Simulator::new(cfg)
            .expect("failed to construct simulator")
            .simulate(&mut rng)
            .expect("failed to simulate")
    }

    fn alternative(utility: f64, shock: f64) -> Alternative {
        Alternative {
            label: "A".to_string(),
            kind: AltKind::Product,
            profile: Vec::new(),
            utility,
            shock,
            chosen: false,
        }
    }

    #[test]
    fn exactly_one_arg_max_chosen_per_task() {
        let tasks = simulate(&config(), 1);
        assert_eq!(tasks.len(), 6 * 20);
        for task in &tasks {
            let chosen: Vec<_> = task.alternatives.iter().filter(|alt| alt.chosen).collect();
            assert_eq!(chosen.len(), 1);
            let max = task
                .alternatives
                .iter()
                .map(Alternative::total_utility)
                .fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(chosen[0].total_utility(), max);
        }
    }

    #[test]
    fn ties_go_to_first_alternative() {
        let alts = [
            alternative(1.0, 0.0),
            alternative(0.5, 0.5),
            alternative(0.0, 0.2),
        ];
        assert_eq!(choose(&alts), Some(0));
        assert_eq!(choose(&[]), None);
    }

    #[test]
    fn preferences_are_stable_within_respondent() {
        let tasks = simulate(&config(), 2);
        for i_resp in 0..6 {
            let mut seen: BTreeMap<String, f64> = BTreeMap::new();
            let mut none_utils = Vec::new();
            let alts = tasks
                .iter()
                .filter(|task| task.i_resp == i_resp)
                .flat_map(|task| &task.alternatives);
            for alt in alts {
                match alt.kind {
                    AltKind::Product => {
                        let key = format!("{:?}", alt.profile);
                        let utility = *seen.entry(key).or_insert(alt.utility);
                        assert_eq!(utility, alt.utility);
                    }
                    AltKind::NoChoice => none_utils.push(alt.utility),
                    AltKind::Competitor(_) => {}
                }
            }
            // 2 x 2 profiles over 60 products: every profile repeats.
            assert!(seen.len() <= 4);
            assert!(none_utils.windows(2).all(|pair| pair[0] == pair[1]));
        }
    }

    #[test]
    fn preferences_vary_across_respondents() {
        let tasks = simulate(&config(), 3);
        let none_utils: Vec<_> = tasks
            .iter()
            .flat_map(|task| &task.alternatives)
            .filter(|alt| alt.kind == AltKind::NoChoice)
            .map(|alt| alt.utility)
            .collect();
        assert!(none_utils.iter().any(|&util| util != none_utils[0]));
    }

    #[test]
    fn row_count_matches_alternatives() {
        let cfg = config();
        let tasks = simulate(&cfg, 4);
        let dataset = to_dataset(&cfg, &tasks);
        let n_alts: usize = tasks.iter().map(|task| task.alternatives.len()).sum();
        assert_eq!(dataset.len(), n_alts);
        for task in &tasks {
            assert!((3..=5).contains(&task.alternatives.len()));
        }
        assert!(tasks.iter().any(|task| task.alternatives.len() > 3));
    }

    #[test]
    fn none_rows_are_blank() {
        let cfg = config();
        let dataset = to_dataset(&cfg, &simulate(&cfg, 5));
        let none_rows: Vec<_> = dataset
            .records()
            .iter()
            .filter(|rec| rec[ALT_COLUMN] == Value::from("None"))
            .collect();
        assert!(!none_rows.is_empty());
        for rec in none_rows {
            assert!(!rec.contains_key("brand"));
            assert!(!rec.contains_key("price"));
        }
    }

    #[test]
    fn competitor_utility_is_constant_plus_price() {
        let cfg = ConjointConfig {
            prob_competitor: 1.0,
            ..config()
        };
        let sim = Simulator::new(&cfg).expect("failed to construct simulator");
        let mut rng = ChaCha12Rng::seed_from_u64(6);
        let prefs = sim.draw_preferences(0, &mut rng).expect("failed to draw");
        let task = sim
            .simulate_task(0, 0, &prefs, &mut rng)
            .expect("failed to simulate task");

        let comp = task.alternatives.last().expect("task should not be empty");
        assert_eq!(comp.kind, AltKind::Competitor(0));
        assert_eq!(comp.label, "Rival");
        let Weight::Linear(coef) = prefs.weights[1] else {
            panic!("expected price coefficient");
        };
        let expected = prefs.competitor_ascs[0] + coef * 799.0;
        assert!((comp.utility - expected).abs() < 1e-12);
        assert_eq!(prefs.competitor_ascs[0], 1.5);
    }

    #[test]
    fn single_task_scenario() {
        let cfg = bare_config();
        let tasks = simulate(&cfg, 7);
        let dataset = to_dataset(&cfg, &tasks);

        assert_eq!(dataset.len(), 3);
        let mut n_chosen = 0;
        for rec in dataset.records() {
            assert_eq!(rec[RESP_COLUMN], Value::from("R001"));
            assert_eq!(rec[TASK_COLUMN], Value::Int(1));
            let Value::Int(chosen) = rec[CHOSEN_COLUMN] else {
                panic!("chosen should be an integer");
            };
            n_chosen += chosen;
        }
        assert_eq!(n_chosen, 1);

        let labels: Vec<_> = dataset
            .records()
            .iter()
            .map(|rec| rec[ALT_COLUMN].to_string())
            .collect();
        assert_eq!(labels, ["A", "B", "C"]);
    }

    #[test]
    fn same_seed_same_bytes() {
        let cfg = config();
        let write = |seed| {
            let mut rng = ChaCha12Rng::seed_from_u64(seed);
            let mut buf = Vec::new();
            generate(&cfg, &mut rng)
                .expect("failed to generate")
                .write_to(&mut buf)
                .expect("failed to write");
            buf
        };
        assert_eq!(write(8), write(8));
        assert_ne!(write(8), write(9));
    }

    #[test]
    fn variable_product_counts() {
        let cfg = ConjointConfig {
            n_products: vec![3, 4],
            none: None,
            prob_competitor: 0.0,
            ..config()
        };
        let tasks = simulate(&cfg, 10);
        let lens: Vec<_> = tasks.iter().map(|task| task.alternatives.len()).collect();
        assert!(lens.iter().all(|len| (3..=4).contains(len)));
        assert!(lens.contains(&3) && lens.contains(&4));
    }

    #[test]
    fn segments_scale_weights() {
        let mut cfg = bare_config();
        cfg.heterogeneity = Heterogeneity::Scale;
        for attr in &mut cfg.attributes {
            match attr {
                Attribute::Discrete(attr) => attr.std_dev = 0.0,
                Attribute::Continuous(attr) => attr.std_dev = 0.0,
            }
        }
        cfg.segments = vec![
            Segment {
                name: "loyal".to_string(),
                share: 1.0,
                multipliers: BTreeMap::from([("brand".to_string(), 1.5)]),
                utilities: BTreeMap::new(),
                coefs: BTreeMap::new(),
                none_asc: None,
            },
            Segment {
                name: "thrifty".to_string(),
                share: 1.0,
                multipliers: BTreeMap::new(),
                utilities: BTreeMap::from([("brand".to_string(), vec![0.2, 0.1])]),
                coefs: BTreeMap::from([("price".to_string(), -0.01)]),
                none_asc: None,
            },
        ];

        let sim = Simulator::new(&cfg).expect("failed to construct simulator");
        let mut rng = ChaCha12Rng::seed_from_u64(11);

        let prefs = sim.draw_preferences(0, &mut rng).expect("failed to draw");
        assert_eq!(prefs.segment, Some(0));
        assert_eq!(prefs.weights[0], Weight::Levels(vec![0.0, 0.8 * 1.5]));
        assert_eq!(prefs.weights[1], Weight::Linear(-0.003));

        let prefs = sim.draw_preferences(3, &mut rng).expect("failed to draw");
        assert_eq!(prefs.segment, Some(1));
        assert_eq!(prefs.weights[0], Weight::Levels(vec![0.2, 0.1]));
        assert_eq!(prefs.weights[1], Weight::Linear(-0.01));
    }

    #[test]
    fn random_segment_assignment_follows_shares() {
        let mut cfg = bare_config();
        cfg.segment_assignment = Assignment::Random;
        cfg.segments = ["never", "always"]
            .into_iter()
            .zip([0.0, 1.0])
            .map(|(name, share)| Segment {
                name: name.to_string(),
                share,
                multipliers: BTreeMap::new(),
                utilities: BTreeMap::new(),
                coefs: BTreeMap::new(),
                none_asc: None,
            })
            .collect();

        let sim = Simulator::new(&cfg).expect("failed to construct simulator");
        let mut rng = ChaCha12Rng::seed_from_u64(12);
        for i_resp in 0..20 {
            let prefs = sim.draw_preferences(i_resp, &mut rng).expect("failed to draw");
            assert_eq!(prefs.segment, Some(1));
        }
    }
}
