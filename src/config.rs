use crate::{bivariate, conjoint, model::Value};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Debug,
    fs,
    ops::RangeBounds,
    path::Path,
};

/// Scenario configuration.
///
/// Loaded from a TOML file whose `kind` key selects the generator, and
/// validated before use. See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Config {
    Conjoint(ConjointConfig),
    Multinomial(MultinomialConfig),
    Bivariate(BivariateConfig),
}

/// Choice-based conjoint study parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ConjointConfig {
    /// Random number generator seed.
    pub seed: u64,

    /// Number of respondents.
    pub n_resp: usize,
    /// Number of tasks per respondent.
    pub n_tasks: usize,

    /// Prefix of respondent ids.
    #[serde(default = "default_resp_prefix")]
    pub resp_prefix: String,
    /// Zero-padded width of the numeric part of respondent ids.
    #[serde(default = "default_id_width")]
    pub resp_width: usize,

    /// Candidate numbers of product alternatives, one drawn uniformly per task.
    pub n_products: Vec<usize>,

    /// How respondent deviations combine with population weights.
    #[serde(default)]
    pub heterogeneity: Heterogeneity,

    /// Product attributes, in output column order.
    pub attributes: Vec<Attribute>,

    /// Optional "none" alternative.
    pub none: Option<NoneOption>,

    /// Fixed competitor profiles.
    #[serde(default)]
    pub competitors: Vec<Competitor>,
    /// Probability of including a competitor in a task.
    #[serde(default)]
    pub prob_competitor: f64,

    /// Respondent segments.
    #[serde(default)]
    pub segments: Vec<Segment>,
    /// How respondents are assigned to segments.
    #[serde(default)]
    pub segment_assignment: Assignment,
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Heterogeneity {
    /// Independent deviation added to every weight.
    #[default]
    Offset,
    /// One relative deviation per attribute scaling all its weights.
    Scale,
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assignment {
    /// Respondent `i` belongs to segment `i mod n_segments`.
    #[default]
    Cyclic,
    /// Segments drawn in proportion to their shares.
    Random,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attribute {
    Discrete(DiscreteAttribute),
    Continuous(ContinuousAttribute),
}

/// Attribute with a finite set of levels, each with its own part-worth.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct DiscreteAttribute {
    pub name: String,
    /// Multiplier group used by segments.
    pub group: Option<String>,
    /// Standard deviation of respondent heterogeneity.
    #[serde(default)]
    pub std_dev: f64,
    pub levels: Vec<Value>,
    /// Population part-worths (one per level).
    pub utilities: Vec<f64>,
}

/// Numeric attribute entering the utility linearly.
///
/// Its contribution is `coef * (value - reference) / scale`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ContinuousAttribute {
    pub name: String,
    pub group: Option<String>,
    #[serde(default)]
    pub std_dev: f64,
    pub values: Vec<Value>,
    pub coef: f64,
    #[serde(default)]
    pub reference: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct NoneOption {
    #[serde(default = "default_none_label")]
    pub label: String,
    /// Population alternative-specific constant.
    pub asc: f64,
    /// Standard deviation of respondent heterogeneity.
    #[serde(default)]
    pub std_dev: f64,
    /// Standard deviation of additional noise drawn for every task.
    #[serde(default)]
    pub task_std_dev: f64,
    /// Probability of including the option in a task.
    pub prob: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Competitor {
    pub label: String,
    pub asc: f64,
    #[serde(default)]
    pub std_dev: f64,
    /// One value per attribute, in attribute order.
    pub profile: Vec<Value>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    /// Relative size when segments are assigned at random.
    #[serde(default = "default_share")]
    pub share: f64,
    /// Weight multipliers keyed by attribute group.
    #[serde(default)]
    pub multipliers: BTreeMap<String, f64>,
    /// Part-worth overrides keyed by discrete attribute name.
    #[serde(default)]
    pub utilities: BTreeMap<String, Vec<f64>>,
    /// Coefficient overrides keyed by continuous attribute name.
    #[serde(default)]
    pub coefs: BTreeMap<String, f64>,
    /// Override of the "none" constant.
    pub none_asc: Option<f64>,
}

/// Multinomial segment dataset parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MultinomialConfig {
    pub seed: u64,
    pub n_rows: usize,

    pub id_column: String,
    #[serde(default)]
    pub id_prefix: String,
    #[serde(default = "default_id_width")]
    pub id_width: usize,

    pub outcome_column: String,
    pub outcomes: Vec<Outcome>,

    #[serde(default)]
    pub categorical: Vec<CategoricalPredictor>,
    #[serde(default)]
    pub continuous: Vec<ContinuousPredictor>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub label: String,
    /// Baseline score.
    #[serde(default)]
    pub base: f64,
    /// Standard deviation of the score noise.
    #[serde(default)]
    pub std_dev: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct CategoricalPredictor {
    pub name: String,
    pub levels: Vec<CategoricalLevel>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct CategoricalLevel {
    pub value: String,
    /// Sampling weight.
    pub weight: f64,
    /// Score effect per outcome (empty means no effect).
    #[serde(default)]
    pub effects: Vec<f64>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ContinuousPredictor {
    pub name: String,
    pub mean: f64,
    pub std_dev: f64,
    /// Lower clamp applied to the raw draw, before shifts.
    pub draw_min: Option<f64>,
    /// Lower clamp applied after shifts.
    pub min: Option<f64>,
    /// Number of decimals written to the dataset.
    #[serde(default = "default_decimals")]
    pub decimals: usize,
    /// Point around which effects are measured.
    #[serde(default)]
    pub center: f64,
    /// Score slope per outcome (empty means no effect).
    #[serde(default)]
    pub effects: Vec<f64>,
    #[serde(default)]
    pub shifts: Vec<Shift>,
}

/// Shift of a continuous predictor when a categorical predictor takes a level.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Shift {
    pub predictor: String,
    pub level: String,
    pub delta: f64,
}

/// Bivariate input/output scenario parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct BivariateConfig {
    pub seed: u64,

    /// Maximum relative noise amplitude.
    #[serde(default = "default_noise_factor")]
    pub noise_factor: f64,
    /// Upper bound (exclusive) of the R² of every resource.
    #[serde(default = "default_max_r2")]
    pub max_r2: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Lowest output value.
    #[serde(default = "default_floor")]
    pub floor: f64,
    #[serde(default = "default_prob_shock")]
    pub prob_shock: f64,
    #[serde(default = "default_shock_factor")]
    pub shock_factor: f64,

    pub resources: Vec<Resource>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub inputs: Vec<f64>,
    pub rate: f64,
    #[serde(default)]
    pub curve: Curve,
}

/// Noiseless response of a resource to its input.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Curve {
    #[default]
    Linear,
    Saturating,
    Sqrt,
    Log,
    WeakLog,
}

fn default_resp_prefix() -> String {
    "R".to_string()
}

fn default_none_label() -> String {
    "None".to_string()
}

fn default_id_width() -> usize {
    3
}

fn default_scale() -> f64 {
    1.0
}

fn default_share() -> f64 {
    1.0
}

fn default_decimals() -> usize {
    3
}

fn default_noise_factor() -> f64 {
    0.35
}

fn default_max_r2() -> f64 {
    0.85
}

fn default_max_attempts() -> usize {
    1000
}

fn default_floor() -> f64 {
    100.0
}

fn default_prob_shock() -> f64 {
    0.25
}

fn default_shock_factor() -> f64 {
    1.5
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let text = fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&text)
    }

    /// Parse and validate a [`Config`] from a TOML string.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).context("failed to deserialize config")?;
        config.validate().context("failed to validate config")?;
        Ok(config)
    }

    pub fn seed(&self) -> u64 {
        match self {
            Config::Conjoint(cfg) => cfg.seed,
            Config::Multinomial(cfg) => cfg.seed,
            Config::Bivariate(cfg) => cfg.seed,
        }
    }

    /// Column identifying the unit a dataset is grouped by.
    pub fn key_column(&self) -> &str {
        match self {
            Config::Conjoint(_) => conjoint::RESP_COLUMN,
            Config::Multinomial(cfg) => &cfg.id_column,
            Config::Bivariate(_) => bivariate::RESOURCE_COLUMN,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Config::Conjoint(cfg) => cfg.validate(),
            Config::Multinomial(cfg) => cfg.validate(),
            Config::Bivariate(cfg) => cfg.validate(),
        }
    }
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Attribute::Discrete(attr) => &attr.name,
            Attribute::Continuous(attr) => &attr.name,
        }
    }

    pub fn group(&self) -> Option<&str> {
        match self {
            Attribute::Discrete(attr) => attr.group.as_deref(),
            Attribute::Continuous(attr) => attr.group.as_deref(),
        }
    }

    pub fn std_dev(&self) -> f64 {
        match self {
            Attribute::Discrete(attr) => attr.std_dev,
            Attribute::Continuous(attr) => attr.std_dev,
        }
    }

    fn validate(&self) -> Result<()> {
        check_std_dev(self.std_dev()).context("invalid heterogeneity standard deviation")?;
        match self {
            Attribute::Discrete(attr) => {
                if attr.levels.is_empty() {
                    bail!("levels must not be empty");
                }
                let n_levels = attr.levels.len();
                let n_utils = attr.utilities.len();
                if n_utils != n_levels {
                    bail!("number of utilities must be {n_levels}, but is {n_utils}");
                }
                check_finite(&attr.utilities).context("invalid utilities")?;
            }
            Attribute::Continuous(attr) => {
                if attr.values.is_empty() {
                    bail!("values must not be empty");
                }
                for value in &attr.values {
                    check_numeric(value).context("invalid value")?;
                }
                check_finite(&[attr.coef, attr.reference]).context("invalid coefficient")?;
                if !attr.scale.is_finite() || attr.scale <= 0.0 {
                    bail!("scale must be positive, but is {}", attr.scale);
                }
            }
        }
        Ok(())
    }
}

impl ConjointConfig {
    fn validate(&self) -> Result<()> {
        check_num(self.n_resp, 1..).context("invalid number of respondents")?;
        check_num(self.n_tasks, 1..).context("invalid number of tasks")?;
        check_num(self.resp_width, 1..10).context("invalid respondent id width")?;

        if self.n_products.is_empty() {
            bail!("product counts must not be empty");
        }
        for &n_products in &self.n_products {
            check_num(n_products, 1..=conjoint::MAX_PRODUCTS)
                .context("invalid number of products")?;
        }

        if self.attributes.is_empty() {
            bail!("attributes must not be empty");
        }
        let mut columns: Vec<&str> = conjoint::ID_COLUMNS.to_vec();
        columns.extend(self.attributes.iter().map(|attr| attr.name()));
        check_unique(columns).context("invalid column names")?;
        for attr in &self.attributes {
            attr.validate()
                .with_context(|| format!("invalid attribute {:?}", attr.name()))?;
        }

        if let Some(none) = &self.none {
            check_finite(&[none.asc]).context("invalid none constant")?;
            check_std_dev(none.std_dev).context("invalid none standard deviation")?;
            check_std_dev(none.task_std_dev).context("invalid none task standard deviation")?;
            check_prob(none.prob).context("invalid none probability")?;
        }

        check_prob(self.prob_competitor).context("invalid competitor probability")?;
        if self.prob_competitor > 0.0 && self.competitors.is_empty() {
            bail!("competitor probability is positive but there are no competitors");
        }
        for comp in &self.competitors {
            self.check_competitor(comp)
                .with_context(|| format!("invalid competitor {:?}", comp.label))?;
        }

        if self.segment_assignment == Assignment::Random && !self.segments.is_empty() {
            let shares: Vec<_> = self.segments.iter().map(|seg| seg.share).collect();
            check_weights(&shares).context("invalid segment shares")?;
        }
        for seg in &self.segments {
            self.check_segment(seg)
                .with_context(|| format!("invalid segment {:?}", seg.name))?;
        }

        Ok(())
    }

    fn check_competitor(&self, comp: &Competitor) -> Result<()> {
        check_finite(&[comp.asc]).context("invalid constant")?;
        check_std_dev(comp.std_dev).context("invalid standard deviation")?;
        let n_attrs = self.attributes.len();
        let len = comp.profile.len();
        if len != n_attrs {
            bail!("profile length must be {n_attrs}, but is {len}");
        }
        for (attr, value) in self.attributes.iter().zip(&comp.profile) {
            if let Attribute::Continuous(_) = attr {
                check_numeric(value).with_context(|| format!("invalid {:?} value", attr.name()))?;
            }
        }
        Ok(())
    }

    fn check_segment(&self, seg: &Segment) -> Result<()> {
        let groups: BTreeSet<_> = self.attributes.iter().filter_map(|a| a.group()).collect();
        for (group, &mult) in &seg.multipliers {
            if !groups.contains(group.as_str()) {
                bail!("no attribute belongs to group {group:?}");
            }
            check_finite(&[mult]).with_context(|| format!("invalid {group:?} multiplier"))?;
        }

        for (name, utils) in &seg.utilities {
            let attr = self.attributes.iter().find_map(|attr| match attr {
                Attribute::Discrete(attr) if &attr.name == name => Some(attr),
                _ => None,
            });
            let Some(attr) = attr else {
                bail!("no discrete attribute named {name:?}");
            };
            let n_levels = attr.levels.len();
            if utils.len() != n_levels {
                bail!("{name:?} utilities must have {n_levels} elements");
            }
            check_finite(utils).with_context(|| format!("invalid {name:?} utilities"))?;
        }

        for (name, &coef) in &seg.coefs {
            let is_continuous = self
                .attributes
                .iter()
                .any(|attr| matches!(attr, Attribute::Continuous(attr) if &attr.name == name));
            if !is_continuous {
                bail!("no continuous attribute named {name:?}");
            }
            check_finite(&[coef]).with_context(|| format!("invalid {name:?} coefficient"))?;
        }

        if let Some(asc) = seg.none_asc {
            if self.none.is_none() {
                bail!("none constant given but there is no none option");
            }
            check_finite(&[asc]).context("invalid none constant")?;
        }

        Ok(())
    }
}

impl MultinomialConfig {
    fn validate(&self) -> Result<()> {
        check_num(self.n_rows, 1..).context("invalid number of rows")?;
        check_num(self.id_width, 1..10).context("invalid id width")?;

        let n_outcomes = self.outcomes.len();
        check_num(n_outcomes, 2..100).context("invalid number of outcomes")?;
        check_unique(self.outcomes.iter().map(|out| out.label.as_str()))
            .context("invalid outcome labels")?;
        for out in &self.outcomes {
            check_finite(&[out.base])
                .and_then(|_| check_std_dev(out.std_dev))
                .with_context(|| format!("invalid outcome {:?}", out.label))?;
        }

        let columns = [self.id_column.as_str(), self.outcome_column.as_str()]
            .into_iter()
            .chain(self.categorical.iter().map(|pred| pred.name.as_str()))
            .chain(self.continuous.iter().map(|pred| pred.name.as_str()));
        check_unique(columns).context("invalid column names")?;

        for pred in &self.categorical {
            check_categorical(pred, n_outcomes)
                .with_context(|| format!("invalid predictor {:?}", pred.name))?;
        }
        for pred in &self.continuous {
            self.check_continuous(pred, n_outcomes)
                .with_context(|| format!("invalid predictor {:?}", pred.name))?;
        }

        Ok(())
    }

    fn check_continuous(&self, pred: &ContinuousPredictor, n_outcomes: usize) -> Result<()> {
        check_finite(&[pred.mean, pred.center]).context("invalid location")?;
        check_std_dev(pred.std_dev).context("invalid standard deviation")?;
        for min in [pred.draw_min, pred.min].into_iter().flatten() {
            check_finite(&[min]).context("invalid minimum")?;
        }
        check_num(pred.decimals, 0..=10).context("invalid number of decimals")?;
        check_effects(&pred.effects, n_outcomes).context("invalid effects")?;
        for shift in &pred.shifts {
            let has_level = self
                .categorical
                .iter()
                .filter(|cat| cat.name == shift.predictor)
                .any(|cat| cat.levels.iter().any(|lvl| lvl.value == shift.level));
            if !has_level {
                bail!(
                    "shift refers to unknown level {:?} of {:?}",
                    shift.level,
                    shift.predictor
                );
            }
            check_finite(&[shift.delta]).context("invalid shift")?;
        }
        Ok(())
    }
}

fn check_categorical(pred: &CategoricalPredictor, n_outcomes: usize) -> Result<()> {
    if pred.levels.is_empty() {
        bail!("levels must not be empty");
    }
    check_unique(pred.levels.iter().map(|lvl| lvl.value.as_str())).context("invalid levels")?;
    let weights: Vec<_> = pred.levels.iter().map(|lvl| lvl.weight).collect();
    check_weights(&weights).context("invalid level weights")?;
    for lvl in &pred.levels {
        check_effects(&lvl.effects, n_outcomes)
            .with_context(|| format!("invalid effects of level {:?}", lvl.value))?;
    }
    Ok(())
}

impl BivariateConfig {
    fn validate(&self) -> Result<()> {
        if !(self.noise_factor > 0.0 && self.noise_factor <= 1.0) {
            bail!("noise factor must be in (0, 1], but is {}", self.noise_factor);
        }
        if !(self.max_r2 > 0.0 && self.max_r2 <= 1.0) {
            bail!("maximum R² must be in (0, 1], but is {}", self.max_r2);
        }
        check_num(self.max_attempts, 1..).context("invalid maximum attempts")?;
        check_finite(&[self.floor]).context("invalid floor")?;
        check_prob(self.prob_shock).context("invalid shock probability")?;
        check_num(self.shock_factor, 0.0..f64::INFINITY).context("invalid shock factor")?;

        if self.resources.is_empty() {
            bail!("resources must not be empty");
        }
        check_unique(self.resources.iter().map(|res| res.id.as_str()))
            .context("invalid resource ids")?;
        for res in &self.resources {
            check_resource(res).with_context(|| format!("invalid resource {:?}", res.id))?;
        }

        Ok(())
    }
}

fn check_resource(res: &Resource) -> Result<()> {
    check_num(res.inputs.len(), 2..10_000).context("invalid number of inputs")?;
    for &input in &res.inputs {
        check_num(input, f64::MIN_POSITIVE..f64::INFINITY).context("invalid input")?;
    }
    if res.inputs.iter().all(|&input| input == res.inputs[0]) {
        bail!("inputs must not all be equal");
    }
    check_finite(&[res.rate]).context("invalid rate")?;
    Ok(())
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_prob(prob: f64) -> Result<()> {
    check_num(prob, 0.0..=1.0)
}

fn check_std_dev(std_dev: f64) -> Result<()> {
    check_num(std_dev, 0.0..f64::INFINITY)
}

fn check_finite(vals: &[f64]) -> Result<()> {
    if let Some(val) = vals.iter().find(|val| !val.is_finite()) {
        bail!("number must be finite, but is {val}");
    }
    Ok(())
}

fn check_numeric(value: &Value) -> Result<()> {
    match value.as_f64() {
        Some(num) if num.is_finite() => Ok(()),
        _ => bail!("value must be a finite number, but is {value:?}"),
    }
}

fn check_weights(weights: &[f64]) -> Result<()> {
    if weights.iter().any(|&w| !w.is_finite() || w < 0.0) {
        bail!("weights must be finite and non-negative");
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        bail!("weights must not all be zero");
    }
    Ok(())
}

fn check_effects(effects: &[f64], n_outcomes: usize) -> Result<()> {
    let len = effects.len();
    if len != 0 && len != n_outcomes {
        bail!("vector length must be 0 or {n_outcomes}, but is {len}");
    }
    check_finite(effects)
}

fn check_unique<'a, I>(names: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = BTreeSet::new();
    for name in names {
        if name.is_empty() {
            bail!("names must not be empty");
        }
        if !seen.insert(name) {
            bail!("name {name:?} is repeated");
        }
    }
    Ok(())
}
