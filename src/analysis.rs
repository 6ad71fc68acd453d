use crate::config::{Attribute, Config};
use crate::dataset::{Dataset, Record};
use crate::model::Value;
use crate::stats::{Accumulator, r_squared};
use crate::{bivariate, conjoint};
use anyhow::{Context, Result, bail};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

pub trait Obs {
    fn update(&mut self, record: &Record) -> Result<()>;
    fn report(&self) -> Result<(String, toml::Value)>;
}

/// Restricts an observable to the records whose column holds a value.
#[derive(Clone, Debug)]
pub struct Filter {
    column: String,
    value: Value,
}

impl Filter {
    pub fn new(column: &str, value: Value) -> Self {
        Self {
            column: column.to_string(),
            value,
        }
    }

    /// Rows of chosen alternatives.
    pub fn chosen() -> Self {
        Self::new(conjoint::CHOSEN_COLUMN, Value::Int(1))
    }

    fn accepts(filter: &Option<Self>, record: &Record) -> bool {
        filter
            .as_ref()
            .is_none_or(|filter| record.get(&filter.column) == Some(&filter.value))
    }
}

pub struct RowCount {
    n_rows: usize,
}

impl RowCount {
    pub fn new() -> Self {
        Self { n_rows: 0 }
    }
}

impl Obs for RowCount {
    fn update(&mut self, _record: &Record) -> Result<()> {
        self.n_rows += 1;
        Ok(())
    }

    fn report(&self) -> Result<(String, toml::Value)> {
        Ok(("n_rows".to_string(), toml::Value::Integer(self.n_rows as i64)))
    }
}

pub struct DistinctCount {
    column: String,
    keys: BTreeSet<String>,
}

impl DistinctCount {
    pub fn new(column: &str) -> Self {
        Self {
            column: column.to_string(),
            keys: BTreeSet::new(),
        }
    }
}

impl Obs for DistinctCount {
    fn update(&mut self, record: &Record) -> Result<()> {
        let key = record
            .get(&self.column)
            .with_context(|| format!("missing {:?}", self.column))?;
        self.keys.insert(key.to_string());
        Ok(())
    }

    fn report(&self) -> Result<(String, toml::Value)> {
        let name = format!("distinct_{}", self.column);
        Ok((name, toml::Value::Integer(self.keys.len() as i64)))
    }
}

/// Number of alternatives per choice task.
///
/// Reporting fails if any task does not have exactly one chosen alternative.
pub struct TaskSizes {
    tasks: BTreeMap<(String, String), (usize, i64)>,
}

impl TaskSizes {
    pub fn new() -> Self {
        Self {
            tasks: BTreeMap::new(),
        }
    }
}

impl Obs for TaskSizes {
    fn update(&mut self, record: &Record) -> Result<()> {
        let field = |column: &str| {
            record
                .get(column)
                .with_context(|| format!("missing {column:?}"))
        };
        let resp = field(conjoint::RESP_COLUMN)?.to_string();
        let task = field(conjoint::TASK_COLUMN)?.to_string();
        let chosen = match field(conjoint::CHOSEN_COLUMN)? {
            Value::Int(chosen) => *chosen,
            other => bail!("chosen flag {other:?} is not an integer"),
        };

        let (n_alts, n_chosen) = self.tasks.entry((resp, task)).or_default();
        *n_alts += 1;
        *n_chosen += chosen;
        Ok(())
    }

    fn report(&self) -> Result<(String, toml::Value)> {
        let mut hist = BTreeMap::<usize, i64>::new();
        for ((resp, task), &(n_alts, n_chosen)) in &self.tasks {
            if n_chosen != 1 {
                bail!("task {task} of {resp} has {n_chosen} chosen alternatives");
            }
            *hist.entry(n_alts).or_default() += 1;
        }

        let table: toml::Table = hist
            .into_iter()
            .map(|(n_alts, count)| (n_alts.to_string(), toml::Value::Integer(count)))
            .collect();
        Ok(("alternatives_per_task".to_string(), table.into()))
    }
}

/// Relative frequency of each value of a column.
pub struct Shares {
    column: String,
    filter: Option<Filter>,
    counts: BTreeMap<String, usize>,
    total: usize,
}

impl Shares {
    pub fn new(column: &str, filter: Option<Filter>) -> Self {
        Self {
            column: column.to_string(),
            filter,
            counts: BTreeMap::new(),
            total: 0,
        }
    }
}

impl Obs for Shares {
    fn update(&mut self, record: &Record) -> Result<()> {
        if !Filter::accepts(&self.filter, record) {
            return Ok(());
        }
        if let Some(val) = record.get(&self.column) {
            *self.counts.entry(val.to_string()).or_default() += 1;
            self.total += 1;
        }
        Ok(())
    }

    fn report(&self) -> Result<(String, toml::Value)> {
        let table: toml::Table = self
            .counts
            .iter()
            .map(|(key, &count)| {
                let share = count as f64 / self.total as f64;
                (key.clone(), toml::Value::Float(share))
            })
            .collect();
        Ok((format!("shares_{}", self.column), table.into()))
    }
}

/// Mean and standard deviation of a numeric column.
pub struct Moments {
    column: String,
    filter: Option<Filter>,
    acc: Accumulator,
}

impl Moments {
    pub fn new(column: &str, filter: Option<Filter>) -> Self {
        Self {
            column: column.to_string(),
            filter,
            acc: Accumulator::new(),
        }
    }
}

impl Obs for Moments {
    fn update(&mut self, record: &Record) -> Result<()> {
        if !Filter::accepts(&self.filter, record) {
            return Ok(());
        }
        if let Some(val) = record.get(&self.column).and_then(Value::as_f64) {
            self.acc.add(val);
        }
        Ok(())
    }

    fn report(&self) -> Result<(String, toml::Value)> {
        let report = toml::Value::try_from(self.acc.report()).context("failed to serialize")?;
        Ok((format!("moments_{}", self.column), report))
    }
}

/// R² of the least-squares line through the points of each group.
pub struct LinearFits {
    points: BTreeMap<String, (Vec<f64>, Vec<f64>)>,
}

impl LinearFits {
    pub fn new() -> Self {
        Self {
            points: BTreeMap::new(),
        }
    }
}

impl Obs for LinearFits {
    fn update(&mut self, record: &Record) -> Result<()> {
        let field = |column: &str| {
            record
                .get(column)
                .with_context(|| format!("missing {column:?}"))
        };
        let id = field(bivariate::RESOURCE_COLUMN)?.to_string();
        let x = field(bivariate::INPUT_COLUMN)?
            .as_f64()
            .context("input is not numeric")?;
        let y = field(bivariate::OUTPUT_COLUMN)?
            .as_f64()
            .context("output is not numeric")?;

        let (xs, ys) = self.points.entry(id).or_default();
        xs.push(x);
        ys.push(y);
        Ok(())
    }

    fn report(&self) -> Result<(String, toml::Value)> {
        let table: toml::Table = self
            .points
            .iter()
            .map(|(id, (xs, ys))| (id.clone(), toml::Value::Float(r_squared(xs, ys))))
            .collect();
        Ok(("r_squared".to_string(), table.into()))
    }
}

pub struct Analyzer {
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new(cfg: &Config) -> Self {
        let mut obs_ptr_vec: Vec<Box<dyn Obs>> = vec![Box::new(RowCount::new())];
        match cfg {
            Config::Conjoint(cfg) => {
                obs_ptr_vec.push(Box::new(DistinctCount::new(conjoint::RESP_COLUMN)));
                obs_ptr_vec.push(Box::new(TaskSizes::new()));
                obs_ptr_vec.push(Box::new(Shares::new(
                    conjoint::ALT_COLUMN,
                    Some(Filter::chosen()),
                )));
                let first_discrete = cfg.attributes.iter().find_map(|attr| match attr {
                    Attribute::Discrete(attr) => Some(&attr.name),
                    Attribute::Continuous(_) => None,
                });
                if let Some(name) = first_discrete {
                    obs_ptr_vec.push(Box::new(Shares::new(name, Some(Filter::chosen()))));
                }
                for attr in &cfg.attributes {
                    if let Attribute::Continuous(attr) = attr {
                        let obs = Moments::new(&attr.name, Some(Filter::chosen()));
                        obs_ptr_vec.push(Box::new(obs));
                    }
                }
            }
            Config::Multinomial(cfg) => {
                obs_ptr_vec.push(Box::new(Shares::new(&cfg.outcome_column, None)));
                for pred in &cfg.continuous {
                    obs_ptr_vec.push(Box::new(Moments::new(&pred.name, None)));
                }
            }
            Config::Bivariate(_) => {
                obs_ptr_vec.push(Box::new(DistinctCount::new(bivariate::RESOURCE_COLUMN)));
                obs_ptr_vec.push(Box::new(LinearFits::new()));
            }
        }
        Self { obs_ptr_vec }
    }

    pub fn add_dataset(&mut self, dataset: &Dataset) -> Result<()> {
        for record in dataset.records() {
            for obs in &mut self.obs_ptr_vec {
                obs.update(record).context("failed to update observable")?;
            }
        }
        Ok(())
    }

    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let dataset = Dataset::read_csv(file).with_context(|| format!("failed to read {file:?}"))?;
        self.add_dataset(&dataset)
    }

    pub fn results(&self) -> Result<toml::Table> {
        let mut table = toml::Table::new();
        for obs in &self.obs_ptr_vec {
            let (name, value) = obs.report().context("failed to report observable")?;
            log::info!("{name} = {value}");
            table.insert(name, value);
        }
        Ok(table)
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let text = toml::to_string_pretty(&self.results()?).context("failed to serialize results")?;
        fs::write(file, text).with_context(|| format!("failed to write {file:?}"))?;
        Ok(())
    }
}
