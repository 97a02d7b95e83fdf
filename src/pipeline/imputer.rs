//! Deterministic imputation by cross-column inference
//!
//! Missing demographic and placement fields are recovered from related keys:
//! a user's other impressions reveal their gender, a campaign always runs on
//! the same webpage, and so on. Each rule only fills nulls, so repeating the
//! ordered rule set until a pass fills nothing reaches a fixed point; the pass
//! cap bounds rule sets that would otherwise keep cascading.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use polars::prelude::*;
use tracing::{debug, info};

use super::schema::*;
use super::values::{column_to_string_vec, write_string_cells};

/// Default ceiling on full passes over the rule set.
pub const DEFAULT_MAX_PASSES: usize = 10;

/// Restricts which rows may contribute to a rule's mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum RowFilter {
    Equals { column: String, value: String },
    NotEquals { column: String, value: String },
}

impl RowFilter {
    fn column(&self) -> &str {
        match self {
            RowFilter::Equals { column, .. } | RowFilter::NotEquals { column, .. } => column,
        }
    }

    fn admits(&self, cell: Option<&str>) -> bool {
        match self {
            RowFilter::Equals { value, .. } => cell == Some(value.as_str()),
            // A null never equals the excluded value.
            RowFilter::NotEquals { value, .. } => cell != Some(value.as_str()),
        }
    }
}

/// Fill `target` from a mapping keyed by one or more columns.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRule {
    pub target: String,
    pub keys: Vec<String>,
    pub filter: Option<RowFilter>,
}

impl InferenceRule {
    pub fn by_key(target: &str, key: &str) -> Self {
        Self {
            target: target.to_string(),
            keys: vec![key.to_string()],
            filter: None,
        }
    }

    /// Composite-key variant, e.g. user group from (age, gender).
    pub fn by_keys(target: &str, keys: &[&str]) -> Self {
        Self {
            target: target.to_string(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            filter: None,
        }
    }

    /// Only rows where `column == value` build the mapping.
    pub fn only_where(mut self, column: &str, value: impl ToString) -> Self {
        self.filter = Some(RowFilter::Equals {
            column: column.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Rows where `column == value` are left out of the mapping.
    pub fn excluding(mut self, column: &str, value: impl ToString) -> Self {
        self.filter = Some(RowFilter::NotEquals {
            column: column.to_string(),
            value: value.to_string(),
        });
        self
    }
}

/// Within each group, a column holding exactly one distinct non-null value
/// fills its nulls with that value.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusRule {
    pub group: String,
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Infer(InferenceRule),
    Consensus(ConsensusRule),
}

impl Rule {
    pub fn describe(&self) -> String {
        match self {
            Rule::Infer(r) => {
                let mut s = format!("{} <- {}", r.target, r.keys.join("+"));
                match &r.filter {
                    Some(RowFilter::Equals { column, value }) => {
                        s.push_str(&format!(" [{} == {}]", column, value))
                    }
                    Some(RowFilter::NotEquals { column, value }) => {
                        s.push_str(&format!(" [{} != {}]", column, value))
                    }
                    None => {}
                }
                s
            }
            Rule::Consensus(r) => format!("consensus within {}", r.group),
        }
    }

    fn columns(&self) -> Vec<&str> {
        match self {
            Rule::Infer(r) => {
                let mut cols = vec![r.target.as_str()];
                cols.extend(r.keys.iter().map(String::as_str));
                if let Some(f) = &r.filter {
                    cols.push(f.column());
                }
                cols
            }
            Rule::Consensus(r) => {
                let mut cols = vec![r.group.as_str()];
                cols.extend(r.targets.iter().map(String::as_str));
                cols
            }
        }
    }
}

impl From<InferenceRule> for Rule {
    fn from(rule: InferenceRule) -> Self {
        Rule::Infer(rule)
    }
}

impl From<ConsensusRule> for Rule {
    fn from(rule: ConsensusRule) -> Self {
        Rule::Consensus(rule)
    }
}

/// The rule chain for the impression log.
pub fn click_log_rules() -> Vec<Rule> {
    let mut rules: Vec<Rule> = [
        USER_GROUP_ID,
        GENDER,
        AGE_LEVEL,
        CITY_DEVELOPMENT_INDEX,
        USER_DEPTH,
    ]
    .iter()
    .map(|col| InferenceRule::by_key(col, USER_ID).into())
    .collect();

    let chained: Vec<Rule> = vec![
        InferenceRule::by_key(WEBPAGE_ID, CAMPAIGN_ID).into(),
        InferenceRule::by_key(PRODUCT_CATEGORY_1, CAMPAIGN_ID)
            .only_where(CAMPAIGN_ID, 396664)
            .into(),
        InferenceRule::by_key(CAMPAIGN_ID, WEBPAGE_ID)
            .excluding(WEBPAGE_ID, 13787)
            .into(),
        InferenceRule::by_key(PRODUCT_CATEGORY_1, WEBPAGE_ID)
            .only_where(WEBPAGE_ID, 51181)
            .into(),
        InferenceRule::by_key(GENDER, USER_GROUP_ID)
            .excluding(USER_GROUP_ID, 0)
            .into(),
        InferenceRule::by_key(AGE_LEVEL, USER_GROUP_ID).into(),
        InferenceRule::by_key(USER_GROUP_ID, AGE_LEVEL)
            .only_where(AGE_LEVEL, 0)
            .into(),
        InferenceRule::by_keys(USER_GROUP_ID, &[AGE_LEVEL, GENDER]).into(),
        ConsensusRule {
            group: PRODUCT_CATEGORY_2.to_string(),
            targets: [
                DATE_TIME,
                USER_ID,
                PRODUCT,
                CAMPAIGN_ID,
                WEBPAGE_ID,
                PRODUCT_CATEGORY_1,
                USER_GROUP_ID,
                GENDER,
                AGE_LEVEL,
                USER_DEPTH,
                CITY_DEVELOPMENT_INDEX,
                VAR_1,
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        }
        .into(),
    ];

    rules.extend(chained);
    rules
}

/// Outcome of one imputer run.
#[derive(Debug, Clone, Default)]
pub struct ImputeReport {
    /// Full passes executed, including the final no-change pass.
    pub passes: usize,
    /// Whether a pass filled nothing before the cap was hit.
    pub converged: bool,
    /// Cells filled by each rule, summed over passes, in rule order.
    pub fills_per_rule: Vec<(String, usize)>,
}

impl ImputeReport {
    pub fn total_fills(&self) -> usize {
        self.fills_per_rule.iter().map(|(_, n)| n).sum()
    }
}

/// Fixed-point rule engine.
#[derive(Debug, Clone)]
pub struct DeterministicImputer {
    rules: Vec<Rule>,
    max_passes: usize,
}

impl Default for DeterministicImputer {
    fn default() -> Self {
        Self::new(click_log_rules())
    }
}

impl DeterministicImputer {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    /// Run the rule set to a fixed point and return the filled table.
    pub fn run(&self, df: &DataFrame) -> Result<(DataFrame, ImputeReport)> {
        let present: HashSet<String> = df
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect();

        let active: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|rule| {
                let missing: Vec<&str> = rule
                    .columns()
                    .into_iter()
                    .filter(|c| !present.contains(*c))
                    .collect();
                if !missing.is_empty() {
                    debug!(rule = %rule.describe(), ?missing, "skipping rule, columns absent");
                }
                missing.is_empty()
            })
            .collect();

        let mut grid = CellGrid::from_frame(df, &active)?;
        let mut report = ImputeReport {
            fills_per_rule: active.iter().map(|r| (r.describe(), 0)).collect(),
            ..Default::default()
        };

        while report.passes < self.max_passes {
            report.passes += 1;
            let mut filled_this_pass = 0;

            for (i, rule) in active.iter().enumerate() {
                let filled = match rule {
                    Rule::Infer(r) => grid.apply_inference(r),
                    Rule::Consensus(r) => grid.apply_consensus(r),
                };
                report.fills_per_rule[i].1 += filled;
                filled_this_pass += filled;
            }

            debug!(pass = report.passes, filled = filled_this_pass, "imputer pass");
            if filled_this_pass == 0 {
                report.converged = true;
                break;
            }
        }

        info!(
            passes = report.passes,
            converged = report.converged,
            filled = report.total_fills(),
            "deterministic imputation finished"
        );

        let mut out = df.clone();
        grid.write_into(&mut out)?;
        Ok((out, report))
    }
}

/// Convenience wrapper: run `rules` to a fixed point with the default cap.
pub fn infer(df: &DataFrame, rules: Vec<Rule>) -> Result<DataFrame> {
    Ok(DeterministicImputer::new(rules).run(df)?.0)
}

/// Working copy of the columns the active rules touch.
struct CellGrid {
    columns: HashMap<String, Vec<Option<String>>>,
    touched: HashSet<String>,
}

impl CellGrid {
    fn from_frame(df: &DataFrame, rules: &[&Rule]) -> Result<Self> {
        let mut columns = HashMap::new();
        for rule in rules {
            for name in rule.columns() {
                if !columns.contains_key(name) {
                    columns.insert(name.to_string(), column_to_string_vec(df.column(name)?)?);
                }
            }
        }
        Ok(Self {
            columns,
            touched: HashSet::new(),
        })
    }

    fn composite_key(&self, keys: &[String], row: usize) -> Option<String> {
        let mut parts = Vec::with_capacity(keys.len());
        for key in keys {
            parts.push(self.columns[key][row].as_deref()?);
        }
        Some(parts.join("\u{1f}"))
    }

    fn apply_inference(&mut self, rule: &InferenceRule) -> usize {
        let height = self.columns[&rule.target].len();

        let mut mapping: HashMap<String, String> = HashMap::new();
        for row in 0..height {
            let Some(value) = self.columns[&rule.target][row].as_ref() else {
                continue;
            };
            if let Some(filter) = &rule.filter {
                if !filter.admits(self.columns[filter.column()][row].as_deref()) {
                    continue;
                }
            }
            if let Some(key) = self.composite_key(&rule.keys, row) {
                mapping.entry(key).or_insert_with(|| value.clone());
            }
        }

        if mapping.is_empty() {
            return 0;
        }

        let fills: Vec<(usize, String)> = (0..height)
            .filter(|&row| self.columns[&rule.target][row].is_none())
            .filter_map(|row| {
                let key = self.composite_key(&rule.keys, row)?;
                mapping.get(&key).map(|v| (row, v.clone()))
            })
            .collect();

        self.fill(&rule.target, fills)
    }

    fn apply_consensus(&mut self, rule: &ConsensusRule) -> usize {
        let mut filled = 0;
        for target in &rule.targets {
            if *target == rule.group {
                continue;
            }
            let groups = &self.columns[&rule.group];
            let values = &self.columns[target];

            // None marks a group with conflicting values.
            let mut single: HashMap<&str, Option<&str>> = HashMap::new();
            for (g, v) in groups.iter().zip(values.iter()) {
                if let (Some(g), Some(v)) = (g, v) {
                    single
                        .entry(g.as_str())
                        .and_modify(|seen| {
                            if *seen != Some(v.as_str()) {
                                *seen = None;
                            }
                        })
                        .or_insert(Some(v.as_str()));
                }
            }

            let fills: Vec<(usize, String)> = groups
                .iter()
                .zip(values.iter())
                .enumerate()
                .filter(|(_, (_, v))| v.is_none())
                .filter_map(|(row, (g, _))| {
                    let value = (*single.get(g.as_deref()?)?)?;
                    Some((row, value.to_string()))
                })
                .collect();

            filled += self.fill(target, fills);
        }
        filled
    }

    fn fill(&mut self, target: &str, fills: Vec<(usize, String)>) -> usize {
        if fills.is_empty() {
            return 0;
        }
        let n = fills.len();
        if let Some(cells) = self.columns.get_mut(target) {
            for (row, value) in fills {
                cells[row] = Some(value);
            }
        }
        self.touched.insert(target.to_string());
        n
    }

    fn write_into(self, df: &mut DataFrame) -> Result<()> {
        let mut columns = self.columns;
        for name in &self.touched {
            if let Some(cells) = columns.remove(name) {
                write_string_cells(df, name, cells)?;
            }
        }
        Ok(())
    }
}
