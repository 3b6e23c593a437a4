//! Group-by and reduce over a filtered view.
//!
//! Groups are keyed by the distinct tuple of key values present in the view
//! and come out in ascending key order. The result therefore does not depend
//! on input row order, and "first encountered" means "smallest key" wherever
//! ties are broken.
//!
//! Null policy: a row with a missing key value is left out of the grouping,
//! and so is a row with a missing value for any requested numeric metric.
//! `count` counts the rows that remain. `nunique` ignores missing metric
//! values. No combination of keys is ever filled in.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use serde::Serialize;

use crate::{
    columns::Column,
    data::Value,
    error::{AnalyticsError, Result},
    filter::FilteredView,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Sum,
    Mean,
    Count,
    NUnique,
    Max,
    Min,
}

impl Reducer {
    pub fn name(self) -> &'static str {
        match self {
            Reducer::Sum => "sum",
            Reducer::Mean => "mean",
            Reducer::Count => "count",
            Reducer::NUnique => "nunique",
            Reducer::Max => "max",
            Reducer::Min => "min",
        }
    }

    pub fn requires_numeric(self) -> bool {
        matches!(
            self,
            Reducer::Sum | Reducer::Mean | Reducer::Max | Reducer::Min
        )
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Reducer {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(Reducer::Sum),
            "mean" | "avg" => Ok(Reducer::Mean),
            "count" => Ok(Reducer::Count),
            "nunique" => Ok(Reducer::NUnique),
            "max" => Ok(Reducer::Max),
            "min" => Ok(Reducer::Min),
            other => Err(format!("Unknown reducer '{other}'")),
        }
    }
}

/// One `(metric, reducer)` pair of an aggregation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Aggregation {
    pub metric: Column,
    pub reducer: Reducer,
}

impl Aggregation {
    pub fn new(metric: Column, reducer: Reducer) -> Self {
        Self { metric, reducer }
    }

    pub fn sum(metric: Column) -> Self {
        Self::new(metric, Reducer::Sum)
    }

    pub fn mean(metric: Column) -> Self {
        Self::new(metric, Reducer::Mean)
    }

    pub fn count(metric: Column) -> Self {
        Self::new(metric, Reducer::Count)
    }

    pub fn nunique(metric: Column) -> Self {
        Self::new(metric, Reducer::NUnique)
    }

    pub fn label(&self) -> String {
        format!("{}({})", self.reducer, self.metric)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub keys: Vec<Value>,
    pub values: Vec<f64>,
}

impl AggregateRow {
    /// The first reduced value.
    pub fn value(&self) -> f64 {
        self.values.first().copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateTable {
    pub key_names: Vec<String>,
    pub metric_names: Vec<String>,
    pub rows: Vec<AggregateRow>,
}

impl AggregateTable {
    pub fn new(key_names: Vec<String>, metric_names: Vec<String>) -> Self {
        Self {
            key_names,
            metric_names,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn metric_values(&self, by: usize) -> Result<Vec<f64>> {
        self.check_metric(by)?;
        Ok(self.rows.iter().map(|row| row.values[by]).collect())
    }

    pub fn total(&self, by: usize) -> Result<f64> {
        Ok(self.metric_values(by)?.into_iter().sum())
    }

    /// Prefixes every row with a constant key, e.g. to label a slice before
    /// appending it to another table.
    pub fn with_leading_key(mut self, name: &str, value: Value) -> Self {
        self.key_names.insert(0, name.to_string());
        for row in &mut self.rows {
            row.keys.insert(0, value.clone());
        }
        self
    }

    pub fn append(&mut self, other: AggregateTable) -> Result<()> {
        if self.key_names != other.key_names || self.metric_names != other.metric_names {
            return Err(AnalyticsError::aggregation(format!(
                "cannot append table keyed by [{}] to one keyed by [{}]",
                other.key_names.join(", "),
                self.key_names.join(", ")
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Adds `numerator / denominator` as a new metric column.
    pub fn with_ratio(mut self, numerator: usize, denominator: usize, name: &str) -> Result<Self> {
        self.check_metric(numerator)?;
        self.check_metric(denominator)?;
        for row in &mut self.rows {
            let divisor = row.values[denominator];
            if divisor == 0.0 {
                return Err(AnalyticsError::division_undefined(format!(
                    "{name} has a zero {} for group {}",
                    self.metric_names[denominator],
                    describe_keys(&row.keys)
                )));
            }
            row.values.push(row.values[numerator] / divisor);
        }
        self.metric_names.push(name.to_string());
        Ok(self)
    }

    /// Re-groups on a subset of key positions, reducing one metric again.
    pub fn regroup(&self, keys: &[usize], by: usize, reducer: Reducer) -> Result<AggregateTable> {
        self.check_metric(by)?;
        if let Some(bad) = keys.iter().find(|k| **k >= self.key_names.len()) {
            return Err(AnalyticsError::aggregation(format!(
                "key position {bad} out of range"
            )));
        }
        let mut groups: BTreeMap<Vec<Value>, Accumulator> = BTreeMap::new();
        for row in &self.rows {
            let key = keys.iter().map(|k| row.keys[*k].clone()).collect::<Vec<_>>();
            groups
                .entry(key)
                .or_insert_with(|| Accumulator::new(reducer))
                .push(Some(row.values[by]), Some(Value::Float(row.values[by])));
        }
        let mut table = AggregateTable::new(
            keys.iter().map(|k| self.key_names[*k].clone()).collect(),
            vec![format!("{reducer}({})", self.metric_names[by])],
        );
        table.rows = groups
            .into_iter()
            .map(|(keys, acc)| AggregateRow {
                keys,
                values: vec![acc.finish()],
            })
            .collect();
        Ok(table)
    }

    fn check_metric(&self, by: usize) -> Result<()> {
        if by < self.metric_names.len() {
            Ok(())
        } else {
            Err(AnalyticsError::aggregation(format!(
                "metric position {by} out of range for a table with {} metric(s)",
                self.metric_names.len()
            )))
        }
    }
}

fn describe_keys(keys: &[Value]) -> String {
    keys.iter()
        .map(Value::as_display)
        .collect::<Vec<_>>()
        .join(" / ")
}

#[derive(Debug, Clone)]
enum Accumulator {
    Sum(f64),
    Mean { sum: f64, count: usize },
    Count(usize),
    NUnique(BTreeSet<Value>),
    Max(f64),
    Min(f64),
}

impl Accumulator {
    fn new(reducer: Reducer) -> Self {
        match reducer {
            Reducer::Sum => Accumulator::Sum(0.0),
            Reducer::Mean => Accumulator::Mean { sum: 0.0, count: 0 },
            Reducer::Count => Accumulator::Count(0),
            Reducer::NUnique => Accumulator::NUnique(BTreeSet::new()),
            Reducer::Max => Accumulator::Max(f64::NEG_INFINITY),
            Reducer::Min => Accumulator::Min(f64::INFINITY),
        }
    }

    // Numeric accumulators only ever see rows whose metric is present.
    fn push(&mut self, numeric: Option<f64>, raw: Option<Value>) {
        match self {
            Accumulator::Sum(total) => *total += numeric.unwrap_or_default(),
            Accumulator::Mean { sum, count } => {
                *sum += numeric.unwrap_or_default();
                *count += 1;
            }
            Accumulator::Count(count) => *count += 1,
            Accumulator::NUnique(seen) => {
                if let Some(value) = raw {
                    seen.insert(value);
                }
            }
            Accumulator::Max(max) => {
                if let Some(v) = numeric {
                    *max = max.max(v);
                }
            }
            Accumulator::Min(min) => {
                if let Some(v) = numeric {
                    *min = min.min(v);
                }
            }
        }
    }

    fn finish(self) -> f64 {
        match self {
            Accumulator::Sum(total) => total,
            Accumulator::Mean { sum, count } => sum / count as f64,
            Accumulator::Count(count) => count as f64,
            Accumulator::NUnique(seen) => seen.len() as f64,
            Accumulator::Max(v) | Accumulator::Min(v) => v,
        }
    }
}

fn validate(view: &FilteredView<'_>, keys: &[Column], aggregations: &[Aggregation]) -> Result<()> {
    let columns = view.store().columns();
    for column in keys.iter().chain(aggregations.iter().map(|a| &a.metric)) {
        if !columns.contains(*column) {
            return Err(AnalyticsError::aggregation(format!(
                "column '{column}' is not present in the source"
            )));
        }
    }
    if aggregations.is_empty() {
        return Err(AnalyticsError::aggregation("no metrics requested"));
    }
    for aggregation in aggregations {
        if aggregation.reducer.requires_numeric() && !aggregation.metric.is_numeric() {
            return Err(AnalyticsError::aggregation(format!(
                "reducer '{}' requires a numeric column but '{}' is not numeric",
                aggregation.reducer, aggregation.metric
            )));
        }
    }
    Ok(())
}

/// Groups `view` by `keys` and reduces every requested metric in one pass.
pub fn group_aggregate(
    view: &FilteredView<'_>,
    keys: &[Column],
    aggregations: &[Aggregation],
) -> Result<AggregateTable> {
    validate(view, keys, aggregations)?;

    let mut groups: BTreeMap<Vec<Value>, Vec<Accumulator>> = BTreeMap::new();
    'rows: for transaction in view.iter() {
        let mut key = Vec::with_capacity(keys.len());
        for column in keys {
            match transaction.value(*column) {
                Some(value) => key.push(value),
                None => continue 'rows,
            }
        }
        let mut numerics = Vec::with_capacity(aggregations.len());
        for aggregation in aggregations {
            let numeric = transaction.numeric(aggregation.metric);
            if aggregation.reducer.requires_numeric() && numeric.is_none() {
                continue 'rows;
            }
            numerics.push(numeric);
        }
        let accumulators = groups.entry(key).or_insert_with(|| {
            aggregations
                .iter()
                .map(|a| Accumulator::new(a.reducer))
                .collect()
        });
        for ((accumulator, aggregation), numeric) in accumulators
            .iter_mut()
            .zip(aggregations)
            .zip(numerics)
        {
            let raw = if aggregation.reducer == Reducer::NUnique {
                transaction.value(aggregation.metric)
            } else {
                None
            };
            accumulator.push(numeric, raw);
        }
    }

    let mut table = AggregateTable::new(
        keys.iter().map(|c| c.name().to_string()).collect(),
        aggregations.iter().map(Aggregation::label).collect(),
    );
    table.rows = groups
        .into_iter()
        .map(|(keys, accumulators)| AggregateRow {
            keys,
            values: accumulators.into_iter().map(Accumulator::finish).collect(),
        })
        .collect();
    Ok(table)
}

pub fn group_reduce(
    view: &FilteredView<'_>,
    keys: &[Column],
    metric: Column,
    reducer: Reducer,
) -> Result<AggregateTable> {
    group_aggregate(view, keys, &[Aggregation::new(metric, reducer)])
}

/// The `n` largest groups by metric `by`, descending. Ties keep table order.
pub fn top_n(table: &AggregateTable, n: usize, by: usize) -> Result<AggregateTable> {
    table.check_metric(by)?;
    let mut rows = table.rows.clone();
    rows.sort_by(|a, b| b.values[by].total_cmp(&a.values[by]));
    rows.truncate(n);
    Ok(AggregateTable {
        key_names: table.key_names.clone(),
        metric_names: table.metric_names.clone(),
        rows,
    })
}

/// `top_n` applied separately within each value of the first key.
pub fn top_n_per_group(table: &AggregateTable, n: usize, by: usize) -> Result<AggregateTable> {
    table.check_metric(by)?;
    let mut result = AggregateTable::new(table.key_names.clone(), table.metric_names.clone());
    for chunk in table
        .rows
        .chunk_by(|a, b| a.keys.first() == b.keys.first())
    {
        let mut rows = chunk.to_vec();
        rows.sort_by(|a, b| b.values[by].total_cmp(&a.values[by]));
        rows.truncate(n);
        result.rows.extend(rows);
    }
    Ok(result)
}

/// The group with the largest value of metric `by`; the first one on ties.
pub fn idxmax_group(table: &AggregateTable, by: usize) -> Result<&AggregateRow> {
    table.check_metric(by)?;
    let mut best: Option<&AggregateRow> = None;
    for row in &table.rows {
        if best.is_none_or(|current| row.values[by] > current.values[by]) {
            best = Some(row);
        }
    }
    best.ok_or_else(|| {
        AnalyticsError::empty_view(format!(
            "the largest group by {}",
            table.metric_names[by]
        ))
    })
}

/// Each group's percentage of the metric total, appended as a new metric.
pub fn share_of_total(table: &AggregateTable, by: usize) -> Result<AggregateTable> {
    let total = table.total(by)?;
    if total == 0.0 {
        return Err(AnalyticsError::division_undefined(format!(
            "{} sums to zero",
            table.metric_names[by]
        )));
    }
    let mut result = table.clone();
    for row in &mut result.rows {
        row.values.push(row.values[by] / total * 100.0);
    }
    result.metric_names.push("percent_of_total".to_string());
    Ok(result)
}

/// A two-key table reshaped into rows × columns. Absent cells stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Matrix {
    pub row_name: String,
    pub column_name: String,
    pub metric_name: String,
    pub row_labels: Vec<Value>,
    pub column_labels: Vec<Value>,
    pub cells: Vec<Vec<Option<f64>>>,
}

impl Matrix {
    /// Reorders rows to `labels`, adding empty rows for labels with no data.
    pub fn reindex_rows(self, labels: Vec<Value>) -> Self {
        let mut by_label = self
            .row_labels
            .into_iter()
            .zip(self.cells)
            .collect::<BTreeMap<_, _>>();
        let width = self.column_labels.len();
        let cells = labels
            .iter()
            .map(|label| by_label.remove(label).unwrap_or_else(|| vec![None; width]))
            .collect();
        Self {
            row_labels: labels,
            cells,
            ..self
        }
    }

    pub fn cell(&self, row: &Value, column: &Value) -> Option<f64> {
        let r = self.row_labels.iter().position(|l| l == row)?;
        let c = self.column_labels.iter().position(|l| l == column)?;
        self.cells[r][c]
    }
}

pub fn pivot(table: &AggregateTable, row_key: usize, column_key: usize, by: usize) -> Result<Matrix> {
    table.check_metric(by)?;
    let key_count = table.key_names.len();
    if row_key >= key_count || column_key >= key_count || row_key == column_key {
        return Err(AnalyticsError::aggregation(format!(
            "pivot needs two distinct key positions below {key_count}"
        )));
    }
    let row_labels = table
        .rows
        .iter()
        .map(|r| r.keys[row_key].clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    let column_labels = table
        .rows
        .iter()
        .map(|r| r.keys[column_key].clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    let mut cells = vec![vec![None; column_labels.len()]; row_labels.len()];
    for row in &table.rows {
        // Labels were collected from these rows, so both lookups succeed.
        if let (Ok(r), Ok(c)) = (
            row_labels.binary_search(&row.keys[row_key]),
            column_labels.binary_search(&row.keys[column_key]),
        ) {
            let cell: &mut Option<f64> = &mut cells[r][c];
            *cell = Some(cell.unwrap_or_default() + row.values[by]);
        }
    }
    Ok(Matrix {
        row_name: table.key_names[row_key].clone(),
        column_name: table.key_names[column_key].clone(),
        metric_name: table.metric_names[by].clone(),
        row_labels,
        column_labels,
        cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{filter, store::LoadOptions, store::RecordStore};

    const SAMPLE: &str = "\
transaction_date,transaction_time,transaction_qty,unit_price,store_location,product_id,product_category
2023-01-01,07:00:00,2,3.0,Astoria,1,Coffee
2023-01-01,08:30:00,1,5.0,Astoria,2,Tea
2023-01-02,07:15:00,4,1.0,Astoria,1,Coffee
2023-01-02,09:00:00,3,2.0,Hell's Kitchen,3,Bakery
2023-01-03,,1,4.0,Hell's Kitchen,3,Tea
";

    fn store() -> RecordStore {
        RecordStore::from_reader(SAMPLE.as_bytes(), &LoadOptions::default()).unwrap()
    }

    fn keys(table: &AggregateTable) -> Vec<String> {
        table
            .rows
            .iter()
            .map(|r| describe_keys(&r.keys))
            .collect()
    }

    #[test]
    fn sums_per_group_in_key_order() {
        let store = store();
        let view = FilteredView::all(&store);
        let table =
            group_reduce(&view, &[Column::ProductCategory], Column::TransactionQty, Reducer::Sum)
                .unwrap();
        assert_eq!(keys(&table), vec!["Bakery", "Coffee", "Tea"]);
        assert_eq!(table.metric_values(0).unwrap(), vec![3.0, 6.0, 2.0]);
        assert_eq!(table.metric_names, vec!["sum(transaction_qty)"]);
    }

    #[test]
    fn numeric_reducers_reject_text_metrics() {
        let store = store();
        let view = FilteredView::all(&store);
        let err = group_reduce(&view, &[Column::StoreLocation], Column::ProductCategory, Reducer::Mean)
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::Aggregation(_)));
        let counted =
            group_reduce(&view, &[Column::StoreLocation], Column::ProductCategory, Reducer::NUnique)
                .unwrap();
        assert_eq!(counted.metric_values(0).unwrap(), vec![2.0, 2.0]);
    }

    #[test]
    fn rows_with_missing_keys_are_left_out() {
        let store = store();
        let view = FilteredView::all(&store);
        let hourly =
            group_reduce(&view, &[Column::Hour], Column::TransactionQty, Reducer::Count).unwrap();
        assert_eq!(hourly.total(0).unwrap(), 4.0);
        assert_eq!(keys(&hourly), vec!["7", "8", "9"]);
    }

    #[test]
    fn multiple_metrics_share_one_pass() {
        let store = store();
        let view = FilteredView::all(&store);
        let table = group_aggregate(
            &view,
            &[Column::StoreLocation],
            &[
                Aggregation::sum(Column::Revenue),
                Aggregation::mean(Column::TransactionQty),
                Aggregation::new(Column::UnitPrice, Reducer::Max),
                Aggregation::new(Column::UnitPrice, Reducer::Min),
            ],
        )
        .unwrap();
        assert_eq!(table.rows[0].values, vec![15.0, 7.0 / 3.0, 5.0, 1.0]);
        assert_eq!(table.rows[1].values, vec![10.0, 2.0, 4.0, 2.0]);
    }

    #[test]
    fn empty_key_list_yields_one_overall_group() {
        let store = store();
        let view = FilteredView::all(&store);
        let table = group_reduce(&view, &[], Column::TransactionQty, Reducer::Sum).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].value(), 11.0);
    }

    #[test]
    fn idxmax_fails_on_empty_views() {
        let store = store();
        let empty = filter::apply(
            &store,
            &filter::FilterCriteria::new().with_categories(Vec::<String>::new()),
        );
        let table =
            group_reduce(&empty, &[Column::ProductCategory], Column::TransactionQty, Reducer::Sum)
                .unwrap();
        assert!(table.is_empty());
        assert!(matches!(
            idxmax_group(&table, 0),
            Err(AnalyticsError::EmptyView(_))
        ));
    }

    #[test]
    fn top_n_is_stable_and_tolerates_large_n() {
        let mut table = AggregateTable::new(vec!["k".into()], vec!["v".into()]);
        for (key, value) in [("a", 1.0), ("b", 3.0), ("c", 2.0), ("d", 2.0), ("e", 2.0)] {
            table.rows.push(AggregateRow {
                keys: vec![Value::text(key)],
                values: vec![value],
            });
        }
        assert_eq!(keys(&top_n(&table, 3, 0).unwrap()), vec!["b", "c", "d"]);
        assert_eq!(top_n(&table, 50, 0).unwrap().len(), 5);
        assert!(top_n(&table, 1, 3).is_err());
        assert_eq!(idxmax_group(&table, 0).unwrap().keys, vec![Value::text("b")]);
    }

    #[test]
    fn top_n_per_group_restarts_for_each_leading_key() {
        let store = store();
        let view = FilteredView::all(&store);
        let table = group_reduce(
            &view,
            &[Column::StoreLocation, Column::ProductCategory],
            Column::TransactionQty,
            Reducer::Sum,
        )
        .unwrap();
        let top = top_n_per_group(&table, 1, 0).unwrap();
        assert_eq!(keys(&top), vec!["Astoria / Coffee", "Hell's Kitchen / Bakery"]);
    }

    #[test]
    fn share_of_total_appends_percentages() {
        let store = store();
        let view = FilteredView::all(&store);
        let table =
            group_reduce(&view, &[Column::StoreLocation], Column::TransactionQty, Reducer::Sum)
                .unwrap();
        let shares = share_of_total(&table, 0).unwrap();
        let percents = shares.metric_values(1).unwrap();
        assert!((percents[0] - 7.0 / 11.0 * 100.0).abs() < 1e-9);
        assert!((percents.iter().sum::<f64>() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn regroup_averages_daily_counts_per_location() {
        let store = store();
        let view = FilteredView::all(&store);
        let daily = group_reduce(
            &view,
            &[Column::TransactionDate, Column::StoreLocation],
            Column::ProductId,
            Reducer::NUnique,
        )
        .unwrap();
        let averaged = daily.regroup(&[1], 0, Reducer::Mean).unwrap();
        assert_eq!(keys(&averaged), vec!["Astoria", "Hell's Kitchen"]);
        assert_eq!(averaged.metric_values(0).unwrap(), vec![1.5, 1.0]);
    }

    #[test]
    fn pivot_leaves_missing_cells_empty() {
        let store = store();
        let view = FilteredView::all(&store);
        let table = group_reduce(
            &view,
            &[Column::StoreLocation, Column::ProductCategory],
            Column::TransactionQty,
            Reducer::Sum,
        )
        .unwrap();
        let matrix = pivot(&table, 0, 1, 0).unwrap();
        let astoria = Value::text("Astoria");
        assert_eq!(matrix.cell(&astoria, &Value::text("Coffee")), Some(6.0));
        assert_eq!(matrix.cell(&astoria, &Value::text("Bakery")), None);

        let reindexed = matrix.reindex_rows(vec![Value::text("Bushwick"), astoria.clone()]);
        assert_eq!(reindexed.cells[0], vec![None, None, None]);
        assert_eq!(reindexed.cell(&astoria, &Value::text("Tea")), Some(1.0));
    }

    #[test]
    fn ratio_of_metrics_guards_zero_denominators() {
        let mut table = AggregateTable::new(vec!["k".into()], vec!["a".into(), "b".into()]);
        table.rows.push(AggregateRow {
            keys: vec![Value::text("x")],
            values: vec![6.0, 3.0],
        });
        let with_ratio = table.clone().with_ratio(0, 1, "a_per_b").unwrap();
        assert_eq!(with_ratio.rows[0].values, vec![6.0, 3.0, 2.0]);
        table.rows[0].values[1] = 0.0;
        assert!(matches!(
            table.with_ratio(0, 1, "a_per_b"),
            Err(AnalyticsError::DivisionUndefined(_))
        ));
    }
}
