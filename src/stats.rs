//! Descriptive statistics over numeric columns of a filtered view.
//!
//! Variance and standard deviation use the sample convention (n − 1
//! denominator) everywhere. Degenerate input is an error, never NaN or
//! infinity: empty input is [`AnalyticsError::EmptyView`], too few
//! observations is [`AnalyticsError::InsufficientData`], and a zero divisor
//! is [`AnalyticsError::DivisionUndefined`].

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    aggregate::{self, AggregateTable, Reducer},
    columns::{Column, ColumnKind},
    data::Value,
    error::{AnalyticsError, Result},
    filter::FilteredView,
};

fn require_numeric(column: Column) -> Result<()> {
    if column.is_numeric() {
        Ok(())
    } else {
        Err(AnalyticsError::aggregation(format!(
            "'{column}' is not a numeric column"
        )))
    }
}

/// Sum of a numeric column; zero for an empty view.
pub fn total(view: &FilteredView<'_>, column: Column) -> Result<f64> {
    require_numeric(column)?;
    Ok(view.iter().filter_map(|t| t.numeric(column)).sum())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: Option<f64>,
}

/// The non-missing values of one numeric column (or one aggregate metric).
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSample {
    label: String,
    values: Vec<f64>,
}

impl ColumnSample {
    pub fn from_view(view: &FilteredView<'_>, column: Column) -> Result<Self> {
        require_numeric(column)?;
        Ok(Self {
            label: column.name().to_string(),
            values: view.iter().filter_map(|t| t.numeric(column)).collect(),
        })
    }

    pub fn from_table(table: &AggregateTable, by: usize) -> Result<Self> {
        let values = table.metric_values(by)?;
        Ok(Self {
            label: table.metric_names[by].clone(),
            values,
        })
    }

    pub fn from_values(label: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            values,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn non_empty(&self, statistic: &str) -> Result<()> {
        if self.values.is_empty() {
            Err(AnalyticsError::empty_view(format!(
                "the {statistic} of {}",
                self.label
            )))
        } else {
            Ok(())
        }
    }

    fn sorted(&self) -> Vec<f64> {
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);
        sorted
    }

    pub fn mean(&self) -> Result<f64> {
        self.non_empty("mean")?;
        Ok(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    pub fn median(&self) -> Result<f64> {
        self.non_empty("median")?;
        let sorted = self.sorted();
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Ok((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Ok(sorted[mid])
        }
    }

    /// Most frequent value; the smallest one when several tie.
    pub fn mode(&self) -> Result<f64> {
        self.non_empty("mode")?;
        let sorted = self.sorted();
        let mut best = (sorted[0], 0usize);
        for run in sorted.chunk_by(|a, b| a == b) {
            if run.len() > best.1 {
                best = (run[0], run.len());
            }
        }
        Ok(best.0)
    }

    /// Sample variance (n − 1 denominator).
    pub fn variance(&self) -> Result<f64> {
        let mean = self.mean()?;
        if self.values.len() < 2 {
            return Err(AnalyticsError::insufficient_data(format!(
                "the variance of {} needs at least 2 values, found {}",
                self.label,
                self.values.len()
            )));
        }
        if is_constant(self.values.iter().copied()) {
            return Ok(0.0);
        }
        let squares = self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
        Ok(squares / (self.values.len() - 1) as f64)
    }

    pub fn std_dev(&self) -> Result<f64> {
        self.variance().map(f64::sqrt)
    }

    /// Z-score of every value relative to this sample.
    pub fn z_scores(&self) -> Result<Vec<f64>> {
        let mean = self.mean()?;
        let std_dev = self.std_dev()?;
        self.values
            .iter()
            .map(|v| z_score(*v, mean, std_dev))
            .collect()
    }

    pub fn summary(&self) -> Result<Summary> {
        let sorted = self.sorted();
        let (Some(min), Some(max)) = (sorted.first(), sorted.last()) else {
            return Err(AnalyticsError::empty_view(format!(
                "a summary of {}",
                self.label
            )));
        };
        Ok(Summary {
            count: sorted.len(),
            min: *min,
            max: *max,
            mean: self.mean()?,
            median: self.median()?,
            std_dev: self.std_dev().ok(),
        })
    }
}

/// True when every value equals the first, so rounding in the mean
/// cannot leave a spurious spread.
fn is_constant(mut values: impl Iterator<Item = f64>) -> bool {
    match values.next() {
        Some(first) => values.all(|v| v == first),
        None => true,
    }
}

pub fn z_score(value: f64, mean: f64, std_dev: f64) -> Result<f64> {
    if std_dev == 0.0 || !std_dev.is_finite() {
        return Err(AnalyticsError::division_undefined(format!(
            "z-score with standard deviation {std_dev}"
        )));
    }
    Ok((value - mean) / std_dev)
}

fn pairs(view: &FilteredView<'_>, x: Column, y: Column) -> Result<Vec<(f64, f64)>> {
    require_numeric(x)?;
    require_numeric(y)?;
    Ok(view
        .iter()
        .filter_map(|t| Some((t.numeric(x)?, t.numeric(y)?)))
        .collect())
}

struct Moments {
    n: f64,
    mean_x: f64,
    mean_y: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
}

fn moments(pairs: &[(f64, f64)], what: &str) -> Result<Moments> {
    if pairs.len() < 2 {
        return Err(AnalyticsError::insufficient_data(format!(
            "{what} needs at least 2 paired observations, found {}",
            pairs.len()
        )));
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let constant_x = is_constant(pairs.iter().map(|p| p.0));
    let constant_y = is_constant(pairs.iter().map(|p| p.1));
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        let dx = if constant_x { 0.0 } else { x - mean_x };
        let dy = if constant_y { 0.0 } else { y - mean_y };
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    Ok(Moments {
        n,
        mean_x,
        mean_y,
        sxx,
        syy,
        sxy,
    })
}

/// Pearson correlation over rows where both columns have a value.
pub fn correlation(view: &FilteredView<'_>, a: Column, b: Column) -> Result<f64> {
    let pairs = pairs(view, a, b)?;
    let m = moments(&pairs, &format!("correlation of {a} and {b}"))?;
    if m.sxx == 0.0 || m.syy == 0.0 {
        return Err(AnalyticsError::division_undefined(format!(
            "correlation of {a} and {b} with a constant column"
        )));
    }
    Ok(m.sxy / (m.sxx * m.syy).sqrt())
}

/// Least-squares line `y = slope * x + intercept`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
    pub observations: usize,
}

impl LinearTrend {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

pub fn linear_trend(view: &FilteredView<'_>, x: Column, y: Column) -> Result<LinearTrend> {
    let pairs = pairs(view, x, y)?;
    let m = moments(&pairs, &format!("trend of {y} over {x}"))?;
    if m.sxx == 0.0 {
        return Err(AnalyticsError::division_undefined(format!(
            "trend over constant {x}"
        )));
    }
    let slope = m.sxy / m.sxx;
    Ok(LinearTrend {
        slope,
        intercept: m.mean_y - slope * m.mean_x,
        observations: m.n as usize,
    })
}

/// One day of one group's daily series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthPoint {
    pub group: Vec<Value>,
    pub date: NaiveDate,
    pub total: f64,
    /// Change from the group's previous day; `None` on its first day.
    pub growth: Option<f64>,
}

/// Day-over-day change of the summed metric, per group.
pub fn daily_growth(
    view: &FilteredView<'_>,
    group_by: &[Column],
    date_column: Column,
    metric: Column,
) -> Result<Vec<GrowthPoint>> {
    if date_column.kind() != ColumnKind::Date {
        return Err(AnalyticsError::aggregation(format!(
            "'{date_column}' is not a date column"
        )));
    }
    let keys = group_by
        .iter()
        .copied()
        .chain([date_column])
        .collect::<Vec<_>>();
    // Rows come back sorted by group, then date ascending.
    let daily = aggregate::group_reduce(view, &keys, metric, Reducer::Sum)?;

    let mut points: Vec<GrowthPoint> = Vec::with_capacity(daily.len());
    for row in daily.rows {
        let (group, date) = row.keys.split_at(group_by.len());
        let date = date
            .first()
            .and_then(Value::as_date)
            .ok_or_else(|| AnalyticsError::aggregation("daily key is not a date"))?;
        let growth = points
            .last()
            .filter(|previous| previous.group == group)
            .map(|previous| row.values[0] - previous.total);
        points.push(GrowthPoint {
            group: group.to_vec(),
            date,
            total: row.values[0],
            growth,
        });
    }
    Ok(points)
}

/// Net growth per group over the whole series, largest first. Groups with a
/// single day have no defined growth and are left out.
pub fn growth_by_group(points: &[GrowthPoint], group_names: &[&str]) -> Result<AggregateTable> {
    let mut table = AggregateTable::new(
        group_names.iter().map(|n| n.to_string()).collect(),
        vec!["sales_growth".to_string()],
    );
    for chunk in points.chunk_by(|a, b| a.group == b.group) {
        let defined = chunk.iter().filter_map(|p| p.growth).collect::<Vec<_>>();
        if defined.is_empty() {
            continue;
        }
        table.rows.push(aggregate::AggregateRow {
            keys: chunk[0].group.clone(),
            values: vec![defined.iter().sum()],
        });
    }
    aggregate::top_n(&table, table.len(), 0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Equal-width bins over `[min, max]`; the last bin includes `max`.
pub fn histogram(sample: &ColumnSample, bins: usize) -> Result<Vec<HistogramBin>> {
    if bins == 0 {
        return Err(AnalyticsError::insufficient_data("a histogram needs at least one bin"));
    }
    let summary = sample.summary()?;
    if summary.min == summary.max {
        return Ok(vec![HistogramBin {
            start: summary.min,
            end: summary.max,
            count: summary.count,
        }]);
    }
    let width = (summary.max - summary.min) / bins as f64;
    let mut result = (0..bins)
        .map(|i| HistogramBin {
            start: summary.min + width * i as f64,
            end: if i + 1 == bins {
                summary.max
            } else {
                summary.min + width * (i + 1) as f64
            },
            count: 0,
        })
        .collect::<Vec<_>>();
    for value in sample.values() {
        let idx = (((value - summary.min) / width) as usize).min(bins - 1);
        result[idx].count += 1;
    }
    Ok(result)
}
