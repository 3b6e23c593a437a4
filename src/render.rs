//! Text and JSON presentation of assembled page results.

use std::fmt::Write as _;

use anyhow::{Context, Result};

use crate::{
    aggregate::{AggregateTable, Matrix},
    data::{Value, format_number},
    stats::{GrowthPoint, HistogramBin, LinearTrend},
    table::render_table,
    views::{Metric, ResultSet, ResultValue, ViewOutcome},
};

const MISSING_CELL: &str = "-";

pub fn render_json(results: &ResultSet) -> Result<String> {
    serde_json::to_string_pretty(results).context("Serializing page results to JSON")
}

pub fn render_text(results: &ResultSet) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "# {} ({} row(s) in view, {} dropped at load)",
        results.page.title(),
        results.rows_in_view,
        results.dropped_rows
    );
    for view in &results.views {
        let _ = writeln!(output);
        match &view.outcome {
            ViewOutcome::Ready(value) => {
                let _ = writeln!(output, "## {}", view.title);
                output.push_str(&render_value(value));
            }
            ViewOutcome::Unavailable(reason) => {
                let _ = writeln!(output, "## {}: {reason}", view.title);
            }
        }
    }
    if !results.diagnostics.is_empty() {
        let _ = writeln!(output, "\nDiagnostics:");
        for diagnostic in &results.diagnostics {
            let _ = writeln!(output, "- {}: {}", diagnostic.view, diagnostic.message);
        }
    }
    output
}

pub fn render_value(value: &ResultValue) -> String {
    match value {
        ResultValue::Scalar(v) => format!("{}\n", format_number(*v)),
        ResultValue::Highlight { label, value } => {
            format!("{label} ({})\n", format_number(*value))
        }
        ResultValue::Table(table) => aggregate_table(table),
        ResultValue::Matrix(matrix) => matrix_table(matrix),
        ResultValue::Metrics(metrics) => metric_table(metrics),
        ResultValue::Growth(points) => growth_table(points),
        ResultValue::Trend(trend) => trend_line(trend),
        ResultValue::Histogram(bins) => histogram_table(bins),
    }
}

fn with_empty_note(rendered: String, is_empty: bool) -> String {
    if is_empty {
        format!("{rendered}(no rows)\n")
    } else {
        rendered
    }
}

fn aggregate_table(table: &AggregateTable) -> String {
    let headers = table
        .key_names
        .iter()
        .chain(&table.metric_names)
        .cloned()
        .collect::<Vec<_>>();
    let rows = table
        .rows
        .iter()
        .map(|row| {
            row.keys
                .iter()
                .map(Value::as_display)
                .chain(row.values.iter().map(|v| format_number(*v)))
                .collect()
        })
        .collect::<Vec<_>>();
    with_empty_note(render_table(&headers, &rows), table.is_empty())
}

fn matrix_table(matrix: &Matrix) -> String {
    let headers = std::iter::once(format!("{} \\ {}", matrix.row_name, matrix.column_name))
        .chain(matrix.column_labels.iter().map(Value::as_display))
        .collect::<Vec<_>>();
    let rows = matrix
        .row_labels
        .iter()
        .zip(&matrix.cells)
        .map(|(label, cells)| {
            std::iter::once(label.as_display())
                .chain(cells.iter().map(|cell| {
                    cell.map(format_number)
                        .unwrap_or_else(|| MISSING_CELL.to_string())
                }))
                .collect()
        })
        .collect::<Vec<_>>();
    with_empty_note(render_table(&headers, &rows), matrix.row_labels.is_empty())
}

fn metric_table(metrics: &[Metric]) -> String {
    let headers = vec!["statistic".to_string(), "value".to_string()];
    let rows = metrics
        .iter()
        .map(|metric| vec![metric.name.clone(), format_number(metric.value)])
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}

fn growth_table(points: &[GrowthPoint]) -> String {
    let headers = ["group", "date", "total", "growth"].map(String::from).to_vec();
    let rows = points
        .iter()
        .map(|point| {
            vec![
                point
                    .group
                    .iter()
                    .map(Value::as_display)
                    .collect::<Vec<_>>()
                    .join(" / "),
                point.date.format("%Y-%m-%d").to_string(),
                format_number(point.total),
                point
                    .growth
                    .map(format_number)
                    .unwrap_or_else(|| MISSING_CELL.to_string()),
            ]
        })
        .collect::<Vec<_>>();
    with_empty_note(render_table(&headers, &rows), points.is_empty())
}

fn trend_line(trend: &LinearTrend) -> String {
    format!(
        "slope {}, intercept {} over {} observation(s)\n",
        format_number(trend.slope),
        format_number(trend.intercept),
        trend.observations
    )
}

fn histogram_table(bins: &[HistogramBin]) -> String {
    let headers = ["from", "to", "count"].map(String::from).to_vec();
    let rows = bins
        .iter()
        .map(|bin| {
            vec![
                format_number(bin.start),
                format_number(bin.end),
                bin.count.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}
