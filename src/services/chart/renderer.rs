//! Runs a chart query and draws the result to a PNG under the media root.

use plotters::element::Pie;
use plotters::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};

use crate::api::middleware::AppError;
use crate::models::{ChartRender, PlotType, QueryResult};
use crate::services::database::DatabaseAdapter;
use crate::services::query_service::QueryService;
use crate::validation::SqlValidator;

const IMAGE_SIZE: (u32, u32) = (1200, 600);
const TABLE_ROWS: usize = 20;
const MAX_X_LABELS: usize = 30;

const PALETTE: [RGBColor; 8] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
];

/// Drawable data for one plot kind
#[derive(Debug, Clone, PartialEq)]
pub enum PlotData {
    Bar { labels: Vec<String>, values: Vec<f64> },
    Line { series: Vec<(String, Vec<f64>)> },
    Pie { labels: Vec<String>, values: Vec<f64> },
    Scatter { x_label: String, y_label: String, points: Vec<(f64, f64)> },
    Table { columns: Vec<String>, rows: Vec<Vec<String>> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plot {
    pub title: String,
    pub data: PlotData,
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn number_label(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}

/// Columns whose non-null cells are all JSON numbers (and at least one is)
fn numeric_columns(result: &QueryResult) -> Vec<usize> {
    (0..result.columns.len())
        .filter(|&idx| {
            let values = result.column_values(idx);
            values.iter().any(Value::is_number)
                && values.iter().all(|v| v.is_number() || v.is_null())
        })
        .collect()
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn numbers(result: &QueryResult, idx: usize) -> Vec<f64> {
    result
        .column_values(idx)
        .iter()
        .map(|v| as_f64(v).unwrap_or(0.0))
        .collect()
}

fn no_numeric_data() -> AppError {
    AppError::Chart("no numeric data to plot".to_string())
}

fn shape_bar(result: &QueryResult, numeric: &[usize]) -> Result<Plot, AppError> {
    let category = (0..result.columns.len()).find(|idx| !numeric.contains(idx));

    match (category, numeric.first()) {
        (Some(cat), Some(&num)) => {
            // Summed per label, labels in sorted order
            let mut totals: BTreeMap<String, f64> = BTreeMap::new();
            for row in &result.rows {
                let label = row.get(cat).map(cell_text).unwrap_or_default();
                let value = row.get(num).and_then(as_f64).unwrap_or(0.0);
                *totals.entry(label).or_insert(0.0) += value;
            }
            let (labels, values) = totals.into_iter().unzip();
            Ok(Plot {
                title: format!("{} by {}", result.columns[num], result.columns[cat]),
                data: PlotData::Bar { labels, values },
            })
        }
        _ if numeric.len() >= 2 => {
            let labels = numbers(result, numeric[0]).into_iter().map(number_label).collect();
            Ok(Plot {
                title: format!("{} by {}", result.columns[numeric[1]], result.columns[numeric[0]]),
                data: PlotData::Bar {
                    labels,
                    values: numbers(result, numeric[1]),
                },
            })
        }
        (_, Some(&num)) => Ok(Plot {
            title: result.columns[num].clone(),
            data: PlotData::Bar {
                labels: (0..result.rows.len()).map(|i| i.to_string()).collect(),
                values: numbers(result, num),
            },
        }),
        (_, None) => Err(no_numeric_data()),
    }
}

fn shape_line(result: &QueryResult, numeric: &[usize]) -> Result<Plot, AppError> {
    if numeric.is_empty() {
        return Err(no_numeric_data());
    }
    let series = numeric
        .iter()
        .map(|&idx| (result.columns[idx].clone(), numbers(result, idx)))
        .collect::<Vec<_>>();
    Ok(Plot {
        title: series.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>().join(", "),
        data: PlotData::Line { series },
    })
}

fn shape_pie(result: &QueryResult, numeric: &[usize]) -> Result<Plot, AppError> {
    let (title, labels, values): (String, Vec<String>, Vec<f64>) = match numeric.first() {
        Some(&num) => (
            result.columns[num].clone(),
            result.column_values(0).iter().map(cell_text).collect(),
            numbers(result, num),
        ),
        None => {
            // Value counts of the second column, or the first when alone
            let idx = if result.columns.len() >= 2 { 1 } else { 0 };
            let mut counts: Vec<(String, f64)> = Vec::new();
            for value in result.column_values(idx) {
                let label = cell_text(&value);
                match counts.iter_mut().find(|(l, _)| *l == label) {
                    Some((_, count)) => *count += 1.0,
                    None => counts.push((label, 1.0)),
                }
            }
            counts.sort_by(|a, b| b.1.total_cmp(&a.1));
            let (labels, values) = counts.into_iter().unzip();
            (result.columns[idx].clone(), labels, values)
        }
    };

    if values.iter().any(|v| *v < 0.0) {
        return Err(AppError::Chart("pie values must be non-negative".to_string()));
    }
    if values.iter().sum::<f64>() <= 0.0 {
        return Err(no_numeric_data());
    }
    Ok(Plot {
        title,
        data: PlotData::Pie { labels, values },
    })
}

fn shape_scatter(result: &QueryResult, numeric: &[usize]) -> Result<Plot, AppError> {
    let (x, y) = if numeric.len() >= 2 {
        (numeric[0], numeric[1])
    } else if result.columns.len() >= 2 {
        (0, 1)
    } else {
        return shape_bar(result, numeric);
    };

    let points: Vec<(f64, f64)> = result
        .rows
        .iter()
        .filter_map(|row| Some((as_f64(row.get(x)?)?, as_f64(row.get(y)?)?)))
        .collect();
    if points.is_empty() {
        // Columns that do not coerce to numbers fall back to bars
        return shape_bar(result, numeric);
    }

    Ok(Plot {
        title: format!("{} vs {}", result.columns[y], result.columns[x]),
        data: PlotData::Scatter {
            x_label: result.columns[x].clone(),
            y_label: result.columns[y].clone(),
            points,
        },
    })
}

fn shape_table(result: &QueryResult) -> Plot {
    Plot {
        title: String::new(),
        data: PlotData::Table {
            columns: result.columns.clone(),
            rows: result
                .rows
                .iter()
                .take(TABLE_ROWS)
                .map(|row| row.iter().map(cell_text).collect())
                .collect(),
        },
    }
}

/// Arrange query rows for the requested plot kind
pub fn shape(plot_type: PlotType, result: &QueryResult) -> Result<Plot, AppError> {
    let numeric = numeric_columns(result);
    match plot_type {
        PlotType::Bar => shape_bar(result, &numeric),
        PlotType::Line => shape_line(result, &numeric),
        PlotType::Pie => shape_pie(result, &numeric),
        PlotType::Scatter => shape_scatter(result, &numeric),
        PlotType::Table => Ok(shape_table(result)),
    }
}

fn value_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (mut lo, mut hi) = values.fold((0f64, 0f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if (hi - lo).abs() < f64::EPSILON {
        hi = lo + 1.0;
    }
    let pad = (hi - lo) * 0.1;
    if lo < 0.0 {
        lo -= pad;
    }
    (lo, hi + pad)
}

fn span(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let lo = values.clone().fold(f64::INFINITY, f64::min);
    let hi = values.fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(0.5);
    (lo - pad, hi + pad)
}

fn draw_bar(path: &Path, title: &str, labels: &[String], values: &[f64]) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, IMAGE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let n = values.len();
    let (y_min, y_max) = value_range(values.iter().copied());
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(80)
        .y_label_area_size(70)
        .build_cartesian_2d((0..n).into_segmented(), y_min..y_max)?;

    let label_for = |x: &SegmentValue<usize>| match x {
        SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => labels.get(*i).cloned().unwrap_or_default(),
        SegmentValue::Last => String::new(),
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n.clamp(1, MAX_X_LABELS))
        .x_label_formatter(&label_for)
        .draw()?;

    chart.draw_series(
        Histogram::vertical(&chart)
            .style(PALETTE[0].filled())
            .margin(4)
            .data(values.iter().enumerate().map(|(i, v)| (i, *v))),
    )?;

    root.present()?;
    Ok(())
}

fn draw_line(path: &Path, title: &str, series: &[(String, Vec<f64>)]) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, IMAGE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let n = series.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
    let x_max = n.saturating_sub(1).max(1) as f64;
    let (y_min, y_max) = value_range(series.iter().flat_map(|(_, v)| v.iter().copied()));

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(0f64..x_max, y_min..y_max)?;
    chart.configure_mesh().x_desc("row").draw()?;

    for (idx, (name, values)) in series.iter().enumerate() {
        let style = PALETTE[idx % PALETTE.len()].stroke_width(2);
        chart
            .draw_series(LineSeries::new(
                values.iter().enumerate().map(|(i, v)| (i as f64, *v)),
                style,
            ))?
            .label(name.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_pie(path: &Path, title: &str, labels: &[String], values: &[f64]) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, IMAGE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(title, ("sans-serif", 24))?;

    let dims = root.dim_in_pixel();
    let center = (dims.0 as i32 / 2, dims.1 as i32 / 2);
    let radius = dims.0.min(dims.1) as f64 * 0.38;
    let colors: Vec<RGBColor> = (0..values.len()).map(|i| PALETTE[i % PALETTE.len()]).collect();

    let mut pie = Pie::new(&center, &radius, values, &colors, labels);
    pie.start_angle(-90.0);
    pie.label_style(("sans-serif", 16).into_font().color(&BLACK));
    pie.percentages(("sans-serif", 14).into_font().color(&WHITE));
    root.draw(&pie)?;

    root.present()?;
    Ok(())
}

fn draw_scatter(
    path: &Path,
    title: &str,
    x_label: &str,
    y_label: &str,
    points: &[(f64, f64)],
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, IMAGE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let (x_min, x_max) = span(points.iter().map(|p| p.0));
    let (y_min, y_max) = span(points.iter().map(|p| p.1));
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    chart
        .configure_mesh()
        .x_desc(x_label)
        .y_desc(y_label)
        .draw()?;

    chart.draw_series(
        points
            .iter()
            .map(|(x, y)| Circle::new((*x, *y), 4, PALETTE[0].filled())),
    )?;

    root.present()?;
    Ok(())
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut clipped: String = text.chars().take(max_chars.saturating_sub(1)).collect();
        clipped.push('…');
        clipped
    }
}

fn draw_table(path: &Path, columns: &[String], rows: &[Vec<String>]) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, IMAGE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let (width, _) = root.dim_in_pixel();
    let cell_w = ((width as i32 - 40) / columns.len().max(1) as i32).max(20);
    let cell_h = 26;
    let max_chars = (cell_w / 8).max(3) as usize;
    let header_fill = RGBColor(230, 230, 230);

    let lines = std::iter::once(columns).chain(rows.iter().map(Vec::as_slice));
    for (r, line) in lines.enumerate() {
        let y = 20 + r as i32 * cell_h;
        for (c, text) in line.iter().enumerate() {
            let x = 20 + c as i32 * cell_w;
            if r == 0 {
                root.draw(&Rectangle::new([(x, y), (x + cell_w, y + cell_h)], header_fill.filled()))?;
            }
            root.draw(&Rectangle::new([(x, y), (x + cell_w, y + cell_h)], BLACK.stroke_width(1)))?;
            root.draw(&Text::new(clip(text, max_chars), (x + 4, y + 6), ("sans-serif", 14).into_font()))?;
        }
    }

    root.present()?;
    Ok(())
}

/// Draw `plot` into a PNG at `path`
pub fn draw(path: &Path, plot: &Plot) -> Result<(), AppError> {
    let outcome = match &plot.data {
        PlotData::Bar { labels, values } => draw_bar(path, &plot.title, labels, values),
        PlotData::Line { series } => draw_line(path, &plot.title, series),
        PlotData::Pie { labels, values } => draw_pie(path, &plot.title, labels, values),
        PlotData::Scatter {
            x_label,
            y_label,
            points,
        } => draw_scatter(path, &plot.title, x_label, y_label, points),
        PlotData::Table { columns, rows } => draw_table(path, columns, rows),
    };
    outcome.map_err(|e| AppError::Chart(e.to_string()))
}

/// Public URL of a plot file under the media URL
pub fn plot_url(media_url: &str, file_name: &str) -> String {
    format!("{}/plots/{}", media_url.trim_end_matches('/'), file_name)
}

pub struct ChartRenderer {
    media_root: PathBuf,
    media_url: String,
    query_service: QueryService,
}

impl ChartRenderer {
    pub fn new(media_root: impl Into<PathBuf>, media_url: impl Into<String>, query_service: QueryService) -> Self {
        Self {
            media_root: media_root.into(),
            media_url: media_url.into(),
            query_service,
        }
    }

    /// Execute `sql` with at most `limit_rows` rows and render it as `plot_type`
    pub async fn render(
        &self,
        adapter: &dyn DatabaseAdapter,
        sql: &str,
        plot_type: &str,
        limit_rows: u64,
    ) -> Result<ChartRender, AppError> {
        let sql = SqlValidator::fix_date_funcs_for_dialect(adapter.database_type(), sql)?;
        let result = self
            .query_service
            .execute_guarded(adapter, &sql, limit_rows)
            .await?;
        if result.is_empty() {
            return Err(AppError::Database("Query returned no rows".to_string()));
        }

        let plot = shape(PlotType::parse(plot_type), &result)?;

        let plots_dir = self.media_root.join("plots");
        tokio::fs::create_dir_all(&plots_dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create plots directory: {}", e)))?;
        let file_name = format!("plot_{}.png", uuid::Uuid::new_v4().simple());
        let file_path = plots_dir.join(&file_name);

        let target = file_path.clone();
        tokio::task::spawn_blocking(move || draw(&target, &plot))
            .await
            .map_err(|e| AppError::Internal(format!("Chart task failed: {}", e)))??;

        tracing::info!("Rendered {} chart to {}", plot_type, file_path.display());

        Ok(ChartRender {
            plot_url: plot_url(&self.media_url, &file_name),
            cols: result.columns,
            rows: result.rows,
        })
    }
}
