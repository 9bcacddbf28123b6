//! 固定公式统计：逐个 CSV 统计行数与每列摘要，不生成图表

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::Analyzer;
use crate::core::AnalystError;
use crate::pipeline::AnalysisRequest;

#[derive(Debug, Default)]
pub struct StatsAnalyzer;

impl StatsAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Serialize)]
struct StatsReport<'a> {
    question: &'a str,
    files: Vec<FileSummary>,
}

#[derive(Debug, Serialize)]
struct FileSummary {
    file: String,
    rows: usize,
    columns: Vec<ColumnSummary>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ColumnSummary {
    Numeric {
        name: String,
        count: usize,
        sum: f64,
        mean: f64,
        min: f64,
        max: f64,
    },
    Text {
        name: String,
        non_empty: usize,
        distinct: usize,
    },
}

/// 单列累加器；出现一个非空且非数字的值后降级为文本列
struct ColumnAcc {
    name: String,
    numeric: bool,
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
    non_empty: usize,
    distinct: HashSet<String>,
}

impl ColumnAcc {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            numeric: true,
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            non_empty: 0,
            distinct: HashSet::new(),
        }
    }

    fn push(&mut self, raw: &str) {
        let value = raw.trim();
        if value.is_empty() {
            return;
        }
        self.non_empty += 1;
        if !self.distinct.contains(value) {
            self.distinct.insert(value.to_string());
        }
        if self.numeric {
            match value.parse::<f64>() {
                Ok(n) if n.is_finite() => {
                    self.count += 1;
                    self.sum += n;
                    self.min = self.min.min(n);
                    self.max = self.max.max(n);
                }
                _ => self.numeric = false,
            }
        }
    }

    fn finish(self) -> ColumnSummary {
        if self.numeric && self.count > 0 {
            ColumnSummary::Numeric {
                name: self.name,
                count: self.count,
                sum: self.sum,
                mean: self.sum / self.count as f64,
                min: self.min,
                max: self.max,
            }
        } else {
            ColumnSummary::Text {
                name: self.name,
                non_empty: self.non_empty,
                distinct: self.distinct.len(),
            }
        }
    }
}

fn summarize_csv(path: &Path) -> Result<FileSummary, AnalystError> {
    let data_err = |e: csv::Error| AnalystError::Data(format!("{}: {}", path.display(), e));

    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(data_err)?;
    let headers = rdr.headers().map_err(data_err)?.clone();
    let mut columns: Vec<ColumnAcc> = headers.iter().map(ColumnAcc::new).collect();

    let mut rows = 0;
    for result in rdr.records() {
        let record = result.map_err(data_err)?;
        rows += 1;
        for (acc, field) in columns.iter_mut().zip(record.iter()) {
            acc.push(field);
        }
    }

    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    tracing::debug!(file = %file, rows, columns = columns.len(), "csv summarized");

    Ok(FileSummary {
        file,
        rows,
        columns: columns.into_iter().map(ColumnAcc::finish).collect(),
    })
}

#[async_trait]
impl Analyzer for StatsAnalyzer {
    fn name(&self) -> &str {
        "stats"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<Value, AnalystError> {
        if request.data_files.is_empty() {
            return Err(AnalystError::Data("No CSV file provided".to_string()));
        }

        let paths = request.data_files.clone();
        let summaries = tokio::task::spawn_blocking(move || {
            paths
                .iter()
                .map(|p| summarize_csv(p))
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| AnalystError::Data(format!("stats task failed: {}", e)))??;

        serde_json::to_value(StatsReport {
            question: request.question_text.trim(),
            files: summaries,
        })
        .map_err(|e| AnalystError::Data(e.to_string()))
    }
}
