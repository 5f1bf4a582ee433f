//! マージ結果の型定義と組み立て
//!
//! 全入力ファイルを入力順に1回だけ走査し、検証・集計・派生指標の計算を行う。

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MergeError;
use crate::io::write_json;
use crate::latency::{LatencyAccumulator, LatencySummary, PercentileInclusion};
use crate::status::{count_in_range, merge_status};
use crate::types::{ConflictDetail, PhaseMetrics};
use crate::validate::{inspect, InspectedFile, Outcome};

// =============================================================================
// 構造体定義
// =============================================================================

/// マージ済みレポート（出力ドキュメント）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedReport {
    /// 先頭ファイルからそのままコピー
    pub scenario: Value,
    /// 先頭ファイルからそのままコピー
    pub execution: Value,
    /// 採用ファイルの権威あるリクエスト数の合計
    pub total_requests: u64,
    /// (http_4xx + http_5xx) / total_requests
    pub error_rate: f64,
    pub http_4xx: u64,
    pub http_5xx: u64,
    pub http_status: BTreeMap<String, u64>,
    /// ステータスコードごとの count / total_requests
    pub status_distribution: BTreeMap<String, f64>,
    pub latency: LatencySummary,
    /// 読み込めた全ファイル（採否を問わない）の合計
    pub conflict_detail: ConflictDetail,
}

/// マージ設定
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub percentile_inclusion: PercentileInclusion,
    /// 出力を整形するか
    pub pretty: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            percentile_inclusion: PercentileInclusion::default(),
            pretty: true,
        }
    }
}

/// 実行結果の件数（出力ドキュメントには含めない）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub inputs: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub unreadable: usize,
    /// total_requests を http_status 合計で置き換えたファイル数
    pub reconciled: usize,
}

/// マージ結果
#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub report: MergedReport,
    pub summary: MergeSummary,
}

// =============================================================================
// 集計状態
// =============================================================================

/// 1回のマージ実行が所有する集計状態
#[derive(Debug)]
pub struct MergeState {
    summary: MergeSummary,
    accepted: Vec<PhaseMetrics>,
    total_requests: u64,
    latency: LatencyAccumulator,
    conflict: ConflictDetail,
    metadata: Option<(Value, Value)>,
}

impl MergeState {
    pub fn new(options: &MergeOptions) -> Self {
        Self {
            summary: MergeSummary::default(),
            accepted: Vec::new(),
            total_requests: 0,
            latency: LatencyAccumulator::new(options.percentile_inclusion),
            conflict: ConflictDetail::default(),
            metadata: None,
        }
    }

    /// 判定済みファイルを1つ取り込む（入力順に呼ぶこと）
    ///
    /// 合計カウントが u64 に収まらなくなった時点で [`MergeError::CountOverflow`] を返す。
    pub fn observe(&mut self, file: InspectedFile) -> Result<(), MergeError> {
        let first = self.summary.inputs == 0;
        self.summary.inputs += 1;

        if let Some(raw) = file.raw() {
            let detail = ConflictDetail::from_value(raw.conflict_detail.as_ref(), &file.path);
            self.conflict = self
                .conflict
                .checked_add(detail)
                .ok_or_else(|| overflow("conflict_detail", &file.path))?;
        }
        if first {
            self.metadata = Some(match file.raw() {
                Some(raw) => (
                    raw.scenario.clone().unwrap_or_else(empty_object),
                    raw.execution.clone().unwrap_or_else(empty_object),
                ),
                None => {
                    log::warn!(
                        "Failed to read metadata from {}, using empty scenario/execution",
                        file.path.display()
                    );
                    (empty_object(), empty_object())
                }
            });
        }

        match file.outcome {
            Outcome::Unreadable(_) => self.summary.unreadable += 1,
            Outcome::Rejected { .. } => self.summary.rejected += 1,
            Outcome::Accepted { phase, .. } => {
                self.total_requests = self
                    .total_requests
                    .checked_add(phase.total_requests)
                    .ok_or_else(|| overflow("total_requests", &file.path))?;
                self.summary.accepted += 1;
                if phase.reconciled() {
                    self.summary.reconciled += 1;
                }
                self.latency.add(&phase.latency, phase.total_requests);
                self.accepted.push(phase);
            }
        }
        Ok(())
    }

    /// 派生指標を計算してレポートを確定する
    pub fn finish(self) -> Result<MergeOutput, MergeError> {
        if self.summary.inputs == 0 {
            return Err(MergeError::NoInputs);
        }
        if self.accepted.is_empty() {
            return Err(MergeError::NoValidFiles);
        }

        // 各ファイルの http_status 合計は total_requests と一致するので、
        // total_requests が収まっていれば以下の和も収まる。
        let last = self.accepted.last().map(|p| p.source.clone()).unwrap_or_default();
        let total_requests = self.total_requests;
        let http_status =
            merge_status(&self.accepted).ok_or_else(|| overflow("http_status", &last))?;
        let http_4xx =
            count_in_range(&http_status, 400, 500).ok_or_else(|| overflow("http_4xx", &last))?;
        let http_5xx =
            count_in_range(&http_status, 500, 600).ok_or_else(|| overflow("http_5xx", &last))?;
        let errors =
            http_4xx.checked_add(http_5xx).ok_or_else(|| overflow("error count", &last))?;

        let (error_rate, status_distribution) = if total_requests > 0 {
            let total = total_requests as f64;
            let dist =
                http_status.iter().map(|(code, c)| (code.clone(), *c as f64 / total)).collect();
            (errors as f64 / total, dist)
        } else {
            (0.0, BTreeMap::new())
        };

        let (scenario, execution) =
            self.metadata.unwrap_or_else(|| (empty_object(), empty_object()));

        let report = MergedReport {
            scenario,
            execution,
            total_requests,
            error_rate,
            http_4xx,
            http_5xx,
            http_status,
            status_distribution,
            latency: self.latency.finish(),
            conflict_detail: self.conflict,
        };
        if !report.is_finite() {
            return Err(MergeError::NonFinite);
        }

        Ok(MergeOutput {
            report,
            summary: self.summary,
        })
    }
}

impl MergedReport {
    /// 数値フィールドがすべて有限か
    pub fn is_finite(&self) -> bool {
        let l = &self.latency;
        self.error_rate.is_finite()
            && self.status_distribution.values().all(|v| v.is_finite())
            && [
                l.min_ms, l.max_ms, l.mean_ms, l.p50_ms, l.p75_ms, l.p90_ms, l.p95_ms, l.p99_ms,
                l.p999_ms,
            ]
            .iter()
            .flatten()
            .all(|v| v.is_finite())
    }
}

fn overflow(field: &'static str, path: &Path) -> MergeError {
    MergeError::CountOverflow {
        field,
        path: path.to_path_buf(),
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

// =============================================================================
// エントリポイント
// =============================================================================

/// 判定済みファイル列をマージする
pub fn merge_inspected<I>(files: I, options: &MergeOptions) -> Result<MergeOutput, MergeError>
where
    I: IntoIterator<Item = InspectedFile>,
{
    let mut state = MergeState::new(options);
    for file in files {
        state.observe(file)?;
    }
    state.finish()
}

/// 入力ファイルを順に読み込んでマージする
pub fn merge_files<P: AsRef<Path>>(
    inputs: &[P],
    options: &MergeOptions,
) -> Result<MergeOutput, MergeError> {
    merge_inspected(inputs.iter().map(|p| inspect(p.as_ref())), options)
}

/// マージしてファイルに書き出す。有効なファイルがなければ何も書かない。
pub fn merge_to_file<P: AsRef<Path>>(
    inputs: &[P],
    output: &Path,
    options: &MergeOptions,
) -> Result<MergeOutput, MergeError> {
    let merged = merge_files(inputs, options)?;
    write_json(output, &merged.report, options.pretty)?;
    Ok(merged)
}

// =============================================================================
// テスト
// =============================================================================
