//! レイテンシのリクエスト数重み付き合算
//!
//! 生サンプルも分散も入力にないため、標準偏差は合算しない。

use serde::{Deserialize, Serialize};

use crate::types::{LatencyMetric, LatencySample};

const WEIGHTED_METRICS: usize = LatencyMetric::WEIGHTED.len();

/// 重み付き平均の結果を出力に含める条件
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PercentileInclusion {
    /// 重み付き平均が正のときのみ含める（mean_ms は報告があれば常に含める）。
    /// 全ファイルで 0 のパーセンタイルは未報告と区別できない。
    /// min_ms も 0 を未報告として扱う。
    #[default]
    PositiveSum,
    /// 1ファイルでも報告していれば含める（0 も正当な値として扱う）
    Reported,
}

/// 合算後のレイテンシ（ミリ秒）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p50_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p75_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p90_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p95_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p99_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p999_ms: Option<f64>,
}

impl LatencySummary {
    pub fn is_empty(&self) -> bool {
        *self == LatencySummary::default()
    }

    fn set(&mut self, metric: LatencyMetric, value: f64) {
        let slot = match metric {
            LatencyMetric::Mean => &mut self.mean_ms,
            LatencyMetric::P50 => &mut self.p50_ms,
            LatencyMetric::P75 => &mut self.p75_ms,
            LatencyMetric::P90 => &mut self.p90_ms,
            LatencyMetric::P95 => &mut self.p95_ms,
            LatencyMetric::P99 => &mut self.p99_ms,
            LatencyMetric::P999 => &mut self.p999_ms,
            LatencyMetric::Min => &mut self.min_ms,
            LatencyMetric::Max => &mut self.max_ms,
        };
        *slot = Some(value);
    }
}

/// 1指標分の重み付き平均と Σweight
///
/// Σ(value × weight) を直接持つと巨大な有限値で inf に溢れるため、平均を逐次更新する。
/// 値は非負の有限値なので、平均は常に報告値の最小値と最大値の間に収まる。
#[derive(Debug, Clone, Copy, Default)]
struct WeightedMean {
    mean: f64,
    weight: f64,
}

impl WeightedMean {
    fn push(&mut self, value: f64, weight: u64) {
        let w = weight as f64;
        self.weight += w;
        self.mean += (value - self.mean) * (w / self.weight);
    }
}

/// レイテンシ合算の途中状態。1回のマージ実行が所有する。
///
/// 浮動小数の加算順序は [`add`](Self::add) の呼び出し順（＝入力ファイル順）に従う。
#[derive(Debug, Clone)]
pub struct LatencyAccumulator {
    inclusion: PercentileInclusion,
    weighted: [WeightedMean; WEIGHTED_METRICS],
    min_ms: Option<f64>,
    max_ms: Option<f64>,
    contributors: usize,
}

impl LatencyAccumulator {
    pub fn new(inclusion: PercentileInclusion) -> Self {
        Self {
            inclusion,
            weighted: [WeightedMean::default(); WEIGHTED_METRICS],
            min_ms: None,
            max_ms: None,
            contributors: 0,
        }
    }

    /// 1フェーズ分のレイテンシを `weight`（権威あるリクエスト数）で加える
    pub fn add(&mut self, sample: &LatencySample, weight: u64) {
        if weight == 0 || sample.is_empty() {
            return;
        }
        self.contributors += 1;

        for (slot, metric) in self.weighted.iter_mut().zip(LatencyMetric::WEIGHTED) {
            if let Some(v) = sample.get(metric) {
                slot.push(v, weight);
            }
        }

        let min_floor_excluded = self.inclusion == PercentileInclusion::PositiveSum;
        if let Some(v) = sample.min_ms.filter(|v| !min_floor_excluded || *v > 0.0) {
            self.min_ms = Some(self.min_ms.map_or(v, |m| m.min(v)));
        }
        if let Some(v) = sample.max_ms {
            self.max_ms = Some(self.max_ms.map_or(v, |m| m.max(v)));
        }
    }

    /// 合算結果を確定する。重みを持つフェーズが1つもなければ空を返す。
    pub fn finish(self) -> LatencySummary {
        let mut out = LatencySummary::default();
        if self.contributors == 0 {
            return out;
        }

        for (slot, metric) in self.weighted.iter().zip(LatencyMetric::WEIGHTED) {
            if slot.weight == 0.0 {
                continue;
            }
            let include = match self.inclusion {
                PercentileInclusion::Reported => true,
                PercentileInclusion::PositiveSum => {
                    metric == LatencyMetric::Mean || slot.mean > 0.0
                }
            };
            if include {
                out.set(metric, slot.mean);
            }
        }
        if let Some(v) = self.min_ms {
            out.set(LatencyMetric::Min, v);
        }
        if let Some(v) = self.max_ms {
            out.set(LatencyMetric::Max, v);
        }
        out
    }
}

/// 採用済みフェーズ列のレイテンシを合算する
pub fn merge_latency<'a, I>(samples: I, inclusion: PercentileInclusion) -> LatencySummary
where
    I: IntoIterator<Item = (&'a LatencySample, u64)>,
{
    let mut acc = LatencyAccumulator::new(inclusion);
    for (sample, weight) in samples {
        acc.add(sample, weight);
    }
    acc.finish()
}
