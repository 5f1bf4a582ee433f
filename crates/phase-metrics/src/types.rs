//! フェーズメトリクスの型定義
//!
//! 入力ファイルはまず [`RawPhase`]（各フィールドが `Option<Value>`）として読み込み、
//! 検証（[`crate::validate`]）を一度だけ通して型付きの [`PhaseMetrics`] に変換する。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CountError;

// =============================================================================
// 入力（検証前）
// =============================================================================

/// 1フェーズ分の lua_metrics.json（検証前）
///
/// 列挙したフィールド以外は読み捨てる。`null` は未設定と同じ扱い。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPhase {
    #[serde(default)]
    pub total_requests: Option<Value>,
    #[serde(default)]
    pub http_status: Option<Value>,
    #[serde(default)]
    pub latency: Option<Value>,
    #[serde(default)]
    pub conflict_detail: Option<Value>,
    #[serde(default)]
    pub scenario: Option<Value>,
    #[serde(default)]
    pub execution: Option<Value>,
}

/// JSON値を非負整数のカウントとして解釈する。
///
/// bool は数値扱いしない。浮動小数は整数値（`10.0` など）のみ受け付ける。
pub fn parse_count(value: &Value) -> Result<u64, CountError> {
    match value {
        Value::Bool(_) => Err(CountError::Boolean),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return Ok(u);
            }
            if let Some(i) = n.as_i64() {
                return Err(CountError::Negative(i.to_string()));
            }
            let f = n.as_f64().ok_or(CountError::NotNumeric)?;
            if !f.is_finite() || f.fract() != 0.0 {
                return Err(CountError::NonIntegral(f));
            }
            if f < 0.0 {
                return Err(CountError::Negative(f.to_string()));
            }
            // 2^64 以上は u64 に収まらない
            if f >= 18_446_744_073_709_551_616.0 {
                return Err(CountError::OutOfRange(f.to_string()));
            }
            Ok(f as u64)
        }
        _ => Err(CountError::NotNumeric),
    }
}

// =============================================================================
// 検証済みフェーズ
// =============================================================================

/// 検証済みの1フェーズ
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseMetrics {
    /// 入力ファイルのパス
    pub source: PathBuf,
    /// ファイルに書かれていた total_requests
    pub declared_total: u64,
    /// 重み付けに使う権威あるリクエスト数（http_status の合計）
    pub total_requests: u64,
    pub http_status: BTreeMap<String, u64>,
    pub latency: LatencySample,
}

impl PhaseMetrics {
    /// 宣言値と http_status 合計が食い違い、合計で置き換えたか
    pub fn reconciled(&self) -> bool {
        self.declared_total != self.total_requests
    }
}

// =============================================================================
// レイテンシ
// =============================================================================

/// レイテンシ指標のキー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyMetric {
    Mean,
    P50,
    P75,
    P90,
    P95,
    P99,
    P999,
    Min,
    Max,
}

impl LatencyMetric {
    /// 重み付き平均で合算する指標（min/max 以外）
    pub const WEIGHTED: [LatencyMetric; 7] = [
        LatencyMetric::Mean,
        LatencyMetric::P50,
        LatencyMetric::P75,
        LatencyMetric::P90,
        LatencyMetric::P95,
        LatencyMetric::P99,
        LatencyMetric::P999,
    ];

    pub const ALL: [LatencyMetric; 9] = [
        LatencyMetric::Mean,
        LatencyMetric::P50,
        LatencyMetric::P75,
        LatencyMetric::P90,
        LatencyMetric::P95,
        LatencyMetric::P99,
        LatencyMetric::P999,
        LatencyMetric::Min,
        LatencyMetric::Max,
    ];

    pub fn key(self) -> &'static str {
        match self {
            LatencyMetric::Mean => "mean_ms",
            LatencyMetric::P50 => "p50_ms",
            LatencyMetric::P75 => "p75_ms",
            LatencyMetric::P90 => "p90_ms",
            LatencyMetric::P95 => "p95_ms",
            LatencyMetric::P99 => "p99_ms",
            LatencyMetric::P999 => "p999_ms",
            LatencyMetric::Min => "min_ms",
            LatencyMetric::Max => "max_ms",
        }
    }
}

/// 1ファイル分のレイテンシ（ミリ秒）。報告されなかった指標は `None`。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencySample {
    pub mean_ms: Option<f64>,
    pub p50_ms: Option<f64>,
    pub p75_ms: Option<f64>,
    pub p90_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub p999_ms: Option<f64>,
    pub min_ms: Option<f64>,
    pub max_ms: Option<f64>,
}

impl LatencySample {
    pub fn get(&self, metric: LatencyMetric) -> Option<f64> {
        match metric {
            LatencyMetric::Mean => self.mean_ms,
            LatencyMetric::P50 => self.p50_ms,
            LatencyMetric::P75 => self.p75_ms,
            LatencyMetric::P90 => self.p90_ms,
            LatencyMetric::P95 => self.p95_ms,
            LatencyMetric::P99 => self.p99_ms,
            LatencyMetric::P999 => self.p999_ms,
            LatencyMetric::Min => self.min_ms,
            LatencyMetric::Max => self.max_ms,
        }
    }

    fn slot(&mut self, metric: LatencyMetric) -> &mut Option<f64> {
        match metric {
            LatencyMetric::Mean => &mut self.mean_ms,
            LatencyMetric::P50 => &mut self.p50_ms,
            LatencyMetric::P75 => &mut self.p75_ms,
            LatencyMetric::P90 => &mut self.p90_ms,
            LatencyMetric::P95 => &mut self.p95_ms,
            LatencyMetric::P99 => &mut self.p99_ms,
            LatencyMetric::P999 => &mut self.p999_ms,
            LatencyMetric::Min => &mut self.min_ms,
            LatencyMetric::Max => &mut self.max_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        LatencyMetric::ALL.iter().all(|m| self.get(*m).is_none())
    }

    /// `latency` ブロックを読み取る。
    ///
    /// 有限の非負数でない値は「未報告」として扱い、警告を出す。
    pub fn from_value(value: Option<&Value>, path: &Path) -> Self {
        let mut sample = LatencySample::default();
        let map = match value {
            None | Some(Value::Null) => return sample,
            Some(Value::Object(map)) => map,
            Some(_) => {
                log::warn!("Invalid latency in {}, ignoring", path.display());
                return sample;
            }
        };
        for metric in LatencyMetric::ALL {
            let Some(raw) = map.get(metric.key()) else {
                continue;
            };
            match raw {
                Value::Null => {}
                Value::Number(n) => match n.as_f64() {
                    Some(ms) if ms.is_finite() && ms >= 0.0 => *sample.slot(metric) = Some(ms),
                    _ => log::warn!(
                        "Invalid latency {} ({n}) in {}, ignoring",
                        metric.key(),
                        path.display()
                    ),
                },
                other => log::warn!(
                    "Non-numeric latency {} ({other}) in {}, ignoring",
                    metric.key(),
                    path.display()
                ),
            }
        }
        sample
    }
}

// =============================================================================
// コンフリクトカウンタ
// =============================================================================

/// 並行制御レイヤのコンフリクトカウンタ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDetail {
    pub stale_version: u64,
    pub retryable_cas: u64,
    pub retry_success: u64,
    pub retry_exhausted: u64,
}

impl ConflictDetail {
    const KEYS: [&'static str; 4] =
        ["stale_version", "retryable_cas", "retry_success", "retry_exhausted"];

    /// `conflict_detail` ブロックを読み取る。欠けたキーや不正な値は 0 とする。
    pub fn from_value(value: Option<&Value>, path: &Path) -> Self {
        let mut detail = ConflictDetail::default();
        let map = match value {
            None | Some(Value::Null) => return detail,
            Some(Value::Object(map)) => map,
            Some(_) => {
                log::warn!("Invalid conflict_detail in {}, ignoring", path.display());
                return detail;
            }
        };
        for key in Self::KEYS {
            let Some(raw) = map.get(key) else {
                continue;
            };
            match parse_count(raw) {
                Ok(count) => {
                    if let Some(slot) = detail.slot(key) {
                        *slot = count;
                    }
                }
                Err(e) => log::warn!(
                    "Invalid conflict_detail {key} in {}: {e}, counting as 0",
                    path.display()
                ),
            }
        }
        detail
    }

    fn slot(&mut self, key: &str) -> Option<&mut u64> {
        match key {
            "stale_version" => Some(&mut self.stale_version),
            "retryable_cas" => Some(&mut self.retryable_cas),
            "retry_success" => Some(&mut self.retry_success),
            "retry_exhausted" => Some(&mut self.retry_exhausted),
            _ => None,
        }
    }

    /// カウンタごとの和。いずれかが u64 に収まらなければ `None`。
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        Some(Self {
            stale_version: self.stale_version.checked_add(rhs.stale_version)?,
            retryable_cas: self.retryable_cas.checked_add(rhs.retryable_cas)?,
            retry_success: self.retry_success.checked_add(rhs.retry_success)?,
            retry_exhausted: self.retry_exhausted.checked_add(rhs.retry_exhausted)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_count_accepts_integers() {
        assert_eq!(parse_count(&json!(0)), Ok(0));
        assert_eq!(parse_count(&json!(42)), Ok(42));
        assert_eq!(parse_count(&json!(10.0)), Ok(10));
    }

    #[test]
    fn test_parse_count_rejects_bad_values() {
        assert_eq!(parse_count(&json!(true)), Err(CountError::Boolean));
        assert_eq!(parse_count(&json!("12")), Err(CountError::NotNumeric));
        assert_eq!(parse_count(&json!(null)), Err(CountError::NotNumeric));
        assert_eq!(parse_count(&json!(1.5)), Err(CountError::NonIntegral(1.5)));
        assert_eq!(parse_count(&json!(-3)), Err(CountError::Negative("-3".to_string())));
        assert!(matches!(parse_count(&json!(-2.0)), Err(CountError::Negative(_))));
        assert!(matches!(parse_count(&json!(1e30)), Err(CountError::OutOfRange(_))));
    }

    #[test]
    fn test_latency_sample_from_value() {
        let v = json!({
            "mean_ms": 12.5,
            "p50_ms": 10,
            "p99_ms": "fast",
            "min_ms": -1.0,
            "max_ms": 0,
            "stddev_ms": 3.0,
        });
        let s = LatencySample::from_value(Some(&v), Path::new("a.json"));
        assert_eq!(s.mean_ms, Some(12.5));
        assert_eq!(s.p50_ms, Some(10.0));
        assert_eq!(s.p99_ms, None);
        assert_eq!(s.min_ms, None);
        assert_eq!(s.max_ms, Some(0.0));
        assert_eq!(s.p75_ms, None);
    }

    #[test]
    fn test_latency_sample_non_object_is_empty() {
        let s = LatencySample::from_value(Some(&json!([1, 2])), Path::new("a.json"));
        assert!(s.is_empty());
        assert!(LatencySample::from_value(None, Path::new("a.json")).is_empty());
    }

    #[test]
    fn test_conflict_detail_defaults_missing_and_invalid_to_zero() {
        let v = json!({"stale_version": 3, "retryable_cas": true, "retry_success": 2});
        let d = ConflictDetail::from_value(Some(&v), Path::new("a.json"));
        assert_eq!(
            d,
            ConflictDetail {
                stale_version: 3,
                retryable_cas: 0,
                retry_success: 2,
                retry_exhausted: 0,
            }
        );
    }

    #[test]
    fn test_conflict_detail_checked_add() {
        let a = ConflictDetail {
            stale_version: 1,
            retryable_cas: 2,
            retry_success: 3,
            retry_exhausted: 4,
        };
        let sum = a
            .checked_add(ConflictDetail {
                stale_version: 10,
                retryable_cas: 20,
                retry_success: 30,
                retry_exhausted: 40,
            })
            .unwrap();
        assert_eq!(sum.stale_version, 11);
        assert_eq!(sum.retryable_cas, 22);
        assert_eq!(sum.retry_success, 33);
        assert_eq!(sum.retry_exhausted, 44);

        let full = ConflictDetail {
            retry_exhausted: u64::MAX,
            ..Default::default()
        };
        assert_eq!(full.checked_add(a), None);
    }

    #[test]
    fn test_conflict_detail_slot_only_known_keys() {
        let mut d = ConflictDetail::default();
        for key in ConflictDetail::KEYS {
            *d.slot(key).unwrap() += 1;
        }
        assert_eq!(
            d,
            ConflictDetail {
                stale_version: 1,
                retryable_cas: 1,
                retry_success: 1,
                retry_exhausted: 1,
            }
        );
        assert!(d.slot("retry_unknown").is_none());
    }
}
