//! ファイル単位の検証
//!
//! 1ファイルを読み込み、集計に使えるかを判定する。使える場合は
//! http_status の合計を権威あるリクエスト数として採用する。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{LoadError, RejectReason};
use crate::io::load_phase;
use crate::types::{parse_count, LatencySample, PhaseMetrics, RawPhase};

/// 1ファイルの判定結果
#[derive(Debug)]
pub enum Outcome {
    /// 読み込み・パースに失敗した（全集計から除外）
    Unreadable(LoadError),
    /// 読めたが不正（リクエスト数で重み付けする集計から除外）
    Rejected { raw: RawPhase, reason: RejectReason },
    /// 集計対象
    Accepted { raw: RawPhase, phase: PhaseMetrics },
}

/// 判定済みの1ファイル
#[derive(Debug)]
pub struct InspectedFile {
    pub path: PathBuf,
    pub outcome: Outcome,
}

impl InspectedFile {
    /// 読み込めたファイルの生データ（採否を問わない）
    pub fn raw(&self) -> Option<&RawPhase> {
        match &self.outcome {
            Outcome::Unreadable(_) => None,
            Outcome::Rejected { raw, .. } | Outcome::Accepted { raw, .. } => Some(raw),
        }
    }

    pub fn accepted(&self) -> Option<&PhaseMetrics> {
        match &self.outcome {
            Outcome::Accepted { phase, .. } => Some(phase),
            _ => None,
        }
    }
}

/// ファイルを読み込んで判定する。問題はすべてログに出す。
pub fn inspect(path: &Path) -> InspectedFile {
    let outcome = match load_phase(path) {
        Ok(raw) => classify(raw, path),
        Err(e) => {
            log::warn!("Failed to read {}: {e}", path.display());
            Outcome::Unreadable(e)
        }
    };
    InspectedFile {
        path: path.to_path_buf(),
        outcome,
    }
}

/// 読み込み済みの生データを判定する
pub fn classify(raw: RawPhase, path: &Path) -> Outcome {
    match validate(&raw, path) {
        Ok(phase) => {
            if phase.reconciled() {
                log::info!(
                    "http_status sum ({}) != total_requests ({}) in {}, using http_status sum",
                    phase.total_requests,
                    phase.declared_total,
                    path.display()
                );
            }
            Outcome::Accepted { raw, phase }
        }
        Err(reason) => {
            log::warn!("{reason} in {}, skipping", path.display());
            Outcome::Rejected { raw, reason }
        }
    }
}

/// 生データを検証し、型付きの [`PhaseMetrics`] に変換する。
///
/// 検証順序:
/// 1. total_requests が正の整数であること（bool 不可、非整数の浮動小数不可）
/// 2. http_status がマップで、全値が非負整数であること（1つでも不正ならファイルごと除外）
/// 3. http_status の合計が正であること
/// 4. 合計と total_requests が食い違う場合は合計を採用する
pub fn validate(raw: &RawPhase, path: &Path) -> Result<PhaseMetrics, RejectReason> {
    let declared_total = match raw.total_requests.as_ref() {
        None => return Err(RejectReason::MissingTotal),
        Some(v) => parse_count(v).map_err(RejectReason::InvalidTotal)?,
    };
    if declared_total == 0 {
        return Err(RejectReason::ZeroTotal);
    }

    let http_status = match raw.http_status.as_ref() {
        None => return Err(RejectReason::MissingStatus),
        Some(Value::Object(map)) => parse_status(map)?,
        Some(_) => return Err(RejectReason::StatusNotMapping),
    };

    let mut status_sum: u64 = 0;
    for count in http_status.values() {
        status_sum = status_sum.checked_add(*count).ok_or(RejectReason::StatusOverflow)?;
    }
    if status_sum == 0 {
        return Err(RejectReason::EmptyStatus);
    }

    Ok(PhaseMetrics {
        source: path.to_path_buf(),
        declared_total,
        total_requests: status_sum,
        http_status,
        latency: LatencySample::from_value(raw.latency.as_ref(), path),
    })
}

fn parse_status(
    map: &serde_json::Map<String, Value>,
) -> Result<BTreeMap<String, u64>, RejectReason> {
    map.iter()
        .map(|(code, v)| {
            parse_count(v).map(|count| (code.clone(), count)).map_err(|source| {
                RejectReason::InvalidStatusCount {
                    code: code.clone(),
                    source,
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CountError;
    use serde_json::json;

    fn raw(v: Value) -> RawPhase {
        serde_json::from_value(v).unwrap()
    }

    fn check(v: Value) -> Result<PhaseMetrics, RejectReason> {
        validate(&raw(v), Path::new("phase.json"))
    }

    #[test]
    fn test_accepts_consistent_file() {
        let phase = check(json!({
            "total_requests": 10,
            "http_status": {"200": 8, "404": 2},
            "latency": {"mean_ms": 5.0},
        }))
        .unwrap();
        assert_eq!(phase.total_requests, 10);
        assert!(!phase.reconciled());
        assert_eq!(phase.latency.mean_ms, Some(5.0));
    }

    #[test]
    fn test_reconciles_to_status_sum() {
        let phase = check(json!({"total_requests": 7, "http_status": {"200": 9, "500": 1}}))
            .unwrap();
        assert_eq!(phase.declared_total, 7);
        assert_eq!(phase.total_requests, 10);
        assert!(phase.reconciled());
    }

    #[test]
    fn test_accepts_integral_float_total() {
        let phase = check(json!({"total_requests": 3.0, "http_status": {"200": 3.0}})).unwrap();
        assert_eq!(phase.total_requests, 3);
    }

    #[test]
    fn test_rejects_bad_total() {
        let status = json!({"200": 1});
        assert_eq!(
            check(json!({"http_status": status.clone()})),
            Err(RejectReason::MissingTotal)
        );
        assert_eq!(
            check(json!({"total_requests": true, "http_status": status.clone()})),
            Err(RejectReason::InvalidTotal(CountError::Boolean))
        );
        assert_eq!(
            check(json!({"total_requests": 2.5, "http_status": status.clone()})),
            Err(RejectReason::InvalidTotal(CountError::NonIntegral(2.5)))
        );
        assert_eq!(
            check(json!({"total_requests": 0, "http_status": status.clone()})),
            Err(RejectReason::ZeroTotal)
        );
        assert!(matches!(
            check(json!({"total_requests": -4, "http_status": status})),
            Err(RejectReason::InvalidTotal(CountError::Negative(_)))
        ));
    }

    #[test]
    fn test_rejects_bad_status() {
        assert_eq!(check(json!({"total_requests": 1})), Err(RejectReason::MissingStatus));
        assert_eq!(
            check(json!({"total_requests": 1, "http_status": [200]})),
            Err(RejectReason::StatusNotMapping)
        );
        assert_eq!(
            check(json!({"total_requests": 1, "http_status": {}})),
            Err(RejectReason::EmptyStatus)
        );
        assert_eq!(
            check(json!({"total_requests": 1, "http_status": {"200": 0}})),
            Err(RejectReason::EmptyStatus)
        );
        assert!(matches!(
            check(json!({"total_requests": 3, "http_status": {"200": 4, "500": -1}})),
            Err(RejectReason::InvalidStatusCount { ref code, .. }) if code == "500"
        ));
        assert!(matches!(
            check(json!({"total_requests": 3, "http_status": {"200": false}})),
            Err(RejectReason::InvalidStatusCount {
                source: CountError::Boolean,
                ..
            })
        ));
    }

    #[test]
    fn test_status_overflow_is_rejected() {
        assert_eq!(
            check(json!({
                "total_requests": 1,
                "http_status": {"200": u64::MAX, "500": 1},
            })),
            Err(RejectReason::StatusOverflow)
        );
    }

    #[test]
    fn test_inspect_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let f = inspect(&dir.path().join("nope.json"));
        assert!(matches!(f.outcome, Outcome::Unreadable(_)));
        assert!(f.raw().is_none());
        assert!(f.accepted().is_none());
    }

    #[test]
    fn test_classify_keeps_raw_for_rejected() {
        let r = raw(json!({"total_requests": 0, "conflict_detail": {"stale_version": 2}}));
        let out = classify(r, Path::new("x.json"));
        match out {
            Outcome::Rejected { raw, reason } => {
                assert_eq!(reason, RejectReason::ZeroTotal);
                assert!(raw.conflict_detail.is_some());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
