//! HTTP ステータス集計

use std::collections::BTreeMap;

use crate::types::PhaseMetrics;

/// 採用済みフェーズの http_status をステータスコードごとに合算する。
///
/// 値は検証済みの整数なので、ここで再検証はしない。入力が空なら空のマップを返す。
/// いずれかのコードの合計が u64 に収まらなければ `None`。
pub fn merge_status<'a, I>(phases: I) -> Option<BTreeMap<String, u64>>
where
    I: IntoIterator<Item = &'a PhaseMetrics>,
{
    let mut merged: BTreeMap<String, u64> = BTreeMap::new();
    for phase in phases {
        for (code, count) in &phase.http_status {
            let slot = merged.entry(code.clone()).or_default();
            *slot = slot.checked_add(*count)?;
        }
    }
    Some(merged)
}

/// ステータスコード（数字のみのラベル）が `[lo, hi)` に入る件数の合計。
/// 数値として解釈できないラベルは無視する。合計が u64 に収まらなければ `None`。
pub fn count_in_range(status: &BTreeMap<String, u64>, lo: u16, hi: u16) -> Option<u64> {
    status
        .iter()
        .filter_map(|(code, count)| status_code(code).map(|c| (c, *count)))
        .filter(|(c, _)| (lo..hi).contains(c))
        .try_fold(0u64, |acc, (_, count)| acc.checked_add(count))
}

fn status_code(label: &str) -> Option<u16> {
    if label.is_empty() || !label.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    label.parse().ok()
}
