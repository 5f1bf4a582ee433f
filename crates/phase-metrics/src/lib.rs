//! 負荷試験フェーズメトリクスのマージ
//!
//! 独立したベンチマークワーカーが出力したフェーズごとの lua_metrics.json を、
//! 整合性のとれた1つのレポートにまとめる。
//!
//! - [`validate`]: ファイル単位の検証と権威あるリクエスト数の決定
//! - [`status`]: HTTP ステータスの合算
//! - [`latency`]: リクエスト数重み付きのレイテンシ合算
//! - [`report`]: 派生指標の計算とレポートの組み立て

pub mod error;
pub mod io;
pub mod latency;
pub mod report;
pub mod status;
pub mod types;
pub mod validate;

pub use error::{CountError, LoadError, MergeError, RejectReason};
pub use latency::{LatencySummary, PercentileInclusion};
pub use report::{
    merge_files, merge_inspected, merge_to_file, MergeOptions, MergeOutput, MergeState,
    MergeSummary, MergedReport,
};
pub use types::{ConflictDetail, LatencySample, PhaseMetrics, RawPhase};
pub use validate::{inspect, InspectedFile, Outcome};
