//! エラー型の定義
//!
//! ファイル単位の問題（[`LoadError`], [`RejectReason`]）はログに出して該当ファイルを
//! 除外するだけで、実行全体を止めるのは [`MergeError`] のみ。

use std::path::PathBuf;

use thiserror::Error;

/// JSON値が非負整数のカウントとして解釈できない理由
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CountError {
    #[error("boolean is not a count")]
    Boolean,
    #[error("not numeric")]
    NotNumeric,
    #[error("non-integer value ({0})")]
    NonIntegral(f64),
    #[error("negative value ({0})")]
    Negative(String),
    #[error("value out of range ({0})")]
    OutOfRange(String),
}

/// 読み込めたファイルを集計対象から外す理由
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("missing total_requests")]
    MissingTotal,
    #[error("invalid total_requests: {0}")]
    InvalidTotal(CountError),
    #[error("non-positive total_requests (0)")]
    ZeroTotal,
    #[error("missing http_status")]
    MissingStatus,
    #[error("http_status is not a mapping")]
    StatusNotMapping,
    #[error("invalid http_status count for {code}: {source}")]
    InvalidStatusCount { code: String, source: CountError },
    #[error("http_status sum overflows")]
    StatusOverflow,
    #[error("empty http_status")]
    EmptyStatus,
}

/// ファイルの読み込み・パースに失敗した理由
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("top-level JSON value is not an object")]
    NotObject,
}

/// 実行全体を失敗させるエラー
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no input files provided")]
    NoInputs,
    #[error("no valid files to merge")]
    NoValidFiles,
    #[error("merged {field} overflows u64 at {}", path.display())]
    CountOverflow { field: &'static str, path: PathBuf },
    #[error("merged report contains a non-finite number")]
    NonFinite,
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize merged report: {0}")]
    Serialize(#[from] serde_json::Error),
}
