/// フェーズごとの lua_metrics.json をマージするツール
///
/// 使い方:
///   merge_phase_metrics --output merged/lua_metrics.json phase1.json phase2.json
///
///   # 存在しない入力は警告してスキップする（1つも無ければエラー終了）
///   merge_phase_metrics -o out.json runs/*/lua_metrics.json
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use phase_metrics::{merge_to_file, MergeOptions, PercentileInclusion};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Merge lua_metrics.json files from multiple benchmark phases"
)]
struct Cli {
    /// Output file path for merged lua_metrics.json (`-` for stdout, `.gz` for gzip)
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Input lua_metrics.json files to merge
    #[arg(required = true)]
    input_files: Vec<PathBuf>,

    /// 0 のパーセンタイルも報告値として出力に含める
    #[arg(long)]
    keep_zero_percentiles: bool,

    /// 整形せず1行で出力する
    #[arg(long)]
    compact: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    let inputs: Vec<PathBuf> = cli
        .input_files
        .into_iter()
        .filter(|f| {
            if f.exists() {
                true
            } else {
                log::warn!("File not found: {}", f.display());
                false
            }
        })
        .collect();
    if inputs.is_empty() {
        bail!("No valid input files found");
    }

    let options = MergeOptions {
        percentile_inclusion: if cli.keep_zero_percentiles {
            PercentileInclusion::Reported
        } else {
            PercentileInclusion::PositiveSum
        },
        pretty: !cli.compact,
    };

    let merged = merge_to_file(&inputs, &cli.output, &options)?;
    let s = merged.summary;
    log::info!(
        "accepted {} / rejected {} / unreadable {} (reconciled {})",
        s.accepted,
        s.rejected,
        s.unreadable,
        s.reconciled
    );
    if cli.output.as_os_str() != "-" {
        println!("Merged {} lua_metrics.json files into {}", s.inputs, cli.output.display());
    }
    Ok(())
}
