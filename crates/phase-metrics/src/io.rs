//! ファイルI/Oユーティリティ（gzip対応）

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::error::{LoadError, MergeError};
use crate::types::RawPhase;

const READER_BUF_CAP: usize = 128 * 1024; // 128 KiB

fn is_gzip(p: &Path) -> bool {
    p.extension().and_then(|e| e.to_str()).unwrap_or_default().eq_ignore_ascii_case("gz")
}

pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let p = path.as_ref();
    let f = File::open(p)?;
    if is_gzip(p) {
        let dec = flate2::read::GzDecoder::new(f);
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, dec)));
    }
    Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, f)))
}

/// フェーズファイルを1つ読み込む（検証はしない）
///
/// トップレベルはオブジェクトのみ受け付ける（配列を構造体として読ませない）。
pub fn load_phase(path: &Path) -> Result<RawPhase, LoadError> {
    let reader = open_reader(path)?;
    let value: Value = serde_json::from_reader(reader)?;
    if !value.is_object() {
        return Err(LoadError::NotObject);
    }
    Ok(serde_json::from_value(value)?)
}

/// Writer wrapper to propagate finish/close errors for compressed outputs.
#[must_use = "call .close() to propagate compression/IO errors"]
pub enum Writer {
    Plain(BufWriter<File>),
    Stdout(io::Stdout),
    Gz(flate2::write::GzEncoder<File>),
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Writer::Plain(f) => f.write(buf),
            Writer::Stdout(s) => s.write(buf),
            Writer::Gz(e) => e.write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            Writer::Plain(f) => f.flush(),
            Writer::Stdout(s) => s.flush(),
            Writer::Gz(e) => e.flush(),
        }
    }
}

impl Writer {
    /// Finalize the stream and flush underlying file/stdout.
    pub fn close(self) -> io::Result<()> {
        match self {
            Writer::Plain(f) => {
                let mut file = f.into_inner().map_err(|e| e.into_error())?;
                file.flush()
            }
            Writer::Stdout(mut s) => s.flush(),
            Writer::Gz(e) => {
                let mut f = e.finish()?;
                f.flush()
            }
        }
    }
}

/// 出力先を開く。`-` は標準出力。親ディレクトリがなければ作成する。
pub fn open_writer<P: AsRef<Path>>(path: P) -> io::Result<Writer> {
    let p = path.as_ref();
    if p.to_string_lossy() == "-" {
        return Ok(Writer::Stdout(io::stdout()));
    }
    if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let f = File::create(p)?;
    if is_gzip(p) {
        let enc = flate2::write::GzEncoder::new(f, flate2::Compression::default());
        return Ok(Writer::Gz(enc));
    }
    Ok(Writer::Plain(BufWriter::new(f)))
}

/// JSON ドキュメントを書き出す。失敗した場合は書きかけの出力ファイルを削除する。
pub fn write_json<T: Serialize>(path: &Path, value: &T, pretty: bool) -> Result<(), MergeError> {
    let mut w = open_writer(path).map_err(|e| write_error(path, e))?;
    let result = encode_json(&mut w, value, pretty, path)
        .and_then(|()| w.close().map_err(|e| write_error(path, e)));
    if result.is_err() {
        discard_partial(path);
    }
    result
}

fn encode_json<W: Write, T: Serialize>(
    w: &mut W,
    value: &T,
    pretty: bool,
    path: &Path,
) -> Result<(), MergeError> {
    let encoded = if pretty {
        serde_json::to_writer_pretty(&mut *w, value)
    } else {
        serde_json::to_writer(&mut *w, value)
    };
    encoded.map_err(|e| json_error(path, e))?;
    w.write_all(b"\n").map_err(|e| write_error(path, e))
}

fn write_error(path: &Path, source: io::Error) -> MergeError {
    MergeError::Write {
        path: path.to_path_buf(),
        source,
    }
}

/// serde_json のエラーのうち I/O 由来のものは書き込みエラーとして扱う
fn json_error(path: &Path, e: serde_json::Error) -> MergeError {
    if e.is_io() {
        write_error(path, e.into())
    } else {
        MergeError::Serialize(e)
    }
}

fn discard_partial(path: &Path) {
    if !fs::metadata(path).is_ok_and(|m| m.is_file()) {
        return;
    }
    if let Err(e) = fs::remove_file(path) {
        log::warn!("Failed to remove partial output {}: {e}", path.display());
    }
}
