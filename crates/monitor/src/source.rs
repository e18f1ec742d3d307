//! 로그 소스 탐색과 증분 읽기
//!
//! 매 실행마다 설정된 디렉토리를 스캔하여 소스 목록을 새로 만들고,
//! 체크포인트 이후에 추가된 완성된 라인만 읽습니다.
//!
//! # 로테이션 감지
//! - 파일 크기 축소 감지 (truncation)
//! - inode 변경 감지 (logrotate 등, Unix 전용)
//!
//! 둘 중 하나라도 해당하면 오프셋 0부터 다시 읽습니다.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use logsentry_core::config::SourcesConfig;

use crate::checkpoint::{Checkpoint, SourceKey};
use crate::error::MonitorError;

/// 감시 대상 로그 파일
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSource {
    /// 파일 경로
    pub path: PathBuf,
    /// 알림에 표시할 이름 (파일명)
    pub label: String,
    /// 체크포인트 키
    pub key: SourceKey,
}

impl LogSource {
    /// 경로로 소스를 생성합니다.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let key = SourceKey::from_path(&path);
        Self { path, label, key }
    }
}

/// 설정에 따라 소스 목록을 만듭니다.
///
/// 디렉토리에서 파일명이 정규식에 매칭되는 일반 파일을 찾고, 명시된 경로를 더합니다.
/// 결과는 경로 순으로 정렬되며 중복이 없습니다.
/// 디렉토리가 없으면 경고만 남기고 명시된 경로만 사용합니다.
///
/// # Errors
///
/// 파일명 정규식이 유효하지 않으면 [`MonitorError::SourceConfig`]를 반환합니다.
pub async fn discover_sources(config: &SourcesConfig) -> Result<Vec<LogSource>, MonitorError> {
    let mut paths: Vec<PathBuf> = Vec::new();

    if !config.dir.is_empty() {
        let pattern = Regex::new(&config.pattern).map_err(|e| MonitorError::SourceConfig {
            field: "sources.pattern".to_owned(),
            reason: e.to_string(),
        })?;
        paths.extend(scan_directory(Path::new(&config.dir), &pattern).await);
    }

    paths.extend(config.paths.iter().map(PathBuf::from));
    paths.sort();
    paths.dedup();

    tracing::debug!(count = paths.len(), dir = %config.dir, "log sources discovered");
    Ok(paths.into_iter().map(LogSource::new).collect())
}

async fn scan_directory(dir: &Path, pattern: &Regex) -> Vec<PathBuf> {
    let mut found = Vec::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "source directory not readable");
            return found;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to read directory entry");
                break;
            }
        };

        let name = entry.file_name();
        if !pattern.is_match(&name.to_string_lossy()) {
            continue;
        }

        // 심볼릭 링크는 대상 파일 기준으로 판단
        match tokio::fs::metadata(entry.path()).await {
            Ok(meta) if meta.is_file() => found.push(entry.path()),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(path = %entry.path().display(), error = %e, "skipping entry");
            }
        }
    }

    found
}

/// 한 번의 증분 읽기 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    /// 새로 읽은 완성된 라인들 (잘못된 UTF-8은 대체 문자로 변환)
    pub content: String,
    /// 읽기를 시작한 오프셋
    pub start_offset: u64,
    /// 다음 패스가 시작할 오프셋 (항상 개행 직후)
    pub new_offset: u64,
    /// 현재 파일 식별자
    pub inode: Option<u64>,
    /// 로테이션/truncation으로 처음부터 다시 읽었는지 여부
    pub rotated: bool,
    /// 읽기 한도에 걸려 남은 내용이 있는지 여부
    pub has_more: bool,
}

impl ReadOutcome {
    /// 새 체크포인트 값
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            offset: self.new_offset,
            inode: self.inode,
        }
    }
}

/// 체크포인트 이후의 새 내용을 읽습니다.
///
/// 마지막 개행까지만 소비하고, 끝의 미완성 라인은 다음 패스로 넘깁니다.
/// 한 라인이 `max_read_bytes`보다 길면 진행이 멈추지 않도록 한도만큼 소비합니다.
///
/// # Errors
///
/// 파일을 열거나 읽을 수 없으면 [`MonitorError::SourceRead`]를 반환합니다.
pub async fn read_new_content(
    source: &LogSource,
    previous: Option<Checkpoint>,
    max_read_bytes: u64,
) -> Result<ReadOutcome, MonitorError> {
    let read_err = |e: std::io::Error| MonitorError::SourceRead {
        path: source.path.display().to_string(),
        reason: e.to_string(),
    };

    let mut file = tokio::fs::File::open(&source.path).await.map_err(read_err)?;
    let metadata = file.metadata().await.map_err(read_err)?;
    let len = metadata.len();
    let inode = inode_of(&metadata);

    let stored = previous.unwrap_or_default();
    let truncated = len < stored.offset;
    let replaced = matches!((stored.inode, inode), (Some(old), Some(new)) if old != new);
    let rotated = truncated || replaced;
    let start = if rotated { 0 } else { stored.offset };

    if rotated {
        tracing::warn!(
            path = %source.path.display(),
            stored_offset = stored.offset,
            file_len = len,
            truncated,
            inode_changed = replaced,
            "source rotated, reading from start"
        );
    }

    let available = len.saturating_sub(start);
    let to_read = available.min(max_read_bytes);
    let mut buf = Vec::with_capacity(usize::try_from(to_read).unwrap_or(0));

    if to_read > 0 {
        file.seek(SeekFrom::Start(start)).await.map_err(read_err)?;
        (&mut file)
            .take(to_read)
            .read_to_end(&mut buf)
            .await
            .map_err(read_err)?;
    }

    let consumed = match buf.iter().rposition(|&b| b == b'\n') {
        Some(pos) => pos + 1,
        None if to_read == max_read_bytes && !buf.is_empty() => {
            tracing::warn!(
                path = %source.path.display(),
                max_read_bytes,
                "line exceeds read limit, consuming partial line"
            );
            buf.len()
        }
        None => 0,
    };
    buf.truncate(consumed);

    let new_offset = start + consumed as u64;
    Ok(ReadOutcome {
        content: String::from_utf8_lossy(&buf).into_owned(),
        start_offset: start,
        new_offset,
        inode,
        rotated,
        has_more: new_offset < len && available > max_read_bytes,
    })
}

#[cfg(unix)]
fn inode_of(metadata: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ino())
}

#[cfg(not(unix))]
fn inode_of(_metadata: &std::fs::Metadata) -> Option<u64> {
    None
}
