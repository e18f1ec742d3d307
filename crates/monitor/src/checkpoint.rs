//! 체크포인트 저장소 -- 소스별 마지막 처리 오프셋 영속화
//!
//! [`CheckpointStore`]는 소스 키마다 마지막으로 처리한 바이트 오프셋을 기록합니다.
//! 저장 형식은 사람이 읽을 수 있는 라인 단위 텍스트입니다.
//!
//! ```text
//! <source_key> <offset> [<inode>]
//! 3f2a9c...e1 10482 1835029
//! ```
//!
//! 기록은 임시 파일에 쓴 뒤 rename 하므로, 중간에 프로세스가 종료되어도
//! 절반만 기록된 저장소가 남지 않습니다.
//! 동시 접근은 저장소가 아니라 실행 락([`crate::lock`])이 막습니다.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::MonitorError;

/// 소스 키 길이 (16진수 문자 수, 128비트)
const SOURCE_KEY_HEX_LEN: usize = 32;

/// 소스 경로에서 도출한 안정적인 키
///
/// 원본 경로 대신 SHA-256 접두사를 사용하여 저장소가 구분자에 안전하도록 합니다.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceKey(String);

impl SourceKey {
    /// 소스 경로에서 키를 도출합니다.
    pub fn from_path(path: &Path) -> Self {
        let digest = Sha256::digest(path.as_os_str().as_encoded_bytes());
        let mut key = hex::encode(digest);
        key.truncate(SOURCE_KEY_HEX_LEN);
        Self(key)
    }

    /// 저장소에서 읽은 문자열을 키로 파싱합니다.
    fn parse(raw: &str) -> Option<Self> {
        (raw.len() == SOURCE_KEY_HEX_LEN && raw.chars().all(|c| c.is_ascii_hexdigit()))
            .then(|| Self(raw.to_ascii_lowercase()))
    }

    /// 키 문자열
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 체크포인트 엔트리
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Checkpoint {
    /// 다음 패스가 읽기 시작할 바이트 오프셋 (항상 개행 직후를 가리킴)
    pub offset: u64,
    /// 기록 시점의 파일 식별자 (Unix inode). 로테이션 감지에 사용합니다.
    pub inode: Option<u64>,
}

/// 체크포인트 저장소
///
/// 열 때 전체 파일을 메모리로 읽고, 갱신할 때마다 전체를 원자적으로 다시 씁니다.
/// 소스 수가 적으므로 전체 재기록 비용은 무시할 수 있습니다.
/// 오프셋 갱신은 크레이트 내부(락을 쥔 패스)에서만 가능합니다.
///
/// ```compile_fail
/// # async fn advance(
/// #     store: &mut logsentry_monitor::CheckpointStore,
/// #     key: &logsentry_monitor::SourceKey,
/// # ) {
/// store.set_offset(key, 42).await.unwrap();
/// # }
/// ```
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    entries: BTreeMap<SourceKey, Checkpoint>,
}

impl CheckpointStore {
    /// 저장소 파일을 엽니다.
    ///
    /// 파일이 없거나 읽을 수 없으면 빈 저장소로 취급합니다 (실패하지 않음).
    /// 형식이 잘못된 라인은 경고 로그를 남기고 건너뜁니다.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) => Self::parse(&content, &path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "checkpoint store unreadable, treating as empty"
                );
                BTreeMap::new()
            }
        };

        tracing::debug!(
            path = %path.display(),
            entries = entries.len(),
            "checkpoint store opened"
        );

        Self { path, entries }
    }

    fn parse(content: &str, path: &Path) -> BTreeMap<SourceKey, Checkpoint> {
        let mut entries = BTreeMap::new();

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let key = parts.next().and_then(SourceKey::parse);
            let offset = parts.next().and_then(|s| s.parse::<u64>().ok());
            let inode = match parts.next() {
                Some(raw) => match raw.parse::<u64>() {
                    Ok(v) => Some(Some(v)),
                    Err(_) => None,
                },
                None => Some(None),
            };

            match (key, offset, inode) {
                (Some(key), Some(offset), Some(inode)) => {
                    // 같은 키가 여러 번 나오면 마지막 값이 우선
                    entries.insert(key, Checkpoint { offset, inode });
                }
                _ => {
                    tracing::warn!(
                        path = %path.display(),
                        line = line_no + 1,
                        "malformed checkpoint line, skipping"
                    );
                }
            }
        }

        entries
    }

    /// 저장소 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 저장된 체크포인트를 반환합니다. 처음 보는 소스면 `None`입니다.
    pub fn get(&self, key: &SourceKey) -> Option<Checkpoint> {
        self.entries.get(key).copied()
    }

    /// 저장된 오프셋을 반환합니다. 처음 보는 소스면 `0`입니다.
    pub fn get_offset(&self, key: &SourceKey) -> u64 {
        self.entries.get(key).map_or(0, |c| c.offset)
    }

    /// 오프셋을 기록하고 즉시 영속화합니다.
    ///
    /// 같은 키의 이전 엔트리를 대체합니다 (last-write-wins).
    #[cfg(test)]
    pub(crate) async fn set_offset(&mut self, key: &SourceKey, offset: u64) -> Result<(), MonitorError> {
        let inode = self.entries.get(key).and_then(|c| c.inode);
        self.set(key, Checkpoint { offset, inode }).await
    }

    /// 오프셋과 파일 식별자를 함께 기록하고 즉시 영속화합니다.
    pub(crate) async fn set(&mut self, key: &SourceKey, checkpoint: Checkpoint) -> Result<(), MonitorError> {
        let previous = self.entries.insert(key.clone(), checkpoint);
        if let Err(e) = self.persist().await {
            // 메모리 상태를 디스크와 일치시킴
            match previous {
                Some(prev) => {
                    self.entries.insert(key.clone(), prev);
                }
                None => {
                    self.entries.remove(key);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// 저장된 엔트리 수
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 저장소가 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for (key, cp) in &self.entries {
            match cp.inode {
                Some(inode) => out.push_str(&format!("{key} {} {inode}\n", cp.offset)),
                None => out.push_str(&format!("{key} {}\n", cp.offset)),
            }
        }
        out
    }

    async fn persist(&self) -> Result<(), MonitorError> {
        write_atomic(&self.path, self.render().as_bytes()).await
    }
}

/// 임시 파일에 쓴 뒤 rename 하여 원자적으로 파일을 교체합니다.
pub(crate) async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), MonitorError> {
    let tmp_path = tmp_path_for(path);

    let result = async {
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    result.map_err(|e| {
        // 실패한 임시 파일은 다음 기록에서 덮어쓰므로 정리 실패는 무시
        let _ = std::fs::remove_file(&tmp_path);
        MonitorError::Persist {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_key_is_stable_and_fixed_length() {
        let a = SourceKey::from_path(Path::new("/var/log/app/api.log"));
        let b = SourceKey::from_path(Path::new("/var/log/app/api.log"));
        let c = SourceKey::from_path(Path::new("/var/log/app/worker.log"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), SOURCE_KEY_HEX_LEN);
        assert!(a.as_str().chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn source_key_hides_delimiters_in_path() {
        let key = SourceKey::from_path(Path::new("/var/log/weird dir/a|b.log"));
        assert!(!key.as_str().contains(' '));
        assert!(!key.as_str().contains('|'));
    }

    #[tokio::test]
    async fn missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path().join("checkpoints")).await;
        assert!(store.is_empty());
        let key = SourceKey::from_path(Path::new("/var/log/a.log"));
        assert_eq!(store.get_offset(&key), 0);
    }

    #[tokio::test]
    async fn set_offset_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints");
        let key = SourceKey::from_path(Path::new("/var/log/a.log"));

        let mut store = CheckpointStore::open(&path).await;
        store.set_offset(&key, 120).await.unwrap();
        store.set_offset(&key, 240).await.unwrap();

        let reopened = CheckpointStore::open(&path).await;
        assert_eq!(reopened.get_offset(&key), 240);
        assert_eq!(reopened.len(), 1);
    }

    #[tokio::test]
    async fn inode_is_persisted_and_kept_by_set_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints");
        let key = SourceKey::from_path(Path::new("/var/log/a.log"));

        let mut store = CheckpointStore::open(&path).await;
        store
            .set(
                &key,
                Checkpoint {
                    offset: 10,
                    inode: Some(4242),
                },
            )
            .await
            .unwrap();
        store.set_offset(&key, 20).await.unwrap();

        let reopened = CheckpointStore::open(&path).await;
        assert_eq!(
            reopened.get(&key),
            Some(Checkpoint {
                offset: 20,
                inode: Some(4242)
            })
        );
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_and_last_duplicate_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints");
        let key = SourceKey::from_path(Path::new("/var/log/a.log"));
        let content = format!(
            "garbage line\n{key} 5\n{key} not-a-number\n{key} 9 77\n\n# comment\n"
        );
        tokio::fs::write(&path, content).await.unwrap();

        let store = CheckpointStore::open(&path).await;
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(&key),
            Some(Checkpoint {
                offset: 9,
                inode: Some(77)
            })
        );
    }

    #[tokio::test]
    async fn persist_failure_keeps_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        // 존재하지 않는 하위 디렉토리 -> 기록 실패
        let path = dir.path().join("missing").join("checkpoints");
        let key = SourceKey::from_path(Path::new("/var/log/a.log"));

        let mut store = CheckpointStore::open(&path).await;
        assert!(store.set_offset(&key, 100).await.is_err());
        assert_eq!(store.get_offset(&key), 0);
    }

    #[tokio::test]
    async fn store_file_is_human_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints");
        let key = SourceKey::from_path(Path::new("/var/log/a.log"));

        let mut store = CheckpointStore::open(&path).await;
        store.set_offset(&key, 33).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, format!("{key} 33\n"));
    }
}
