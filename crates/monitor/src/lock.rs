//! 실행 락 -- 단일 인스턴스 보장
//!
//! 잘 알려진 경로의 락 파일에 배타적 advisory 락(`flock`)을 걸고,
//! 보유 중에는 파일 내용에 `<pid> <acquired_at>`을 기록합니다.
//!
//! # 획득 절차
//! 1. 락 파일을 열거나 만듭니다 (절대 삭제하지 않음).
//! 2. 논블로킹 배타 락을 시도합니다.
//!    - 성공하면 내용을 자신의 기록으로 교체합니다.
//!    - 이미 잠겨 있으면 [`LockOutcome::Denied`] (정상적인 결과이며 에러가 아님)
//!
//! 보유 프로세스가 죽으면 커널이 락을 풀어 주므로 남은 기록은 다음 획득자가 덮어씁니다.
//! 해제는 [`LockGuard`]의 `Drop`에서 수행되므로 모든 종료 경로에서 보장됩니다.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;

use crate::error::MonitorError;

/// 락 획득 결과
#[derive(Debug)]
pub enum LockOutcome {
    /// 획득 성공. 가드가 살아 있는 동안 락이 유지됩니다.
    Acquired(LockGuard),
    /// 다른 프로세스가 락을 보유 중
    Denied {
        /// 보유 프로세스 pid (아직 기록 전이면 `None`)
        pid: Option<u32>,
    },
}

/// 실행 락
pub struct RunLock;

impl RunLock {
    /// 락을 획득합니다.
    ///
    /// # Errors
    ///
    /// 락 파일을 열거나 기록할 수 없으면 [`MonitorError::Lock`]을 반환합니다.
    /// 경합은 에러가 아니라 [`LockOutcome::Denied`]입니다.
    pub fn acquire(path: impl AsRef<Path>) -> Result<LockOutcome, MonitorError> {
        let path = path.as_ref();
        let mut file = open_lock_file(path).map_err(|e| lock_error(path, &e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if is_contended(&e) => {
                let holder = read_record(&mut file);
                tracing::info!(
                    holder_pid = ?holder,
                    path = %path.display(),
                    "run lock held by another process"
                );
                return Ok(LockOutcome::Denied { pid: holder });
            }
            Err(e) => return Err(lock_error(path, &e)),
        }

        if let Some(previous) = read_record(&mut file) {
            tracing::warn!(
                previous_pid = previous,
                path = %path.display(),
                "reclaiming run lock left by a process that did not release it"
            );
        }

        let pid = std::process::id();
        let acquired_at = Utc::now();
        write_record(&mut file, pid, acquired_at).map_err(|e| lock_error(path, &e))?;

        tracing::info!(pid, path = %path.display(), "run lock acquired");
        Ok(LockOutcome::Acquired(LockGuard {
            file,
            path: path.to_path_buf(),
            pid,
            acquired_at,
        }))
    }
}

fn open_lock_file(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(false);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// 락 파일에서 pid를 읽습니다. 비었거나 해석할 수 없으면 `None`.
fn read_record(file: &mut File) -> Option<u32> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut content).ok()?;
    content.split_whitespace().next()?.parse().ok()
}

fn write_record(file: &mut File, pid: u32, acquired_at: DateTime<Utc>) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{pid} {}", acquired_at.to_rfc3339())?;
    file.sync_all()
}

fn lock_error(path: &Path, e: &std::io::Error) -> MonitorError {
    MonitorError::Lock {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

/// 획득한 락의 가드
///
/// 드롭되면 기록을 지우고 락을 해제합니다. 락 파일 자체는 남겨 둡니다.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

impl LockGuard {
    /// 락 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 보유 pid
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// 획득 시각
    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // 락을 쥔 채로 비워야 다음 획득자가 반쯤 지운 기록을 보지 않는다
        if let Err(e) = self.file.set_len(0) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to clear run lock record"
            );
        }
        match FileExt::unlock(&self.file) {
            Ok(()) => tracing::info!(path = %self.path.display(), "run lock released"),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to unlock run lock"
            ),
        }
    }
}
