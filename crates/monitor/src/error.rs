//! 모니터 에러 타입
//!
//! [`MonitorError`]는 모니터 내부(규칙, 소스 읽기, 상태 저장소)에서 발생하는 에러를,
//! [`DispatchError`]는 알림 전송 실패를 표현합니다.
//! `From<MonitorError> for LogsentryError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use std::time::Duration;

use logsentry_core::error::{ConfigError, LogsentryError, StateError};

use crate::notify::NotifyError;

/// 모니터 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// 규칙 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 규칙 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 규칙 유효성 검증 실패 (정규식 컴파일 실패 등)
    #[error("rule validation error: rule[{index}] '{category}': {reason}")]
    RuleValidation {
        /// 규칙 순번 (전체 규칙 목록 기준)
        index: usize,
        /// 규칙 카테고리
        category: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 소스 파일 정규식/디렉토리 설정 에러
    #[error("source config error: {field}: {reason}")]
    SourceConfig {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 소스 읽기 실패 (권한 없음, 읽는 중 삭제 등)
    #[error("source read error: {path}: {reason}")]
    SourceRead {
        /// 소스 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 상태 파일 기록 실패
    #[error("state persist error: {path}: {reason}")]
    Persist {
        /// 상태 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 락 파일 처리 실패 (락 경합과는 별개)
    #[error("lock error: {path}: {reason}")]
    Lock {
        /// 락 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// 설정 성격의 에러인지 확인합니다.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::RuleLoad { .. } | Self::RuleValidation { .. } | Self::SourceConfig { .. }
        )
    }
}

impl From<MonitorError> for LogsentryError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::RuleLoad { path, reason } => {
                LogsentryError::Config(ConfigError::InvalidValue {
                    field: format!("rule_files ({path})"),
                    reason,
                })
            }
            MonitorError::RuleValidation {
                index,
                category,
                reason,
            } => LogsentryError::Config(ConfigError::InvalidValue {
                field: format!("rules[{index}] ({category})"),
                reason,
            }),
            MonitorError::SourceConfig { field, reason } => {
                LogsentryError::Config(ConfigError::InvalidValue { field, reason })
            }
            MonitorError::Persist { path, reason } | MonitorError::Lock { path, reason } => {
                LogsentryError::State(StateError::Persist { path, reason })
            }
            MonitorError::SourceRead { path, reason } => {
                LogsentryError::State(StateError::Directory { path, reason })
            }
            MonitorError::Io(e) => LogsentryError::Io(e),
        }
    }
}

/// 알림 전송 에러
///
/// 전송 실패는 같은 패스 안에서 재시도하지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// 알림 채널이 실패를 반환함
    #[error("notification failed: {0}")]
    Notify(#[from] NotifyError),

    /// 타임아웃 초과 (전송 실패로 취급)
    #[error("notification timed out after {0:?}")]
    Timeout(Duration),
}

/// 헬스 프로브 에러
///
/// 프로브 실패는 이슈를 만들지 않고 상태를 "unknown"으로 표시합니다.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// 시스템 정보를 읽을 수 없음
    #[error("probe unavailable: {0}")]
    Unavailable(String),

    /// 프로브 타임아웃
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    /// I/O 에러
    #[error("probe io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_validation_display() {
        let err = MonitorError::RuleValidation {
            index: 2,
            category: "AUTH_FAIL".to_owned(),
            reason: "invalid regex".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("rule[2]"));
        assert!(msg.contains("AUTH_FAIL"));
        assert!(msg.contains("invalid regex"));
    }

    #[test]
    fn rule_errors_convert_to_config_error() {
        let err = MonitorError::RuleValidation {
            index: 0,
            category: "X".to_owned(),
            reason: "bad".to_owned(),
        };
        assert!(err.is_config());
        let top: LogsentryError = err.into();
        assert!(top.is_config());
    }

    #[test]
    fn persist_error_converts_to_state_error() {
        let err = MonitorError::Persist {
            path: "/tmp/checkpoints".to_owned(),
            reason: "read-only filesystem".to_owned(),
        };
        assert!(!err.is_config());
        let top: LogsentryError = err.into();
        assert!(matches!(top, LogsentryError::State(_)));
    }

    #[test]
    fn timeout_display() {
        let err = DispatchError::Timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("5s"));
    }
}
