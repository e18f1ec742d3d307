//! 에러 타입 -- 도메인별 에러 정의

/// logsentry 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogsentryError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 상태 저장소(체크포인트, 카운터, 락) 에러
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LogsentryError {
    /// 설정 에러인지 확인합니다 (종료 코드 결정용).
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 상태 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// 상태 디렉토리 준비 실패
    #[error("state directory {path} unusable: {reason}")]
    Directory { path: String, reason: String },

    /// 상태 파일 기록 실패
    #[error("failed to persist {path}: {reason}")]
    Persist { path: String, reason: String },
}
