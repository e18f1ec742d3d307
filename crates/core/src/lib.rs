//! logsentry 공통 크레이트
//!
//! 모니터 크레이트와 바이너리가 공유하는 타입, 에러, 설정을 정의합니다.
//!
//! - [`config`]: `logsentry.toml` 파싱, 환경변수 오버라이드, 검증
//! - [`error`]: 최상위 에러 타입과 도메인별 에러
//! - [`types`]: 심각도 티어와 이벤트 배치

pub mod config;
pub mod error;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, LogsentryError, StateError};

// 설정
pub use config::{MonitorConfig, RuleConfig};

// 도메인 타입
pub use types::{EventBatch, Severity};
