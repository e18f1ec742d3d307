//! # logsentry-monitor
//!
//! 체크포인트 기반 로그 추적, 패턴 분류, 계층형 알림, 일일 카운터 집계를 담당합니다.
//! 크론 등 외부 스케줄러가 주기적으로 호출하는 단발성 실행을 전제로 합니다.
//!
//! # 모듈 구성
//!
//! - [`checkpoint`]: 소스별 마지막 처리 오프셋 저장소
//! - [`source`]: 소스 탐색과 증분 읽기 (로테이션 감지)
//! - [`rule`]: 정규식 분류 규칙, YAML 규칙 로더, 분류기
//! - [`counter`]: WARN 이벤트 일일 카운터 로그
//! - [`notify`]: 알림 채널 trait과 구현체
//! - [`dispatch`]: 알림 렌더링과 타임아웃 제한 전송
//! - [`health`]: 디스크/메모리/서비스 점검
//! - [`lock`]: 단일 인스턴스 실행 락
//! - [`coordinator`]: 한 번의 실행 오케스트레이션
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! RunLock -> discover_sources -> read_new_content -> classify -+-> CounterLog (WARN)
//!                 |                                            +-> AlertDispatcher (CRITICAL)
//!           CheckpointStore <----------- new offset ----------+
//!                                         HealthChecker -> AlertDispatcher
//!
//! --digest: CounterLog - 보고된 합계(digested.log) -> AlertDispatcher -> 성공 시 정리
//! ```

pub mod checkpoint;
pub mod coordinator;
pub mod counter;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod lock;
pub mod notify;
pub mod rule;
pub mod source;

// --- 주요 타입 re-export ---

// 조정자
pub use coordinator::{DigestSummary, PassSummary, RunCoordinator, RunState, StateLayout};

// 에러
pub use error::{DispatchError, MonitorError, ProbeError};

// 상태 저장소
pub use checkpoint::{Checkpoint, CheckpointStore, SourceKey};
pub use counter::{CounterLog, DatedTotals};
pub use lock::{LockGuard, LockOutcome, RunLock};

// 분류
pub use rule::{PatternRule, RuleSet, classify};

// 소스
pub use source::{LogSource, ReadOutcome, discover_sources, read_new_content};

// 알림
pub use dispatch::AlertDispatcher;
pub use notify::{LogNotifier, MessageFormat, Notifier, NotifyError, TelegramNotifier};

// 헬스 체크
pub use health::{HealthChecker, HealthIssue, HealthReport, HostProbe, SystemProbe, Usage};
