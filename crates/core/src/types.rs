//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 분류기, 카운터 집계기, 알림 디스패처가 공유하는 데이터 구조를 정의합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 심각도 티어
///
/// `Critical`은 즉시 개별 알림으로 전송되고,
/// `Warn`은 일일 카운터에 누적되어 다이제스트로 요약됩니다.
/// `Ord` 구현으로 비교가 가능합니다 (`Warn < Critical`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 집계 대상 -- 다이제스트로만 보고
    #[serde(alias = "WARN", alias = "warning", alias = "Warn")]
    Warn,
    /// 치명적 -- 즉시 알림
    #[serde(alias = "CRITICAL", alias = "crit", alias = "Critical")]
    Critical,
}

impl Severity {
    /// 대문자 레이블 (`CRITICAL`, `WARN`)
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Warn => "WARN",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// 이벤트 배치
///
/// 하나의 (소스, 패스)에서 같은 `(category, severity)`로 분류된 매칭을 묶은 결과입니다.
/// 영속화되지 않으며, 생성 즉시 디스패처(CRITICAL) 또는 카운터(WARN)가 소비합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBatch {
    /// 분류 카테고리 (예: `AUTH_FAIL`)
    pub category: String,
    /// 심각도 티어
    pub severity: Severity,
    /// 매칭된 라인 수
    pub match_count: u64,
    /// 대표 샘플 라인 (개수/길이 제한, HTML 이스케이프 완료)
    pub sample_lines: Vec<String>,
}

impl EventBatch {
    /// 샘플 없이 빈 배치를 생성합니다.
    pub fn new(category: impl Into<String>, severity: Severity) -> Self {
        Self {
            category: category.into(),
            severity,
            match_count: 0,
            sample_lines: Vec::new(),
        }
    }
}

impl fmt::Display for EventBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} x{}",
            self.severity, self.category, self.match_count
        )
    }
}
