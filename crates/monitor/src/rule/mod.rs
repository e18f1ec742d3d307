//! 분류 규칙 -- 정규식 패턴 기반 로그 라인 분류
//!
//! 설정의 `[[rules]]`와 YAML 규칙 파일에서 읽은 규칙을 순서대로 컴파일하여
//! [`RuleSet`]을 만들고, [`classify`]로 새 로그 내용을 [`EventBatch`] 목록으로 변환합니다.
//!
//! # 규칙 평가 순서
//! - 라인마다 CRITICAL 규칙을 선언 순서대로 평가하고 첫 매칭만 인정합니다.
//! - CRITICAL 매칭이 없을 때만 WARN 규칙을 같은 방식으로 평가합니다.
//! - 패턴은 대소문자를 구분하지 않습니다.
//!
//! # 아키텍처
//! - [`RuleSet`]: 컴파일된 규칙 목록
//! - [`loader`]: YAML 규칙 파일 로딩
//! - [`classifier`]: 순수 분류 함수와 샘플 렌더링
//!
//! [`EventBatch`]: logsentry_core::types::EventBatch

pub mod classifier;
pub mod loader;

pub use classifier::{MAX_SAMPLE_CHARS, MAX_SAMPLES, classify};
pub use loader::RuleLoader;

use regex::{Regex, RegexBuilder};

use logsentry_core::config::RuleConfig;
use logsentry_core::types::Severity;

use crate::error::MonitorError;

/// 컴파일된 정규식 최대 크기 (바이트)
const REGEX_SIZE_LIMIT: usize = 1024 * 1024;

/// 컴파일된 분류 규칙
#[derive(Debug, Clone)]
pub struct PatternRule {
    /// 원본 패턴
    pub pattern: String,
    /// 카테고리
    pub category: String,
    /// 심각도 티어
    pub severity: Severity,
    regex: Regex,
}

impl PatternRule {
    /// 규칙 설정을 검증하고 대소문자 무시 정규식으로 컴파일합니다.
    pub fn compile(index: usize, config: &RuleConfig) -> Result<Self, MonitorError> {
        config
            .validate()
            .map_err(|reason| MonitorError::RuleValidation {
                index,
                category: config.category.clone(),
                reason,
            })?;

        let regex = RegexBuilder::new(&config.pattern)
            .case_insensitive(true)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| MonitorError::RuleValidation {
                index,
                category: config.category.clone(),
                reason: format!("invalid regex '{}': {e}", config.pattern),
            })?;

        Ok(Self {
            pattern: config.pattern.clone(),
            category: config.category.clone(),
            severity: config.severity,
            regex,
        })
    }

    /// 라인이 이 규칙에 매칭되는지 확인합니다.
    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }
}

/// 순서가 보존되는 규칙 집합
///
/// 생성 후에는 변경되지 않습니다.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<PatternRule>,
}

impl RuleSet {
    /// 규칙 설정 목록을 순서대로 컴파일합니다.
    ///
    /// 하나라도 유효하지 않으면 전체가 실패합니다.
    pub fn compile(configs: &[RuleConfig]) -> Result<Self, MonitorError> {
        let rules = configs
            .iter()
            .enumerate()
            .map(|(idx, cfg)| PatternRule::compile(idx, cfg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// 설정의 인라인 규칙과 YAML 규칙 파일을 합쳐 컴파일합니다.
    ///
    /// 인라인 규칙이 먼저, 이어서 `rule_files`에 나열된 순서대로 붙습니다.
    pub async fn from_config(
        inline: &[RuleConfig],
        rule_files: &[String],
    ) -> Result<Self, MonitorError> {
        let mut configs = inline.to_vec();
        for path in rule_files {
            configs.extend(RuleLoader::load_file(path).await?);
        }

        if configs.is_empty() {
            return Err(MonitorError::RuleValidation {
                index: 0,
                category: String::new(),
                reason: "rule set must not be empty".to_owned(),
            });
        }

        let set = Self::compile(&configs)?;
        tracing::info!(
            rules = set.len(),
            critical = set.count_by_severity(Severity::Critical),
            warn = set.count_by_severity(Severity::Warn),
            "classification rules compiled"
        );
        Ok(set)
    }

    /// 규칙 목록 (선언 순서)
    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// 규칙 수
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 규칙이 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 특정 티어의 규칙 수
    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.rules.iter().filter(|r| r.severity == severity).count()
    }

    /// 라인에 대해 티어 내 첫 매칭 규칙의 순번을 반환합니다.
    pub(crate) fn first_match(&self, line: &str, severity: Severity) -> Option<usize> {
        self.rules
            .iter()
            .position(|r| r.severity == severity && r.is_match(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, category: &str, severity: Severity) -> RuleConfig {
        RuleConfig {
            pattern: pattern.to_owned(),
            category: category.to_owned(),
            severity,
        }
    }

    #[test]
    fn compile_is_case_insensitive() {
        let compiled =
            PatternRule::compile(0, &rule(r"auth\.failed", "AUTH_FAIL", Severity::Critical))
                .unwrap();
        assert!(compiled.is_match("AUTH.FAILED user=1"));
        assert!(compiled.is_match("auth.failed"));
        assert!(!compiled.is_match("authXfailed"));
    }

    #[test]
    fn invalid_regex_reports_index() {
        let err = RuleSet::compile(&[
            rule("ok", "OK", Severity::Warn),
            rule("[invalid", "BROKEN", Severity::Warn),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            MonitorError::RuleValidation { index: 1, .. }
        ));
    }

    #[test]
    fn empty_category_is_rejected() {
        assert!(PatternRule::compile(0, &rule("x", "", Severity::Warn)).is_err());
    }

    #[test]
    fn first_match_respects_tier_and_order() {
        let set = RuleSet::compile(&[
            rule("timeout", "TIMEOUT", Severity::Warn),
            rule("fail", "FAIL_A", Severity::Critical),
            rule("fail", "FAIL_B", Severity::Critical),
        ])
        .unwrap();

        assert_eq!(set.first_match("login fail", Severity::Critical), Some(1));
        assert_eq!(set.first_match("login fail", Severity::Warn), None);
        assert_eq!(set.first_match("upstream timeout", Severity::Warn), Some(0));
        assert_eq!(set.count_by_severity(Severity::Critical), 2);
    }

    #[tokio::test]
    async fn from_config_appends_rule_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("extra.yml");
        tokio::fs::write(
            &file,
            "- pattern: disk full\n  category: DISK_FULL\n  severity: critical\n",
        )
        .await
        .unwrap();

        let set = RuleSet::from_config(
            &[rule("timeout", "TIMEOUT", Severity::Warn)],
            &[file.display().to_string()],
        )
        .await
        .unwrap();

        let categories: Vec<&str> = set.rules().iter().map(|r| r.category.as_str()).collect();
        assert_eq!(categories, vec!["TIMEOUT", "DISK_FULL"]);
    }

    #[tokio::test]
    async fn from_config_rejects_empty_set() {
        assert!(RuleSet::from_config(&[], &[]).await.is_err());
    }
}
