//! 규칙 파일 로더 -- YAML 규칙 목록을 디스크에서 로드합니다.
//!
//! 규칙 파일은 `pattern`/`category`/`severity` 항목의 YAML 시퀀스입니다.
//! 인라인 규칙과 달리 파일 하나라도 실패하면 전체 로딩이 실패합니다.

use std::path::Path;

use logsentry_core::config::RuleConfig;

use crate::error::MonitorError;

const MAX_RULE_FILE_SIZE: u64 = 1024 * 1024; // 1MB
const MAX_RULES_PER_FILE: usize = 1_000;

/// 규칙 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// YAML 규칙 파일 하나를 로드합니다.
    ///
    /// # Errors
    /// - 파일이 없거나 읽을 수 없는 경우
    /// - 파일 크기가 `MAX_RULE_FILE_SIZE`를 초과하는 경우
    /// - YAML 형식이 잘못된 경우
    pub async fn load_file(path: impl AsRef<Path>) -> Result<Vec<RuleConfig>, MonitorError> {
        let path = path.as_ref();
        let source = path.display().to_string();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| MonitorError::RuleLoad {
                path: source.clone(),
                reason: format!("failed to stat file: {e}"),
            })?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(MonitorError::RuleLoad {
                path: source,
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| MonitorError::RuleLoad {
                    path: source.clone(),
                    reason: format!("failed to read file: {e}"),
                })?;

        let rules = Self::parse_yaml(&content, &source)?;
        tracing::debug!(path = %source, count = rules.len(), "rule file loaded");
        Ok(rules)
    }

    /// YAML 문자열을 규칙 목록으로 파싱합니다.
    ///
    /// 빈 문서는 빈 목록으로 취급합니다.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<Vec<RuleConfig>, MonitorError> {
        if yaml_str.trim().is_empty() {
            return Ok(Vec::new());
        }

        let rules: Vec<RuleConfig> =
            serde_yaml::from_str(yaml_str).map_err(|e| MonitorError::RuleLoad {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;

        if rules.len() > MAX_RULES_PER_FILE {
            return Err(MonitorError::RuleLoad {
                path: source.to_owned(),
                reason: format!(
                    "too many rules: {} (max: {MAX_RULES_PER_FILE})",
                    rules.len()
                ),
            });
        }

        Ok(rules)
    }
}
