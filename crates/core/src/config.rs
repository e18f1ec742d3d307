//! 설정 관리 -- logsentry.toml 파싱 및 런타임 설정
//!
//! [`MonitorConfig`]는 모니터의 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선, 로그 레벨/형식만)
//! 2. 환경변수 (`LOGSENTRY_NOTIFY_BOT_TOKEN=...` 형식)
//! 3. 설정 파일 (`logsentry.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logsentry_core::error::LogsentryError> {
//! use logsentry_core::config::MonitorConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드 + 검증
//! let config = MonitorConfig::load("logsentry.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = MonitorConfig::parse("[notify]\ndestination = \"-100123\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogsentryError};
use crate::types::Severity;

/// logsentry 통합 설정
///
/// `logsentry.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// 추가 YAML 규칙 파일 목록 (`rules` 뒤에 순서대로 이어 붙임)
    #[serde(default)]
    pub rule_files: Vec<String>,
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 알림 채널 설정
    #[serde(default)]
    pub notify: NotifyConfig,
    /// 로그 소스 탐색 설정
    #[serde(default)]
    pub sources: SourcesConfig,
    /// 헬스 체크 설정
    #[serde(default)]
    pub health: HealthConfig,
    /// 다이제스트 설정
    #[serde(default)]
    pub digest: DigestConfig,
    /// 분류 규칙 (순서가 카테고리 귀속을 결정)
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl MonitorConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용한 뒤 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogsentryError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드, 검증 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogsentryError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogsentryError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogsentryError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogsentryError> {
        toml::from_str(toml_str).map_err(|e| {
            LogsentryError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGSENTRY_{SECTION}_{FIELD}`
    /// 예: `LOGSENTRY_NOTIFY_DESTINATION=-1001234567890`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGSENTRY_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGSENTRY_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.state_dir, "LOGSENTRY_GENERAL_STATE_DIR");

        // Notify
        override_string(&mut self.notify.bot_token, "LOGSENTRY_NOTIFY_BOT_TOKEN");
        override_string(&mut self.notify.destination, "LOGSENTRY_NOTIFY_DESTINATION");
        override_opt_i64(&mut self.notify.sub_channel, "LOGSENTRY_NOTIFY_SUB_CHANNEL");
        override_string(&mut self.notify.api_base, "LOGSENTRY_NOTIFY_API_BASE");
        override_u64(&mut self.notify.timeout_secs, "LOGSENTRY_NOTIFY_TIMEOUT_SECS");

        // Sources
        override_string(&mut self.sources.dir, "LOGSENTRY_SOURCES_DIR");
        override_string(&mut self.sources.pattern, "LOGSENTRY_SOURCES_PATTERN");
        override_csv(&mut self.sources.paths, "LOGSENTRY_SOURCES_PATHS");
        override_u64(
            &mut self.sources.max_read_bytes,
            "LOGSENTRY_SOURCES_MAX_READ_BYTES",
        );

        // Health
        override_bool(&mut self.health.enabled, "LOGSENTRY_HEALTH_ENABLED");
        override_string(&mut self.health.disk_path, "LOGSENTRY_HEALTH_DISK_PATH");
        override_u8(
            &mut self.health.disk_threshold,
            "LOGSENTRY_HEALTH_DISK_THRESHOLD",
        );
        override_u8(&mut self.health.mem_threshold, "LOGSENTRY_HEALTH_MEM_THRESHOLD");
        override_csv(&mut self.health.services, "LOGSENTRY_HEALTH_SERVICES");
        override_u64(
            &mut self.health.probe_timeout_secs,
            "LOGSENTRY_HEALTH_PROBE_TIMEOUT_SECS",
        );

        // Digest
        override_u32(
            &mut self.digest.retention_days,
            "LOGSENTRY_DIGEST_RETENTION_DAYS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 정규식 컴파일 검증은 규칙을 컴파일하는 모니터 크레이트에서 수행합니다.
    pub fn validate(&self) -> Result<(), LogsentryError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.general.state_dir.trim().is_empty() {
            return Err(invalid("general.state_dir", "must not be empty"));
        }

        if self.notify.destination.trim().is_empty() {
            return Err(invalid("notify.destination", "must not be empty"));
        }

        if self.notify.timeout_secs == 0 || self.notify.timeout_secs > 60 {
            return Err(invalid("notify.timeout_secs", "must be 1-60"));
        }

        if self.sources.dir.is_empty() && self.sources.paths.is_empty() {
            return Err(invalid(
                "sources",
                "either sources.dir or sources.paths must be set",
            ));
        }

        if self.sources.max_read_bytes == 0 {
            return Err(invalid("sources.max_read_bytes", "must be greater than 0"));
        }

        for (field, value) in [
            ("health.disk_threshold", self.health.disk_threshold),
            ("health.mem_threshold", self.health.mem_threshold),
        ] {
            if value == 0 || value > 100 {
                return Err(invalid(field, "must be a percentage in 1-100"));
            }
        }

        if self.health.probe_timeout_secs == 0 || self.health.probe_timeout_secs > 60 {
            return Err(invalid("health.probe_timeout_secs", "must be 1-60"));
        }

        if self.digest.retention_days == 0 {
            return Err(invalid("digest.retention_days", "must be at least 1"));
        }

        if self.rules.is_empty() && self.rule_files.is_empty() {
            return Err(invalid("rules", "at least one classification rule is required"));
        }

        for (idx, rule) in self.rules.iter().enumerate() {
            rule.validate()
                .map_err(|reason| invalid(&format!("rules[{idx}]"), reason))?;
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> LogsentryError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 체크포인트/카운터/락 파일 디렉토리
    pub state_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            state_dir: "/var/lib/logsentry".to_owned(),
        }
    }
}

/// 알림 채널 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// 봇 API 토큰 (환경변수로 주입 권장)
    pub bot_token: String,
    /// 알림 대상 (채팅 ID)
    pub destination: String,
    /// 대상 내 하위 채널 (토픽/스레드 ID)
    pub sub_channel: Option<i64>,
    /// 봇 API 베이스 URL
    pub api_base: String,
    /// 전송 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            destination: String::new(),
            sub_channel: None,
            api_base: "https://api.telegram.org".to_owned(),
            timeout_secs: 5,
        }
    }
}

/// 로그 소스 탐색 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// 매 실행마다 스캔할 디렉토리 (비어 있으면 스캔하지 않음)
    pub dir: String,
    /// 파일명 매칭 정규식
    pub pattern: String,
    /// 디렉토리 스캔과 별개로 항상 감시할 파일 경로
    pub paths: Vec<String>,
    /// 소스당 한 패스에서 읽을 최대 바이트 수
    pub max_read_bytes: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            dir: "/var/log/app".to_owned(),
            pattern: r"\.log$".to_owned(),
            paths: Vec::new(),
            max_read_bytes: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// 헬스 체크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 디스크 사용률을 측정할 경로
    pub disk_path: String,
    /// 디스크 사용률 임계값 (%)
    pub disk_threshold: u8,
    /// 메모리 사용률 임계값 (%)
    pub mem_threshold: u8,
    /// 살아 있어야 하는 서비스 프로세스명
    pub services: Vec<String>,
    /// 프로브 타임아웃 (초)
    pub probe_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            disk_path: "/".to_owned(),
            disk_threshold: 90,
            mem_threshold: 95,
            services: Vec::new(),
            probe_timeout_secs: 5,
        }
    }
}

/// 다이제스트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    /// 카운터 보존 기간 (일)
    pub retention_days: u32,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self { retention_days: 3 }
    }
}

/// 분류 규칙 설정 -- `(pattern, category, severity)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// 정규식 패턴 (대소문자 무시로 컴파일됨)
    pub pattern: String,
    /// 카테고리명 (카운터 로그에 그대로 기록됨)
    pub category: String,
    /// 심각도 티어
    pub severity: Severity,
}

impl RuleConfig {
    /// 규칙 필드를 검증합니다. 실패 시 사유를 반환합니다.
    ///
    /// 카테고리는 카운터 로그 구분자(`|`)와 공백 문자를 포함할 수 없습니다.
    pub fn validate(&self) -> Result<(), String> {
        if self.pattern.is_empty() {
            return Err("pattern must not be empty".to_owned());
        }
        if self.category.is_empty() {
            return Err("category must not be empty".to_owned());
        }
        if self.category.len() > 64 {
            return Err(format!(
                "category '{}' must not exceed 64 characters",
                self.category
            ));
        }
        if self
            .category
            .chars()
            .any(|c| c == '|' || c.is_whitespace() || c.is_control())
        {
            return Err(format!(
                "category '{}' must not contain '|' or whitespace",
                self.category
            ));
        }
        Ok(())
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u8(target: &mut u8, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u8>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u8 from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_opt_i64(target: &mut Option<i64>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        if val.trim().is_empty() {
            *target = None;
            return;
        }
        match val.trim().parse::<i64>() {
            Ok(parsed) => *target = Some(parsed),
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse i64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
