//! 실행 조정자 -- 한 번의 실행(패스/다이제스트/테스트)을 오케스트레이션합니다.
//!
//! # 상태 전이
//!
//! ```text
//! 패스:       Idle -> LockAcquired -> Scanning -> HealthCheck -> Done
//! 다이제스트: Idle -> LockAcquired -> Digest -> Done
//! 경합:       Idle -> LockDenied
//! 테스트:     Idle -> Done            (락 없음, 상태 변경 없음)
//! ```
//!
//! # 소스별 처리 순서
//! 1. 체크포인트 조회, 로테이션 감지, 마지막 개행까지 새 내용 읽기
//! 2. 분류
//! 3. 오늘 날짜로 WARN 카운트 추가 (실패 시 소스를 건너뛰고 오프셋 유지)
//! 4. CRITICAL 배치 즉시 전송
//! 5. 새 오프셋 기록
//!
//! 상태를 바꾸는 진입점은 모두 [`LockGuard`] 참조를 요구합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use tracing::Instrument;
use uuid::Uuid;

use logsentry_core::config::{MonitorConfig, SourcesConfig};
use logsentry_core::types::Severity;

use crate::checkpoint::CheckpointStore;
use crate::counter::{CounterLog, DatedTotals};
use crate::dispatch::AlertDispatcher;
use crate::error::{DispatchError, MonitorError};
use crate::health::{HealthChecker, SystemProbe};
use crate::lock::{LockGuard, LockOutcome, RunLock};
use crate::notify::Notifier;
use crate::rule::{RuleSet, classify};
use crate::source::{LogSource, discover_sources, read_new_content};

const CHECKPOINT_FILE: &str = "checkpoints";
const COUNTER_FILE: &str = "counters.log";
const REPORTED_FILE: &str = "digested.log";
const LOCK_FILE: &str = "monitor.lock";

/// 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// 시작 전
    Idle,
    /// 락 획득
    LockAcquired,
    /// 다른 인스턴스가 실행 중
    LockDenied,
    /// 소스 스캔 중
    Scanning,
    /// 헬스 체크 중
    HealthCheck,
    /// 다이제스트 생성/전송 중
    Digest,
    /// 완료
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::LockAcquired => "lock_acquired",
            Self::LockDenied => "lock_denied",
            Self::Scanning => "scanning",
            Self::HealthCheck => "health_check",
            Self::Digest => "digest",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// 상태 디렉토리 내 파일 배치
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    /// 상태 디렉토리
    pub dir: PathBuf,
    /// 체크포인트 저장소
    pub checkpoints: PathBuf,
    /// 카운터 로그
    pub counters: PathBuf,
    /// 다이제스트로 이미 보고된 합계 (카운터 로그와 같은 형식)
    pub reported: PathBuf,
    /// 락 파일
    pub lock: PathBuf,
}

impl StateLayout {
    /// 상태 디렉토리 기준으로 파일 경로를 만듭니다.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            checkpoints: dir.join(CHECKPOINT_FILE),
            counters: dir.join(COUNTER_FILE),
            reported: dir.join(REPORTED_FILE),
            lock: dir.join(LOCK_FILE),
            dir,
        }
    }

    /// 상태 디렉토리를 만듭니다 (Unix에서는 0o700).
    pub fn ensure(&self) -> Result<(), MonitorError> {
        let result = {
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                std::fs::DirBuilder::new()
                    .mode(0o700)
                    .recursive(true)
                    .create(&self.dir)
            }
            #[cfg(not(unix))]
            {
                std::fs::create_dir_all(&self.dir)
            }
        };
        result.map_err(|e| MonitorError::Persist {
            path: self.dir.display().to_string(),
            reason: format!("failed to create state directory: {e}"),
        })
    }
}

/// 한 패스의 결과 요약
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// 처리 완료한 소스 수
    pub sources_scanned: usize,
    /// 읽기/기록 실패로 건너뛴 소스 수
    pub sources_failed: usize,
    /// 로테이션이 감지된 소스 수
    pub sources_rotated: usize,
    /// 전송된 CRITICAL 알림 수
    pub criticals_sent: usize,
    /// 전송에 실패한 CRITICAL 알림 수
    pub criticals_lost: usize,
    /// 카운터에 추가된 WARN 이벤트 수
    pub warn_events: u64,
    /// 헬스 이슈 수
    pub health_issues: usize,
}

/// 다이제스트 결과 요약
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestSummary {
    /// 대상 날짜
    pub date: NaiveDate,
    /// 카테고리 수
    pub categories: usize,
    /// 전체 이벤트 수
    pub total_events: u64,
    /// 전송 성공 여부
    pub sent: bool,
    /// 정리된 카운터 엔트리 수
    pub pruned: usize,
}

/// 실행 조정자
pub struct RunCoordinator<N: Notifier, P: SystemProbe> {
    layout: StateLayout,
    sources: SourcesConfig,
    rules: RuleSet,
    dispatcher: AlertDispatcher<N>,
    health: HealthChecker<P>,
    retention_days: u32,
    state: RunState,
}

impl<N: Notifier, P: SystemProbe> RunCoordinator<N, P> {
    /// 검증된 설정과 컴파일된 규칙으로 조정자를 생성합니다.
    pub fn new(config: &MonitorConfig, rules: RuleSet, notifier: N, probe: P) -> Self {
        Self {
            layout: StateLayout::new(&config.general.state_dir),
            sources: config.sources.clone(),
            rules,
            dispatcher: AlertDispatcher::new(
                notifier,
                Duration::from_secs(config.notify.timeout_secs),
            ),
            health: HealthChecker::new(config.health.clone(), probe),
            retention_days: config.digest.retention_days,
            state: RunState::Idle,
        }
    }

    /// 상태 파일 배치
    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    /// 현재 상태
    pub fn state(&self) -> RunState {
        self.state
    }

    /// 디스패처 참조
    pub fn dispatcher(&self) -> &AlertDispatcher<N> {
        &self.dispatcher
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!(from = %self.state, to = %next, "run state transition");
        self.state = next;
    }

    /// 상태 디렉토리를 준비하고 실행 락을 획득합니다.
    ///
    /// # Errors
    ///
    /// 상태 디렉토리나 락 파일을 만들 수 없으면 실패합니다.
    pub fn acquire_lock(&mut self) -> Result<LockOutcome, MonitorError> {
        self.layout.ensure()?;
        let outcome = RunLock::acquire(&self.layout.lock)?;
        match &outcome {
            LockOutcome::Acquired(_) => self.transition(RunState::LockAcquired),
            LockOutcome::Denied { .. } => self.transition(RunState::LockDenied),
        }
        Ok(outcome)
    }

    /// 모든 소스를 한 번 스캔하고 헬스 체크를 실행합니다.
    ///
    /// 소스 하나의 실패는 그 소스만 건너뛰며 패스를 중단하지 않습니다.
    ///
    /// # Errors
    ///
    /// 소스 탐색 설정이 잘못된 경우에만 실패합니다.
    pub async fn run_pass(
        &mut self,
        guard: &LockGuard,
        today: NaiveDate,
    ) -> Result<PassSummary, MonitorError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("pass", %run_id, lock_pid = guard.pid());
        self.run_pass_inner(today).instrument(span).await
    }

    async fn run_pass_inner(&mut self, today: NaiveDate) -> Result<PassSummary, MonitorError> {
        let mut summary = PassSummary::default();

        self.transition(RunState::Scanning);
        let sources = discover_sources(&self.sources).await?;
        let mut store = CheckpointStore::open(&self.layout.checkpoints).await;
        let counters = CounterLog::new(&self.layout.counters);

        for source in &sources {
            self.scan_source(source, &mut store, &counters, today, &mut summary)
                .await;
        }

        self.transition(RunState::HealthCheck);
        let report = self.health.check().await;
        summary.health_issues = report.issues.len();
        if let Err(e) = self.dispatcher.send_health_alert(&report.issues).await {
            tracing::error!(error = %e, issues = report.issues.len(), "health alert not delivered");
        }

        self.transition(RunState::Done);
        tracing::info!(
            sources_scanned = summary.sources_scanned,
            sources_failed = summary.sources_failed,
            sources_rotated = summary.sources_rotated,
            criticals_sent = summary.criticals_sent,
            criticals_lost = summary.criticals_lost,
            warn_events = summary.warn_events,
            health_issues = summary.health_issues,
            "pass completed"
        );
        Ok(summary)
    }

    async fn scan_source(
        &self,
        source: &LogSource,
        store: &mut CheckpointStore,
        counters: &CounterLog,
        today: NaiveDate,
        summary: &mut PassSummary,
    ) {
        let previous = store.get(&source.key);
        let read = match read_new_content(source, previous, self.sources.max_read_bytes).await {
            Ok(read) => read,
            Err(e) => {
                tracing::warn!(source = %source.label, error = %e, "source skipped");
                summary.sources_failed += 1;
                return;
            }
        };
        if read.rotated {
            summary.sources_rotated += 1;
        }

        let batches = classify(&read.content, &self.rules);

        let warn: Vec<(&str, u64)> = batches
            .iter()
            .filter(|b| b.severity == Severity::Warn)
            .map(|b| (b.category.as_str(), b.match_count))
            .collect();
        if let Err(e) = counters.increment_many(today, &warn).await {
            tracing::error!(
                source = %source.label,
                error = %e,
                "warn aggregation failed, source skipped with offset unchanged"
            );
            summary.sources_failed += 1;
            return;
        }
        summary.warn_events += warn.iter().map(|(_, count)| count).sum::<u64>();

        for batch in batches.iter().filter(|b| b.severity == Severity::Critical) {
            match self.dispatcher.send_critical(batch, &source.label).await {
                Ok(()) => {
                    summary.criticals_sent += 1;
                    tracing::info!(
                        source = %source.label,
                        category = %batch.category,
                        matches = batch.match_count,
                        "critical alert sent"
                    );
                }
                Err(e) => {
                    summary.criticals_lost += 1;
                    log_lost_critical(&source.label, &batch.category, batch.match_count, &e);
                }
            }
        }

        let next = read.checkpoint();
        if previous != Some(next) {
            if let Err(e) = store.set(&source.key, next).await {
                tracing::error!(
                    source = %source.label,
                    offset = next.offset,
                    error = %e,
                    "failed to persist checkpoint"
                );
                summary.sources_failed += 1;
                return;
            }
        }

        summary.sources_scanned += 1;
        tracing::debug!(
            source = %source.label,
            from = read.start_offset,
            to = read.new_offset,
            batches = batches.len(),
            has_more = read.has_more,
            "source scanned"
        );
    }

    /// 직전 다이제스트 이후의 카운트로 다이제스트를 전송하고, 성공하면 오래된 카운터를 정리합니다.
    ///
    /// 대상 구간은 `today - retention_days ..= today`이며, 이미 보고된 합계를 뺀 나머지만 접습니다.
    /// 따라서 다이제스트 이후 같은 날 쌓인 카운트는 다음 다이제스트에 포함됩니다.
    /// 전송에 실패하면 보고 기록도 정리도 하지 않습니다.
    ///
    /// # Errors
    ///
    /// 카운터 로그를 읽거나 정리할 수 없으면 실패합니다.
    pub async fn run_digest(
        &mut self,
        guard: &LockGuard,
        today: NaiveDate,
    ) -> Result<DigestSummary, MonitorError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("digest", %run_id, lock_pid = guard.pid());
        self.run_digest_inner(today).instrument(span).await
    }

    async fn run_digest_inner(&mut self, today: NaiveDate) -> Result<DigestSummary, MonitorError> {
        self.transition(RunState::Digest);
        let cutoff = today
            .checked_sub_days(Days::new(u64::from(self.retention_days)))
            .unwrap_or(NaiveDate::MIN);
        let counters = CounterLog::new(&self.layout.counters);
        let reported = CounterLog::new(&self.layout.reported);

        let totals = counters.totals_between(cutoff, today).await?;
        let already = reported.totals_between(cutoff, today).await?;
        let counts = unreported_counts(&totals, &already);
        let report = self.health.check().await;

        let date_label = today.format("%Y-%m-%d").to_string();
        let mut summary = DigestSummary {
            date: today,
            categories: counts.len(),
            total_events: counts.values().sum(),
            sent: false,
            pruned: 0,
        };

        match self
            .dispatcher
            .send_digest(&date_label, &counts, &report.status)
            .await
        {
            Ok(()) => {
                summary.sent = true;
                reported.replace_with(&totals).await?;
                summary.pruned = counters.prune_older_than(cutoff).await?;
            }
            Err(e) => {
                tracing::error!(date = %date_label, error = %e, "digest not delivered, counters kept");
            }
        }

        self.transition(RunState::Done);
        tracing::info!(
            date = %date_label,
            since = %cutoff,
            categories = summary.categories,
            total_events = summary.total_events,
            sent = summary.sent,
            pruned = summary.pruned,
            "digest completed"
        );
        Ok(summary)
    }

    /// 테스트 알림을 전송합니다. 락을 잡지 않고 상태를 바꾸지 않습니다.
    pub async fn run_test(&mut self) -> Result<(), DispatchError> {
        let result = self.dispatcher.send_test().await;
        self.transition(RunState::Done);
        result
    }
}

/// 카테고리별로 아직 보고되지 않은 카운트를 접습니다.
fn unreported_counts(totals: &DatedTotals, already: &DatedTotals) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for (key, &total) in totals {
        let pending = total.saturating_sub(already.get(key).copied().unwrap_or(0));
        if pending > 0 {
            *counts.entry(key.1.clone()).or_insert(0) += pending;
        }
    }
    counts
}

fn log_lost_critical(source: &str, category: &str, matches: u64, error: &DispatchError) {
    tracing::error!(
        alert_lost = true,
        source,
        category,
        matches,
        error = %error,
        "critical alert not delivered"
    );
}
