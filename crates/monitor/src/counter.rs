//! 일일 카운터 로그 -- WARN 이벤트 집계
//!
//! `YYYY-MM-DD|CATEGORY|count` 형식의 라인을 추가만 하는 로그입니다.
//! 같은 날짜의 엔트리는 다이제스트 시점에 합산되고,
//! 보존 기간이 지난 엔트리는 다이제스트 전송 성공 후에만 정리됩니다.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tokio::io::AsyncWriteExt;

use crate::checkpoint::write_atomic;
use crate::error::MonitorError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// 카운터 로그 엔트리
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterEntry {
    /// 날짜
    pub date: NaiveDate,
    /// 카테고리
    pub category: String,
    /// 건수
    pub count: u64,
}

impl CounterEntry {
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.trim_end().splitn(3, '|');
        let date = NaiveDate::parse_from_str(parts.next()?, DATE_FORMAT).ok()?;
        let category = parts.next()?;
        let count = parts.next()?.parse().ok()?;
        if category.is_empty() {
            return None;
        }
        Some(Self {
            date,
            category: category.to_owned(),
            count,
        })
    }

    fn render(&self) -> String {
        format!(
            "{}|{}|{}",
            self.date.format(DATE_FORMAT),
            self.category,
            self.count
        )
    }
}

/// (날짜, 카테고리)별 합계
pub type DatedTotals = BTreeMap<(NaiveDate, String), u64>;

/// 추가 전용 일일 카운터 로그
///
/// 읽기는 공개되어 있지만 기록과 정리는 락을 쥔 실행 조정자만 수행합니다.
///
/// ```compile_fail
/// # async fn seed(log: &logsentry_monitor::CounterLog) {
/// let today = chrono::NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
/// log.increment(today, "AUTH_FAIL", 1).await.unwrap();
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CounterLog {
    path: PathBuf,
}

impl CounterLog {
    /// 카운터 로그 파일 경로로 생성합니다. 파일은 첫 기록 시 만들어집니다.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 카운터 로그 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `date|category|count` 엔트리를 추가합니다.
    ///
    /// `count`가 0이면 아무것도 기록하지 않습니다.
    #[cfg(test)]
    pub(crate) async fn increment(
        &self,
        date: NaiveDate,
        category: &str,
        count: u64,
    ) -> Result<(), MonitorError> {
        self.increment_many(date, &[(category, count)]).await
    }

    /// 여러 카테고리의 엔트리를 한 번의 쓰기로 추가합니다.
    ///
    /// 카테고리 하나라도 유효하지 않으면 아무것도 기록하지 않습니다.
    pub(crate) async fn increment_many(
        &self,
        date: NaiveDate,
        items: &[(&str, u64)],
    ) -> Result<(), MonitorError> {
        let mut lines = String::new();
        for &(category, count) in items {
            if count == 0 {
                continue;
            }
            if category.is_empty() || category.contains(['|', '\n', '\r']) {
                return Err(MonitorError::Persist {
                    path: self.path.display().to_string(),
                    reason: format!("invalid counter category '{category}'"),
                });
            }
            let entry = CounterEntry {
                date,
                category: category.to_owned(),
                count,
            };
            lines.push_str(&entry.render());
            lines.push('\n');
        }
        if lines.is_empty() {
            return Ok(());
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.persist_error(e))?;
        file.write_all(lines.as_bytes())
            .await
            .map_err(|e| self.persist_error(e))?;
        file.flush().await.map_err(|e| self.persist_error(e))?;
        Ok(())
    }

    /// 특정 날짜의 카테고리별 합계를 반환합니다.
    ///
    /// 파일이 없으면 빈 맵을 반환합니다.
    pub async fn sum_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<BTreeMap<String, u64>, MonitorError> {
        let mut sums = BTreeMap::new();
        for entry in self.read_entries().await?.0 {
            if entry.date == date {
                *sums.entry(entry.category).or_insert(0u64) += entry.count;
            }
        }
        Ok(sums)
    }

    /// `from..=through` 구간의 (날짜, 카테고리)별 합계를 반환합니다.
    pub async fn totals_between(
        &self,
        from: NaiveDate,
        through: NaiveDate,
    ) -> Result<DatedTotals, MonitorError> {
        let mut totals = DatedTotals::new();
        for entry in self.read_entries().await?.0 {
            if (from..=through).contains(&entry.date) {
                *totals.entry((entry.date, entry.category)).or_insert(0) += entry.count;
            }
        }
        Ok(totals)
    }

    /// 로그 전체를 주어진 합계로 원자적으로 교체합니다.
    pub(crate) async fn replace_with(&self, totals: &DatedTotals) -> Result<(), MonitorError> {
        let mut content = String::new();
        for ((date, category), &count) in totals {
            if count == 0 {
                continue;
            }
            let entry = CounterEntry {
                date: *date,
                category: category.clone(),
                count,
            };
            content.push_str(&entry.render());
            content.push('\n');
        }
        write_atomic(&self.path, content.as_bytes()).await
    }

    /// `date < cutoff`인 엔트리를 제거하고 제거된 엔트리 수를 반환합니다.
    ///
    /// 형식이 잘못된 라인도 함께 제거됩니다. 파일은 원자적으로 교체됩니다.
    pub(crate) async fn prune_older_than(&self, cutoff: NaiveDate) -> Result<usize, MonitorError> {
        let (entries, malformed) = self.read_entries().await?;
        let before = entries.len();
        let kept: Vec<CounterEntry> = entries.into_iter().filter(|e| e.date >= cutoff).collect();
        let removed = before - kept.len();

        if removed == 0 && malformed == 0 {
            return Ok(0);
        }

        let mut content = String::new();
        for entry in &kept {
            content.push_str(&entry.render());
            content.push('\n');
        }
        write_atomic(&self.path, content.as_bytes()).await?;

        tracing::info!(
            path = %self.path.display(),
            cutoff = %cutoff,
            removed,
            malformed,
            kept = kept.len(),
            "counter log pruned"
        );
        Ok(removed)
    }

    /// 모든 유효 엔트리와 잘못된 라인 수를 읽습니다.
    async fn read_entries(&self) -> Result<(Vec<CounterEntry>, usize), MonitorError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((Vec::new(), 0));
            }
            Err(e) => {
                return Err(MonitorError::Persist {
                    path: self.path.display().to_string(),
                    reason: format!("failed to read counter log: {e}"),
                });
            }
        };

        let mut entries = Vec::new();
        let mut malformed = 0usize;
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match CounterEntry::parse(line) {
                Some(entry) => entries.push(entry),
                None => {
                    malformed += 1;
                    tracing::warn!(
                        path = %self.path.display(),
                        line = lineno + 1,
                        "skipping malformed counter line"
                    );
                }
            }
        }
        Ok((entries, malformed))
    }

    fn persist_error(&self, e: std::io::Error) -> MonitorError {
        MonitorError::Persist {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        }
    }
}
