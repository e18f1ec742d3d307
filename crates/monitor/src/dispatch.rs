//! 알림 디스패처 -- 메시지 렌더링과 전송
//!
//! 모든 전송은 타임아웃으로 제한되며, 타임아웃은 전송 실패로 취급합니다.
//! 같은 패스 안에서 재시도하지 않습니다. 실패 로깅은 호출자가 담당합니다.

use std::collections::BTreeMap;
use std::time::Duration;

use logsentry_core::types::EventBatch;

use crate::error::DispatchError;
use crate::health::HealthIssue;
use crate::notify::{MessageFormat, Notifier};
use crate::rule::classifier::escape_html;

/// `--test` 알림 본문
pub const TEST_MESSAGE: &str = "✅ <b>logsentry</b>: test alert, notification channel is working";

/// 알림 디스패처
pub struct AlertDispatcher<N: Notifier> {
    notifier: N,
    timeout: Duration,
}

impl<N: Notifier> AlertDispatcher<N> {
    /// 알림 채널과 전송 타임아웃으로 디스패처를 생성합니다.
    pub fn new(notifier: N, timeout: Duration) -> Self {
        Self { notifier, timeout }
    }

    /// 알림 채널 참조
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// CRITICAL 배치 하나를 즉시 전송합니다.
    pub async fn send_critical(
        &self,
        batch: &EventBatch,
        source_label: &str,
    ) -> Result<(), DispatchError> {
        let text = render_critical(
            &batch.category,
            batch.match_count,
            source_label,
            &batch.sample_lines,
        );
        self.deliver("critical", &text).await
    }

    /// 일일 다이제스트를 전송합니다.
    ///
    /// 이벤트가 없으면 "none"으로 표시합니다.
    pub async fn send_digest(
        &self,
        date_label: &str,
        counts: &BTreeMap<String, u64>,
        system_status: &[String],
    ) -> Result<(), DispatchError> {
        let text = render_digest(date_label, counts, system_status);
        self.deliver("digest", &text).await
    }

    /// 고정된 테스트 메시지를 전송합니다.
    pub async fn send_test(&self) -> Result<(), DispatchError> {
        self.deliver("test", TEST_MESSAGE).await
    }

    /// 한 패스의 헬스 이슈를 하나의 메시지로 합쳐 전송합니다.
    ///
    /// 이슈가 없으면 아무것도 전송하지 않습니다.
    pub async fn send_health_alert(&self, issues: &[HealthIssue]) -> Result<(), DispatchError> {
        if issues.is_empty() {
            return Ok(());
        }
        let text = render_health(issues);
        self.deliver("health", &text).await
    }

    async fn deliver(&self, kind: &'static str, text: &str) -> Result<(), DispatchError> {
        match tokio::time::timeout(self.timeout, self.notifier.send(text, MessageFormat::Html))
            .await
        {
            Ok(Ok(())) => {
                tracing::debug!(kind, notifier = self.notifier.name(), "notification sent");
                Ok(())
            }
            Ok(Err(e)) => Err(DispatchError::Notify(e)),
            Err(_) => Err(DispatchError::Timeout(self.timeout)),
        }
    }
}

/// CRITICAL 알림 본문
///
/// 샘플 라인은 분류기에서 이미 이스케이프되어 있습니다.
pub fn render_critical(
    category: &str,
    match_count: u64,
    source_label: &str,
    samples: &[String],
) -> String {
    let mut text = format!(
        "🚨 <b>CRITICAL: {}</b>\nSource: <code>{}</code>\nMatches: {match_count}\n",
        escape_html(category),
        escape_html(source_label),
    );
    if !samples.is_empty() {
        text.push_str("<pre>");
        text.push_str(&samples.join("\n"));
        text.push_str("</pre>");
    }
    text
}

/// 다이제스트 본문
pub fn render_digest(
    date_label: &str,
    counts: &BTreeMap<String, u64>,
    system_status: &[String],
) -> String {
    let mut text = format!("📊 <b>Daily digest: {}</b>\n\n", escape_html(date_label));

    text.push_str("<b>System</b>\n");
    if system_status.is_empty() {
        text.push_str("none\n");
    } else {
        for line in system_status {
            text.push_str(&format!("• {}\n", escape_html(line)));
        }
    }

    text.push_str("\n<b>Events</b>\n");
    if counts.is_empty() {
        text.push_str("none\n");
    } else {
        let total: u64 = counts.values().sum();
        for (category, count) in counts {
            text.push_str(&format!("• <code>{}</code>: {count}\n", escape_html(category)));
        }
        text.push_str(&format!("Total: {total}\n"));
    }
    text
}

/// 헬스 알림 본문
pub fn render_health(issues: &[HealthIssue]) -> String {
    let mut text = String::from("⚠️ <b>Health check</b>\n");
    for issue in issues {
        text.push_str(&format!("• {}\n", escape_html(&issue.message)));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::IssueKind;
    use crate::notify::MockNotifier;
    use logsentry_core::types::Severity;

    fn dispatcher(mock: &MockNotifier) -> AlertDispatcher<MockNotifier> {
        AlertDispatcher::new(mock.clone(), Duration::from_secs(5))
    }

    #[test]
    fn critical_template() {
        let text = render_critical(
            "AUTH_FAIL",
            3,
            "app.log",
            &["auth.failed user=a".to_owned(), "auth.failed user=b".to_owned()],
        );
        assert!(text.contains("CRITICAL: AUTH_FAIL"));
        assert!(text.contains("<code>app.log</code>"));
        assert!(text.contains("Matches: 3"));
        assert!(text.contains("<pre>auth.failed user=a\nauth.failed user=b</pre>"));
    }

    #[test]
    fn digest_renders_none_when_empty() {
        let text = render_digest("2025-01-10", &BTreeMap::new(), &[]);
        assert!(text.contains("<b>Events</b>\nnone"));
        assert!(text.contains("<b>System</b>\nnone"));
    }

    #[test]
    fn digest_lists_counts_and_status() {
        let counts = BTreeMap::from([("AUTH_FAIL".to_owned(), 5), ("RATE_LIMITED".to_owned(), 1)]);
        let status = vec!["disk /: 42.0%".to_owned()];
        let text = render_digest("2025-01-10", &counts, &status);
        assert!(text.contains("<code>AUTH_FAIL</code>: 5"));
        assert!(text.contains("<code>RATE_LIMITED</code>: 1"));
        assert!(text.contains("Total: 6"));
        assert!(text.contains("• disk /: 42.0%"));
        assert!(!text.contains("none"));
    }

    #[tokio::test]
    async fn send_critical_delivers_one_message() {
        let mock = MockNotifier::new();
        let mut batch = EventBatch::new("AUTH_FAIL", Severity::Critical);
        batch.match_count = 1;
        batch.sample_lines.push("auth.failed".to_owned());

        dispatcher(&mock).send_critical(&batch, "app.log").await.unwrap();
        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("AUTH_FAIL"));
    }

    #[tokio::test]
    async fn health_alert_merges_issues() {
        let mock = MockNotifier::new();
        let issues = vec![
            HealthIssue {
                kind: IssueKind::Disk,
                message: "disk usage on / at 92.0% (threshold 90%)".to_owned(),
            },
            HealthIssue {
                kind: IssueKind::Service,
                message: "service sshd is not running".to_owned(),
            },
        ];
        dispatcher(&mock).send_health_alert(&issues).await.unwrap();
        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("92.0%"));
        assert!(sent[0].contains("sshd"));
    }

    #[tokio::test]
    async fn no_health_issues_sends_nothing() {
        let mock = MockNotifier::new();
        dispatcher(&mock).send_health_alert(&[]).await.unwrap();
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn notifier_failure_is_dispatch_error() {
        let mock = MockNotifier::failing();
        let err = dispatcher(&mock).send_test().await.unwrap_err();
        assert!(matches!(err, DispatchError::Notify(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_notifier_times_out() {
        let mock = MockNotifier::new().with_delay(Duration::from_secs(30));
        let err = dispatcher(&mock).send_test().await.unwrap_err();
        assert!(matches!(err, DispatchError::Timeout(_)));
        assert!(mock.sent().is_empty());
    }
}
