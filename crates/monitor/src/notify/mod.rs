//! 알림 채널 추상화
//!
//! [`Notifier`] trait은 완성된 메시지 텍스트를 외부 채널로 전달하는 경계입니다.
//! 프로덕션에서는 [`TelegramNotifier`]를, `--dry-run`에서는 [`LogNotifier`]를 사용하고,
//! 테스트에서는 `MockNotifier`로 전송 내용을 기록합니다.
//!
//! # 구현체
//! - [`TelegramNotifier`]: 봇 API `sendMessage` 호출
//! - [`LogNotifier`]: 전송 대신 로그로 출력
//! - `MockNotifier`: 테스트 전용 (전송 내용 기록, 실패 시뮬레이션)

pub mod telegram;

use std::future::Future;

pub use telegram::TelegramNotifier;

/// 알림 전송 에러
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// 알림 채널 설정 에러 (토큰 누락 등)
    #[error("notifier config error: {0}")]
    Config(String),

    /// 요청 전송 실패 (연결 실패, 타임아웃 등)
    #[error("request failed: {0}")]
    Request(String),

    /// HTTP 상태 코드 실패
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP 상태 코드
        status: u16,
        /// 응답 본문 (잘린 값)
        body: String,
    },

    /// API가 `ok: false`로 응답함
    #[error("rejected by api: {0}")]
    Rejected(String),
}

/// 메시지 본문 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    /// HTML 마크업 (`<b>`, `<code>` 등)
    Html,
    /// 일반 텍스트
    Plain,
}

/// 알림 채널 trait
///
/// 구현체는 메시지 하나를 전달하거나 실패를 반환합니다.
/// 재시도와 타임아웃은 호출자(디스패처)의 책임입니다.
pub trait Notifier: Send + Sync + 'static {
    /// 채널 이름 (로그용)
    fn name(&self) -> &str;

    /// 메시지를 전송합니다.
    ///
    /// # Errors
    ///
    /// 채널이 메시지를 수락하지 않으면 [`NotifyError`]를 반환합니다.
    fn send(
        &self,
        text: &str,
        format: MessageFormat,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// 전송 대신 로그로 출력하는 알림 채널 (`--dry-run`)
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl LogNotifier {
    /// 새 로그 알림 채널을 생성합니다.
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, text: &str, format: MessageFormat) -> Result<(), NotifyError> {
        tracing::info!(
            notifier = "log",
            format = ?format,
            chars = text.chars().count(),
            message = %text,
            "dry-run: notification not sent"
        );
        Ok(())
    }
}

/// 테스트용 Mock 알림 채널
///
/// 전송된 메시지를 기록하고, 필요하면 실패나 지연을 시뮬레이션합니다.
#[cfg(test)]
#[derive(Default, Clone)]
pub struct MockNotifier {
    sent: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
    fail: std::sync::Arc<std::sync::atomic::AtomicBool>,
    delay: Option<std::time::Duration>,
}

#[cfg(test)]
impl MockNotifier {
    /// 항상 성공하는 mock 채널을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 전송 시 실패하도록 설정합니다.
    pub fn failing() -> Self {
        let mock = Self::default();
        mock.set_failing(true);
        mock
    }

    /// 전송 전에 지연을 추가합니다.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 실패 여부를 변경합니다.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// 지금까지 성공적으로 전송된 메시지
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl Notifier for MockNotifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, text: &str, _format: MessageFormat) -> Result<(), NotifyError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(NotifyError::Request("mock failure".to_owned()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(text.to_owned());
        }
        Ok(())
    }
}
