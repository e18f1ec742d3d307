//! 텔레그램 봇 API 알림 채널
//!
//! `POST {api_base}/bot{token}/sendMessage`로 메시지를 전송합니다.
//! 4096자를 넘는 메시지는 라인 경계에서 나누어 순서대로 전송하며,
//! 응답의 `ok` 필드가 `false`이면 실패로 취급합니다.

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use logsentry_core::config::NotifyConfig;

use super::{MessageFormat, NotifyError, Notifier};

/// 메시지 하나의 최대 길이 (문자 수)
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// 에러 메시지에 포함할 응답 본문 최대 길이
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i64>,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// 텔레그램 봇 알림 채널
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
    thread_id: Option<i64>,
}

impl TelegramNotifier {
    /// 알림 설정으로 채널을 생성합니다.
    ///
    /// # Errors
    ///
    /// 봇 토큰이나 대상이 비어 있거나 HTTP 클라이언트를 만들 수 없으면 실패합니다.
    pub fn new(config: &NotifyConfig) -> Result<Self, NotifyError> {
        if config.bot_token.trim().is_empty() {
            return Err(NotifyError::Config("bot_token is not set".to_owned()));
        }
        if config.destination.trim().is_empty() {
            return Err(NotifyError::Config("destination is not set".to_owned()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_base.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.destination.clone(),
            thread_id: config.sub_channel,
        })
    }

    async fn send_chunk(&self, text: &str, format: MessageFormat) -> Result<(), NotifyError> {
        let payload = SendMessageRequest {
            chat_id: &self.chat_id,
            message_thread_id: self.thread_id,
            text,
            parse_mode: match format {
                MessageFormat::Html => Some("HTML"),
                MessageFormat::Plain => None,
            },
            disable_web_page_preview: true,
        };

        // 토큰이 URL에 포함되므로 에러에서 URL을 제거합니다.
        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NotifyError::Request(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let parsed: ApiResponse = serde_json::from_str(&body)
            .map_err(|e| NotifyError::Rejected(format!("malformed response: {e}")))?;
        if !parsed.ok {
            return Err(NotifyError::Rejected(
                parsed
                    .description
                    .unwrap_or_else(|| "ok=false".to_owned()),
            ));
        }

        Ok(())
    }
}

impl fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("chat_id", &self.chat_id)
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}

impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, text: &str, format: MessageFormat) -> Result<(), NotifyError> {
        let chunks = split_message(text, MAX_MESSAGE_CHARS);
        let total = chunks.len();
        for (idx, chunk) in chunks.iter().enumerate() {
            self.send_chunk(chunk, format).await?;
            tracing::debug!(chunk = idx + 1, total, "telegram message chunk sent");
        }
        Ok(())
    }
}

/// 메시지를 `max_chars` 이하의 조각으로 나눕니다.
///
/// 가능한 한 라인 경계에서 나누고, 한 라인이 한도를 넘으면 문자 경계에서 자릅니다.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_owned()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for line in text.split_inclusive('\n') {
        let line_chars = line.chars().count();

        if current_chars + line_chars > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        if line_chars > max_chars {
            let mut piece = String::new();
            let mut piece_chars = 0usize;
            for c in line.chars() {
                if piece_chars == max_chars {
                    chunks.push(std::mem::take(&mut piece));
                    piece_chars = 0;
                }
                piece.push(c);
                piece_chars += 1;
            }
            current = piece;
            current_chars = piece_chars;
            continue;
        }

        current.push_str(line);
        current_chars += line_chars;
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}
