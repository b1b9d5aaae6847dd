//! SMS transports
//!
//! The verification service only needs `send(phone, body)`. Three
//! implementations:
//! - [`LogSmsTransport`]: writes the message to the log (development)
//! - [`HttpSmsTransport`]: JSON POST to a provider gateway
//! - [`MemorySmsTransport`]: keeps messages in memory (tests, demos)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::phone::PhoneNumber;
use crate::{Error, Result};

/// Provider acknowledgement for one accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsReceipt {
    pub provider_message_id: String,
}

/// Outbound SMS collaborator
#[async_trait]
pub trait SmsTransport: Send + Sync {
    /// Deliver `body` to `phone`; at most one message per call
    async fn send(&self, phone: &PhoneNumber, body: &str) -> Result<SmsReceipt>;
}

/// Logs messages instead of sending them
///
/// The code is visible in the log, so this must never be selected in
/// production.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSmsTransport;

#[async_trait]
impl SmsTransport for LogSmsTransport {
    async fn send(&self, phone: &PhoneNumber, body: &str) -> Result<SmsReceipt> {
        info!("[sms:log] to {}: {}", phone.masked(), body);
        Ok(SmsReceipt {
            provider_message_id: format!("log-{}", Uuid::new_v4()),
        })
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    message_id: String,
}

/// Sends through an HTTP gateway
///
/// Request: `POST {endpoint}` with bearer auth and
/// `{"from", "to", "text"}`; response `{"message_id"}`.
pub struct HttpSmsTransport {
    client: reqwest::Client,
    endpoint: String,
    sender: String,
    api_key: String,
}

impl HttpSmsTransport {
    pub fn new(endpoint: impl Into<String>, sender: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            sender: sender.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl SmsTransport for HttpSmsTransport {
    async fn send(&self, phone: &PhoneNumber, body: &str) -> Result<SmsReceipt> {
        let request = SendRequest {
            from: &self.sender,
            to: phone.as_str(),
            text: body,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::SmsTransport(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!("SMS gateway rejected message to {}: {}", phone.masked(), status);
            return Err(Error::SmsTransport(format!("gateway returned {}", status)));
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| Error::SmsTransport(format!("unreadable gateway response: {}", e)))?;

        debug!("SMS accepted for {} as {}", phone.masked(), parsed.message_id);
        Ok(SmsReceipt {
            provider_message_id: parsed.message_id,
        })
    }
}

/// One message captured by [`MemorySmsTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub phone: PhoneNumber,
    pub body: String,
}

/// Keeps every message in memory; can be switched to fail
#[derive(Debug, Default)]
pub struct MemorySmsTransport {
    sent: Mutex<Vec<SentMessage>>,
    failing: AtomicBool,
}

impl MemorySmsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail with a transport error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// The six-digit code in the latest message to `phone`
    pub fn last_code_for(&self, phone: &PhoneNumber) -> Option<String> {
        let sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        sent.iter()
            .rev()
            .find(|m| &m.phone == phone)
            .and_then(|m| extract_code(&m.body))
    }
}

fn extract_code(body: &str) -> Option<String> {
    let bytes = body.as_bytes();
    (0..bytes.len().saturating_sub(5)).find_map(|i| {
        let window = &bytes[i..i + 6];
        let bounded_left = i == 0 || !bytes[i - 1].is_ascii_digit();
        let bounded_right = i + 6 == bytes.len() || !bytes[i + 6].is_ascii_digit();
        if bounded_left && bounded_right && window.iter().all(u8::is_ascii_digit) {
            Some(String::from_utf8_lossy(window).into_owned())
        } else {
            None
        }
    })
}

#[async_trait]
impl SmsTransport for MemorySmsTransport {
    async fn send(&self, phone: &PhoneNumber, body: &str) -> Result<SmsReceipt> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::SmsTransport("memory transport set to fail".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage {
                phone: phone.clone(),
                body: body.to_string(),
            });
        Ok(SmsReceipt {
            provider_message_id: format!("mem-{}", Uuid::new_v4()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_code_finds_isolated_six_digits() {
        assert_eq!(
            extract_code("[Invitation] Your verification code is 042917. It expires in 5 minutes."),
            Some("042917".to_string())
        );
        assert_eq!(extract_code("no code here"), None);
        // seven digits is not a code
        assert_eq!(extract_code("1234567"), None);
    }

    #[tokio::test]
    async fn test_memory_transport_records_and_fails_on_demand() {
        let transport = MemorySmsTransport::new();
        let phone = PhoneNumber::parse("010-1234-5678").unwrap();

        transport.send(&phone, "code 123456").await.unwrap();
        assert_eq!(transport.sent_count(), 1);
        assert_eq!(transport.last_code_for(&phone), Some("123456".to_string()));

        transport.set_failing(true);
        let err = transport.send(&phone, "code 654321").await.unwrap_err();
        assert!(matches!(err, Error::SmsTransport(_)));
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_log_transport_always_succeeds() {
        let phone = PhoneNumber::parse("01012345678").unwrap();
        let receipt = LogSmsTransport.send(&phone, "hello").await.unwrap();
        assert!(receipt.provider_message_id.starts_with("log-"));
    }
}
