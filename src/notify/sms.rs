use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::SmsSender;
use crate::config::{SmsConfig, SmsSenderId};
use crate::phone;

const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

/// REST adapter for the SMS channel (Twilio messages endpoint).
///
/// One attempt per call, bounded by a short timeout; the dispatcher never
/// retries a channel within a single pass, so neither does the adapter.
pub struct HttpSmsSender {
    client: Client,
    account_sid: String,
    auth_token: String,
    sender: SmsSenderId,
    timeout: Duration,
    base_url: String,
}

impl HttpSmsSender {
    pub fn from_config(cfg: &SmsConfig, timeout_secs: u64) -> Self {
        Self {
            client: Client::new(),
            account_sid: cfg.account_sid.clone(),
            auth_token: cfg.auth_token.clone(),
            sender: cfg.sender.clone(),
            timeout: Duration::from_secs(timeout_secs),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the adapter at a stub server (tests/tools).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Relevant slice of the provider's JSON response.
#[derive(Debug, Deserialize)]
struct ProviderResponse {
    sid: Option<String>,
    message: Option<String>,
    code: Option<i64>,
}

#[async_trait]
impl SmsSender for HttpSmsSender {
    async fn send(&self, to: &str, body: &str) -> Result<String> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );

        let mut form: Vec<(&str, &str)> = vec![("To", to), ("Body", body)];
        match &self.sender {
            SmsSenderId::From(from) => form.push(("From", from)),
            SmsSenderId::MessagingService(sid) => form.push(("MessagingServiceSid", sid)),
        }

        tracing::debug!(to = %phone::mask(to), "sending sms");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .timeout(self.timeout)
            .form(&form)
            .send()
            .await
            .context("sms request")?;

        let status = response.status();
        let parsed: ProviderResponse = response.json().await.context("sms response body")?;

        if !status.is_success() {
            let code = parsed.code.unwrap_or_default();
            let message = parsed.message.unwrap_or_else(|| "unknown error".to_string());
            return Err(anyhow!("sms provider error {code}: {message}"));
        }

        parsed
            .sid
            .ok_or_else(|| anyhow!("sms provider returned no message sid"))
    }
}
