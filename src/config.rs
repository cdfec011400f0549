//! config.rs — environment-driven service configuration.
//!
//! Everything is read once at boot (after `dotenvy::dotenv()` in the
//! entrypoint). Provider credentials are optional: a channel whose provider
//! is not configured is skipped at dispatch time with
//! `provider_not_configured`, never a boot failure. Malformed numeric values
//! fall back to their defaults.

use std::env;

/// SMTP relay settings for the email channel.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub pass: String,
    pub from: String,
    pub reply_to: Option<String>,
}

/// Identifies the sending side of an outbound SMS.
#[derive(Debug, Clone)]
pub enum SmsSenderId {
    From(String),
    MessagingService(String),
}

/// REST credentials for the SMS provider.
#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub sender: SmsSenderId,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Smart-cooldown window applied by the gate.
    pub cooldown_secs: i64,

    pub per_ip_limit: u32,
    pub per_ip_window_secs: i64,
    pub per_reservation_limit: u32,
    pub per_reservation_window_secs: i64,
    pub per_event_limit: u32,
    pub per_event_window_secs: i64,
    pub per_event_capacity: usize,

    pub admin_emails: Vec<String>,
    pub legacy_admin_email: Option<String>,

    pub smtp: Option<SmtpConfig>,
    pub sms: Option<SmsConfig>,
    /// Upper bound on any single outbound provider call.
    pub provider_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 15,
            per_ip_limit: 30,
            per_ip_window_secs: 60,
            per_reservation_limit: 5,
            per_reservation_window_secs: 60,
            per_event_limit: 10,
            per_event_window_secs: 300,
            per_event_capacity: 200,
            admin_emails: Vec::new(),
            legacy_admin_email: None,
            smtp: None,
            sms: None,
            provider_timeout_secs: 5,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            cooldown_secs: env_parse("NOTIFY_COOLDOWN_SECS", defaults.cooldown_secs),
            per_ip_limit: env_parse("RATE_IP_LIMIT", defaults.per_ip_limit),
            per_ip_window_secs: env_parse("RATE_IP_WINDOW_SECS", defaults.per_ip_window_secs),
            per_reservation_limit: env_parse(
                "RATE_RESERVATION_LIMIT",
                defaults.per_reservation_limit,
            ),
            per_reservation_window_secs: env_parse(
                "RATE_RESERVATION_WINDOW_SECS",
                defaults.per_reservation_window_secs,
            ),
            per_event_limit: env_parse("RATE_EVENT_LIMIT", defaults.per_event_limit),
            per_event_window_secs: env_parse(
                "RATE_EVENT_WINDOW_SECS",
                defaults.per_event_window_secs,
            ),
            per_event_capacity: env_parse("RATE_EVENT_CAPACITY", defaults.per_event_capacity),
            admin_emails: env::var("ADMIN_EMAILS")
                .map(|raw| {
                    raw.split(',')
                        .map(|e| e.trim().to_string())
                        .filter(|e| !e.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            legacy_admin_email: env::var("ADMIN_EMAIL").ok().filter(|e| !e.trim().is_empty()),
            smtp: smtp_from_env(),
            sms: sms_from_env(),
            provider_timeout_secs: env_parse(
                "PROVIDER_TIMEOUT_SECS",
                defaults.provider_timeout_secs,
            ),
        }
    }
}

fn smtp_from_env() -> Option<SmtpConfig> {
    let host = env::var("SMTP_HOST").ok()?;
    let user = env::var("SMTP_USER").ok()?;
    let pass = env::var("SMTP_PASS").ok()?;
    let from = env::var("NOTIFY_EMAIL_FROM").ok()?;
    Some(SmtpConfig {
        host,
        user,
        pass,
        from,
        reply_to: env::var("NOTIFY_EMAIL_REPLY_TO").ok(),
    })
}

fn sms_from_env() -> Option<SmsConfig> {
    let account_sid = env::var("TWILIO_ACCOUNT_SID").ok()?;
    let auth_token = env::var("TWILIO_AUTH_TOKEN").ok()?;

    // Messaging service takes precedence over a bare from-number.
    let sender = if let Ok(sid) = env::var("TWILIO_MESSAGING_SERVICE_SID") {
        SmsSenderId::MessagingService(sid)
    } else if let Ok(from) = env::var("TWILIO_FROM") {
        SmsSenderId::From(from)
    } else {
        return None;
    };

    Some(SmsConfig {
        account_sid,
        auth_token,
        sender,
    })
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
