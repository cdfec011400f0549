//! Host Notification Service — Binary Entrypoint
//! Boots the Axum HTTP server, wiring config, adapters, guards, and routes.
//!
//! See `README.md` for quickstart.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rsvp_host_notify::config::AppConfig;
use rsvp_host_notify::gate::NotifyGate;
use rsvp_host_notify::identity::{AdminPolicy, IdentityVerifier, StaticTokenVerifier};
use rsvp_host_notify::metrics::Metrics;
use rsvp_host_notify::notify::email::SmtpEmailSender;
use rsvp_host_notify::notify::inapp::StoreInAppSink;
use rsvp_host_notify::notify::sms::HttpSmsSender;
use rsvp_host_notify::notify::{EmailSender, NotificationDispatcher, SmsSender};
use rsvp_host_notify::store::{DocumentStore, MemoryStore};
use rsvp_host_notify::{api, api::AppState};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - NOTIFY_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("NOTIFY_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rsvp_host_notify=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    // Initialize dev tracing early (no-op in production).
    enable_dev_tracing();

    let config = AppConfig::from_env();
    let metrics = Metrics::init(config.cooldown_secs);

    // The persistence technology is a collaborator; the default wiring runs
    // against the in-memory store until a real backend is plugged in here.
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());

    let email: Option<Arc<dyn EmailSender>> = config.smtp.as_ref().and_then(|smtp| {
        match SmtpEmailSender::from_config(smtp, config.provider_timeout_secs) {
            Ok(sender) => Some(Arc::new(sender) as Arc<dyn EmailSender>),
            Err(err) => {
                warn!("email channel disabled: {err:#}");
                None
            }
        }
    });
    let sms: Option<Arc<dyn SmsSender>> = config.sms.as_ref().map(|cfg| {
        Arc::new(HttpSmsSender::from_config(cfg, config.provider_timeout_secs))
            as Arc<dyn SmsSender>
    });

    let sink = Arc::new(StoreInAppSink::new(store.clone()));
    let dispatcher = NotificationDispatcher::new(store.clone(), sink, email, sms);

    let verifier: Arc<dyn IdentityVerifier> = Arc::new(StaticTokenVerifier::from_env());
    let admin_policy = AdminPolicy::new(
        config.admin_emails.clone(),
        config.legacy_admin_email.clone(),
    );

    let gate = Arc::new(NotifyGate::new(
        store,
        verifier,
        admin_policy,
        dispatcher,
        &config,
    ));

    let router = api::router(AppState { gate }).merge(metrics.router());
    Ok(router.into())
}
