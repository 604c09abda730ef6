use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Process-local counters. Every update is mirrored to the `metrics` facade
/// so an exporter installed by the binary sees the same numbers.
#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    faq_matches_total: AtomicU64,
    fallback_total: AtomicU64,
    assistant_calls_total: AtomicU64,
    assistant_failures_total: AtomicU64,
    reviews_created_total: AtomicU64,
    checkout_intents_total: AtomicU64,
    total_latency_millis: AtomicU64,
    latency_samples_total: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub faq_matches_total: u64,
    pub fallback_total: u64,
    pub assistant_calls_total: u64,
    pub assistant_failures_total: u64,
    pub reviews_created_total: u64,
    pub checkout_intents_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("club_requests_total").increment(1);
    }

    pub fn inc_faq_match(&self, topic: &'static str) {
        self.faq_matches_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("club_faq_matches_total", "topic" => topic).increment(1);
    }

    pub fn inc_fallback(&self) {
        self.fallback_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("club_faq_fallback_total").increment(1);
    }

    pub fn inc_assistant_call(&self) {
        self.assistant_calls_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("club_assistant_calls_total").increment(1);
    }

    pub fn inc_assistant_failure(&self) {
        self.assistant_failures_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("club_assistant_failures_total").increment(1);
    }

    pub fn inc_review_created(&self) {
        self.reviews_created_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("club_reviews_created_total").increment(1);
    }

    pub fn inc_checkout_intent(&self) {
        self.checkout_intents_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("club_checkout_intents_total").increment(1);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        self.latency_samples_total.fetch_add(1, Ordering::Relaxed);
        metrics::histogram!("club_request_latency_seconds").record(duration.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);
        // Only timed operations contribute samples, so average over those.
        let samples = self.latency_samples_total.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: requests,
            faq_matches_total: self.faq_matches_total.load(Ordering::Relaxed),
            fallback_total: self.fallback_total.load(Ordering::Relaxed),
            assistant_calls_total: self.assistant_calls_total.load(Ordering::Relaxed),
            assistant_failures_total: self.assistant_failures_total.load(Ordering::Relaxed),
            reviews_created_total: self.reviews_created_total.load(Ordering::Relaxed),
            checkout_intents_total: self.checkout_intents_total.load(Ordering::Relaxed),
            avg_latency_millis: if samples == 0 {
                0.0
            } else {
                latency as f64 / samples as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,club_api=info,club_agents=info,club_storage=info,tower_http=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}
