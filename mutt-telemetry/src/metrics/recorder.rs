//! MUTT metrics recorder with pre-defined metrics.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Pre-defined metrics for the MUTT pipeline.
///
/// All metrics follow the naming convention: `mutt_<category>_<metric>_<unit>`
pub struct MuttMetrics;

impl MuttMetrics {
    /// Register all metric descriptions.
    pub fn register() {
        // Queue metrics
        describe_counter!("mutt_event_enqueued_total", "Total events enqueued");
        describe_counter!("mutt_message_acked_total", "Total messages acked");
        describe_counter!(
            "mutt_message_nacked_total",
            "Total messages nacked and re-queued with backoff"
        );
        describe_counter!(
            "mutt_message_deferred_total",
            "Total messages re-queued without consuming an attempt"
        );
        describe_counter!(
            "mutt_message_dead_letter_total",
            "Total messages moved to the dead letter queue"
        );
        describe_gauge!("mutt_queue_depth", "Current main queue depth");
        describe_gauge!("mutt_inflight_count", "Current in-flight message count");
        describe_gauge!(
            "mutt_delayed_count",
            "Current delayed (not yet visible) message count"
        );
        describe_gauge!("mutt_dead_letter_count", "Current dead letter queue length");

        // Janitor metrics
        describe_counter!(
            "mutt_janitor_reclaimed_total",
            "Messages reclaimed from expired leases"
        );
        describe_counter!(
            "mutt_janitor_promoted_total",
            "Delayed messages promoted to the main queue by the janitor"
        );

        // Breaker metrics
        describe_gauge!(
            "mutt_breaker_open",
            "Circuit state per destination (1=open, 0=closed)"
        );
        describe_counter!("mutt_breaker_trips_total", "Closed-to-open transitions");
        describe_counter!(
            "mutt_breaker_blocked_total",
            "Sends blocked by an open circuit"
        );

        // Rate limit and backpressure metrics
        describe_counter!(
            "mutt_rate_limit_deferred_total",
            "Sends deferred by the rate limiter"
        );
        describe_counter!(
            "mutt_intake_shed_total",
            "Events rejected by backpressure shedding"
        );

        // Latency metrics
        describe_histogram!(
            "mutt_rule_match_latency_seconds",
            "Rule evaluation latency per message"
        );
        describe_histogram!(
            "mutt_send_latency_seconds",
            "Downstream send latency per attempt"
        );
        describe_histogram!(
            "mutt_message_latency_seconds",
            "Dequeue-to-resolution latency per message"
        );
    }

    // ==================== Queue Metrics ====================

    /// Record an event enqueued.
    pub fn event_enqueued() {
        counter!("mutt_event_enqueued_total").increment(1);
    }

    /// Record a message acked.
    pub fn message_acked() {
        counter!("mutt_message_acked_total").increment(1);
    }

    /// Record a message nacked and re-queued.
    pub fn message_nacked() {
        counter!("mutt_message_nacked_total").increment(1);
    }

    /// Record a message deferred without consuming an attempt.
    pub fn message_deferred(reason: &str) {
        counter!(
            "mutt_message_deferred_total",
            "reason" => reason.to_string()
        )
        .increment(1);
    }

    /// Record a message dead-lettered.
    pub fn message_dead_lettered() {
        counter!("mutt_message_dead_letter_total").increment(1);
    }

    /// Update the main queue depth gauge.
    #[allow(clippy::cast_precision_loss)]
    pub fn queue_depth(depth: u64) {
        gauge!("mutt_queue_depth").set(depth as f64);
    }

    /// Update the in-flight count gauge.
    #[allow(clippy::cast_precision_loss)]
    pub fn inflight_count(count: u64) {
        gauge!("mutt_inflight_count").set(count as f64);
    }

    /// Update the delayed count gauge.
    #[allow(clippy::cast_precision_loss)]
    pub fn delayed_count(count: u64) {
        gauge!("mutt_delayed_count").set(count as f64);
    }

    /// Update the dead letter queue length gauge.
    #[allow(clippy::cast_precision_loss)]
    pub fn dead_letter_count(count: u64) {
        gauge!("mutt_dead_letter_count").set(count as f64);
    }

    // ==================== Janitor Metrics ====================

    /// Record messages reclaimed from expired leases.
    pub fn janitor_reclaimed(count: u64) {
        counter!("mutt_janitor_reclaimed_total").increment(count);
    }

    /// Record delayed messages promoted by the janitor.
    pub fn janitor_promoted(count: u64) {
        counter!("mutt_janitor_promoted_total").increment(count);
    }

    // ==================== Breaker Metrics ====================

    /// Update the per-destination circuit state gauge.
    pub fn breaker_state(destination: &str, open: bool) {
        gauge!(
            "mutt_breaker_open",
            "destination" => destination.to_string()
        )
        .set(if open { 1.0 } else { 0.0 });
    }

    /// Record a closed-to-open transition.
    pub fn breaker_tripped(destination: &str) {
        counter!(
            "mutt_breaker_trips_total",
            "destination" => destination.to_string()
        )
        .increment(1);
    }

    /// Record a send blocked by an open circuit.
    pub fn breaker_blocked(destination: &str) {
        counter!(
            "mutt_breaker_blocked_total",
            "destination" => destination.to_string()
        )
        .increment(1);
    }

    // ==================== Rate Limit / Backpressure ====================

    /// Record a send deferred by the rate limiter.
    pub fn rate_limit_deferred(destination: &str) {
        counter!(
            "mutt_rate_limit_deferred_total",
            "destination" => destination.to_string()
        )
        .increment(1);
    }

    /// Record an event shed by backpressure.
    pub fn intake_shed() {
        counter!("mutt_intake_shed_total").increment(1);
    }

    // ==================== Latency Metrics ====================

    /// Record rule evaluation latency.
    pub fn rule_match_latency(latency_seconds: f64) {
        histogram!("mutt_rule_match_latency_seconds").record(latency_seconds);
    }

    /// Record downstream send latency.
    pub fn send_latency(destination: &str, latency_seconds: f64) {
        histogram!(
            "mutt_send_latency_seconds",
            "destination" => destination.to_string()
        )
        .record(latency_seconds);
    }

    /// Record dequeue-to-resolution latency.
    pub fn message_latency(outcome: &str, latency_seconds: f64) {
        histogram!(
            "mutt_message_latency_seconds",
            "outcome" => outcome.to_string()
        )
        .record(latency_seconds);
    }
}
