//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Name every gateway metric in one place
//! - Expose a Prometheus scrape endpoint when enabled
//!
//! # Metrics
//! - `harq_connections_accepted_total` (counter): client sockets accepted
//! - `harq_connections_refused_total` (counter): sockets closed at the limit
//! - `harq_connections_closed_total` (counter): connections destroyed, by role
//! - `harq_active_connections` (gauge): live connections, by role
//! - `harq_requests_forwarded_total` (counter): requests written to the broker
//! - `harq_replies_sent_total` (counter): replies written to clients, by status
//! - `harq_replies_dropped_total` (counter): replies with no live target
//! - `harq_broker_frames_decoded_total` (counter): frames read off the link
//! - `harq_broker_reconnects_total` (counter): link dials after the first
//!
//! # Design Decisions
//! - Updates go through the `metrics` facade, so they cost nothing until a
//!   recorder is installed

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::net::connection::Role;

/// Install the Prometheus recorder and its HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::ClientHttp => "client",
        Role::BrokerLink => "broker",
    }
}

pub fn record_accepted() {
    metrics::counter!("harq_connections_accepted_total").increment(1);
}

pub fn record_refused() {
    metrics::counter!("harq_connections_refused_total").increment(1);
}

pub fn record_opened(role: Role) {
    metrics::gauge!("harq_active_connections", "role" => role_label(role)).increment(1.0);
}

pub fn record_closed(role: Role) {
    metrics::counter!("harq_connections_closed_total", "role" => role_label(role)).increment(1);
    metrics::gauge!("harq_active_connections", "role" => role_label(role)).decrement(1.0);
}

pub fn record_forwarded() {
    metrics::counter!("harq_requests_forwarded_total").increment(1);
}

pub fn record_reply(status: u16) {
    metrics::counter!("harq_replies_sent_total", "status" => status.to_string()).increment(1);
}

pub fn record_dropped_reply() {
    metrics::counter!("harq_replies_dropped_total").increment(1);
}

pub fn record_frame_decoded() {
    metrics::counter!("harq_broker_frames_decoded_total").increment(1);
}

pub fn record_reconnect() {
    metrics::counter!("harq_broker_reconnects_total").increment(1);
}
