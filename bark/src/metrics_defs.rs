//! Metrics definitions for notification distribution.

use shared::metrics_defs::{MetricDef, MetricType};

pub const MESSAGES_RECEIVED: MetricDef = MetricDef {
    name: "bark.messages.received",
    metric_type: MetricType::Counter,
    description: "Number of topic messages received",
};

pub const MESSAGES_MALFORMED: MetricDef = MetricDef {
    name: "bark.messages.malformed",
    metric_type: MetricType::Counter,
    description: "Number of topic messages dropped because they could not be decoded",
};

pub const BARK_FAILED: MetricDef = MetricDef {
    name: "bark.failed",
    metric_type: MetricType::Counter,
    description: "Number of notifications a barker failed to deliver",
};

pub const WS_CONNECTIONS: MetricDef = MetricDef {
    name: "bark.websocket.connections",
    metric_type: MetricType::Gauge,
    description: "Number of open websocket connections",
};

pub const WS_REJECTED: MetricDef = MetricDef {
    name: "bark.websocket.rejected",
    metric_type: MetricType::Counter,
    description: "Number of websocket connections turned away at capacity",
};

pub const WS_MESSAGES_DROPPED: MetricDef = MetricDef {
    name: "bark.websocket.dropped",
    metric_type: MetricType::Counter,
    description: "Number of broadcasts skipped for a full connection queue",
};

pub const PUSH_RECEIVED: MetricDef = MetricDef {
    name: "bark.push.received",
    metric_type: MetricType::Counter,
    description: "Number of messages delivered through the push endpoint",
};

pub const ALL_METRICS: &[MetricDef] = &[
    MESSAGES_RECEIVED,
    MESSAGES_MALFORMED,
    BARK_FAILED,
    WS_CONNECTIONS,
    WS_REJECTED,
    WS_MESSAGES_DROPPED,
    PUSH_RECEIVED,
];
