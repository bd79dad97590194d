//! Metrics definitions for alert ingestion and clustering.

use shared::metrics_defs::{MetricDef, MetricType};

pub const ALERTS_PARSED: MetricDef = MetricDef {
    name: "fetch.alerts.parsed",
    metric_type: MetricType::Counter,
    description: "Number of messages turned into alerts",
};

pub const ALERTS_SKIPPED: MetricDef = MetricDef {
    name: "fetch.alerts.skipped",
    metric_type: MetricType::Counter,
    description: "Number of messages dropped for an unknown sender or a failed extraction",
};

pub const ALERTS_STORED: MetricDef = MetricDef {
    name: "fetch.alerts.stored",
    metric_type: MetricType::Counter,
    description: "Number of alerts written to the store",
};

pub const EXTRACT_DURATION: MetricDef = MetricDef {
    name: "fetch.extract.duration",
    metric_type: MetricType::Histogram,
    description: "Time taken by the phrase extractor in seconds",
};

pub const EVENTS_CREATED: MetricDef = MetricDef {
    name: "fetch.events.created",
    metric_type: MetricType::Counter,
    description: "Number of new events found",
};

pub const EVENTS_UPDATED: MetricDef = MetricDef {
    name: "fetch.events.updated",
    metric_type: MetricType::Counter,
    description: "Number of events that gained alerts",
};

pub const EVENTS_MERGED: MetricDef = MetricDef {
    name: "fetch.events.merged",
    metric_type: MetricType::Counter,
    description: "Number of stale events deleted by a merge",
};

pub const PUBLISH_FAILED: MetricDef = MetricDef {
    name: "fetch.publish.failed",
    metric_type: MetricType::Counter,
    description: "Number of notifications that could not be published",
};

pub const RUN_DURATION: MetricDef = MetricDef {
    name: "fetch.run.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a fetch run in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[
    ALERTS_PARSED,
    ALERTS_SKIPPED,
    ALERTS_STORED,
    EXTRACT_DURATION,
    EVENTS_CREATED,
    EVENTS_UPDATED,
    EVENTS_MERGED,
    PUBLISH_FAILED,
    RUN_DURATION,
];
