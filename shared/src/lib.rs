pub mod metrics_defs;
pub mod pubsub;
pub mod topics;
pub mod types;
