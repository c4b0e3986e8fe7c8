pub mod artifact;
pub mod metrics;
