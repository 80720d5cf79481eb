//! Data types flowing through the survey pipeline.

pub mod harvest;
pub mod metrics;
pub mod record;
pub mod target;
