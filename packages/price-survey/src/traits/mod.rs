//! Collaborator interfaces. The pipeline only talks to these.

pub mod sink;
pub mod store;
pub mod transport;
pub mod trigger;
