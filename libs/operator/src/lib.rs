pub mod controller;
pub mod crd;
pub mod error;
pub mod finalizer;
pub mod membership;
pub mod metrics;
pub mod namespace;
pub mod quota;
pub mod refs;
pub mod status;
pub mod target;
pub mod telemetry;

pub use error::{Error, Result};
