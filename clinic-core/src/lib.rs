//! clinic-core: tenant-aware building blocks shared by the clinic record crates.

pub mod config;
pub mod errors;
pub mod telemetry;
pub mod tenant;

pub use config::{ClinicConfig, ClinicConfigSnapshot};
pub use errors::{ClassifiedError, ErrorKind};
pub use tenant::{TenantContext, TenantId};

#[cfg(feature = "serde")]
pub use errors::ErrorBody;

#[cfg(feature = "tracing-basic")]
pub use telemetry::init_tracing;
