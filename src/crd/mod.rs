//! Custom Resource Definitions for the Pulp operator
//!
//! `Pulp` is owned by this operator; `Route` is OpenShift's type, modelled
//! so routes can be created and drift-corrected like any other child.

mod pulp;
pub mod route;
pub mod types;


pub use pulp::{Pulp, PulpSpec, PulpStatus, SpecValidationError};
pub use route::{Route, RoutePort, RouteSpec, RouteTargetReference, TlsConfig};
pub use types::*;
