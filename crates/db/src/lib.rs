//! # stage-db
//!
//! Table/junction DDL emission, the data insertion engine (C6), the
//! analytic SQL gate and chunk-reference reconstitution (C7), and the
//! metadata introspector (C8) over one staged compartment.
//!
//! [`service::StagingService`] is the facade: it owns a compartment's
//! connection and implements the six external operations from `spec.md`
//! §6 (`stage`, `query`, `introspect`, `table_columns`, `chunking_stats`,
//! `delete_all`).

pub mod compartment;
pub mod ddl;
pub mod error;
pub mod gate;
pub mod helpers;
pub mod insert;
pub mod introspect;
pub mod reconstitute;
pub mod response;
pub mod service;

pub use compartment::Compartment;
pub use error::DbError;
pub use service::StagingService;
