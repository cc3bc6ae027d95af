//! Reconciliation core for the Microsoft 365 provider.
//!
//! # Overview
//! Translates between the configuration tool's typed attribute model and
//! Microsoft Graph JSON documents, resolves data source lookups against a
//! collection snapshot, and confirms writes against an eventually
//! consistent service. Network I/O goes through the host's `Transport`.
//!
//! # Design
//! - Each resource declares a `FieldMapping` table bound once against its
//!   schema; binding derives every collection's empty/absent policy from
//!   the attribute's cardinality and fails fast on any mismatch.
//! - `construct` and `map_to_local` are pure functions over a bound table.
//! - `GraphClient` splits every operation into `build_*` and `parse_*`, so
//!   request shapes are testable without a network.
//! - `guarded_read` owns all retrying; nothing else in the crate retries.

pub mod client;
pub mod codec;
pub mod config;
pub mod construct;
pub mod diagnostics;
pub mod error;
pub mod guard;
pub mod http;
pub mod mapping;
pub mod model;
pub mod persist;
pub mod resolve;
pub mod resource;
pub mod resources;
pub mod schema;
pub mod state;

pub use client::{GraphClient, ODataPage};
pub use config::{ProviderConfig, RetrySettings};
pub use construct::construct;
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::{QueryKind, ReconcileError, ReconcileResult, SchemaError, TransportError};
pub use guard::{guarded_read, GuardContext, RetryPolicy, WriteKind};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport};
pub use mapping::{CollectionPolicy, FieldMapping, MappingTable, Transform};
pub use model::{Attr, AttrValue, LocalObject, Presence};
pub use persist::{from_state_json, to_state_json};
pub use resolve::{resolve, Candidate, ResolutionQuery};
pub use resource::{DataSource, DataSourceDefinition, ResourceClient, ResourceDefinition};
pub use schema::{AttributeSchema, Cardinality, ObjectSchema};
pub use state::{drift, map_to_local};
