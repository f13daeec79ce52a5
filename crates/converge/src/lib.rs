#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![forbid(unsafe_code)]

mod association;
mod config;
pub mod error;
mod executor;
mod gateway;
pub mod matcher;
mod plan;
mod reconciler;
mod scope;

pub use association::{Association, AssociationAttributes, NaturalKey, ParentId, RemoteId};
pub use config::{CONFIG, DynAppConfig, RetryConfig};
pub use error::{
    AmbiguousMatch, ConfigurationError, ConvergeError, DiffError, DuplicateNaturalKey,
    ExecuteError, GatewayError, GatewayErrorKind, InvalidAssociation, ItemFailure,
    MissingRemoteId,
};
pub use executor::{ExecutionReport, Phase, PhaseOrder, execute};
pub use gateway::Gateway;
pub use matcher::IdentityMatcher;
pub use plan::{Plan, PlanSummary, PlannedChange, Removal, Update, diff};
pub use reconciler::Reconciler;
pub use scope::{ExclusiveScopes, ScopeGuard};

pub use async_trait;
pub use tracing;
