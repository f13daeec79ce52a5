use std::{
    error::Error as StdError,
    fmt::{Display, Formatter},
};

use crate::{NaturalKey, ParentId, executor::ExecutionReport, executor::Phase};

macro_rules! impl_error_stack_methods {
    ($error_type:ty) => {
        impl $error_type {
            #[must_use]
            pub fn append_details(mut self, details: impl IntoIterator<Item = String>) -> Self {
                self.stack.extend(details);
                self
            }

            #[must_use]
            pub fn append_detail(mut self, detail: impl Into<String>) -> Self {
                self.stack.push(detail.into());
                self
            }

            pub fn append_details_mut(&mut self, details: impl IntoIterator<Item = String>) {
                self.stack.extend(details);
            }

            pub fn append_detail_mut(&mut self, detail: impl Into<String>) {
                self.stack.push(detail.into());
            }

            #[must_use]
            pub fn stack(&self) -> &[String] {
                &self.stack
            }
        }
    };
}

macro_rules! impl_from_with_detail {
    ($from_type:ty => $to_type:ident::$variant:ident, $detail:expr) => {
        impl From<$from_type> for $to_type {
            fn from(err: $from_type) -> Self {
                $to_type::$variant(err.append_detail($detail))
            }
        }
    };
}

/// Defines a fully transparent error enum with automatic conversion implementations.
///
/// This macro generates:
/// - An enum with all variants marked as `#[error(transparent)]`
/// - `impl_from_with_detail!` for each variant to add stack context
/// - `append_detail` / `append_detail_mut` / `stack` delegating to the variant
macro_rules! define_transparent_error {
    (
        $(#[$meta:meta])*
        $vis:vis enum $error_name:ident,
        stack_message: $stack_msg:expr,
        variants: [
            $($variant:ident),* $(,)?
        ]
    ) => {
        $(#[$meta])*
        #[derive(thiserror::Error, Debug)]
        $vis enum $error_name {
            $(
                #[error(transparent)]
                $variant($variant),
            )*
        }

        pastey::paste! {
            const [<$error_name:snake:upper _STACK>]: &str = $stack_msg;

            $(
                impl_from_with_detail!($variant => $error_name::$variant, [<$error_name:snake:upper _STACK>]);
            )*
        }

        impl $error_name {
            #[must_use]
            pub fn append_detail(mut self, detail: impl Into<String>) -> Self {
                self.append_detail_mut(detail);
                self
            }

            pub fn append_detail_mut(&mut self, detail: impl Into<String>) -> &mut Self {
                match self {
                    $(
                        $error_name::$variant(e) => {
                            e.append_detail_mut(detail);
                        }
                    )*
                }
                self
            }

            #[must_use]
            pub fn stack(&self) -> &[String] {
                match self {
                    $(
                        $error_name::$variant(e) => e.stack(),
                    )*
                }
            }
        }
    };
}

// --------------------------- CONFIGURATION ERRORS ---------------------------

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("Natural key `{key}` appears more than once in the desired associations")]
pub struct DuplicateNaturalKey {
    pub key: String,
    pub stack: Vec<String>,
}
impl DuplicateNaturalKey {
    #[must_use]
    pub fn new(key: impl Display) -> Self {
        Self {
            key: key.to_string(),
            stack: Vec::new(),
        }
    }
}
impl_error_stack_methods!(DuplicateNaturalKey);

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("Ambiguous match for `{key}`: {reason}")]
pub struct AmbiguousMatch {
    pub key: String,
    pub reason: String,
    pub stack: Vec<String>,
}
impl AmbiguousMatch {
    #[must_use]
    pub fn new(key: impl Display, reason: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            reason: reason.into(),
            stack: Vec::new(),
        }
    }
}
impl_error_stack_methods!(AmbiguousMatch);

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("Invalid association: {reason}")]
pub struct InvalidAssociation {
    pub reason: String,
    pub stack: Vec<String>,
}
impl InvalidAssociation {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            stack: Vec::new(),
        }
    }
}
impl_error_stack_methods!(InvalidAssociation);

define_transparent_error! {
    /// The desired input cannot be reconciled as written. Never retried automatically.
    pub enum ConfigurationError,
    stack_message: "Invalid desired configuration",
    variants: [
        DuplicateNaturalKey,
        AmbiguousMatch,
        InvalidAssociation,
    ]
}

// --------------------------- DIFF ERROR ---------------------------

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("Current association `{key}` was reported without a remote id")]
pub struct MissingRemoteId {
    pub key: String,
    pub stack: Vec<String>,
}
impl MissingRemoteId {
    #[must_use]
    pub fn new(key: impl Display) -> Self {
        Self {
            key: key.to_string(),
            stack: Vec::new(),
        }
    }
}
impl_error_stack_methods!(MissingRemoteId);

define_transparent_error! {
    pub enum DiffError,
    stack_message: "Error computing reconciliation plan",
    variants: [
        ConfigurationError,
        MissingRemoteId,
    ]
}

impl DiffError {
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, DiffError::ConfigurationError(_))
    }
}

// --------------------------- GATEWAY ERROR ---------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum GatewayErrorKind {
    /// The parent or the targeted association does not exist remotely.
    NotFound,
    /// A remote uniqueness constraint collided.
    Conflict,
    /// Any other failure talking to the remote system.
    Transport,
}

impl GatewayErrorKind {
    /// Whether re-running the full reconcile cycle can resolve the failure.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, GatewayErrorKind::Conflict | GatewayErrorKind::Transport)
    }
}

#[derive(Debug)]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub stack: Vec<String>,
    pub source: Box<dyn StdError + Send + Sync + 'static>,
}

impl_error_stack_methods!(GatewayError);

impl PartialEq for GatewayError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.stack == other.stack
            && self.source.to_string() == other.source.to_string()
    }
}

impl GatewayError {
    pub fn new<E>(source: E, kind: GatewayErrorKind) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            kind,
            stack: Vec::new(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(InternalErrorMessage(message.into()), GatewayErrorKind::NotFound)
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(InternalErrorMessage(message.into()), GatewayErrorKind::Conflict)
    }

    pub fn transport<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::new(source, GatewayErrorKind::Transport)
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == GatewayErrorKind::NotFound
    }
}

impl StdError for GatewayError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.source as &(dyn StdError + 'static))
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GatewayError ({}): {}", self.kind, self.source)?;

        if !self.stack.is_empty() {
            writeln!(f)?;
            writeln!(f, "Stack:")?;
            for detail in &self.stack {
                writeln!(f, "  {detail}")?;
            }
        }

        if let Some(source) = self.source.source() {
            writeln!(f)?;
            writeln!(f, "Caused by:")?;
            error_chain_fmt(source, f)?;
        }

        Ok(())
    }
}

pub(crate) fn error_chain_fmt(
    e: &(dyn StdError + 'static),
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{e}")?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{cause}")?;
        current = cause.source();
    }
    Ok(())
}

#[derive(thiserror::Error, PartialEq, Debug)]
#[error("{0}")]
pub struct InternalErrorMessage(pub String);

// --------------------------- EXECUTE ERROR ---------------------------

/// The single mutation that aborted an execution.
#[derive(Debug, PartialEq)]
pub struct ItemFailure<K> {
    pub key: K,
    pub phase: Phase,
    pub error: GatewayError,
}

impl<K: NaturalKey> Display for ItemFailure<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} of `{}` failed: {}", self.phase, self.key, self.error)
    }
}

impl<K: NaturalKey> StdError for ItemFailure<K> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.error)
    }
}

/// Execution stopped at `failure`. Everything in `report` was applied remotely
/// before the failure and should be persisted by the caller.
#[derive(Debug, PartialEq)]
pub struct ExecuteError<K> {
    pub report: ExecutionReport<K>,
    pub failure: ItemFailure<K>,
}

impl<K: NaturalKey> ExecuteError<K> {
    #[must_use]
    pub fn kind(&self) -> GatewayErrorKind {
        self.failure.error.kind
    }
}

impl<K: NaturalKey> Display for ExecuteError<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Reconciliation aborted: {}", self.failure)?;
        write!(f, "Applied before the failure: {}", self.report)
    }
}

impl<K: NaturalKey> StdError for ExecuteError<K> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.failure)
    }
}

// --------------------------- CONVERGE ERROR ---------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConvergeError<K: NaturalKey> {
    #[error("Failed to list current associations of `{parent}`: {source}")]
    List {
        parent: ParentId,
        #[source]
        source: GatewayError,
    },
    #[error(transparent)]
    Diff(#[from] DiffError),
    #[error(transparent)]
    Execute(#[from] ExecuteError<K>),
}

impl<K: NaturalKey> ConvergeError<K> {
    /// Whether the whole `list → diff → execute` cycle may be re-run.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ConvergeError::List { source, .. } => source.kind.is_transient(),
            ConvergeError::Diff(_) => false,
            ConvergeError::Execute(e) => e.kind().is_transient(),
        }
    }

    /// Partial results applied before the failure, if any.
    #[must_use]
    pub fn partial_report(&self) -> Option<&ExecutionReport<K>> {
        match self {
            ConvergeError::Execute(e) => Some(&e.report),
            ConvergeError::List { .. } | ConvergeError::Diff(_) => None,
        }
    }
}
