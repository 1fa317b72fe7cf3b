//! Error types and result definitions for bulk update operations.
//!
//! [`BulkError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, an optional source error and the callsite where it was created. Several
//! errors can be aggregated into one, which is how worker pools report multiple failures.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Result type used throughout the crate.
pub type BulkResult<T> = Result<T, BulkError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for bulk update operations.
#[derive(Debug, Clone)]
pub struct BulkError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Errors collected from several concurrent units of work.
    Many {
        errors: Vec<BulkError>,
        location: &'static Location<'static>,
    },
}

/// Classification of the failures that can occur while tracking and running bulk updates.
///
/// Contention outcomes (duplicate queue keys, lost checkout races) are not errors and never
/// show up here; they are reported as `false` or `None` by the operations themselves.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Store Errors
    StoreConnectionFailed,
    StoreQueryFailed,

    // Data Errors
    ConversionError,
    InvalidData,
    DeserializationError,
    IoError,

    // Configuration Errors
    ConfigError,

    // Operation Tracking Errors
    OperationAlreadyRegistered,

    // Job Errors
    JobAlreadyExists,
    JobNotFound,

    // Record Processing Errors
    MissingIdentifier,
    LeaseConflict,
    PipelineAborted,
    PersistFailed,
    RecordProcessingFailed,

    // State & Workflow Errors
    InvalidState,
    BulkJobPanic,
    QueueConsumerPanic,
    ReleaseWorkerPanic,
    ReleaseAgentPanic,

    Unknown,

    /// Raised by fail points during fault injection tests.
    #[cfg(feature = "failpoints")]
    FailpointTriggered,
}

impl BulkError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors this is the kind of the first error, or [`ErrorKind::Unknown`]
    /// when the aggregation is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.description.as_ref(),
            ErrorRepr::Many { .. } => "multiple errors aggregated",
        }
    }

    /// Returns the dynamic detail, or the first detail found in an aggregation.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating error.
    ///
    /// Has no effect on aggregated errors, which forward their first error as the source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        BulkError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    #[track_caller]
    fn from_source<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        BulkError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for BulkError {
    fn eq(&self, other: &BulkError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Hash for BulkError {
    /// Hashes only the kind and static description so that repeated occurrences of the
    /// same failure group together regardless of detail or location.
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.repr).hash(state);
        match &self.repr {
            ErrorRepr::Single(payload) => {
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                errors.len().hash(state);
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for BulkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                write_indented_block(f, "Detail", payload.detail.as_deref())?;

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_indented_block(f, "Backtrace", Some(&backtrace))?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

/// Writes `label:` followed by `content` indented under it.
fn write_indented_block(
    f: &mut fmt::Formatter<'_>,
    label: &str,
    content: Option<&str>,
) -> fmt::Result {
    let Some(content) = content else {
        return Ok(());
    };

    if content.trim().is_empty() {
        return write!(f, "\n  {label}: <empty>");
    }

    write!(f, "\n  {label}:")?;
    for line in content.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl error::Error for BulkError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for BulkError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> BulkError {
        BulkError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for BulkError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> BulkError {
        BulkError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors; a single error is returned as is instead of being wrapped.
impl<E> From<Vec<E>> for BulkError
where
    E: Into<BulkError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> BulkError {
        let location = Location::caller();

        let mut errors: Vec<BulkError> = errors.into_iter().map(Into::into).collect();
        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        BulkError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for BulkError {
    #[track_caller]
    fn from(err: std::io::Error) -> BulkError {
        BulkError::from_source(ErrorKind::IoError, "I/O operation failed", err)
    }
}

impl From<serde_json::Error> for BulkError {
    #[track_caller]
    fn from(err: serde_json::Error) -> BulkError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        BulkError::from_source(kind, description, err)
    }
}

impl From<std::num::TryFromIntError> for BulkError {
    #[track_caller]
    fn from(err: std::num::TryFromIntError) -> BulkError {
        BulkError::from_source(ErrorKind::ConversionError, "Integer conversion failed", err)
    }
}

impl From<uuid::Error> for BulkError {
    #[track_caller]
    fn from(err: uuid::Error) -> BulkError {
        BulkError::from_source(ErrorKind::InvalidData, "UUID parsing failed", err)
    }
}

impl From<chrono::OutOfRangeError> for BulkError {
    #[track_caller]
    fn from(err: chrono::OutOfRangeError) -> BulkError {
        BulkError::from_source(ErrorKind::ConversionError, "Duration out of range", err)
    }
}

/// Maps pool failures to [`ErrorKind::StoreConnectionFailed`] and everything else that
/// reached the database to [`ErrorKind::StoreQueryFailed`].
impl From<sqlx::Error> for BulkError {
    #[track_caller]
    fn from(err: sqlx::Error) -> BulkError {
        let kind = match &err {
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => ErrorKind::StoreConnectionFailed,
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                ErrorKind::StoreConnectionFailed
            }
            _ => ErrorKind::StoreQueryFailed,
        };

        BulkError::from_source(kind, "Store operation failed", err)
    }
}

impl From<bulk_config::shared::ValidationError> for BulkError {
    #[track_caller]
    fn from(err: bulk_config::shared::ValidationError) -> BulkError {
        BulkError::from_source(ErrorKind::ConfigError, "Invalid configuration", err)
    }
}

impl From<bulk_config::LoadConfigError> for BulkError {
    #[track_caller]
    fn from(err: bulk_config::LoadConfigError) -> BulkError {
        BulkError::from_source(ErrorKind::ConfigError, "Configuration loading failed", err)
    }
}
