use std::error::Error as ErrorTrait;
use std::fmt::Display;

///
/// Contains information about an error occurence
///
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    /// The type of this error
    pub kind: ErrorKind,
    /// Some errors come with more context
    pub context: Option<String>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Error {
            kind,
            context: None,
        }
    }

    pub(crate) fn new_with_context(kind: ErrorKind, context: impl Display) -> Error {
        Error {
            kind,
            context: Some(context.to_string()),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let context = self.context.as_deref();

        match (&self.kind, context) {
            (ErrorKind::UnmatchedRequest, Some(context))
            | (ErrorKind::IncompleteStub, Some(context))
            | (ErrorKind::OutstandingExpectation, Some(context))
            | (ErrorKind::OutstandingRequest, Some(context)) => {
                write!(f, "{}{}", self.kind.description(), context)
            }
            _ => write!(
                f,
                "{} (context: {})",
                self.kind.description(),
                context.unwrap_or("none")
            ),
        }
    }
}

impl ErrorTrait for Error {}

///
/// The type of an error
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No stub matched the request
    UnmatchedRequest,
    /// A stub matched but declares neither a response nor a passthrough
    IncompleteStub,
    /// Some expectations were never consumed
    OutstandingExpectation,
    /// Some synthetic responses were never delivered
    OutstandingRequest,
    /// The request object was used out of order
    InvalidState,
    /// The status code is invalid or out of range
    InvalidStatusCode,
    /// The real transport failed to perform a passthrough request
    TransportFailure,
    /// The background runtime could not be started
    RuntimeFailure,
}

impl ErrorKind {
    fn description(&self) -> &'static str {
        match self {
            ErrorKind::UnmatchedRequest => "Unexpected request: ",
            ErrorKind::IncompleteStub => "No response has been defined for ",
            ErrorKind::OutstandingExpectation => {
                "Expected no outstanding expectations, but there were "
            }
            ErrorKind::OutstandingRequest => "Expected no outstanding requests, but there were ",
            ErrorKind::InvalidState => "the request is in an invalid state",
            ErrorKind::InvalidStatusCode => "invalid status code",
            ErrorKind::TransportFailure => "the real transport failed",
            ErrorKind::RuntimeFailure => "the background runtime is not running",
        }
    }
}
