use derive_more::Display;

use cql_protocol::error::Error;
use cql_protocol::frame::message_error::{
    AdditionalErrorInfo, ErrorBody, ReadTimeoutError, WriteTimeoutError, WriteType,
};

#[derive(Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Copy, Clone, Display)]
pub enum RetryDecision {
    RetrySameNode,
    RetryNextNode,
    DontRetry,
}

/// Information about a failed request.
#[derive(Debug, Clone, Copy)]
pub struct QueryInfo<'a> {
    pub error: &'a Error,
    /// Number of retries already made for the request; 0 for the first failure.
    pub retry_count: usize,
}

/// Retry policy determines what to do in case of communication error. Policies are pure: all
/// state needed for the decision is in [`QueryInfo`].
pub trait RetryPolicy {
    /// Decide what to do with the failing request.
    fn decide(&self, query_info: QueryInfo) -> RetryDecision;
}

/// Forwards all errors directly to the user, never retries
#[derive(Default, Debug, Clone, Copy)]
pub struct FallthroughRetryPolicy;

impl RetryPolicy for FallthroughRetryPolicy {
    fn decide(&self, _query_info: QueryInfo) -> RetryDecision {
        RetryDecision::DontRetry
    }
}

/// Default retry policy - retries when there is a high chance that a retry might help.
/// Behaviour based on [DataStax Java Driver](https://docs.datastax.com/en/developer/java-driver/4.10/manual/core/retries/)
#[derive(Default, Debug, Clone, Copy)]
pub struct DefaultRetryPolicy;

impl RetryPolicy for DefaultRetryPolicy {
    fn decide(&self, query_info: QueryInfo) -> RetryDecision {
        let first_attempt = query_info.retry_count == 0;

        match query_info.error {
            Error::Io(_)
            | Error::ConnectionClosed(_)
            | Error::Timeout(_)
            | Error::Server {
                body:
                    ErrorBody {
                        additional_info:
                            AdditionalErrorInfo::Server
                            | AdditionalErrorInfo::Overloaded
                            | AdditionalErrorInfo::IsBootstrapping
                            | AdditionalErrorInfo::Truncate,
                        ..
                    },
                ..
            } => RetryDecision::RetryNextNode,
            Error::Server {
                body:
                    ErrorBody {
                        additional_info: AdditionalErrorInfo::Unavailable(_),
                        ..
                    },
                ..
            } => {
                if first_attempt {
                    RetryDecision::RetryNextNode
                } else {
                    RetryDecision::DontRetry
                }
            }
            Error::Server {
                body:
                    ErrorBody {
                        additional_info: AdditionalErrorInfo::ReadTimeout(error @ ReadTimeoutError { .. }),
                        ..
                    },
                ..
            } => {
                // enough replicas answered, but the one asked for data did not
                if first_attempt && error.received >= error.block_for && !error.data_present {
                    RetryDecision::RetrySameNode
                } else {
                    RetryDecision::DontRetry
                }
            }
            Error::Server {
                body:
                    ErrorBody {
                        additional_info:
                            AdditionalErrorInfo::WriteTimeout(error @ WriteTimeoutError { .. }),
                        ..
                    },
                ..
            } => {
                if first_attempt && error.write_type == WriteType::BatchLog {
                    RetryDecision::RetrySameNode
                } else {
                    RetryDecision::DontRetry
                }
            }
            _ => RetryDecision::DontRetry,
        }
    }
}
