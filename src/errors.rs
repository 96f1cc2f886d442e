// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type returned by every fallible operation in
//! this crate.

use std::fmt;

/// `IamfError` enumerates every way a read, write, or validation operation in this crate can
/// fail.
#[derive(Debug)]
pub enum IamfError {
    /// A field value was malformed, violated a documented constraint, or duplicated an entry in
    /// a set required to be unique.
    InvalidArgument(String),
    /// A writer ran out of capacity, a ULEB128 value overflowed the configured encoding size, or
    /// a reader was asked for more bytes than it has.
    ResourceExhausted(String),
    /// A reader signaled a length that would require more bytes than are currently buffered. This
    /// is distinct from `ResourceExhausted`: callers should retry after appending more data rather
    /// than treating the stream as malformed.
    NeedMoreData,
    /// An API was called in a sequence its preconditions forbid, e.g. asking for a subblock
    /// duration before subblocks were initialized.
    FailedPrecondition(String),
    /// The payload belongs to a known-but-unsupported OBU variant (a reserved type whose parse
    /// is intentionally skipped).
    Unimplemented(&'static str),
    /// An internal invariant was violated, e.g. a size back-patch computed a negative length.
    /// Encountering this indicates a bug in this crate rather than malformed input.
    Unknown(String),
}

impl fmt::Display for IamfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IamfError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            IamfError::ResourceExhausted(msg) => write!(f, "resource exhausted: {msg}"),
            IamfError::NeedMoreData => write!(f, "need more data"),
            IamfError::FailedPrecondition(msg) => write!(f, "failed precondition: {msg}"),
            IamfError::Unimplemented(feature) => write!(f, "unimplemented: {feature}"),
            IamfError::Unknown(msg) => write!(f, "unknown error: {msg}"),
        }
    }
}

impl std::error::Error for IamfError {}

pub type Result<T> = std::result::Result<T, IamfError>;

/// Convenience function to create an `InvalidArgument` error.
pub fn invalid_argument<T>(msg: impl Into<String>) -> Result<T> {
    Err(IamfError::InvalidArgument(msg.into()))
}

/// Convenience function to create a `ResourceExhausted` error.
pub fn resource_exhausted<T>(msg: impl Into<String>) -> Result<T> {
    Err(IamfError::ResourceExhausted(msg.into()))
}

/// Convenience function to create a `NeedMoreData` error.
pub fn need_more_data<T>() -> Result<T> {
    Err(IamfError::NeedMoreData)
}

/// Convenience function to create a `FailedPrecondition` error.
pub fn failed_precondition<T>(msg: impl Into<String>) -> Result<T> {
    Err(IamfError::FailedPrecondition(msg.into()))
}

/// Convenience function to create an `Unimplemented` error.
pub fn unimplemented_error<T>(feature: &'static str) -> Result<T> {
    Err(IamfError::Unimplemented(feature))
}

/// Convenience function to create an `Unknown` error.
pub fn unknown_error<T>(msg: impl Into<String>) -> Result<T> {
    Err(IamfError::Unknown(msg.into()))
}
