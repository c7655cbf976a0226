//! Error taxonomy for the cluster state registry.
//!
//! A small hand-rolled error enum deriving `thiserror::Error` for
//! `Display`/`source`, since these errors cross a real API boundary.

use thiserror::Error;

/// Errors surfaced by [`crate::registry::ClusterStateRegistry`].
///
/// Per the error-handling design (see SPEC_FULL.md §B): `UpdateNodes`
/// returns an error only for unrecoverable input. Provider-transient
/// failures, unsupported capabilities, and scale-up timeouts are *not*
/// represented here — they are logged and/or folded into the next
/// `Status` as first-class events instead of propagated as errors.
#[derive(Debug, Error)]
pub enum CsrError {
    #[error("node list must be non-nil")]
    NilNodeList,

    #[error("pod list must be non-nil")]
    NilPodList,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, CsrError>;
