//! Error types.

use thiserror::Error;

/// Errors reported by the decomposition and spline routines.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid decomposition or discretization parameters.
    ///
    /// These are detected when a topology, knot vector or space is constructed
    /// and are not recoverable.
    #[error("invalid configuration for `{parameter}`: {reason}")]
    Configuration {
        /// Name of the offending parameter.
        parameter: &'static str,
        /// Description of the violated requirement.
        reason: String,
    },
    /// An evaluation point lies outside the valid parametric range.
    #[error("point {point} lies outside of [{lower}, {upper}]")]
    Domain {
        /// The evaluation point.
        point: f64,
        /// Lower end of the valid range.
        lower: f64,
        /// Upper end of the valid range.
        upper: f64,
    },
}

impl Error {
    pub(crate) fn configuration(parameter: &'static str, reason: impl Into<String>) -> Self {
        Error::Configuration {
            parameter,
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
