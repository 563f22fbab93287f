//! Failure classification.
//!
//! Turns a failure cause into a disposition (retry, permanent, restart the
//! radio, partial success) for the connection state machine. The classifier
//! is a strategy object so carriers can plug in their own exceptions.

mod cause;
mod classifier;
mod operator;

pub use cause::FailCause;
pub use classifier::{DefaultClassifier, FailureClassifier, FailureDisposition};
pub use operator::{OperatorOverride, OperatorOverrides};
