//! Post-enhancement validation: spec compliance scoring, run metrics and
//! function-name checks over emitted projects.

pub mod compliance;
pub mod functions;
pub mod metrics;

pub use compliance::{CheckResult, ComplianceValidator, Thresholds, ValidationReport};
pub use functions::{FunctionReport, FunctionValidator, ProjectValidation};
pub use metrics::{Metrics, TokenTotals};
