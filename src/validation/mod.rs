//! Structural validation of a project before it is fixed up
//!
//! Each [`ValidationRule`] inspects one service. The [`ProjectValidator`] runs
//! all of them over every service and reports the complete set of violations,
//! so users can fix a project in one pass.

pub mod rules;
pub mod validator;

pub use rules::ValidationRule;
pub use validator::{ProjectValidator, ValidationError, ValidationErrors};
