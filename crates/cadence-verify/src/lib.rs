//! # cadence-verify
//!
//! Per-type payload validation for the Cadence buses.
//!
//! [`SchemaVerifier`] holds one [`PayloadSchema`] per command or query type
//! and checks payloads in two phases:
//!
//! 1. **Structural**: JSON Schema validation via the `jsonschema` crate.
//! 2. **Rules**: `RequiredField`, `AllowedValues`, `ForbiddenPattern` and
//!    named `Custom` functions evaluated against the payload.
//!
//! [`SchemaValidation`] installs the verifier as middleware on either bus.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use cadence_verify::{PayloadSchema, SchemaValidation, SchemaVerifier};
//!
//! let verifier = Arc::new(SchemaVerifier::new());
//! verifier.register_command::<CreateArtist>(PayloadSchema::json(json!({
//!     "type": "object",
//!     "required": ["name"]
//! })))?;
//!
//! let validation = Arc::new(SchemaValidation::new(verifier));
//! commands.use_middleware(validation.clone());
//! queries.use_middleware(validation);
//! ```

pub mod middleware;
pub mod schema;
pub mod verifier;

pub use middleware::SchemaValidation;
pub use schema::{PayloadRule, PayloadSchema, RuleCheck, VerificationFailure, VerificationReport};
pub use verifier::{RuleFn, SchemaVerifier};
