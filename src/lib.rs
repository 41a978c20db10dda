// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Fleet Planner
//!
//! The reconciliation core of a fleet orchestrator: it turns a declarative
//! deployment (jobs, instance counts, availability zones, networks) into a
//! concrete plan against the instances and addresses that already exist.
//!
//! ## Overview
//!
//! Planning a deployment answers three coupled questions:
//!
//! - **Placement**: which existing instances are kept, which are dropped,
//!   and which zone every new instance goes to, with as little churn as
//!   possible
//! - **Instance plans**: for every instance, whether it is new, kept or
//!   obsolete, which one is bootstrap, and what changed about it
//! - **Addresses**: exclusive, persistent IP reservations drawn from subnet
//!   pools with static, dynamic and reserved sub-ranges
//!
//! ## Architecture
//!
//! 1. **Desired State**: the YAML deployment manifest ([`config`])
//! 2. **Recorded State**: instances, agent reports and held addresses ([`state`])
//! 3. **Reconciler**: places instances, builds plans and settles network
//!    reservations ([`reconciler`])
//!
//! Nothing is applied; the plan is the output.
//!
//! ## Modules
//!
//! - [`config`]: Manifest parsing, validation and conversion
//! - [`network`]: Address pools, reservations and network settings
//! - [`placement`]: Availability zone placement and index assignment
//! - [`planner`]: Instance plans, change detection and plan summaries
//! - [`reconciler`]: Deployment-wide planning
//! - [`state`]: State storage
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! name: prod
//! availability_zones:
//!   - name: z1
//!   - name: z2
//! networks:
//!   - name: default
//!     subnets:
//!       - range: 10.0.0.0/24
//!         gateway: 10.0.0.1
//!         static: ["10.0.0.10 - 10.0.0.20"]
//! jobs:
//!   - name: web
//!     instances: 3
//!     azs: [z1, z2]
//!     networks:
//!       - name: default
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod network;
pub mod placement;
pub mod planner;
pub mod reconciler;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, Deployment, DeploymentManifest, SpecHasher};
pub use error::{FleetError, Result};
pub use network::{IpProvider, NetworkReservation};
pub use placement::AvailabilityZonePicker;
pub use planner::{DeploymentPlan, DesiredInstance, InstancePlan, InstancePlanner};
pub use reconciler::{ReconcileSummary, Reconciler};
pub use state::{DeploymentState, LocalStateStore, StateStore};
