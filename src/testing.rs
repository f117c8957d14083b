//! Testing utilities for ironplan plans.
//!
//! This module provides small building blocks for writing tests of plans and
//! operator graphs:
//!
//! - **Fixtures**: arithmetic task factories (`identity`, `plus`, `mult`,
//!   `sum`) and a wrapper counting task runs
//! - **Assertions**: compare plan outputs as integers or documents, ignoring
//!   the order in which they were produced
//!
//! # Quick Start
//!
//! ```
//! use ironplan::Plan;
//! use ironplan::mapping::Mappings;
//! use ironplan::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let numbers = Plan::new(identity_task(), Mappings::values("x", [1, 2]));
//! let doubled = Plan::new(
//!     mult_task(),
//!     Mappings::product([Mappings::plan("x", &numbers), Mappings::value("y", 2)]),
//! );
//! assert_outputs_unordered(&doubled, &[2, 4])?;
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
