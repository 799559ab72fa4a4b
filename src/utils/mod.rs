//! Common utilities shared by the solver components.
//!
//! Currently a single submodule:
//!
//! - **`random`**: Seedable random number generation for the starting block
//!   and for breakdown-recovery replacement columns. Seeded runs are exactly
//!   reproducible; unseeded runs draw from OS entropy.

pub mod random;
