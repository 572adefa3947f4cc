//! Shared vocabulary for the silo workspace.
//!
//! This crate is intentionally minimal: the node kind tag, the scalar value
//! type the container codec understands, the node-info DTO exchanged across
//! the worker boundary, and the error taxonomy. No I/O, no codec logic.

pub mod error;
pub mod kind;
pub mod node;
pub mod scalar;

pub use error::{Result, SiloError};
pub use kind::Kind;
pub use node::{NodeInfo, SliceSpec};
pub use scalar::Scalar;
