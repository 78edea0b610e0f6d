#![deny(missing_docs)]

//! Core error, randomness and provenance types for the phylo MCMC engine.

pub mod errors;
pub mod provenance;
pub mod rng;

pub use errors::{ErrorInfo, PhyloError};
pub use provenance::{RunProvenance, SchemaVersion};
pub use rng::{derive_substream_seed, digest_f64s, RngHandle};
