//! Coach Core Library
//!
//! Reference trainer and real-time coaching engine for pose-based exercise
//! feedback:
//! - Body-frame pose normalization and geometry kernels (Procrustes, joint angles)
//! - Feature extraction and standardization against a trained reference
//! - Reference model persistence (MessagePack tensors + JSON metadata)
//! - A reference trainer that calibrates tolerances and distance/angle percentiles
//! - A single-threaded, stateful coaching engine with hysteresis and rep counting

pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod features;
pub mod geometry;
pub mod landmark;
pub mod model;
pub mod payload;
pub mod registry;
pub mod trainer;

pub use config::{EngineConfig, SeverityPolicy};
pub use corpus::{parse_corpus, ReferenceCorpus};
pub use engine::CoachingEngine;
pub use error::{CoachError, Result};
pub use model::ReferenceModel;
pub use payload::CoachingPayload;

/// Coach-core version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
