//! Processing stages, mosaicking and output adapters.
//!
//! Stages and adapters are capabilities behind traits, resolved once at
//! startup from their configured names. The chain runner drives a group of
//! tiles through every configured stage and merges multi-tile outputs into
//! one artifact per stage.

pub mod adapter;
pub mod adapters;
pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod graphs;
pub mod mosaic;
pub mod processor;
pub mod registry;
pub mod scene;
pub mod stages;

pub use adapter::Adapter;
pub use chain::{ChainRunner, StageOutputs};
pub use config::{AdapterSettings, EngineConfig, ProcessingContext, StageSettings};
pub use engine::GraphEngine;
pub use error::{ProcessingError, Result};
pub use mosaic::{EngineMosaic, MosaicOp};
pub use processor::Processor;
pub use registry::{resolve_adapters, resolve_processors};
pub use scene::{ManifestSceneReader, SceneReader};
