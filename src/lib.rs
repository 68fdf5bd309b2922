//! Asset processing worker library: polls the Asset API for jobs,
//! dispatches them to a bounded pool of concurrent workers, and for each
//! job downloads a media asset, segments it via an external transcoder,
//! and reports progress and terminal status back to the API.
//!
//! See `SPEC_FULL.md` for the full component design; module layout
//! mirrors the component table there (C1–C8 plus the ambient registry,
//! config, errors, and models modules).

pub mod api;
pub mod config;
pub mod errors;
pub mod heartbeat;
pub mod media;
pub mod models;
pub mod processor;
pub mod registry;
pub mod scheduler;
pub mod supervisor;
pub mod worker;
pub mod workspace;
