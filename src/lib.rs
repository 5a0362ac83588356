//! A deterministic feature flag assignment engine.
//!
//! # Overview
//!
//! The crate revolves around a [`Client`] that evaluates feature flag values for `subjects`, where
//! each subject has a unique key and key-value [`Attributes`] associated with it. Feature flag
//! evaluation results in an [`AssignmentValue`] being returned, representing a specific feature
//! flag value assigned to the subject.
//!
//! Assignment is deterministic: a subject is placed into a bucket by hashing its key with a
//! per-split salt (see [`shard_index`]), so the same subject always receives the same variation for
//! a given configuration.
//!
//! Flag configurations are held in a bounded [`ConfigurationStore`] that evicts the oldest entries
//! once full. The store is filled by the host through [`Client::set_configurations`] or
//! periodically refreshed by a [`PollerThread`].
//!
//! An [`AssignmentLogger`] should be provided to save assignment events to your storage,
//! facilitating tracking of which user received which feature flag values.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! In production, it is recommended to ignore all errors, as feature flag evaluation should not be
//! critical enough to cause system crashes. However, the returned errors are valuable for debugging
//! and usually indicate that developer's attention is needed.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages under
//! the `eppo` target. Consider integrating a `log`-compatible logger implementation for better
//! visibility into SDK operations.
//!
//! # Examples
//!
//! A runnable example lives in the `demos/` directory of the repository.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod assignment_logger;
mod attributes;
mod client;
mod config;
mod configuration_fetcher;
pub mod configuration_store;
mod error;
mod eval;
pub mod poller;
pub mod rules;
mod sdk_metadata;
pub mod sharder;
pub mod ufc;

pub use assignment_logger::{AssignmentEvent, AssignmentLogger};
pub use attributes::{AttributeValue, Attributes};
pub use client::{AssignmentValue, Client};
pub use config::ClientConfig;
pub use configuration_store::ConfigurationStore;
pub use error::{Error, Result};
pub use eval::Assignment;
pub use poller::{PollerConfig, PollerState, PollerThread, RefreshOutcome};
pub use rules::matches_any;
pub use sdk_metadata::SdkMetadata;
pub use sharder::{range_contains, shard_index, Md5Sharder, Sharder};
