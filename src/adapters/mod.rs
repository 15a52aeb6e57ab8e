//! Adapters for external collaborators.
//!
//! Adapters connect the engine to the outside world: command-line tools that
//! act as capabilities or as the reasoning oracle, plan files, and the
//! downstream response writer.

pub mod command;
pub mod file;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::CapabilityConfig;
use crate::core::{CapabilityCatalog, Synthesis};
use crate::domain::Conversation;

pub use command::{run_command, CommandCapability, CommandOracle};
pub use file::FileOracle;

/// Downstream response writer
///
/// Receives the synthesis together with the original conversation and is
/// solely responsible for the user-facing answer. Implementations must
/// rewrite the synthesis, never return it verbatim.
#[async_trait]
pub trait SynthesisConsumer: Send + Sync {
    async fn respond(&self, conversation: &Conversation, synthesis: &Synthesis) -> Result<String>;
}

/// Build the capability catalog from configured commands
pub fn catalog_from_config(capabilities: &[CapabilityConfig]) -> Result<CapabilityCatalog> {
    let mut builder = CapabilityCatalog::builder();

    for config in capabilities {
        builder = builder
            .register(CommandCapability::new(config.clone()))
            .with_context(|| format!("Failed to register capability '{}'", config.name))?;
    }

    Ok(builder.build())
}
