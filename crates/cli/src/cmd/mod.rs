mod apply;
mod delete;
mod get;
mod list;
mod plan;
mod schemas;

pub use apply::{ApplyArgs, cmd_apply};
pub use delete::cmd_delete;
pub use get::cmd_get;
pub use list::cmd_list;
pub use plan::cmd_plan;
pub use schemas::cmd_schemas;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use tracing::warn;

use converge_lib::client::Client;
use converge_lib::config::ClientConfig;
use converge_lib::reconcile::Reconciler;
use converge_lib::resource::Resource;
use converge_lib::state::StateStore;

use crate::manifest::LoadedManifest;

/// Global options shared by every command.
pub struct Context {
  pub config_path: Option<PathBuf>,
  pub json: bool,
  pub verbose: bool,
}

impl Context {
  pub fn client(&self) -> Result<Client> {
    let config = ClientConfig::load(self.config_path.as_deref()).context("Failed to load client config")?;
    Client::from_config(config).context("Failed to create HTTP client")
  }

  pub fn reconciler(&self) -> Result<Reconciler> {
    Ok(Reconciler::new(self.client()?))
  }
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}

pub fn state_store() -> Result<StateStore> {
  StateStore::default_store().context("Failed to locate state directory")
}

/// Last stored state for the manifest. A broken state file is reported and skipped.
pub fn load_hint(store: &StateStore, manifest: &LoadedManifest) -> Option<Resource> {
  match store.load(&manifest.schema, &manifest.key) {
    Ok(hint) => hint,
    Err(e) => {
      warn!(key = %manifest.key, error = %e, "ignoring unreadable stored state");
      None
    }
  }
}

/// The resource to address for get and delete: the stored state when it
/// knows the identity, otherwise the manifest itself.
pub fn target(store: &StateStore, manifest: &LoadedManifest) -> Resource {
  match load_hint(store, manifest) {
    Some(hint) if hint.has_identity(&manifest.schema) => hint,
    _ => manifest.resource.clone(),
  }
}
