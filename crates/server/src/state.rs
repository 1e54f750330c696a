//! Shared server runtime state.

use std::{path::PathBuf, sync::Arc};

use {comcore_mail::Mailer, comcore_store::Store};

use crate::{codes::CodeManager, sessions::SessionRegistry};

/// Everything the dispatcher needs, wrapped in `Arc` for use across
/// per-connection tasks.
pub struct ServerState {
    pub store: Arc<dyn Store>,
    pub mailer: Arc<dyn Mailer>,
    pub codes: CodeManager,
    pub sessions: SessionRegistry,
    /// Destination for `uploadFile`; served by the static site.
    pub upload_dir: PathBuf,
}

impl ServerState {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>, upload_dir: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            store,
            mailer,
            codes: CodeManager::new(),
            sessions: SessionRegistry::new(),
            upload_dir,
        })
    }
}
