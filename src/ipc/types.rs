use std::path::PathBuf;

use serde::Deserialize;

use crate::accounts::ResetTokens;
use crate::config::Config;
use crate::model::Actor;
use crate::store::Store;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Who is asking. Handed over per request by the front end; the daemon
    /// keeps no login state of its own.
    #[serde(default)]
    pub actor: Option<Actor>,
}

/// Everything tied to the selected workspace.
pub struct Workspace {
    pub path: PathBuf,
    pub config: Config,
    pub store: Store,
    pub reset_tokens: ResetTokens,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<Workspace>,
}
