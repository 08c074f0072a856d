use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::adapter::{Clock, RandomSource, SystemClock, ThreadRandom};
use crate::portal::PortalConfig;
use crate::rules::RulesDocument;
use crate::store::SqliteStore;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub store: Option<SqliteStore>,
    pub rules: Option<RulesDocument>,
    pub portals: BTreeMap<String, PortalConfig>,
    pub clock: Box<dyn Clock>,
    pub random: Box<dyn RandomSource>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            store: None,
            rules: None,
            portals: BTreeMap::new(),
            clock: Box::new(SystemClock),
            random: Box::new(ThreadRandom),
        }
    }
}
