use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::remote::RemoteStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub remote: Option<Box<dyn RemoteStore>>,
    pub auth_token: Option<String>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            workspace: None,
            db: None,
            remote: None,
            auth_token: None,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
