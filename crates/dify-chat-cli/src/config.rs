use std::path::{Path, PathBuf};

use dify_chat_core::StoreConfig;

/// Loads `.env` from the crate directory and then the working directory.
pub fn load_env() {
    let _ = dotenvy::from_path(Path::new(
        format!("{}/.env", env!("CARGO_MANIFEST_DIR")).as_str(),
    ));
    dotenvy::dotenv().ok();
}

/// Picks the store: `--memory` wins, then an explicit directory, then
/// `~/.dify-chat`.
pub fn resolve_store(data_dir: Option<PathBuf>, memory: bool) -> StoreConfig {
    if memory {
        return StoreConfig::Memory;
    }
    let dir = data_dir.unwrap_or_else(default_data_dir);
    StoreConfig::File(dir)
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dify-chat")
}
