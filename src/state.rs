use std::sync::Arc;

use crate::config::Config;
use crate::search::TextIndex;
use crate::store::RecordStore;

/// Shared application state, constructed once at startup and cloned into
/// every handler. No other process-wide mutable state exists.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: RecordStore,
    /// None when the index failed to open; search then runs entirely on
    /// the substring fallback tier.
    pub index: Option<Arc<TextIndex>>,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let store = RecordStore::open(config.db_path())?;

        // The store is the source of truth; the index is rebuilt from it at
        // startup so the two can never drift across restarts.
        let index = match TextIndex::open_or_create(&config.index_dir()) {
            Ok(index) => {
                let records = store.all();
                if let Err(e) = index.clear().and_then(|_| index.add_all(&records)) {
                    tracing::error!("Failed to rebuild text index: {e:#}");
                    None
                } else {
                    tracing::info!("Text index ready ({} records)", records.len());
                    Some(Arc::new(index))
                }
            }
            Err(e) => {
                tracing::error!("Text index unavailable, searches will use fallback: {e:#}");
                None
            }
        };

        Ok(Self {
            config,
            store,
            index,
            http_client: reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
        })
    }
}
