use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pact_contracts::error::PipelineError;
use pact_contracts::store::CommitmentStore;

use crate::intel::{DryrunIntel, ExtractTransport, HttpIntel, PromiseIntel};
use crate::store_mem::MemoryStore;
use crate::store_rest::RestStore;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Engine wiring resolved from the environment, with CLI flags layered on
/// top by the caller. Missing inference URL means dryrun intel; missing
/// store URL means the in-memory store.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub store_url: Option<String>,
    pub store_key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub multipart_extract: bool,
    pub dryrun_fixture: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: env_string("PACT_API_URL"),
            api_key: env_string("PACT_API_KEY"),
            store_url: env_string("PACT_STORE_URL"),
            store_key: env_string("PACT_STORE_KEY"),
            timeout_secs: env_string("PACT_TIMEOUT_SECS").and_then(|raw| raw.parse().ok()),
            multipart_extract: env_string("PACT_EXTRACT_TRANSPORT").as_deref() == Some("multipart"),
            dryrun_fixture: env_string("PACT_DRYRUN_FIXTURE").map(PathBuf::from),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn build_intel(&self) -> Result<Arc<dyn PromiseIntel>, PipelineError> {
        match &self.api_url {
            Some(url) => {
                let transport = if self.multipart_extract {
                    ExtractTransport::Multipart
                } else {
                    ExtractTransport::Json
                };
                Ok(Arc::new(HttpIntel::new(
                    url.clone(),
                    self.api_key.clone(),
                    transport,
                    self.timeout(),
                )?))
            }
            None => Ok(Arc::new(DryrunIntel::new(self.dryrun_fixture.clone()))),
        }
    }

    pub fn build_store(&self) -> Result<Arc<dyn CommitmentStore>, PipelineError> {
        match &self.store_url {
            Some(url) => Ok(Arc::new(RestStore::new(
                url.clone(),
                self.store_key.clone(),
                self.timeout(),
            )?)),
            None => Ok(Arc::new(MemoryStore::default())),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
