use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::state::AppState;

use super::{SyncJob, SyncReport, JOB_AUTOFETCH};

/// Keeps the upstream script warm by hitting `AUTOFETCH_URL` on a schedule.
pub struct AutofetchJob {
    url: String,
}

impl AutofetchJob {
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

#[async_trait]
impl SyncJob for AutofetchJob {
    fn name(&self) -> &'static str {
        JOB_AUTOFETCH
    }

    fn schedule(&self) -> &'static str {
        "0 */10 * * * *"
    }

    async fn run(&self, state: Arc<AppState>) -> Result<SyncReport> {
        let status = state.source.ping(&self.url).await?;
        if (200..300).contains(&status) {
            info!(url = %self.url, status, "autofetch ok");
        } else {
            warn!(url = %self.url, status, "autofetch returned non-success status");
        }
        Ok(SyncReport {
            processed: 1,
            ..SyncReport::default()
        })
    }
}
