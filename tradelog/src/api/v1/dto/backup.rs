use serde::{Deserialize, Serialize};

use crate::cache::ImportSummary;
use crate::services::ExportFormat;

/// Query for `GET /v1/export`; `format` defaults to JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportQuery {
    pub format: Option<ExportFormat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResponse {
    pub received: usize,
    pub created: usize,
    pub total: usize,
}

impl From<ImportSummary> for ImportResponse {
    fn from(summary: ImportSummary) -> Self {
        Self {
            received: summary.received,
            created: summary.created,
            total: summary.total,
        }
    }
}
