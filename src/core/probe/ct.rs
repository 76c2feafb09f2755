// src/core/probe/ct.rs

use super::{fill_domain, HttpTransport, ProbeContext, ProbeRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// One certificate-transparency log entry as returned by crt.sh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtRecord {
    pub id: Option<u64>,
    pub issuer_name: Option<String>,
    pub common_name: Option<String>,
    pub name_value: Option<String>,
    pub not_before: Option<String>,
    pub not_after: Option<String>,
}

#[derive(Clone)]
pub struct CtClient {
    transport: Arc<dyn HttpTransport>,
    url_template: String,
}

impl CtClient {
    pub fn new(transport: Arc<dyn HttpTransport>, url_template: &str) -> Self {
        Self { transport, url_template: url_template.to_string() }
    }

    /// All logged certificates for `domain`, or `None` if the query failed.
    /// A failed query never yields a partial list.
    pub async fn fetch(&self, domain: &str, ctx: &ProbeContext) -> Option<Vec<CtRecord>> {
        let url = fill_domain(&self.url_template, domain);
        let response = match self.transport.get(ProbeRequest::json(url), ctx).await {
            Ok(response) => response,
            Err(e) => {
                warn!(domain, error = %e, "Certificate transparency request failed.");
                return None;
            }
        };
        if !response.is_success() {
            warn!(domain, status = response.status, "Certificate transparency query returned an error status.");
            return None;
        }
        // crt.sh answers an empty body (not `[]`) for unknown names.
        if response.body.trim().is_empty() {
            return Some(Vec::new());
        }
        match response.json::<Vec<CtRecord>>() {
            Ok(records) => {
                debug!(domain, count = records.len(), "Certificate transparency records fetched.");
                Some(records)
            }
            Err(e) => {
                warn!(domain, error = %e, "Certificate transparency response was not valid JSON.");
                None
            }
        }
    }
}
