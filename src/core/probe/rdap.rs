// src/core/probe/rdap.rs

use super::{HttpTransport, ProbeContext, ProbeRequest};
use crate::core::error::ProbeError;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct Bootstrap {
    services: Vec<(Vec<String>, Vec<String>)>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RdapEvent {
    pub event_action: String,
    pub event_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RdapNameserver {
    pub ldh_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RdapSecureDns {
    pub delegation_signed: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RdapEntity {
    #[serde(default)]
    pub roles: Vec<String>,
    pub vcard_array: Option<serde_json::Value>,
}

impl RdapEntity {
    /// The `fn` property of the entity's jCard, if present.
    pub fn full_name(&self) -> Option<String> {
        let properties = self.vcard_array.as_ref()?.get(1)?.as_array()?;
        properties.iter().find_map(|property| {
            let fields = property.as_array()?;
            if fields.first()?.as_str()? == "fn" {
                fields.get(3)?.as_str().map(str::to_string)
            } else {
                None
            }
        })
    }
}

/// The parts of an RDAP domain object the scanner looks at.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RdapDomain {
    pub ldh_name: Option<String>,
    #[serde(default)]
    pub status: Vec<String>,
    #[serde(default)]
    pub events: Vec<RdapEvent>,
    #[serde(default)]
    pub nameservers: Vec<RdapNameserver>,
    #[serde(rename = "secureDNS")]
    pub secure_dns: Option<RdapSecureDns>,
    #[serde(default)]
    pub entities: Vec<RdapEntity>,
}

impl RdapDomain {
    pub fn event_date(&self, action: &str) -> Option<&str> {
        self.events
            .iter()
            .find(|e| e.event_action.eq_ignore_ascii_case(action))
            .and_then(|e| e.event_date.as_deref())
    }

    pub fn registrar(&self) -> Option<String> {
        self.entities
            .iter()
            .find(|e| e.roles.iter().any(|r| r == "registrar"))
            .and_then(RdapEntity::full_name)
    }
}

#[derive(Debug, Clone)]
pub enum RdapLookup {
    /// The bootstrap registry has no server for this TLD.
    Unsupported { tld: String },
    Found { server: String, domain: Box<RdapDomain> },
    /// The last candidate server answered 404.
    NotFound { server: String },
    /// Every candidate failed; carries the last failure reason.
    Failed { reason: String },
}

#[derive(Clone)]
pub struct RdapClient {
    transport: Arc<dyn HttpTransport>,
    bootstrap_url: String,
}

impl RdapClient {
    pub fn new(transport: Arc<dyn HttpTransport>, bootstrap_url: &str) -> Self {
        Self { transport, bootstrap_url: bootstrap_url.to_string() }
    }

    /// Candidate RDAP base URLs for the domain's TLD.
    pub async fn servers_for(&self, tld: &str, ctx: &ProbeContext) -> Result<Vec<String>, ProbeError> {
        let response = self
            .transport
            .get(ProbeRequest::json(self.bootstrap_url.clone()), ctx)
            .await?
            .ensure_success()?;
        let bootstrap: Bootstrap = response.json()?;
        let servers = bootstrap
            .services
            .into_iter()
            .find(|(tlds, _)| tlds.iter().any(|t| t.eq_ignore_ascii_case(tld)))
            .map(|(_, urls)| urls)
            .unwrap_or_default();
        debug!(tld, count = servers.len(), "RDAP bootstrap resolved.");
        Ok(servers)
    }

    /// Bootstrap lookup, then each candidate server in order until one answers 200.
    pub async fn lookup(&self, domain: &str, ctx: &ProbeContext) -> Result<RdapLookup, ProbeError> {
        let tld = domain.rsplit('.').next().unwrap_or(domain).to_ascii_lowercase();
        let servers = self.servers_for(&tld, ctx).await?;
        if servers.is_empty() {
            info!(tld = %tld, "No RDAP service registered for TLD.");
            return Ok(RdapLookup::Unsupported { tld });
        }

        let mut last = RdapLookup::Failed { reason: "no RDAP server responded".to_string() };
        for server in servers {
            let url = format!("{}/domain/{}", server.trim_end_matches('/'), domain);
            match self.transport.get(ProbeRequest::new(url, "application/rdap+json"), ctx).await {
                Ok(response) if response.status == 200 => match response.json::<RdapDomain>() {
                    Ok(record) => return Ok(RdapLookup::Found { server, domain: Box::new(record) }),
                    Err(e) => {
                        warn!(server = %server, error = %e, "RDAP response could not be parsed.");
                        last = RdapLookup::Failed { reason: e.to_string() };
                    }
                },
                Ok(response) if response.status == 404 => {
                    debug!(server = %server, "RDAP server reports domain not found.");
                    last = RdapLookup::NotFound { server };
                }
                Ok(response) => {
                    warn!(server = %server, status = response.status, "RDAP server returned an error status.");
                    last = RdapLookup::Failed { reason: format!("HTTP {} from {}", response.status, server) };
                }
                Err(ProbeError::Cancelled) => return Err(ProbeError::Cancelled),
                Err(e) => {
                    warn!(server = %server, error = %e, "RDAP request failed.");
                    last = RdapLookup::Failed { reason: e.to_string() };
                }
            }
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registrar_name_comes_from_vcard_fn() {
        let record: RdapDomain = serde_json::from_str(
            r#"{"entities":[
                {"roles":["abuse"],"vcardArray":["vcard",[["fn",{},"text","Abuse Desk"]]]},
                {"roles":["registrar"],"vcardArray":["vcard",[["version",{},"text","4.0"],["fn",{},"text","Example Registrar, Inc."]]]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(record.registrar().as_deref(), Some("Example Registrar, Inc."));
    }

    #[test]
    fn event_lookup_ignores_case() {
        let record: RdapDomain = serde_json::from_str(
            r#"{"events":[{"eventAction":"Expiration","eventDate":"2030-01-01T00:00:00Z"}]}"#,
        )
        .unwrap();
        assert_eq!(record.event_date("expiration"), Some("2030-01-01T00:00:00Z"));
        assert_eq!(record.event_date("registration"), None);
    }
}
