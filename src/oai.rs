//! OAI-PMH protocol client.
//!
//! One [`OaiClient`] is shared by every worker; the per-endpoint timeout is
//! applied per request. Verbs return raw response bodies plus whatever the
//! caller needs pre-parsed (resumption token, protocol errors), leaving the
//! record extraction to the harvesting strategies.
//!
//! Error mapping:
//!
//! - connect/read timeout, transport failure, 5xx → [`HarvestError::Network`]
//!   (transient, aborts the page);
//! - other non-2xx, OAI `<error>` codes, missing mandatory elements →
//!   [`HarvestError::Protocol`] (aborts the prefix).
//!
//! The one exception is `noRecordsMatch`, which OAI uses for an empty
//! selective harvest; it surfaces as an empty page, not an error.

use chrono::{DateTime, Utc};
use log::debug;

use crate::error::HarvestError;
use crate::provider::Provider;
use crate::xml;

/// One page of a `ListRecords`/`ListIdentifiers` harvest.
#[derive(Debug, Clone)]
pub struct ListPage {
    /// The response body. `None` for an empty result (`noRecordsMatch`).
    pub body: Option<String>,
    /// Token for the next page, if any.
    pub resumption_token: Option<String>,
}

pub struct OaiClient {
    http: reqwest::Client,
}

impl OaiClient {
    pub fn new() -> Result<Self, HarvestError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| HarvestError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// `Identify`: returns the repository name.
    pub async fn identify(&self, provider: &Provider) -> Result<String, HarvestError> {
        let body = self.request(provider, &[("verb", "Identify")]).await?;
        fail_on_oai_error(&body)?;
        xml::first_text(&body, b"repositoryName")
            .ok_or_else(|| HarvestError::Protocol("Identify without repositoryName".to_string()))
    }

    /// `ListMetadataFormats`: returns the prefixes the endpoint offers.
    pub async fn list_metadata_formats(
        &self,
        provider: &Provider,
    ) -> Result<Vec<String>, HarvestError> {
        let body = self
            .request(provider, &[("verb", "ListMetadataFormats")])
            .await?;
        fail_on_oai_error(&body)?;
        let mut prefixes = Vec::new();
        for format in xml::elements_by_local_name(&body, b"metadataFormat")
            .map_err(|e| HarvestError::Protocol(format!("malformed ListMetadataFormats: {e}")))?
        {
            if let Some(prefix) = xml::first_text(&format, b"metadataPrefix") {
                prefixes.push(prefix);
            }
        }
        Ok(prefixes)
    }

    /// One `ListRecords` page.
    pub async fn list_records(
        &self,
        provider: &Provider,
        prefix: &str,
        from: DateTime<Utc>,
        token: Option<&str>,
    ) -> Result<ListPage, HarvestError> {
        self.list_page(provider, "ListRecords", prefix, from, token)
            .await
    }

    /// One `ListIdentifiers` page.
    pub async fn list_identifiers(
        &self,
        provider: &Provider,
        prefix: &str,
        from: DateTime<Utc>,
        token: Option<&str>,
    ) -> Result<ListPage, HarvestError> {
        self.list_page(provider, "ListIdentifiers", prefix, from, token)
            .await
    }

    /// `GetRecord` for a single identifier.
    pub async fn get_record(
        &self,
        provider: &Provider,
        identifier: &str,
        prefix: &str,
    ) -> Result<String, HarvestError> {
        let body = self
            .request(
                provider,
                &[
                    ("verb", "GetRecord"),
                    ("identifier", identifier),
                    ("metadataPrefix", prefix),
                ],
            )
            .await?;
        fail_on_oai_error(&body)?;
        Ok(body)
    }

    async fn list_page(
        &self,
        provider: &Provider,
        verb: &str,
        prefix: &str,
        from: DateTime<Utc>,
        token: Option<&str>,
    ) -> Result<ListPage, HarvestError> {
        let from_param = from_parameter(from);
        let mut params: Vec<(&str, &str)> = vec![("verb", verb)];
        match token {
            // a resumption request carries the token exclusively
            Some(token) => params.push(("resumptionToken", token)),
            None => {
                params.push(("metadataPrefix", prefix));
                if let Some(from) = from_param.as_deref() {
                    params.push(("from", from));
                }
            }
        }
        let body = self.request(provider, &params).await?;
        if let Some((code, message)) = xml::oai_error(&body) {
            if code == "noRecordsMatch" {
                return Ok(ListPage {
                    body: None,
                    resumption_token: None,
                });
            }
            return Err(HarvestError::Protocol(format!("{code}: {message}")));
        }
        let resumption_token = xml::resumption_token(&body);
        Ok(ListPage {
            body: Some(body),
            resumption_token,
        })
    }

    async fn request(
        &self,
        provider: &Provider,
        params: &[(&str, &str)],
    ) -> Result<String, HarvestError> {
        debug!("GET {} {:?}", provider.base_url, params);
        let response = self
            .http
            .get(&provider.base_url)
            .query(params)
            .timeout(provider.timeout)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        if status.is_server_error() {
            return Err(HarvestError::Network(format!(
                "{}: {status}",
                provider.base_url
            )));
        }
        if !status.is_success() {
            return Err(HarvestError::Protocol(format!(
                "{}: {status}",
                provider.base_url
            )));
        }
        response.text().await.map_err(map_transport_error)
    }
}

fn map_transport_error(err: reqwest::Error) -> HarvestError {
    HarvestError::Network(err.to_string())
}

/// OAI `from` parameter at day granularity; the epoch means "everything" and
/// is expressed by omitting the parameter.
fn from_parameter(from: DateTime<Utc>) -> Option<String> {
    if from == DateTime::<Utc>::UNIX_EPOCH {
        None
    } else {
        Some(from.format("%Y-%m-%d").to_string())
    }
}

fn fail_on_oai_error(body: &str) -> Result<(), HarvestError> {
    match xml::oai_error(body) {
        Some((code, message)) => Err(HarvestError::Protocol(format!("{code}: {message}"))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn epoch_from_is_omitted() {
        assert_eq!(from_parameter(DateTime::<Utc>::UNIX_EPOCH), None);
        let from = Utc.with_ymd_and_hms(2024, 1, 2, 13, 0, 0).unwrap();
        assert_eq!(from_parameter(from).as_deref(), Some("2024-01-02"));
    }
}
