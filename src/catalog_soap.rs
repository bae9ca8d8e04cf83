//! SOAP client for the GTC document catalog.
//!
//! Two operations are used, both SOAP 1.1 over HTTP POST:
//!
//! | Operation | Request | `<return>` children |
//! |-----------|---------|---------------------|
//! | `getAllGtcDocuments` | none | `idBodyDoc`, `docName`, `prodCode`, `docTitle`, `typeName` (one `<return>` per document) |
//! | `getGtcDocumentBody` | `<arg0>` body id | `fileName`, `document` (base64) |
//!
//! Responses are matched by local element name, so whatever namespace
//! prefixes the server uses are irrelevant. A `<Fault>` becomes an error
//! carrying its `faultstring`.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::time::Duration;

use gtc_qa_core::catalog::{Catalog, CatalogEntry, DocumentBody};

use crate::config::CatalogConfig;
use crate::http::{send_with_retry_classified, RetryPolicy};

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Catalog client speaking SOAP to `catalog.endpoint`.
pub struct SoapCatalog {
    client: reqwest::Client,
    endpoint: String,
    namespace: String,
    retry: RetryPolicy,
}

impl SoapCatalog {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            namespace: config.namespace.clone(),
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn call(&self, operation: &str, args: &str) -> Result<String> {
        let envelope = envelope(&self.namespace, operation, args);
        let response = send_with_retry_classified(
            self.retry,
            "GTC catalog",
            || {
                self.client
                    .post(&self.endpoint)
                    .header("Content-Type", "text/xml; charset=utf-8")
                    .header("SOAPAction", "\"\"")
                    .body(envelope.clone())
            },
            soap_fault,
        )
        .await
        .with_context(|| format!("SOAP call {} failed", operation))?;
        Ok(response.text().await?)
    }
}

/// SOAP 1.1 services report faults with HTTP 500; those are answers, not
/// transient failures.
fn soap_fault(status: reqwest::StatusCode, body: &str) -> Option<anyhow::Error> {
    if !status.is_server_error() || !body.contains("Fault") {
        return None;
    }
    match parse_return_records(body) {
        Err(e) if e.to_string().starts_with("SOAP fault") => Some(e),
        _ => None,
    }
}

fn envelope(namespace: &str, operation: &str, args: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><soapenv:Envelope xmlns:soapenv="{}" xmlns:gtc="{}"><soapenv:Header/><soapenv:Body><gtc:{op}>{}</gtc:{op}></soapenv:Body></soapenv:Envelope>"#,
        SOAP_ENV_NS,
        namespace,
        args,
        op = operation
    )
}

#[async_trait]
impl Catalog for SoapCatalog {
    async fn list_metadata(&self) -> Result<Vec<CatalogEntry>> {
        let xml = self.call("getAllGtcDocuments", "").await?;
        let records = parse_return_records(&xml)?;

        let mut entries = Vec::with_capacity(records.len());
        for record in &records {
            match entry_from_record(record) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(error = %e, "skipping malformed catalog record"),
            }
        }
        tracing::debug!(records = records.len(), entries = entries.len(), "catalog listing parsed");
        Ok(entries)
    }

    async fn fetch_body(&self, body_id: i64) -> Result<DocumentBody> {
        let xml = self
            .call("getGtcDocumentBody", &format!("<arg0>{}</arg0>", body_id))
            .await?;
        let records = parse_return_records(&xml)?;
        let record = records
            .first()
            .ok_or_else(|| anyhow!("catalog returned no body for id {}", body_id))?;
        body_from_record(record)
    }
}

fn entry_from_record(record: &HashMap<String, String>) -> Result<CatalogEntry> {
    let raw_id = record
        .get("idBodyDoc")
        .ok_or_else(|| anyhow!("record has no idBodyDoc"))?;
    let body_id = raw_id
        .trim()
        .parse::<i64>()
        .with_context(|| format!("invalid idBodyDoc '{}'", raw_id))?;
    let field = |name: &str| record.get(name).cloned().unwrap_or_default();

    Ok(CatalogEntry {
        body_id,
        name: field("docName"),
        product_code: field("prodCode"),
        title: field("docTitle"),
        type_name: field("typeName"),
    })
}

fn body_from_record(record: &HashMap<String, String>) -> Result<DocumentBody> {
    let file_name = record
        .get("fileName")
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow!("document body has no fileName"))?;
    let encoded = record
        .get("document")
        .ok_or_else(|| anyhow!("document body has no document payload"))?;
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .context("document payload is not valid base64")?;
    Ok(DocumentBody { file_name, bytes })
}

/// Collect every `<return>` element's direct children as `name → text`.
///
/// Fails with the fault string if the response contains a SOAP fault.
pub fn parse_return_records(xml: &str) -> Result<Vec<HashMap<String, String>>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut depth = 0usize;
    let mut record: Option<(usize, HashMap<String, String>)> = None;
    let mut field: Option<(String, String)> = None;
    let mut fault: Option<String> = None;
    let mut in_faultstring = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let record_depth = record.as_ref().map(|(d, _)| *d);
                if record_depth.is_none() && name == "return" {
                    record = Some((depth, HashMap::new()));
                } else if record_depth.map(|d| d + 1) == Some(depth) {
                    field = Some((name.clone(), String::new()));
                }
                if name == "Fault" {
                    fault.get_or_insert_with(String::new);
                } else if name == "faultstring" {
                    in_faultstring = true;
                }
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match &mut record {
                    None if name == "return" => records.push(HashMap::new()),
                    Some((d, fields)) if depth == *d => {
                        fields.insert(name, String::new());
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| anyhow!("invalid SOAP text: {}", e))?;
                append_text(&mut field, &mut fault, in_faultstring, depth, &record, &text);
            }
            Ok(Event::CData(c)) => {
                let raw = c.into_inner();
                let text = String::from_utf8_lossy(&raw);
                append_text(&mut field, &mut fault, in_faultstring, depth, &record, &text);
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let record_depth = record.as_ref().map(|(d, _)| *d);
                if record_depth == Some(depth) {
                    if let Some((_, fields)) = record.take() {
                        records.push(fields);
                    }
                } else if record_depth.map(|d| d + 1) == Some(depth) {
                    if let (Some((_, fields)), Some((field_name, value))) =
                        (record.as_mut(), field.take())
                    {
                        fields.insert(field_name, value);
                    }
                }
                if name == "faultstring" {
                    in_faultstring = false;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!("malformed SOAP response: {}", e),
            _ => {}
        }
    }

    if let Some(message) = fault {
        let message = if message.is_empty() {
            "unknown fault".to_string()
        } else {
            message
        };
        bail!("SOAP fault: {}", message);
    }
    Ok(records)
}

fn append_text(
    field: &mut Option<(String, String)>,
    fault: &mut Option<String>,
    in_faultstring: bool,
    depth: usize,
    record: &Option<(usize, HashMap<String, String>)>,
    text: &str,
) {
    if in_faultstring {
        fault.get_or_insert_with(String::new).push_str(text);
        return;
    }
    if let (Some((_, value)), Some((d, _))) = (field.as_mut(), record) {
        if depth == d + 1 {
            value.push_str(text);
        }
    }
}
