//! SOAP catalog client tests against a local axum server playing the GTC
//! catalog.

use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gtc_qa::catalog_soap::SoapCatalog;
use gtc_qa::config::CatalogConfig;
use gtc_qa::http::RetryPolicy;
use gtc_qa_core::catalog::Catalog;

const LISTING: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/">
  <S:Body>
    <ns2:getAllGtcDocumentsResponse xmlns:ns2="http://service.gtc.nn.pl/">
      <return>
        <idBodyDoc>42</idBodyDoc>
        <docName> Policy A </docName>
        <prodCode>HOME</prodCode>
        <docTitle>General terms of home insurance</docTitle>
        <typeName>OWU</typeName>
      </return>
      <return>
        <idBodyDoc>not-a-number</idBodyDoc>
        <docName>Broken</docName>
      </return>
      <return>
        <idBodyDoc>43</idBodyDoc>
        <docName>Policy B</docName>
        <prodCode>CAR</prodCode>
        <docTitle>Motor terms</docTitle>
        <typeName>OWU</typeName>
      </return>
    </ns2:getAllGtcDocumentsResponse>
  </S:Body>
</S:Envelope>"#;

// "Fire is covered." in base64, split across lines.
const BODY_42: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/">
  <S:Body>
    <ns2:getGtcDocumentBodyResponse xmlns:ns2="http://service.gtc.nn.pl/">
      <return>
        <fileName>policy_a.txt</fileName>
        <document>RmlyZSBpcyBj
b3ZlcmVkLg==</document>
      </return>
    </ns2:getGtcDocumentBodyResponse>
  </S:Body>
</S:Envelope>"#;

const FAULT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/">
  <S:Body>
    <S:Fault>
      <faultcode>S:Server</faultcode>
      <faultstring>Document body not found</faultstring>
    </S:Fault>
  </S:Body>
</S:Envelope>"#;

/// Start the fake catalog; returns its endpoint and the request bodies it
/// has received.
async fn spawn_catalog() -> (String, Arc<Mutex<Vec<String>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = received.clone();

    let app = Router::new().route(
        "/gtc",
        post(move |body: String| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(body.clone());
                if body.contains("getAllGtcDocuments") {
                    (StatusCode::OK, LISTING)
                } else if body.contains("<arg0>42</arg0>") {
                    (StatusCode::OK, BODY_42)
                } else if body.contains("<arg0>7</arg0>") {
                    (StatusCode::OK, FAULT)
                } else if body.contains("<arg0>8</arg0>") {
                    (StatusCode::INTERNAL_SERVER_ERROR, FAULT)
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
                }
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/gtc", addr), received)
}

fn client(endpoint: &str) -> SoapCatalog {
    client_with_retries(endpoint, 0)
}

fn client_with_retries(endpoint: &str, max_retries: u32) -> SoapCatalog {
    let config = CatalogConfig {
        endpoint: endpoint.to_string(),
        timeout_secs: 5,
        max_retries: 0,
        ..CatalogConfig::default()
    };
    SoapCatalog::new(&config)
        .unwrap()
        .with_retry_policy(RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(10),
        })
}

#[tokio::test]
async fn test_list_metadata_skips_malformed_records() {
    let (endpoint, received) = spawn_catalog().await;
    let entries = client(&endpoint).list_metadata().await.unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].body_id, 42);
    assert_eq!(entries[0].name.trim(), "Policy A");
    assert_eq!(entries[0].product_code, "HOME");
    assert_eq!(entries[1].body_id, 43);

    let requests = received.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].contains("Envelope"));
    assert!(requests[0].contains("getAllGtcDocuments"));
}

#[tokio::test]
async fn test_fetch_body_decodes_document() {
    let (endpoint, received) = spawn_catalog().await;
    let body = client(&endpoint).fetch_body(42).await.unwrap();

    assert_eq!(body.file_name, "policy_a.txt");
    assert_eq!(body.bytes, b"Fire is covered.");
    assert!(received.lock().unwrap()[0].contains("getGtcDocumentBody"));
}

#[tokio::test]
async fn test_fault_surfaces_faultstring() {
    let (endpoint, _) = spawn_catalog().await;
    let err = client(&endpoint).fetch_body(7).await.unwrap_err();
    assert!(
        format!("{:#}", err).contains("Document body not found"),
        "error: {:#}",
        err
    );
}

#[tokio::test]
async fn test_fault_with_http_500_is_not_retried() {
    let (endpoint, received) = spawn_catalog().await;
    let err = client_with_retries(&endpoint, 3)
        .fetch_body(8)
        .await
        .unwrap_err();

    assert_eq!(received.lock().unwrap().len(), 1);
    assert_eq!(
        err.root_cause().to_string(),
        "SOAP fault: Document body not found"
    );
    assert!(!format!("{:#}", err).contains("<faultstring>"));
}

#[tokio::test]
async fn test_server_error_is_an_error() {
    let (endpoint, received) = spawn_catalog().await;
    assert!(client(&endpoint).fetch_body(99).await.is_err());
    // No retries with max_retries = 0.
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_plain_server_error_is_retried() {
    let (endpoint, received) = spawn_catalog().await;
    let err = client_with_retries(&endpoint, 2)
        .fetch_body(99)
        .await
        .unwrap_err();

    assert_eq!(received.lock().unwrap().len(), 3);
    assert!(format!("{:#}", err).contains("internal error"), "error: {:#}", err);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_an_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{}/gtc", addr)).list_metadata().await;
    assert!(err.is_err());
}
