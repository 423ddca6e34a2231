use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oai_harvest::error::HarvestError;
use oai_harvest::oai::OaiClient;
use oai_harvest::provider::Provider;

async fn provider_for(server: &MockServer) -> Provider {
    Provider::new("test", &server.uri()).unwrap()
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

#[tokio::test]
async fn identify_returns_the_repository_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("verb", "Identify"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<OAI-PMH><Identify><repositoryName>Fixture</repositoryName></Identify></OAI-PMH>",
        ))
        .mount(&server)
        .await;

    let client = OaiClient::new().unwrap();
    let name = client.identify(&provider_for(&server).await).await.unwrap();
    assert_eq!(name, "Fixture");
}

#[tokio::test]
async fn list_metadata_formats_collects_prefixes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("verb", "ListMetadataFormats"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<OAI-PMH><ListMetadataFormats>\
             <metadataFormat><metadataPrefix>oai_dc</metadataPrefix></metadataFormat>\
             <metadataFormat><metadataPrefix>cmdi</metadataPrefix></metadataFormat>\
             </ListMetadataFormats></OAI-PMH>",
        ))
        .mount(&server)
        .await;

    let client = OaiClient::new().unwrap();
    let prefixes = client
        .list_metadata_formats(&provider_for(&server).await)
        .await
        .unwrap();
    assert_eq!(prefixes, vec!["oai_dc", "cmdi"]);
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = OaiClient::new().unwrap();
    let err = client
        .list_records(&provider_for(&server).await, "oai_dc", epoch(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Network(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn client_errors_are_protocol_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = OaiClient::new().unwrap();
    let err = client
        .list_records(&provider_for(&server).await, "oai_dc", epoch(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Protocol(_)));
}

#[tokio::test]
async fn timeouts_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(500))
                .set_body_string("<OAI-PMH><ListRecords/></OAI-PMH>"),
        )
        .mount(&server)
        .await;

    let client = OaiClient::new().unwrap();
    let mut provider = provider_for(&server).await;
    provider.timeout = Duration::from_millis(50);
    let err = client
        .list_records(&provider, "oai_dc", epoch(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Network(_)));
}

#[tokio::test]
async fn oai_error_codes_abort_the_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<OAI-PMH><error code="cannotDisseminateFormat">nope</error></OAI-PMH>"#,
        ))
        .mount(&server)
        .await;

    let client = OaiClient::new().unwrap();
    let err = client
        .list_records(&provider_for(&server).await, "marc21", epoch(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Protocol(_)));
}

#[tokio::test]
async fn no_records_match_is_an_empty_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<OAI-PMH><error code="noRecordsMatch">nothing new</error></OAI-PMH>"#,
        ))
        .mount(&server)
        .await;

    let client = OaiClient::new().unwrap();
    let page = client
        .list_records(&provider_for(&server).await, "oai_dc", epoch(), None)
        .await
        .unwrap();
    assert!(page.body.is_none());
    assert!(page.resumption_token.is_none());
}

#[tokio::test]
async fn selective_requests_carry_the_from_date() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("verb", "ListRecords"))
        .and(query_param("metadataPrefix", "oai_dc"))
        .and(query_param("from", "2024-01-01"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<OAI-PMH><ListRecords/></OAI-PMH>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = OaiClient::new().unwrap();
    let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    client
        .list_records(&provider_for(&server).await, "oai_dc", from, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn resumption_requests_carry_the_token_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("verb", "ListRecords"))
        .and(query_param("resumptionToken", "t-42"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<OAI-PMH><ListRecords><resumptionToken/></ListRecords></OAI-PMH>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let client = OaiClient::new().unwrap();
    let page = client
        .list_records(&provider_for(&server).await, "oai_dc", epoch(), Some("t-42"))
        .await
        .unwrap();
    assert!(page.resumption_token.is_none());
}
