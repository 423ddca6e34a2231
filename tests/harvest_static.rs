//! A static provider backed by the same records as a live endpoint must
//! produce an identical save tree.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oai_harvest::action::{Action, ActionContext};
use oai_harvest::error::HarvestError;
use oai_harvest::models::MetadataFormat;
use oai_harvest::oai::OaiClient;
use oai_harvest::overview::ScenarioKind;
use oai_harvest::provider::Provider;
use oai_harvest::sequence::ActionSequence;
use oai_harvest::transform::StylesheetEngine;
use oai_harvest::worker::Worker;

const RECORDS: &str = "<record><header><identifier>r1</identifier></header>\
<metadata><dc>alpha</dc></metadata></record>\
<record><header><identifier>r2</identifier></header>\
<metadata><dc>beta</dc></metadata></record>";

struct Identity;

impl StylesheetEngine for Identity {
    fn transform(&self, _s: &Path, document: &str) -> Result<String, HarvestError> {
        Ok(document.to_string())
    }
}

fn sequence_for(dir: &Path) -> ActionSequence {
    ActionSequence::new(
        MetadataFormat::new("oai_dc"),
        vec![
            Action::Split,
            Action::Save {
                dir: dir.to_path_buf(),
            },
        ],
    )
    .unwrap()
}

/// Relative path → file contents for every file under `root`.
fn tree(root: &Path) -> BTreeMap<String, String> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, String>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().to_string();
                out.insert(rel, std::fs::read_to_string(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

#[tokio::test]
async fn static_and_live_harvests_write_identical_trees() {
    // live endpoint with a fixed response set
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("verb", "Identify"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<OAI-PMH><Identify><repositoryName>Fixture</repositoryName></Identify></OAI-PMH>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("verb", "ListMetadataFormats"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<OAI-PMH><ListMetadataFormats>\
             <metadataFormat><metadataPrefix>oai_dc</metadataPrefix></metadataFormat>\
             </ListMetadataFormats></OAI-PMH>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("verb", "ListRecords"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<OAI-PMH><ListRecords>{RECORDS}</ListRecords></OAI-PMH>"
        )))
        .mount(&server)
        .await;

    // static archive holding the same records
    let archive_dir = tempfile::tempdir().unwrap();
    let archive = archive_dir.path().join("repo.xml");
    std::fs::write(
        &archive,
        format!(
            "<Repository xmlns=\"http://www.openarchives.org/OAI/2.0/static-repository\">\
             <ListMetadataFormats>\
             <metadataFormat><metadataPrefix>oai_dc</metadataPrefix></metadataFormat>\
             </ListMetadataFormats>\
             <ListRecords metadataPrefix=\"oai_dc\">{RECORDS}</ListRecords>\
             </Repository>"
        ),
    )
    .unwrap();

    let client = OaiClient::new().unwrap();
    let ctx = ActionContext {
        engine: Arc::new(Identity),
    };
    let epoch = DateTime::<Utc>::UNIX_EPOCH;

    let live_out = tempfile::tempdir().unwrap();
    let live = Worker {
        provider: Provider::new("fixture", &server.uri()).unwrap(),
        sequences: vec![sequence_for(live_out.path())],
        scenario: ScenarioKind::ListRecords,
        from: epoch,
    };
    assert!(live.run(&client, &ctx).await);

    let static_out = tempfile::tempdir().unwrap();
    let mut static_provider = Provider::new("fixture", "https://static.example.org/oai").unwrap();
    static_provider.archive = Some(archive);
    let static_worker = Worker {
        provider: static_provider,
        sequences: vec![sequence_for(static_out.path())],
        scenario: ScenarioKind::ListRecords,
        from: epoch,
    };
    assert!(static_worker.run(&client, &ctx).await);

    let live_tree = tree(live_out.path());
    assert_eq!(live_tree.len(), 2);
    assert!(live_tree.contains_key("fixture/oai_dc/r1.xml"));
    assert_eq!(live_tree, tree(static_out.path()));
}
