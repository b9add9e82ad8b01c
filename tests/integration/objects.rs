//! Object persistence through the reqwest transport.

use super::common::{client, server, Node, Note, Tag, CREATED};
use busbar_parse_api::rest::Link;
use busbar_parse_api::{ErrorKind, ObjectGraph, ObjectMeta, Query, RequestOptions};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, Request, ResponseTemplate};

fn members(request: &Request) -> Vec<Value> {
    let body: Value = serde_json::from_slice(&request.body).expect("json body");
    body["requests"].as_array().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_deep_save_note_with_new_tag() {
    let server = server().await;
    Mock::given(method("POST"))
        .and(path("/parse/batch"))
        .and(body_json(json!({
            "requests": [{"method": "POST", "path": "/parse/classes/Tag", "body": {"name": "urgent"}}],
            "transaction": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"success": {"objectId": "t1", "createdAt": CREATED}}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/parse/classes/Note"))
        .and(header("X-Parse-Application-Id", "app"))
        .and(header("X-Parse-Client-Key", "ck"))
        .and(body_partial_json(json!({
            "title": "a",
            "tag": {"__type": "Pointer", "className": "Tag", "objectId": "t1"}
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"objectId": "n1", "createdAt": CREATED})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let mut graph = ObjectGraph::new();
    let tag = graph
        .insert(Tag {
            name: "urgent".to_string(),
            ..Tag::default()
        })
        .expect("tag encodes");
    let mut note = Note {
        title: "a".to_string(),
        tag: Some(tag.clone()),
        ..Note::default()
    };

    client
        .save_graph(&mut note, &mut graph, &RequestOptions::new())
        .await
        .expect("deep save succeeds");

    assert_eq!(note.meta.object_id.as_deref(), Some("n1"));
    assert_eq!(note.tag, Some(Link::saved("t1")));
    assert_eq!(graph.pointer(&tag).map(|p| p.object_id), Some("t1".to_string()));
}

#[tokio::test]
async fn test_cycle_is_rejected_without_requests() {
    let server = server().await;
    let client = client(&server);

    let mut graph = ObjectGraph::new();
    let a = graph.insert(Node::default()).expect("encodes");
    let b = graph
        .insert(Node {
            next: Some(a.clone()),
            ..Node::default()
        })
        .expect("encodes");
    graph
        .replace(
            &a,
            &Node {
                next: Some(b),
                ..Node::default()
            },
        )
        .expect("encodes");

    let mut root = Node {
        next: Some(a),
        ..Node::default()
    };
    let err = client
        .save_graph(&mut root, &mut graph, &RequestOptions::new())
        .await
        .expect_err("cycle must fail");

    assert!(matches!(err.kind, ErrorKind::CircularDependency(_)));
    assert!(server
        .received_requests()
        .await
        .unwrap_or_default()
        .is_empty());
}

#[tokio::test]
async fn test_delete_all_is_chunked() {
    let server = server().await;
    Mock::given(method("POST"))
        .and(path("/parse/batch"))
        .respond_with(|request: &Request| {
            let items: Vec<Value> = members(request)
                .iter()
                .map(|_| json!({"success": {}}))
                .collect();
            ResponseTemplate::new(200).set_body_json(items)
        })
        .expect(3)
        .mount(&server)
        .await;

    let client = client(&server);
    let notes: Vec<Note> = (0..120)
        .map(|i| Note {
            meta: ObjectMeta::with_id(format!("n{}", i)),
            ..Note::default()
        })
        .collect();

    let results = client
        .delete_all(&notes, false, &RequestOptions::new())
        .await
        .expect("batches succeed");
    assert_eq!(results.len(), 120);
    assert!(results.iter().all(|r| r.is_ok()));

    let mut sizes: Vec<usize> = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| members(r).len())
        .collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![20, 50, 50]);
}

#[tokio::test]
async fn test_oversized_transaction_sends_nothing() {
    let server = server().await;
    let client = client(&server);

    let mut notes: Vec<Note> = (0..51).map(|_| Note::default()).collect();
    let err = client
        .save_all(&mut notes, true, &RequestOptions::new())
        .await
        .expect_err("too large");

    assert!(matches!(err.kind, ErrorKind::BatchTooLarge { size: 51, limit: 50 }));
    assert!(server
        .received_requests()
        .await
        .unwrap_or_default()
        .is_empty());
}

#[tokio::test]
async fn test_fetch_missing_object() {
    let server = server().await;
    Mock::given(method("GET"))
        .and(path("/parse/classes/Note/missing"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"code": 101, "error": "Object not found."})),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let mut note = Note {
        meta: ObjectMeta::with_id("missing"),
        ..Note::default()
    };
    let err = client
        .fetch(&mut note, &RequestOptions::new())
        .await
        .expect_err("not found");
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_query_escapes_plus() {
    let server = server().await;
    Mock::given(method("GET"))
        .and(path("/parse/classes/Note"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"objectId": "n1", "title": "a+b", "createdAt": CREATED, "updatedAt": CREATED}]
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let notes = client
        .find(
            &Query::<Note>::new().where_eq("title", "a+b").limit(10),
            &RequestOptions::new(),
        )
        .await
        .expect("query succeeds");
    assert_eq!(notes[0].title, "a+b");

    let requests = server.received_requests().await.unwrap_or_default();
    let query = requests[0].url.query().unwrap_or_default().to_string();
    assert!(query.contains("a%2Bb"), "query was {}", query);
    assert!(query.ends_with("limit=10"));
}
