//! User sessions and persisted identity.

use std::sync::Arc;

use super::common::{client, config, server, Note};
use busbar_parse_api::{
    ErrorKind, FileStore, ParseClient, Query, RequestOptions, User,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_login_query_logout() {
    let server = server().await;
    Mock::given(method("POST"))
        .and(path("/parse/login"))
        .and(body_json(json!({"username": "ada", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "objectId": "u1",
            "username": "ada",
            "sessionToken": "r:abc"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/parse/classes/Note"))
        .and(header("X-Parse-Session-Token", "r:abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/parse/logout"))
        .and(header("X-Parse-Session-Token", "r:abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let user: User = client
        .login("ada", "secret", &RequestOptions::new())
        .await
        .expect("login succeeds");
    assert_eq!(user.username.as_deref(), Some("ada"));

    let notes = client
        .find(&Query::<Note>::new(), &RequestOptions::new())
        .await
        .expect("query succeeds");
    assert!(notes.is_empty());

    client
        .logout(&RequestOptions::new())
        .await
        .expect("logout succeeds");
    let err = client.current_user::<User>().await.expect_err("logged out");
    assert!(matches!(err.kind, ErrorKind::NoCurrentUser));
}

#[tokio::test]
async fn test_current_user_survives_restart() {
    let server = server().await;
    Mock::given(method("POST"))
        .and(path("/parse/users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "objectId": "u1",
            "createdAt": "2024-01-01T00:00:00.000Z",
            "sessionToken": "r:abc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("temp dir");
    let build = || {
        ParseClient::builder(config(&server).build().expect("valid config"))
            .store(Arc::new(FileStore::with_path(dir.path())))
            .build()
            .expect("client")
    };

    let mut user = User::new("ada", "secret");
    build()
        .signup(&mut user, &RequestOptions::new())
        .await
        .expect("signup succeeds");

    let restarted = build();
    let current: User = restarted.current_user().await.expect("restored");
    assert_eq!(current.meta.object_id.as_deref(), Some("u1"));
    assert_eq!(current.username.as_deref(), Some("ada"));
    assert!(current.password.is_none());
    assert_eq!(restarted.session_token().await.as_deref(), Some("r:abc"));
}
