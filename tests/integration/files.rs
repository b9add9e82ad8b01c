//! File upload and download through the reqwest transport.

use super::common::{client, server};
use busbar_parse_api::{ParseFile, RequestOptions};
use serde_json::json;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_upload_then_download() {
    let server = server().await;
    let url = format!("{}/files/app/abc_hello.txt", server.uri());
    Mock::given(method("POST"))
        .and(path("/parse/files/hello.txt"))
        .and(header("Content-Type", "text/plain"))
        .and(body_string("hello"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "name": "abc_hello.txt",
            "url": url.clone()
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/app/abc_hello.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let mut file = ParseFile::from_bytes("hello.txt", "hello");
    client
        .save_file(&mut file, &RequestOptions::new(), None)
        .await
        .expect("upload succeeds");
    assert_eq!(file.name, "abc_hello.txt");
    assert_eq!(file.url.as_deref(), Some(url.as_str()));

    let mut downloaded = ParseFile::saved(file.name.clone(), url.clone());
    client
        .fetch_file(&mut downloaded, &RequestOptions::new(), None)
        .await
        .expect("download succeeds");
    assert_eq!(downloaded.data.as_deref(), Some(&b"hello"[..]));
}
