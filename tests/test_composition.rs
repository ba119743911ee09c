//! End-to-end composition tests
//!
//! These run the full coordinator pipeline against wiremock upstreams and
//! assert on the exact bytes the client receives: fragment bodies spliced
//! at their placeholder positions, sentinel calls around each slot, asset
//! links from upstream Link headers, and async blocks deferred past the
//! end of the template.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http::{HeaderMap, Method, StatusCode};
use pagestitch::{
    ClientRequest, RequestCoordinator, Result, StaticContextSource, StitchConfig, StitchMetrics,
    TemplateSource, TemplateStream,
};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serves one fixed template to every request
struct InlineTemplate(String);

#[async_trait]
impl TemplateSource for InlineTemplate {
    async fn fetch_template(&self, _request: &ClientRequest) -> Result<TemplateStream> {
        let bytes = Bytes::from(self.0.clone());
        Ok(futures::stream::iter([Ok(bytes)]).boxed())
    }
}

fn coordinator(template: &str, config: StitchConfig) -> RequestCoordinator {
    RequestCoordinator::new(
        Arc::new(config),
        Arc::new(InlineTemplate(template.to_string())),
        Arc::new(StaticContextSource::default()),
        Arc::new(StitchMetrics::new()),
    )
    .unwrap()
}

async fn compose(template: &str) -> (StatusCode, HeaderMap, String) {
    compose_with_config(template, StitchConfig::default()).await
}

async fn compose_with_config(template: &str, config: StitchConfig) -> (StatusCode, HeaderMap, String) {
    let coordinator = coordinator(template, config);
    let response = coordinator
        .handle(ClientRequest::new(Method::GET, "/", HeaderMap::new()))
        .await;
    let mut body = Vec::new();
    let mut rx = response.body;
    while let Some(chunk) = rx.recv().await {
        body.extend_from_slice(&chunk);
    }
    (response.status, response.headers, String::from_utf8(body).unwrap())
}

async fn mount_fragment(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_two_inline_fragments() {
    let server = MockServer::start().await;
    mount_fragment(&server, "/1", "hello").await;
    mount_fragment(&server, "/2", "world").await;

    let template = format!(
        r#"<html><fragment id="f-1" src="{uri}/1"><fragment id="f-2" src="{uri}/2"></html>"#,
        uri = server.uri()
    );
    let (status, _, body) = compose(&template).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        "<html>\
         <script data-pipe>p.start(0)</script>hello<script data-pipe>p.end(0)</script>\
         <script data-pipe>p.start(1)</script>world<script data-pipe>p.end(1)</script>\
         </html>"
    );
}

#[tokio::test]
async fn test_standard_response_headers() {
    let (status, headers, body) = compose("<html></html>").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<html></html>");
    assert_eq!(
        headers.get("cache-control").unwrap(),
        "no-cache, no-store, must-revalidate"
    );
    assert_eq!(headers.get("pragma").unwrap(), "no-cache");
    assert_eq!(headers.get("content-type").unwrap(), "text/html");
}

#[tokio::test]
async fn test_inline_fragment_with_link_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Link",
                    r#"<http://link>; rel="stylesheet",<http://link2>; rel="fragment-script""#,
                )
                .set_body_string("hello"),
        )
        .mount(&server)
        .await;

    let template = format!(r#"<fragment src="{}/1">"#, server.uri());
    let (status, _, body) = compose(&template).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        "<link rel=\"stylesheet\" href=\"http://link\">\
         <script data-pipe>p.start(0, \"http://link2\")</script>\
         hello\
         <script data-pipe>p.end(0, \"http://link2\")</script>"
    );
}

#[tokio::test]
async fn test_async_fragment_deferred_past_template() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Link",
                    r#"<http://link>; rel="stylesheet",<http://link2>; rel="fragment-script""#,
                )
                .set_body_string("hello"),
        )
        .mount(&server)
        .await;

    let template = format!(r#"<body><fragment src="{}/1" async></body>"#, server.uri());
    let (status, _, body) = compose(&template).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        "<body><script data-pipe>p.placeholder(0)</script></body>\
         <script>p.loadCSS(\"http://link\")</script>\
         <script data-pipe>p.start(0, \"http://link2\")</script>\
         hello\
         <script data-pipe>p.end(0, \"http://link2\")</script>"
    );
}

#[tokio::test]
async fn test_async_fragments_keep_template_order() {
    let server = MockServer::start().await;
    // The first async fragment responds slower than the second; its block
    // must still be flushed first.
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_millis(100))
                .set_body_string("slow"),
        )
        .mount(&server)
        .await;
    mount_fragment(&server, "/fast", "fast").await;

    let template = format!(
        r#"<fragment src="{uri}/slow" async><fragment src="{uri}/fast" async>"#,
        uri = server.uri()
    );
    let (_, _, body) = compose(&template).await;

    assert_eq!(
        body,
        "<script data-pipe>p.placeholder(0)</script>\
         <script data-pipe>p.placeholder(1)</script>\
         <script data-pipe>p.start(0)</script>slow<script data-pipe>p.end(0)</script>\
         <script data-pipe>p.start(1)</script>fast<script data-pipe>p.end(1)</script>"
    );
}

#[tokio::test]
async fn test_inline_fragments_ordered_despite_arrival() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_millis(100))
                .set_body_string("first"),
        )
        .mount(&server)
        .await;
    mount_fragment(&server, "/fast", "second").await;

    let template = format!(
        r#"<fragment src="{uri}/slow"><fragment src="{uri}/fast">"#,
        uri = server.uri()
    );
    let (_, _, body) = compose(&template).await;

    let first_at = body.find("first").unwrap();
    let second_at = body.find("second").unwrap();
    assert!(first_at < second_at, "template order violated: {}", body);
}

#[tokio::test]
async fn test_empty_body_fragment_keeps_sentinels() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let template = format!(r#"<html><fragment src="{}/empty"></html>"#, server.uri());
    let (status, _, body) = compose(&template).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        "<html><script data-pipe>p.start(0)</script><script data-pipe>p.end(0)</script></html>"
    );
}

#[tokio::test]
async fn test_4xx_fragment_body_passes_through() {
    // Anything below 500 is a usable upstream response; its body streams.
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&server)
        .await;

    let template = format!(r#"<fragment src="{}/gone">"#, server.uri());
    let (status, _, body) = compose(&template).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("not here"), "body: {}", body);
}

#[tokio::test]
async fn test_pipe_definition_and_custom_name() {
    let server = MockServer::start().await;
    mount_fragment(&server, "/1", "hello").await;

    let dir = tempfile::tempdir().unwrap();
    let definition_path = dir.path().join("pipe.html");
    std::fs::write(&definition_path, "<script>var Pipe = {};</script>").unwrap();

    let config = StitchConfig {
        pipe_instance_name: "Pipe".to_string(),
        pipe_definition_file: Some(definition_path.to_str().unwrap().to_string()),
        ..Default::default()
    };
    let template = format!(r#"<html><fragment src="{}/1"></html>"#, server.uri());
    let (_, _, body) = compose_with_config(&template, config).await;

    assert!(body.starts_with("<script>var Pipe = {};</script>"));
    assert!(body.contains("<script data-pipe>Pipe.start(0)</script>hello"));
    assert!(body.contains("<script data-pipe>Pipe.end(0)</script>"));
}

#[tokio::test]
async fn test_fragment_start_precedes_end_for_every_index() {
    let server = MockServer::start().await;
    mount_fragment(&server, "/1", "a").await;
    mount_fragment(&server, "/2", "b").await;
    mount_fragment(&server, "/3", "c").await;

    let template = format!(
        r#"<fragment src="{uri}/1"><fragment src="{uri}/2" async><fragment src="{uri}/3">"#,
        uri = server.uri()
    );
    let (_, _, body) = compose(&template).await;

    for index in 0..3 {
        let start = body.find(&format!("p.start({})", index));
        let end = body.find(&format!("p.end({})", index));
        assert!(start.is_some() && end.is_some(), "index {}: {}", index, body);
        assert!(start < end, "start after end for index {}", index);
    }
    let placeholder = body.find("p.placeholder(1)").unwrap();
    assert!(placeholder < body.find("p.start(1)").unwrap());
}
