use std::sync::Arc;

use assert_json_diff::assert_json_eq;
use graphsync_core::prelude::*;
use graphsync_core::{
    HttpMethod, RemoteRequest, ResourceDescriptor, Transport, TransportError, WriteSubAction,
};
use graphsync_http::{ClientSettings, HttpTransport};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer) -> HttpTransport {
    HttpTransport::new(&ClientSettings {
        base_url: format!("{}/beta", server.uri()),
        bearer_token: Some("test-token".into()),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_get_sends_auth_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/beta/deviceAppManagement/mobileApps/P/assignments"))
        .and(query_param("$filter", "id eq 'X'"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [{ "id": "X" }] })))
        .expect(1)
        .mount(&server)
        .await;

    let response = transport(&server)
        .send(
            RemoteRequest::get("/deviceAppManagement/mobileApps/P/assignments")
                .with_query(vec![("$filter".into(), "id eq 'X'".into())]),
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_json_eq!(response.body, json!({ "value": [{ "id": "X" }] }));
}

#[tokio::test]
async fn test_patch_sends_body_and_if_match() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/beta/policies/authenticationMethodsPolicy"))
        .and(header("if-match", "W/\"5\""))
        .and(body_json(json!({ "state": "enabled" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let response = transport(&server)
        .send(
            RemoteRequest::new(HttpMethod::Patch, "/policies/authenticationMethodsPolicy")
                .with_body(json!({ "state": "enabled" }))
                .with_if_match(Some("W/\"5\"".into())),
        )
        .await
        .unwrap();

    assert_eq!(response.status, 204);
    assert!(response.body.is_null());
}

#[tokio::test]
async fn test_non_json_error_body_is_carried_as_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/beta/x"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad gateway"))
        .mount(&server)
        .await;

    let response = transport(&server).send(RemoteRequest::get("/x")).await.unwrap();
    assert_eq!(response.status, 502);
    assert_eq!(response.body, json!("Bad gateway"));
}

#[tokio::test]
async fn test_invalid_success_body_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/beta/x"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = transport(&server).send(RemoteRequest::get("/x")).await.unwrap_err();
    assert!(matches!(err, TransportError::InvalidBody(_)));
}

#[tokio::test]
async fn test_slow_server_maps_to_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/beta/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(std::time::Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&ClientSettings {
        base_url: format!("{}/beta", server.uri()),
        timeout_ms: 100,
        ..Default::default()
    })
    .unwrap();

    let err = transport.send(RemoteRequest::get("/slow")).await.unwrap_err();
    assert!(matches!(err, TransportError::Timeout));
}

#[tokio::test]
async fn test_engine_create_and_assign_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/beta/deviceManagement/deviceShellScripts"))
        .and(body_json(json!({ "displayName": "cleanup", "scriptContent": "ZWNobyBoaQ==" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "s1", "displayName": "cleanup" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/beta/deviceManagement/deviceShellScripts/s1/assign"))
        .and(body_json(json!({ "deviceManagementScriptAssignments": [] })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let schema = SchemaNode::object(
        ObjectNode::new()
            .attribute("id", Attribute::computed(SchemaNode::string()))
            .attribute("displayName", Attribute::required(SchemaNode::string()))
            .attribute("scriptContent", Attribute::required(SchemaNode::string()))
            .attribute("assignments", Attribute::optional(SchemaNode::set(SchemaNode::dynamic()))),
    );
    let descriptor = ResourceDescriptor::new("device_shell_script", "/deviceManagement/deviceShellScripts", schema)
        .with_sub_action(
            WriteSubAction::new("assign").mapped_attribute("assignments", "deviceManagementScriptAssignments"),
        )
        .with_write_middleware(Arc::new(graphsync_core::Base64Fields::new(["scriptContent"])));
    let engine = ResourceEngine::new(Arc::new(descriptor), Arc::new(transport(&server))).unwrap();

    let outcome = engine
        .create(
            &json!({ "displayName": "cleanup", "scriptContent": "echo hi" }),
            &OperationContext::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.id.as_deref(), Some("s1"));
    assert_eq!(outcome.progress.committed, vec![0]);
}
