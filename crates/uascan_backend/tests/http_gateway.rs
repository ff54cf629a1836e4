//! HTTP gateway tests against a local mock server
//!
//! Every call must carry the bearer credential and use the server-manager
//! endpoints with form-encoded bodies.

use mockito::Matcher;
use uascan_backend::{Backend, BackendError, HttpBackend, RetryPolicy};
use uascan_protocol::{CheckTimestamp, NodeUpsert, ServerId};

const TOKEN: &str = "test-token";

fn backend(server: &mockito::Server) -> HttpBackend {
    HttpBackend::new(&server.url(), TOKEN)
        .unwrap()
        .with_retry(RetryPolicy::none())
}

fn sample_node() -> NodeUpsert {
    NodeUpsert {
        server_id: ServerId::new(7),
        identifier: "ns=2;s=Pump1".to_string(),
        display_name: "Pump1".to_string(),
        path: "/Plant/Pump1".to_string(),
        readable: true,
        writable: true,
        data_type: "Double".to_string(),
        checked_at: CheckTimestamp::from_epoch_secs(1_700_000_000),
        is_virtual: false,
        parent_identifier: None,
    }
}

#[tokio::test]
async fn test_available_follows_ping_status() {
    let mut server = mockito::Server::new_async().await;
    let ok = server
        .mock("GET", "/api/status/ping")
        .with_status(200)
        .create_async()
        .await;
    assert!(backend(&server).available().await);
    ok.assert_async().await;
    ok.remove_async().await;

    let missing = server
        .mock("GET", "/api/status/ping")
        .with_status(404)
        .create_async()
        .await;
    assert!(!backend(&server).available().await);
    missing.assert_async().await;
}

#[tokio::test]
async fn test_reset_server_patches_flag_and_timestamp() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PATCH", "/api/server_manager/server/update")
        .match_query(Matcher::UrlEncoded("id".into(), "4".into()))
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("checked_at".into(), "1700000000".into()),
            Matcher::UrlEncoded("scan_required".into(), "0".into()),
        ]))
        .with_status(200)
        .create_async()
        .await;

    backend(&server)
        .reset_server(ServerId::new(4), CheckTimestamp::from_epoch_secs(1_700_000_000))
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_delete_outdated_nodes_posts_server_id() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/server_manager/node/delete-unchecked")
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::UrlEncoded("server_id".into(), "7".into()))
        .with_status(200)
        .create_async()
        .await;

    backend(&server)
        .delete_outdated_nodes(ServerId::new(7), CheckTimestamp::from_epoch_secs(10))
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_set_server_error_records_error_text() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PATCH", "/api/server_manager/server/update")
        .match_query(Matcher::UrlEncoded("id".into(), "3".into()))
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("has_connection_error".into(), "1".into()),
            Matcher::UrlEncoded("connection_error".into(), "test_error".into()),
            Matcher::UrlEncoded("checked_at".into(), "55".into()),
        ]))
        .with_status(200)
        .create_async()
        .await;

    backend(&server)
        .set_server_error(ServerId::new(3), "test_error", CheckTimestamp::from_epoch_secs(55))
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_servers_due_for_scan_filters_on_flag() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/server_manager/server/index")
        .match_query(Matcher::UrlEncoded("filter[scan_required]".into(), "1".into()))
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                {"id": 1, "url": "opc.tcp://plc-a:4840", "root_node": "", "scan_required": 1},
                {"id": 2, "url": "opc.tcp://plc-b:4840", "root_node": "ns=2;s=Line",
                 "scan_required": 1}
            ]"#,
        )
        .create_async()
        .await;

    let servers = backend(&server).servers_due_for_scan().await.unwrap();
    mock.assert_async().await;
    assert_eq!(servers.len(), 2);
    assert_eq!(servers[0].id, ServerId::new(1));
    assert!(servers[0].configured_root().is_none());
    assert_eq!(servers[1].configured_root().unwrap().as_str(), "ns=2;s=Line");
}

#[tokio::test]
async fn test_upsert_creates_missing_node() {
    let mut server = mockito::Server::new_async().await;
    let exists = server
        .mock("POST", "/api/server_manager/node/exists")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("server_id".into(), "7".into()),
            Matcher::UrlEncoded("identifier".into(), "ns=2;s=Pump1".into()),
        ]))
        .with_status(200)
        .with_body("null")
        .create_async()
        .await;
    let create = server
        .mock("POST", "/api/server_manager/node/create")
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("identifier".into(), "ns=2;s=Pump1".into()),
            Matcher::UrlEncoded("display_name".into(), "Pump1".into()),
            Matcher::UrlEncoded("path".into(), "/Plant/Pump1".into()),
            Matcher::UrlEncoded("readable".into(), "1".into()),
            Matcher::UrlEncoded("writable".into(), "1".into()),
            Matcher::UrlEncoded("data_type".into(), "Double".into()),
            Matcher::UrlEncoded("virtual".into(), "0".into()),
            Matcher::UrlEncoded("checked_at".into(), "1700000000".into()),
        ]))
        .with_status(201)
        .create_async()
        .await;

    backend(&server).upsert_node(&sample_node()).await.unwrap();
    exists.assert_async().await;
    create.assert_async().await;
}

#[tokio::test]
async fn test_upsert_updates_existing_node() {
    let mut server = mockito::Server::new_async().await;
    let exists = server
        .mock("POST", "/api/server_manager/node/exists")
        .with_status(200)
        .with_body(r#"{"id": 12, "identifier": "ns=2;s=Pump1.speed"}"#)
        .create_async()
        .await;
    let update = server
        .mock("PATCH", "/api/server_manager/node/update")
        .match_query(Matcher::UrlEncoded("id".into(), "12".into()))
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("identifier".into(), "ns=2;s=Pump1.speed".into()),
            Matcher::UrlEncoded("virtual".into(), "1".into()),
            Matcher::UrlEncoded("parent_identifier".into(), "ns=2;s=Pump1".into()),
            Matcher::UrlEncoded("data_type".into(), "Float".into()),
        ]))
        .with_status(200)
        .create_async()
        .await;
    let create = server
        .mock("POST", "/api/server_manager/node/create")
        .expect(0)
        .create_async()
        .await;

    let mut node = sample_node();
    node.identifier = "ns=2;s=Pump1.speed".to_string();
    node.display_name = "speed".to_string();
    node.data_type = "Float".to_string();
    node.is_virtual = true;
    node.parent_identifier = Some("ns=2;s=Pump1".to_string());

    backend(&server).upsert_node(&node).await.unwrap();
    exists.assert_async().await;
    update.assert_async().await;
    create.assert_async().await;
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/server_manager/node/delete-unchecked")
        .with_status(422)
        .with_body("server_id is invalid")
        .expect(1)
        .create_async()
        .await;

    let gateway = HttpBackend::new(&server.url(), TOKEN)
        .unwrap()
        .with_retry(RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 0,
            max_delay_ms: 0,
        });
    let err = gateway
        .delete_outdated_nodes(ServerId::new(1), CheckTimestamp::from_epoch_secs(1))
        .await
        .unwrap_err();
    mock.assert_async().await;
    assert!(matches!(err, BackendError::Status { status: 422, .. }));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PATCH", "/api/server_manager/server/update")
        .match_query(Matcher::Any)
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let gateway = HttpBackend::new(&server.url(), TOKEN)
        .unwrap()
        .with_retry(RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 0,
            max_delay_ms: 0,
        });
    let result = gateway
        .reset_server(ServerId::new(1), CheckTimestamp::from_epoch_secs(1))
        .await;
    mock.assert_async().await;
    assert!(result.is_err());
}
