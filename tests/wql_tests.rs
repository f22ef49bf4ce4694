//! Query-context behavior end to end, over a scripted transport.

mod common;

use common::*;
use pretty_assertions::assert_eq;

use wrmon::error::WrError;
use wrmon::protocol::WsmanClient;
use wrmon::wql::QueryContext;

const EXAMPLE_SCHEMA: &str = r#"<CLASS NAME="Win32_Example">
  <PROPERTY NAME="PercentUsed" TYPE="uint32"/>
  <PROPERTY NAME="Caption" TYPE="string"/>
</CLASS>"#;

const CTX_A: &str = "11111111-1111-1111-1111-111111111111";

fn percent_item(value: &str) -> String {
    example_item(&format!("<p:PercentUsed>{value}</p:PercentUsed>"))
}

#[tokio::test]
async fn get_integer_returns_typed_value() {
    let transport = MockTransport::new([
        schema_response(EXAMPLE_SCHEMA),
        enumerate_response(CTX_A),
        last_pull_response(&percent_item("73")),
    ]);
    let mut client = WsmanClient::new(transport);

    let mut ctx = QueryContext::new(&mut client, "root/cimv2", "SELECT * FROM Win32_Example")
        .await
        .unwrap();
    assert_eq!(ctx.class_name(), "Win32_Example");
    ctx.run(&mut client).await.unwrap();

    assert_eq!(ctx.get_integer("PercentUsed").unwrap(), 73);
}

#[tokio::test]
async fn nil_property_fails_instead_of_zero() {
    let transport = MockTransport::new([
        schema_response(EXAMPLE_SCHEMA),
        enumerate_response(CTX_A),
        last_pull_response(&example_item(r#"<p:PercentUsed xsi:nil="true"/>"#)),
    ]);
    let mut client = WsmanClient::new(transport);

    let mut ctx = QueryContext::new(&mut client, "root/cimv2", "SELECT * FROM Win32_Example")
        .await
        .unwrap();
    ctx.run(&mut client).await.unwrap();

    let err = ctx.get_integer("PercentUsed").unwrap_err();
    match err {
        WrError::Schema(msg) => assert!(msg.contains("nil"), "{msg}"),
        other => panic!("expected schema error, got {other}"),
    }
}

#[tokio::test]
async fn non_integer_property_is_refused() {
    let transport = MockTransport::new([
        schema_response(EXAMPLE_SCHEMA),
        enumerate_response(CTX_A),
        last_pull_response(&example_item("<p:Caption>C:</p:Caption>")),
    ]);
    let mut client = WsmanClient::new(transport);

    let mut ctx = QueryContext::new(&mut client, "root/cimv2", "SELECT * FROM Win32_Example")
        .await
        .unwrap();
    ctx.run(&mut client).await.unwrap();

    // Declared string: integer extraction must fail, string succeeds.
    assert!(matches!(
        ctx.get_integer("Caption"),
        Err(WrError::Schema(_))
    ));
    assert_eq!(ctx.get_string("Caption").unwrap(), "C:");
    // And a property the schema does not declare fails either way.
    assert!(matches!(
        ctx.get_integer("Nope"),
        Err(WrError::Schema(_))
    ));
}

#[tokio::test]
async fn second_run_replaces_response_but_not_schema() {
    let transport = MockTransport::new([
        schema_response(EXAMPLE_SCHEMA),
        enumerate_response(CTX_A),
        last_pull_response(&percent_item("73")),
        enumerate_response(CTX_A),
        last_pull_response(&percent_item("42")),
    ]);
    let log = transport.log_handle();
    let mut client = WsmanClient::new(transport);

    let mut ctx = QueryContext::new(&mut client, "root/cimv2", "SELECT * FROM Win32_Example")
        .await
        .unwrap();

    ctx.run(&mut client).await.unwrap();
    let schema_before = ctx.schema().to_xml().unwrap();
    assert_eq!(ctx.get_integer("PercentUsed").unwrap(), 73);

    ctx.run(&mut client).await.unwrap();
    assert_eq!(ctx.get_integer("PercentUsed").unwrap(), 42);
    assert_eq!(ctx.schema().to_xml().unwrap(), schema_before);

    // One schema Get in total: the context never re-fetches it.
    let requests = log.lock().unwrap();
    let gets = requests.iter().filter(|r| r.contains("transfer/Get")).count();
    assert_eq!(gets, 1);
}

#[tokio::test]
async fn run_failure_leaves_no_response() {
    let transport = MockTransport::new([
        schema_response(EXAMPLE_SCHEMA),
        enumerate_response(CTX_A),
        // Transport dies on the Pull.
    ]);
    let mut client = WsmanClient::new(transport);

    let mut ctx = QueryContext::new(&mut client, "root/cimv2", "SELECT * FROM Win32_Example")
        .await
        .unwrap();
    assert!(ctx.run(&mut client).await.is_err());
    assert!(ctx.response().is_none());
}

#[tokio::test]
async fn query_context_requires_a_schema() {
    // The Get answer carries no CLASS element.
    let transport = MockTransport::new([response_envelope("<Nothing/>")]);
    let mut client = WsmanClient::new(transport);

    let err = QueryContext::new(&mut client, "root/cimv2", "SELECT * FROM Win32_Example")
        .await
        .unwrap_err();
    assert!(matches!(err, WrError::Schema(_)), "{err}");
}
