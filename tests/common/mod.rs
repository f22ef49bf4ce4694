//! Shared test plumbing: a scripted transport and response builders.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use wrmon::error::{Result, WrError};
use wrmon::transport::Transport;

/// A transport that replays scripted responses and records every request.
///
/// Templates may carry a `{{RELATES_TO}}` placeholder, substituted with
/// the MessageID of the request being answered so correlation holds.
pub struct MockTransport {
    script: VecDeque<String>,
    log: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    pub fn new(script: impl IntoIterator<Item = String>) -> Self {
        MockTransport {
            script: script.into_iter().collect(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle onto the request log, usable after the transport moves
    /// into a client.
    pub fn log_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn endpoint(&self) -> &str {
        "http://mock-host:5985/wsman"
    }

    async fn round_trip(&mut self, soap: &[u8]) -> Result<Vec<u8>> {
        let request = String::from_utf8(soap.to_vec()).expect("request is UTF-8");
        let message_id = extract_message_id(&request);
        self.log.lock().unwrap().push(request);

        let template = self
            .script
            .pop_front()
            .ok_or_else(|| WrError::Transport("connection reset by peer".to_string()))?;
        Ok(template.replace("{{RELATES_TO}}", &message_id).into_bytes())
    }
}

fn extract_message_id(request: &str) -> String {
    let start = request
        .find("<a:MessageID>uuid:")
        .expect("request has a MessageID")
        + "<a:MessageID>uuid:".len();
    let end = request[start..].find('<').unwrap() + start;
    request[start..end].to_string()
}

const ENVELOPE_NS: &str = r#"xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing" xmlns:n="http://schemas.xmlsoap.org/ws/2004/09/enumeration""#;

/// A response envelope correlated to its request, with the given body.
pub fn response_envelope(body: &str) -> String {
    format!(
        r#"<s:Envelope {ENVELOPE_NS}>
  <s:Header><a:RelatesTo>uuid:{{{{RELATES_TO}}}}</a:RelatesTo></s:Header>
  <s:Body>{body}</s:Body>
</s:Envelope>"#
    )
}

/// A response whose RelatesTo names somebody else's request.
pub fn misrelated_envelope() -> String {
    response_envelope("<n:EnumerateResponse/>").replace(
        "{{RELATES_TO}}",
        "00000000-DEAD-BEEF-0000-000000000000",
    )
}

pub fn enumerate_response(context: &str) -> String {
    response_envelope(&format!(
        "<n:EnumerateResponse><n:EnumerationContext>uuid:{context}</n:EnumerationContext></n:EnumerateResponse>"
    ))
}

/// Pull response that renews the enumeration context.
pub fn pull_response(context: &str, items: &str) -> String {
    response_envelope(&format!(
        "<n:PullResponse><n:EnumerationContext>uuid:{context}</n:EnumerationContext><n:Items>{items}</n:Items></n:PullResponse>"
    ))
}

/// Final pull response: items plus the end-of-sequence marker.
pub fn last_pull_response(items: &str) -> String {
    response_envelope(&format!(
        "<n:PullResponse><n:Items>{items}</n:Items><n:EndOfSequence/></n:PullResponse>"
    ))
}

/// Get response carrying a CIM class definition.
pub fn schema_response(class_xml: &str) -> String {
    response_envelope(class_xml)
}

/// An item element for the Win32_Example test class.
pub fn example_item(properties: &str) -> String {
    format!(
        r#"<p:Win32_Example xmlns:p="http://schemas.microsoft.com/wbem/wsman/1/wmi/root/cimv2/Win32_Example" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">{properties}</p:Win32_Example>"#
    )
}
