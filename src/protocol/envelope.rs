//! SOAP/WS-Management request envelope builder.
//!
//! Every request shares the same header block (addressing, locale,
//! envelope size, timeout, resource and action) and differs only in the
//! selector set and the operation body. Envelopes are built per request,
//! serialized once, and dropped.

use uuid::Uuid;

use crate::xml::xml_escape;

// ============================================================================
// Namespaces, actions, dialects
// ============================================================================

pub const SOAP_ENV_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const WSA_NS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
pub const WSMAN_NS: &str = "http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd";
pub const WSEN_NS: &str = "http://schemas.xmlsoap.org/ws/2004/09/enumeration";

pub const ACTION_GET: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Get";
pub const ACTION_ENUMERATE: &str = "http://schemas.xmlsoap.org/ws/2004/09/enumeration/Enumerate";
pub const ACTION_PULL: &str = "http://schemas.xmlsoap.org/ws/2004/09/enumeration/Pull";

pub const WQL_DIALECT: &str = "http://schemas.microsoft.com/wbem/wsman/1/WQL";

const ANONYMOUS_ADDRESS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous";
const MAX_ENVELOPE_SIZE: u32 = 153_600;
const OPERATION_TIMEOUT: &str = "PT20S";

// ============================================================================
// Envelope
// ============================================================================

/// Operation-specific request body.
#[derive(Debug, Clone, Default)]
pub enum Body {
    /// Empty body (transfer Get).
    #[default]
    Empty,
    /// Enumerate, optionally filtered by a WQL query.
    Enumerate { wql: Option<String> },
    /// Pull the next batch for an open enumeration.
    Pull { context: Uuid, max_elements: u32 },
}

/// One outgoing request document.
#[derive(Debug, Clone)]
pub struct Envelope {
    to: String,
    resource_uri: String,
    action: String,
    message_id: Uuid,
    selectors: Vec<(String, String)>,
    body: Body,
}

impl Envelope {
    /// Basic header for a (resource, action) pair; a fresh MessageID is
    /// generated per envelope.
    pub fn new(
        to: impl Into<String>,
        resource_uri: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Envelope {
            to: to.into(),
            resource_uri: resource_uri.into(),
            action: action.into(),
            message_id: Uuid::new_v4(),
            selectors: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn push_selector(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.selectors.push((name.into(), value.into()));
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// The MessageID the response's RelatesTo must match.
    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn to_xml(&self) -> String {
        let selector_set = if self.selectors.is_empty() {
            String::new()
        } else {
            let selectors: String = self
                .selectors
                .iter()
                .map(|(name, value)| {
                    format!(
                        "<w:Selector Name=\"{}\">{}</w:Selector>",
                        xml_escape(name),
                        xml_escape(value)
                    )
                })
                .collect();
            format!("<w:SelectorSet>{selectors}</w:SelectorSet>")
        };

        let body = match &self.body {
            Body::Empty => String::new(),
            Body::Enumerate { wql } => match wql {
                Some(query) => format!(
                    "<n:Enumerate><w:Filter Dialect=\"{WQL_DIALECT}\">{}</w:Filter></n:Enumerate>",
                    xml_escape(query)
                ),
                None => "<n:Enumerate/>".to_string(),
            },
            Body::Pull {
                context,
                max_elements,
            } => format!(
                "<n:Pull>\
                 <n:EnumerationContext>uuid:{}</n:EnumerationContext>\
                 <n:MaxElements>{max_elements}</n:MaxElements>\
                 </n:Pull>",
                uuid_upper(*context)
            ),
        };

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<env:Envelope xmlns:env="{SOAP_ENV_NS}" xmlns:a="{WSA_NS}" xmlns:w="{WSMAN_NS}" xmlns:n="{WSEN_NS}">
  <env:Header>
    <a:To>{to}</a:To>
    <a:ReplyTo>
      <a:Address env:mustUnderstand="true">{ANONYMOUS_ADDRESS}</a:Address>
    </a:ReplyTo>
    <w:MaxEnvelopeSize env:mustUnderstand="true">{MAX_ENVELOPE_SIZE}</w:MaxEnvelopeSize>
    <a:MessageID>uuid:{message_id}</a:MessageID>
    <w:Locale env:mustUnderstand="false" xml:lang="en-US"/>
    <w:DataLocale env:mustUnderstand="false" xml:lang="en-US"/>
    <w:OperationTimeout>{OPERATION_TIMEOUT}</w:OperationTimeout>
    <w:ResourceURI env:mustUnderstand="true">{resource_uri}</w:ResourceURI>
    <a:Action env:mustUnderstand="true">{action}</a:Action>
    {selector_set}
  </env:Header>
  <env:Body>{body}</env:Body>
</env:Envelope>"#,
            to = xml_escape(&self.to),
            message_id = uuid_upper(self.message_id),
            resource_uri = xml_escape(&self.resource_uri),
            action = xml_escape(&self.action),
        )
    }
}

fn uuid_upper(id: Uuid) -> String {
    id.to_string().to_ascii_uppercase()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{self, Document};

    #[test]
    fn roundtrip_preserves_header_fields() {
        let mut envelope = Envelope::new(
            "http://windows-host:5985/wsman",
            "http://schemas.microsoft.com/wbem/wsman/1/wmi/root/cimv2/*",
            ACTION_ENUMERATE,
        );
        envelope.set_body(Body::Enumerate {
            wql: Some("SELECT * FROM Win32_OperatingSystem".to_string()),
        });

        let doc = Document::parse(&envelope.to_xml()).unwrap();

        let id = doc.get_uuid(Some(WSA_NS), "MessageID").unwrap();
        assert_eq!(id, envelope.message_id());

        let resource = doc.find_first(Some(WSMAN_NS), "ResourceURI").unwrap();
        assert_eq!(
            xml::text_of(resource),
            "http://schemas.microsoft.com/wbem/wsman/1/wmi/root/cimv2/*"
        );

        let action = doc.find_first(Some(WSA_NS), "Action").unwrap();
        assert_eq!(xml::text_of(action), ACTION_ENUMERATE);

        let filter = doc.find_first(Some(WSMAN_NS), "Filter").unwrap();
        assert_eq!(xml::attr(filter, "Dialect"), Some(WQL_DIALECT));
        assert_eq!(xml::text_of(filter), "SELECT * FROM Win32_OperatingSystem");
    }

    #[test]
    fn selector_set_is_escaped() {
        let mut envelope = Envelope::new("http://h:5985/wsman", "uri", ACTION_GET);
        envelope.push_selector("ClassName", "Win32_\"Odd\"&Class");

        let text = envelope.to_xml();
        assert!(text.contains("Win32_&quot;Odd&quot;&amp;Class"));

        let doc = Document::parse(&text).unwrap();
        let selector = doc.find_first(Some(WSMAN_NS), "Selector").unwrap();
        assert_eq!(xml::attr(selector, "Name"), Some("ClassName"));
        assert_eq!(xml::text_of(selector), "Win32_\"Odd\"&Class");
    }

    #[test]
    fn pull_body_carries_context_and_bound() {
        let context = Uuid::parse_str("7b2ed9ec-2cdb-41a6-b4d9-8a8b23245db2").unwrap();
        let mut envelope = Envelope::new("http://h:5985/wsman", "uri", ACTION_PULL);
        envelope.set_body(Body::Pull {
            context,
            max_elements: 10,
        });

        let doc = Document::parse(&envelope.to_xml()).unwrap();
        let ctx = doc.get_uuid(Some(WSEN_NS), "EnumerationContext").unwrap();
        assert_eq!(ctx, context);
        let max = doc.find_first(Some(WSEN_NS), "MaxElements").unwrap();
        assert_eq!(xml::text_of(max), "10");

        // The serialized token is upper-case with the uuid: prefix.
        assert!(envelope
            .to_xml()
            .contains("uuid:7B2ED9EC-2CDB-41A6-B4D9-8A8B23245DB2"));
    }

    #[test]
    fn fresh_message_id_per_envelope() {
        let a = Envelope::new("http://h:5985/wsman", "uri", ACTION_GET);
        let b = Envelope::new("http://h:5985/wsman", "uri", ACTION_GET);
        assert_ne!(a.message_id(), b.message_id());
    }
}
