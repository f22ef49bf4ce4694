//! WS-Management operation sequencing: Get, Enumerate, Pull.
//!
//! [`WsmanClient`] drives one logical query at a time over a transport:
//! every response is correlated back to its request by MessageID, and a
//! query is always the same shape: Enumerate to open a server-side
//! cursor, repeated Pulls until EndOfSequence, all pulled items copied
//! into one aggregated result document. Plain Get exists only for CIM
//! schema retrieval.

pub mod envelope;

use uuid::Uuid;
use xmltree::{Element, Namespace, XMLNode};

use crate::error::{Result, WrError};
use crate::transport::Transport;
use crate::xml::{self, Document};
use envelope::{
    Body, Envelope, ACTION_ENUMERATE, ACTION_GET, ACTION_PULL, SOAP_ENV_NS, WSA_NS, WSEN_NS,
    WSMAN_NS,
};
use tracing::{debug, trace};

// ============================================================================
// Resource URIs
// ============================================================================

/// Schema resource for CIM class definitions.
pub const CIM_SCHEMA_RESOURCE: &str = "http://schemas.dmtf.org/wbem/cim-xml/2/cim-schema/2/*";

/// Batch bound for Pull requests.
pub const PULL_MAX_ELEMENTS: u32 = 10;

/// WMI resource URI for all classes of a namespace (WQL selects the
/// class, so enumeration always targets the wildcard).
pub fn wmi_resource_uri(namespace: &str) -> String {
    format!("http://schemas.microsoft.com/wbem/wsman/1/wmi/{namespace}/*")
}

/// WMI resource URI for one class; this is also the XML namespace its
/// instance properties live under in responses.
pub fn wmi_class_uri(namespace: &str, classname: &str) -> String {
    format!("http://schemas.microsoft.com/wbem/wsman/1/wmi/{namespace}/{classname}")
}

// ============================================================================
// Client
// ============================================================================

/// WS-Management client over an authenticated transport.
pub struct WsmanClient<T: Transport> {
    transport: T,
    enumeration_context: Option<Uuid>,
}

impl<T: Transport> WsmanClient<T> {
    pub fn new(transport: T) -> Self {
        WsmanClient {
            transport,
            enumeration_context: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    /// The open enumeration token, if a query is mid-pagination.
    pub fn enumeration_context(&self) -> Option<Uuid> {
        self.enumeration_context
    }

    fn new_envelope(&self, resource_uri: &str, action: &str) -> Envelope {
        Envelope::new(self.transport.endpoint(), resource_uri, action)
    }

    /// Serialize, round-trip, parse, and correlate one request.
    async fn send(&mut self, envelope: &Envelope) -> Result<Document> {
        let request = envelope.to_xml();
        let response = self.transport.round_trip(request.as_bytes()).await?;
        let text = std::str::from_utf8(&response)
            .map_err(|_| WrError::Xml("response is not valid UTF-8".to_string()))?;
        let doc = Document::parse(text)?;

        let relates_to = doc.get_uuid(Some(WSA_NS), "RelatesTo")?;
        if relates_to != envelope.message_id() {
            return Err(WrError::Protocol(format!(
                "response correlation mismatch: sent {}, received {}",
                envelope.message_id(),
                relates_to
            )));
        }
        Ok(doc)
    }

    /// Transfer Get against a resource, addressed by selectors.
    pub async fn get(&mut self, resource_uri: &str, selectors: &[(&str, &str)]) -> Result<Document> {
        let mut envelope = self.new_envelope(resource_uri, ACTION_GET);
        for (name, value) in selectors {
            envelope.push_selector(*name, *value);
        }
        self.send(&envelope).await
    }

    /// Open an enumeration, optionally filtered by a WQL query. The
    /// server's EnumerationContext is required and kept for the Pulls.
    pub async fn enumerate(&mut self, resource_uri: &str, wql: Option<&str>) -> Result<()> {
        let mut envelope = self.new_envelope(resource_uri, ACTION_ENUMERATE);
        envelope.set_body(Body::Enumerate {
            wql: wql.map(str::to_string),
        });
        let doc = self.send(&envelope).await?;

        let context = doc
            .get_uuid(Some(WSEN_NS), "EnumerationContext")
            .map_err(|_| {
                WrError::Protocol("enumerate response carries no EnumerationContext".to_string())
            })?;
        debug!(resource_uri, %context, "enumeration opened");
        self.enumeration_context = Some(context);
        Ok(())
    }

    /// One Pull round. Returns the batch items and whether the
    /// enumeration continues; on EndOfSequence the context is cleared.
    async fn pull(&mut self, resource_uri: &str) -> Result<(Vec<Element>, bool)> {
        let context = self.enumeration_context.ok_or_else(|| {
            WrError::Protocol("no enumeration in progress".to_string())
        })?;

        let mut envelope = self.new_envelope(resource_uri, ACTION_PULL);
        envelope.set_body(Body::Pull {
            context,
            max_elements: PULL_MAX_ELEMENTS,
        });
        let doc = self.send(&envelope).await?;

        let items: Vec<Element> = doc
            .find_first(Some(WSEN_NS), "Items")
            .map(|el| xml::child_elements(el).cloned().collect())
            .unwrap_or_default();
        trace!(batch = items.len(), "pulled batch");

        if doc.find_first(Some(WSEN_NS), "EndOfSequence").is_some() {
            self.enumeration_context = None;
            return Ok((items, false));
        }
        match doc.get_uuid(Some(WSEN_NS), "EnumerationContext") {
            Ok(renewed) => {
                self.enumeration_context = Some(renewed);
                Ok((items, true))
            }
            Err(_) => {
                self.enumeration_context = None;
                Err(WrError::Protocol(
                    "pull response renewed no EnumerationContext".to_string(),
                ))
            }
        }
    }

    /// Drain the open enumeration into one aggregated result document.
    /// Items keep server order; any mid-pagination failure discards the
    /// aggregation.
    pub async fn pull_all(&mut self, resource_uri: &str) -> Result<Document> {
        let mut all_items = Vec::new();
        loop {
            let (items, more) = self.pull(resource_uri).await?;
            all_items.extend(items);
            if !more {
                break;
            }
        }
        debug!(items = all_items.len(), "enumeration drained");
        Ok(aggregate_items(all_items))
    }

    /// Fetch the CIM schema document for a (namespace, class) pair.
    pub async fn get_cim_schema(&mut self, namespace: &str, classname: &str) -> Result<Document> {
        self.get(
            CIM_SCHEMA_RESOURCE,
            &[("__cimnamespace", namespace), ("ClassName", classname)],
        )
        .await
    }
}

/// Build the aggregated `PullResponse/Items` document from the pulled
/// item nodes.
fn aggregate_items(items: Vec<Element>) -> Document {
    let mut namespaces = Namespace::empty();
    namespaces.put("env", SOAP_ENV_NS);
    namespaces.put("a", WSA_NS);
    namespaces.put("w", WSMAN_NS);
    namespaces.put("n", WSEN_NS);

    let mut items_el = ns_element("n", WSEN_NS, "Items");
    items_el.children = items.into_iter().map(XMLNode::Element).collect();

    let mut pull_response = ns_element("n", WSEN_NS, "PullResponse");
    pull_response.children.push(XMLNode::Element(items_el));

    let mut body = ns_element("env", SOAP_ENV_NS, "Body");
    body.children.push(XMLNode::Element(pull_response));

    let mut root = ns_element("env", SOAP_ENV_NS, "Envelope");
    root.namespaces = Some(namespaces);
    root.children.push(XMLNode::Element(ns_element("env", SOAP_ENV_NS, "Header")));
    root.children.push(XMLNode::Element(body));

    Document::from_root(root)
}

fn ns_element(prefix: &str, ns: &str, name: &str) -> Element {
    let mut el = Element::new(name);
    el.prefix = Some(prefix.to_string());
    el.namespace = Some(ns.to_string());
    el
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_uris() {
        assert_eq!(
            wmi_resource_uri("root/cimv2"),
            "http://schemas.microsoft.com/wbem/wsman/1/wmi/root/cimv2/*"
        );
        assert_eq!(
            wmi_class_uri("root/cimv2", "Win32_OperatingSystem"),
            "http://schemas.microsoft.com/wbem/wsman/1/wmi/root/cimv2/Win32_OperatingSystem"
        );
    }

    #[test]
    fn aggregate_preserves_item_order() {
        let items: Vec<Element> = ["First", "Second", "Third"]
            .iter()
            .map(|name| Element::new(name))
            .collect();
        let doc = aggregate_items(items);

        let items_el = doc.find_first(Some(WSEN_NS), "Items").unwrap();
        let names: Vec<&str> = xml::child_elements(items_el)
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, ["First", "Second", "Third"]);
    }

    #[test]
    fn empty_aggregate_still_has_items_section() {
        let doc = aggregate_items(Vec::new());
        let items_el = doc.find_first(Some(WSEN_NS), "Items").unwrap();
        assert_eq!(xml::child_elements(items_el).count(), 0);
    }
}
