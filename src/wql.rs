//! WQL query context: schema-validated typed access to query results.
//!
//! A context binds a namespace and a WQL string, resolves the target
//! class from the query's `FROM` clause, and fetches that class's CIM
//! schema once. Repeated [`QueryContext::run`] calls then only perform
//! the Enumerate/Pull round-trips, and property extraction is validated
//! against the cached schema.

use tracing::debug;

use crate::error::{Result, WrError};
use crate::protocol::{wmi_class_uri, wmi_resource_uri, WsmanClient};
use crate::transport::Transport;
use crate::xml::{self, Document};

/// Upper bound on a class name parsed out of a query.
pub const MAX_CLASS_NAME_LEN: usize = 128;

/// Extract the class name following the (case-insensitive) ` FROM `
/// token: the next whitespace-delimited word, truncated to the class-name
/// bound.
pub fn extract_class_name(wql: &str) -> Result<String> {
    let lower = wql.to_ascii_lowercase();
    let at = lower
        .find(" from ")
        .ok_or_else(|| WrError::Schema("query has no FROM clause".to_string()))?;

    let rest = wql[at + " from ".len()..].trim_start();
    let name: String = rest
        .chars()
        .take_while(|c| !c.is_whitespace())
        .scan(0usize, |len, c| {
            *len += c.len_utf8();
            (*len < MAX_CLASS_NAME_LEN).then_some(c)
        })
        .collect();
    if name.is_empty() {
        return Err(WrError::Schema("query names no class after FROM".to_string()));
    }
    Ok(name)
}

/// One query against one namespace, with its cached schema.
#[derive(Debug)]
pub struct QueryContext {
    namespace: String,
    query: String,
    class_name: String,
    resource_uri: String,
    class_uri: String,
    schema: Document,
    response: Option<Document>,
}

impl QueryContext {
    /// Resolve the class from the query and fetch its schema. The schema
    /// is fetched exactly once per context.
    pub async fn new<T: Transport>(
        client: &mut WsmanClient<T>,
        namespace: &str,
        query: &str,
    ) -> Result<Self> {
        let parsed_name = extract_class_name(query)?;
        let schema = client.get_cim_schema(namespace, &parsed_name).await?;

        // The schema's own NAME attribute is authoritative for the
        // response namespace URI (it fixes up query-side casing).
        let class = schema.find_first(None, "CLASS").ok_or_else(|| {
            WrError::Schema(format!("no schema found for class {parsed_name}"))
        })?;
        let class_name = xml::attr(class, "NAME")
            .ok_or_else(|| WrError::Schema("schema CLASS has no NAME attribute".to_string()))?
            .to_string();

        debug!(namespace, class = %class_name, "query context ready");

        Ok(QueryContext {
            resource_uri: wmi_resource_uri(namespace),
            class_uri: wmi_class_uri(namespace, &class_name),
            namespace: namespace.to_string(),
            query: query.to_string(),
            class_name,
            schema,
            response: None,
        })
    }

    /// Execute the query: Enumerate with the WQL filter, drain via Pull,
    /// and replace the previous response document.
    pub async fn run<T: Transport>(&mut self, client: &mut WsmanClient<T>) -> Result<()> {
        client.enumerate(&self.resource_uri, Some(&self.query)).await?;
        let document = client.pull_all(&self.resource_uri).await?;
        self.response = Some(document);
        Ok(())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Namespace URI the class's instance properties live under.
    pub fn class_uri(&self) -> &str {
        &self.class_uri
    }

    /// The cached schema document.
    pub fn schema(&self) -> &Document {
        &self.schema
    }

    /// The aggregated response of the last run, if any.
    pub fn response(&self) -> Option<&Document> {
        self.response.as_ref()
    }

    fn response_or_err(&self) -> Result<&Document> {
        self.response
            .as_ref()
            .ok_or_else(|| WrError::Protocol("query has not been run".to_string()))
    }

    /// Declared TYPE of a schema property.
    fn schema_property_type(&self, property: &str) -> Result<String> {
        let node = self
            .schema
            .find_all(None, "PROPERTY")
            .into_iter()
            .find(|el| xml::attr(el, "NAME") == Some(property))
            .ok_or_else(|| {
                WrError::Schema(format!(
                    "property \"{property}\" not found in class \"{}\"",
                    self.class_name
                ))
            })?;
        Ok(xml::attr(node, "TYPE")
            .ok_or_else(|| WrError::Schema("schema property has no TYPE".to_string()))?
            .to_string())
    }

    /// Locate the property element of the first returned instance.
    fn response_property(&self, property: &str) -> Result<&xmltree::Element> {
        let response = self.response_or_err()?;
        let instance = response
            .find_first(Some(&self.class_uri), &self.class_name)
            .ok_or_else(|| WrError::Schema("no elements found".to_string()))?;
        xml::find_first(instance, Some(&self.class_uri), property)
            .ok_or_else(|| WrError::Schema(format!("property \"{property}\" not in response")))
    }

    /// Integer extraction: the schema must declare an unsigned or signed
    /// integer kind, and a nil-flagged value is a failure, never zero.
    pub fn get_integer(&self, property: &str) -> Result<i64> {
        let type_name = self.schema_property_type(property)?;
        if !type_name.starts_with("uint") && !type_name.starts_with("sint") {
            return Err(WrError::Schema(format!(
                "property \"{property}\" ({type_name}) cannot be converted to integer"
            )));
        }

        let node = self.response_property(property)?;
        if xml::is_nil(node) {
            return Err(WrError::Schema(format!("property \"{property}\" is nil")));
        }
        let text = xml::text_of(node);
        text.trim()
            .parse()
            .map_err(|_| WrError::Schema(format!("\"{text}\" is not an integer")))
    }

    /// String extraction from the first returned instance.
    pub fn get_string(&self, property: &str) -> Result<String> {
        self.schema_property_type(property)?;
        let node = self.response_property(property)?;
        if xml::is_nil(node) {
            return Err(WrError::Schema(format!("property \"{property}\" is nil")));
        }
        Ok(xml::text_of(node))
    }
}

// ============================================================================
// Tests
// ============================================================================
