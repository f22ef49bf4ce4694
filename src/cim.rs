//! CIM schema-driven typed values.
//!
//! A class schema is parsed once from the `CLASS`/`PROPERTY` definition
//! the server returns for a class, then stamped into per-item instances:
//! each pulled item's child elements are decoded according to the
//! declared property type. Untyped XML in, natively-typed values out.

use std::fmt;

use tracing::warn;

use crate::error::{Result, WrError};
use crate::protocol::envelope::WSEN_NS;
use crate::xml::{self, Document};

// ============================================================================
// Types and scalars
// ============================================================================

/// The fixed CIM property type set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CimType {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Sint8,
    Sint16,
    Sint32,
    Sint64,
    Real32,
    Real64,
    String,
    DateTime,
    Boolean,
    OctetString,
}

impl CimType {
    /// Map a schema `TYPE` attribute to a type; unknown names fail.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "uint8" => CimType::Uint8,
            "uint16" => CimType::Uint16,
            "uint32" => CimType::Uint32,
            "uint64" => CimType::Uint64,
            "sint8" => CimType::Sint8,
            "sint16" => CimType::Sint16,
            "sint32" => CimType::Sint32,
            "sint64" => CimType::Sint64,
            "real32" => CimType::Real32,
            "real64" => CimType::Real64,
            "string" => CimType::String,
            "datetime" => CimType::DateTime,
            "boolean" => CimType::Boolean,
            "octetstring" => CimType::OctetString,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            CimType::Uint8 => "uint8",
            CimType::Uint16 => "uint16",
            CimType::Uint32 => "uint32",
            CimType::Uint64 => "uint64",
            CimType::Sint8 => "sint8",
            CimType::Sint16 => "sint16",
            CimType::Sint32 => "sint32",
            CimType::Sint64 => "sint64",
            CimType::Real32 => "real32",
            CimType::Real64 => "real64",
            CimType::String => "string",
            CimType::DateTime => "datetime",
            CimType::Boolean => "boolean",
            CimType::OctetString => "octetstring",
        }
    }

    /// True for the unsigned/signed integer kinds.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            CimType::Uint8
                | CimType::Uint16
                | CimType::Uint32
                | CimType::Uint64
                | CimType::Sint8
                | CimType::Sint16
                | CimType::Sint32
                | CimType::Sint64
        )
    }
}

/// One decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum CimScalar {
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Sint8(i8),
    Sint16(i16),
    Sint32(i32),
    Sint64(i64),
    Real32(f32),
    Real64(f64),
    String(String),
    DateTime(String),
    Boolean(bool),
}

impl CimScalar {
    /// The value widened to `i64`, for the integer kinds.
    pub fn as_integer(&self) -> Option<i64> {
        Some(match self {
            CimScalar::Uint8(v) => i64::from(*v),
            CimScalar::Uint16(v) => i64::from(*v),
            CimScalar::Uint32(v) => i64::from(*v),
            CimScalar::Uint64(v) => *v as i64,
            CimScalar::Sint8(v) => i64::from(*v),
            CimScalar::Sint16(v) => i64::from(*v),
            CimScalar::Sint32(v) => i64::from(*v),
            CimScalar::Sint64(v) => *v,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CimScalar::String(s) | CimScalar::DateTime(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CimScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CimScalar::Uint8(v) => write!(f, "{v}"),
            CimScalar::Uint16(v) => write!(f, "{v}"),
            CimScalar::Uint32(v) => write!(f, "{v}"),
            CimScalar::Uint64(v) => write!(f, "{v}"),
            CimScalar::Sint8(v) => write!(f, "{v}"),
            CimScalar::Sint16(v) => write!(f, "{v}"),
            CimScalar::Sint32(v) => write!(f, "{v}"),
            CimScalar::Sint64(v) => write!(f, "{v}"),
            CimScalar::Real32(v) => write!(f, "{v}"),
            CimScalar::Real64(v) => write!(f, "{v}"),
            CimScalar::String(v) | CimScalar::DateTime(v) => write!(f, "\"{v}\""),
            CimScalar::Boolean(v) => write!(f, "{}", if *v { "<true>" } else { "<false>" }),
        }
    }
}

/// Decode raw element text according to the declared type. OctetString
/// is unsupported and yields no value.
fn parse_scalar(cim_type: CimType, raw: &str) -> Result<Option<CimScalar>> {
    fn num<T: std::str::FromStr>(raw: &str, ty: &str) -> Result<T> {
        raw.trim()
            .parse()
            .map_err(|_| WrError::Schema(format!("\"{raw}\" is not a valid {ty}")))
    }

    Ok(Some(match cim_type {
        CimType::Uint8 => CimScalar::Uint8(num(raw, "uint8")?),
        CimType::Uint16 => CimScalar::Uint16(num(raw, "uint16")?),
        CimType::Uint32 => CimScalar::Uint32(num(raw, "uint32")?),
        CimType::Uint64 => CimScalar::Uint64(num(raw, "uint64")?),
        CimType::Sint8 => CimScalar::Sint8(num(raw, "sint8")?),
        CimType::Sint16 => CimScalar::Sint16(num(raw, "sint16")?),
        CimType::Sint32 => CimScalar::Sint32(num(raw, "sint32")?),
        CimType::Sint64 => CimScalar::Sint64(num(raw, "sint64")?),
        CimType::Real32 => CimScalar::Real32(num(raw, "real32")?),
        CimType::Real64 => CimScalar::Real64(num(raw, "real64")?),
        CimType::String => CimScalar::String(raw.to_string()),
        CimType::DateTime => CimScalar::DateTime(raw.to_string()),
        CimType::Boolean => CimScalar::Boolean(raw == "true"),
        CimType::OctetString => return Ok(None),
    }))
}

// ============================================================================
// Schema
// ============================================================================

/// One property descriptor from the class definition.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    pub name: String,
    pub cim_type: CimType,
    pub is_array: bool,
}

/// Ordered property list for one class, parsed from its schema document.
#[derive(Debug, Clone)]
pub struct ClassSchema {
    name: String,
    properties: Vec<PropertyDef>,
}

impl ClassSchema {
    /// Read the `CLASS` element's `NAME` and its `PROPERTY` /
    /// `PROPERTY.ARRAY` children.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let class = doc
            .find_first(None, "CLASS")
            .ok_or_else(|| WrError::Schema("schema document has no CLASS element".to_string()))?;
        let name = xml::attr(class, "NAME")
            .ok_or_else(|| WrError::Schema("CLASS element has no NAME attribute".to_string()))?
            .to_string();

        let mut properties = Vec::new();
        for child in xml::child_elements(class) {
            let is_array = match child.name.as_str() {
                "PROPERTY" => false,
                "PROPERTY.ARRAY" => true,
                _ => continue,
            };
            let prop_name = xml::attr(child, "NAME").ok_or_else(|| {
                WrError::Schema("property has no NAME attribute".to_string())
            })?;
            let type_name = xml::attr(child, "TYPE").ok_or_else(|| {
                WrError::Schema(format!("property {prop_name} has no TYPE attribute"))
            })?;
            let cim_type = CimType::from_name(type_name).ok_or_else(|| {
                WrError::Schema(format!("unknown CIM type \"{type_name}\" on {prop_name}"))
            })?;
            properties.push(PropertyDef {
                name: prop_name.to_string(),
                cim_type,
                is_array,
            });
        }

        Ok(ClassSchema { name, properties })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Stamp out an empty instance shaped like this schema.
    pub fn instantiate(&self) -> ClassInstance {
        ClassInstance {
            class_name: self.name.clone(),
            properties: self
                .properties
                .iter()
                .map(|def| CimProperty {
                    def: def.clone(),
                    data: if def.is_array {
                        CimData::Array(Vec::new())
                    } else {
                        CimData::Scalar(None)
                    },
                })
                .collect(),
        }
    }
}

// ============================================================================
// Instances
// ============================================================================

#[derive(Debug, Clone)]
enum CimData {
    Scalar(Option<CimScalar>),
    Array(Vec<CimScalar>),
}

/// A named property slot with its decoded value(s).
#[derive(Debug, Clone)]
pub struct CimProperty {
    def: PropertyDef,
    data: CimData,
}

impl CimProperty {
    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn cim_type(&self) -> CimType {
        self.def.cim_type
    }

    /// The scalar value, if one was set (first element for arrays).
    pub fn scalar(&self) -> Option<&CimScalar> {
        match &self.data {
            CimData::Scalar(v) => v.as_ref(),
            CimData::Array(v) => v.first(),
        }
    }

    /// All values: one or zero for scalars, append-ordered for arrays.
    pub fn values(&self) -> &[CimScalar] {
        match &self.data {
            CimData::Scalar(Some(v)) => std::slice::from_ref(v),
            CimData::Scalar(None) => &[],
            CimData::Array(v) => v,
        }
    }

    /// Decode and store raw text. Arrays append; setting a scalar twice
    /// is an error.
    fn set(&mut self, raw: &str) -> Result<()> {
        let Some(value) = parse_scalar(self.def.cim_type, raw)? else {
            return Ok(());
        };
        match &mut self.data {
            CimData::Array(values) => values.push(value),
            CimData::Scalar(slot) => {
                if slot.is_some() {
                    return Err(WrError::Schema(format!(
                        "value already set for property {}",
                        self.def.name
                    )));
                }
                *slot = Some(value);
            }
        }
        Ok(())
    }
}

/// One materialized item: the schema's shape with concrete values.
#[derive(Debug, Clone)]
pub struct ClassInstance {
    class_name: String,
    properties: Vec<CimProperty>,
}

impl ClassInstance {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn properties(&self) -> &[CimProperty] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&CimProperty> {
        self.properties.iter().find(|p| p.def.name == name)
    }

    /// The decoded scalar for a property, if present.
    pub fn get(&self, name: &str) -> Option<&CimScalar> {
        self.property(name).and_then(CimProperty::scalar)
    }

    /// Decode raw text into the named property slot.
    pub fn set_property(&mut self, name: &str, raw: &str) -> Result<()> {
        let property = self
            .properties
            .iter_mut()
            .find(|p| p.def.name == name)
            .ok_or_else(|| {
                WrError::Schema(format!("property {name} not found in class {}", self.class_name))
            })?;
        property.set(raw)
    }
}

impl fmt::Display for ClassInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ClassName      : {}", self.class_name)?;
        for property in &self.properties {
            let values = property.values();
            if values.is_empty() {
                continue;
            }
            write!(f, "| {}[{}]: ", property.def.name, property.def.cim_type.name())?;
            if property.def.is_array {
                write!(f, "[ ")?;
                for value in values {
                    write!(f, "{value}, ")?;
                }
                writeln!(f, " ]")?;
            } else {
                writeln!(f, "{}", values[0])?;
            }
        }
        Ok(())
    }
}

/// The materialized instances of one query run, in server return order.
#[derive(Debug, Clone, Default)]
pub struct ClassInstanceSet {
    instances: Vec<ClassInstance>,
}

impl ClassInstanceSet {
    /// One instance per child of the aggregated `Items` section.
    /// Nil-flagged properties are skipped; properties the schema does not
    /// know are logged and skipped rather than failing the item.
    pub fn from_document(doc: &Document, schema: &ClassSchema) -> Result<Self> {
        let items = doc.find_first(Some(WSEN_NS), "Items").ok_or_else(|| {
            WrError::Schema("result document has no Items section".to_string())
        })?;

        let mut instances = Vec::new();
        for item in xml::child_elements(items) {
            let mut instance = schema.instantiate();
            for property in xml::child_elements(item) {
                if xml::is_nil(property) {
                    continue;
                }
                let raw = xml::text_of(property);
                if let Err(e) = instance.set_property(&property.name, &raw) {
                    warn!(property = %property.name, error = %e, "cannot set property");
                }
            }
            instances.push(instance);
        }
        Ok(ClassInstanceSet { instances })
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClassInstance> {
        self.instances.iter()
    }
}

impl<'a> IntoIterator for &'a ClassInstanceSet {
    type Item = &'a ClassInstance;
    type IntoIter = std::slice::Iter<'a, ClassInstance>;

    fn into_iter(self) -> Self::IntoIter {
        self.instances.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================
