//! AMF value model
//!
//! Objects keep their keys in insertion order so that encoded replies come
//! out on the wire in the order they were built, and decoded command objects
//! can be re-encoded byte-for-byte.

use indexmap::IndexMap;

use crate::error::AmfError;

/// Ordered string-keyed map used for AMF objects and ECMA arrays
pub type AmfObject = IndexMap<String, AmfValue>;

static NULL: AmfValue = AmfValue::Null;

/// AMF0 value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AmfValue {
    /// Null (0x05)
    #[default]
    Null,

    /// Undefined (0x06)
    Undefined,

    /// Boolean (0x01)
    Boolean(bool),

    /// IEEE 754 double (0x00)
    Number(f64),

    /// UTF-8 string (0x02, or 0x0C when longer than 65535 bytes)
    String(String),

    /// Anonymous object (0x03)
    Object(AmfObject),

    /// Associative array (0x08), used by `onMetaData`
    EcmaArray(AmfObject),

    /// Dense array (0x0A)
    Array(Vec<AmfValue>),
}

impl AmfValue {
    /// An empty anonymous object
    pub fn object() -> Self {
        AmfValue::Object(AmfObject::new())
    }

    /// Name of the variant, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            AmfValue::Null => "null",
            AmfValue::Undefined => "undefined",
            AmfValue::Boolean(_) => "boolean",
            AmfValue::Number(_) => "number",
            AmfValue::String(_) => "string",
            AmfValue::Object(_) => "object",
            AmfValue::EcmaArray(_) => "ecma-array",
            AmfValue::Array(_) => "array",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Map view of an object or ECMA array
    pub fn as_object(&self) -> Option<&AmfObject> {
        match self {
            AmfValue::Object(m) | AmfValue::EcmaArray(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut AmfObject> {
        match self {
            AmfValue::Object(m) | AmfValue::EcmaArray(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[AmfValue]> {
        match self {
            AmfValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, AmfValue::Null | AmfValue::Undefined)
    }

    /// Consume the value and return its map, if it has one
    pub fn into_object(self) -> Result<AmfObject, AmfError> {
        match self {
            AmfValue::Object(m) | AmfValue::EcmaArray(m) => Ok(m),
            other => Err(AmfError::NotAnObject(other.type_name())),
        }
    }

    /// Index into an object or ECMA array.
    ///
    /// A missing key yields `Null`; indexing any other kind of value is an
    /// error rather than a silent `None`.
    pub fn field(&self, key: &str) -> Result<&AmfValue, AmfError> {
        let map = self
            .as_object()
            .ok_or(AmfError::NotAnObject(self.type_name()))?;
        Ok(map.get(key).unwrap_or(&NULL))
    }

    /// Insert or replace a property on an object or ECMA array
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AmfValue>) -> Result<(), AmfError> {
        let type_name = self.type_name();
        let map = self.as_object_mut().ok_or(AmfError::NotAnObject(type_name))?;
        map.insert(key.into(), value.into());
        Ok(())
    }

    /// Get a property, `None` when missing or when this is not a map
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.as_object()?.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.as_bool()
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Number(v)
    }
}

impl From<u32> for AmfValue {
    fn from(v: u32) -> Self {
        AmfValue::Number(v as f64)
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_string())
    }
}

impl From<AmfObject> for AmfValue {
    fn from(v: AmfObject) -> Self {
        AmfValue::Object(v)
    }
}

impl<K: Into<String>, V: Into<AmfValue>> FromIterator<(K, V)> for AmfValue {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        AmfValue::Object(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        let s = AmfValue::String("live".into());
        assert_eq!(s.as_str(), Some("live"));
        assert_eq!(s.as_number(), None);

        let n = AmfValue::Number(42.0);
        assert_eq!(n.as_number(), Some(42.0));
        assert_eq!(n.as_bool(), None);

        let o: AmfValue = [("app", "live")].into_iter().collect();
        assert_eq!(o.get_string("app"), Some("live"));
        assert_eq!(o.get_number("app"), None);
    }

    #[test]
    fn test_field_missing_key_is_null() {
        let o = AmfValue::object();
        assert_eq!(o.field("tcUrl").unwrap(), &AmfValue::Null);
    }

    #[test]
    fn test_field_on_non_object_is_error() {
        let err = AmfValue::Number(1.0).field("app").unwrap_err();
        assert!(matches!(err, AmfError::NotAnObject("number")));

        let err = AmfValue::Array(vec![]).field("0").unwrap_err();
        assert!(matches!(err, AmfError::NotAnObject("array")));
    }

    #[test]
    fn test_set_on_object_and_ecma_array() {
        let mut o = AmfValue::object();
        o.set("level", "status").unwrap();
        o.set("capabilities", 31.0).unwrap();
        assert_eq!(o.get_string("level"), Some("status"));

        let mut ecma = AmfValue::EcmaArray(AmfObject::new());
        ecma.set("duration", 0.0).unwrap();
        assert_eq!(ecma.get_number("duration"), Some(0.0));
    }

    #[test]
    fn test_set_on_scalar_is_error() {
        let mut s = AmfValue::String("x".into());
        assert!(matches!(
            s.set("k", 1.0),
            Err(AmfError::NotAnObject("string"))
        ));
        assert_eq!(s, AmfValue::String("x".into()));
    }

    #[test]
    fn test_object_keeps_insertion_order() {
        let o: AmfValue = [
            ("level", AmfValue::from("status")),
            ("code", AmfValue::from("NetStream.Publish.Start")),
            ("clientid", AmfValue::from("0")),
        ]
        .into_iter()
        .collect();

        let keys: Vec<_> = o.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["level", "code", "clientid"]);
    }

    #[test]
    fn test_into_object() {
        let o: AmfValue = [("a", 1.0)].into_iter().collect();
        assert_eq!(o.into_object().unwrap().len(), 1);
        assert!(AmfValue::Null.into_object().is_err());
    }

    #[test]
    fn test_is_null_or_undefined() {
        assert!(AmfValue::Null.is_null_or_undefined());
        assert!(AmfValue::Undefined.is_null_or_undefined());
        assert!(!AmfValue::Boolean(false).is_null_or_undefined());
        assert!(!AmfValue::String(String::new()).is_null_or_undefined());
    }

    #[test]
    fn test_default_value() {
        assert_eq!(AmfValue::default(), AmfValue::Null);
    }
}
