//! Named field sets making up a capability descriptor

use std::fmt;

use super::value::Value;

/// A media type name plus constraint fields, e.g.
/// `video/x-raw,format=I420,width=[320,1920]`
///
/// A field absent from a structure accepts any value.
#[derive(Debug, Clone)]
pub struct Structure {
    name: String,
    fields: Vec<(String, Value)>,
}

impl Structure {
    /// Create a structure with no field constraints
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field setter
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Media type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set or replace a field
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Look up a field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Iterate fields in insertion order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Whether every field is a single scalar
    pub fn is_fixed(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.is_fixed())
    }

    /// Intersect two structures
    ///
    /// Names must match. Fields present in only one side are carried over
    /// unchanged; fields present in both must intersect.
    pub fn intersect(&self, other: &Structure) -> Option<Structure> {
        if self.name != other.name {
            return None;
        }

        let mut out = Structure::new(self.name.clone());
        for (name, value) in &self.fields {
            match other.get(name) {
                Some(theirs) => out.fields.push((name.clone(), value.intersect(theirs)?)),
                None => out.fields.push((name.clone(), value.clone())),
            }
        }
        for (name, value) in &other.fields {
            if self.get(name).is_none() {
                out.fields.push((name.clone(), value.clone()));
            }
        }

        Some(out)
    }

    /// Whether the two structures accept at least one common configuration
    pub fn can_intersect(&self, other: &Structure) -> bool {
        self.name == other.name
            && self
                .fields
                .iter()
                .all(|(name, value)| other.get(name).map_or(true, |v| value.can_intersect(v)))
    }
}

/// Field order does not matter for equality
impl PartialEq for Structure {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|(name, value)| other.get(name) == Some(value))
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (name, value) in &self.fields {
            write!(f, ",{}={}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(width: Value) -> Structure {
        Structure::new("video/x-raw")
            .field("format", "I420")
            .field("width", width)
    }

    #[test]
    fn test_intersect_merges_fields() {
        let a = raw(Value::int_range(320, 1920));
        let b = Structure::new("video/x-raw")
            .field("width", Value::int_range(640, 3840))
            .field("height", 480);

        let out = a.intersect(&b).unwrap();
        assert_eq!(out.get("format"), Some(&Value::str("I420")));
        assert_eq!(out.get("width"), Some(&Value::int_range(640, 1920)));
        assert_eq!(out.get("height"), Some(&Value::Int(480)));
    }

    #[test]
    fn test_intersect_different_names() {
        let a = Structure::new("video/x-raw");
        let b = Structure::new("audio/x-raw");
        assert!(a.intersect(&b).is_none());
        assert!(!a.can_intersect(&b));
    }

    #[test]
    fn test_conflicting_field_fails() {
        let a = raw(Value::Int(320));
        let b = raw(Value::Int(640));
        assert!(a.intersect(&b).is_none());
        assert!(!a.can_intersect(&b));
    }

    #[test]
    fn test_equality_ignores_field_order() {
        let a = Structure::new("x").field("a", 1).field("b", 2);
        let b = Structure::new("x").field("b", 2).field("a", 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fixed() {
        assert!(raw(Value::Int(320)).is_fixed());
        assert!(!raw(Value::int_range(320, 640)).is_fixed());
    }
}
