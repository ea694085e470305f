//! Typed processor parameters.
//!
//! A [`ProcessorType`](crate::ProcessorType) declares its parameters as
//! [`ParamSpec`]s. Every processor instance carries a [`ParamMap`] prepopulated
//! from those specs. Updates are staged by the control side, stored into the map
//! during the request drain (marking the entry changed) and consumed by the
//! processor's `config` hook on the render thread.
//!
//! Replacing a value never frees on the render thread: [`ParamMap::swap`]
//! exchanges the new value in and hands the old one back to the caller, which
//! retires it to the control side.

use core::fmt;

use crate::error::ConfigError;

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// 64-bit float. Integers are widened on assignment.
    Float,
    /// 64-bit signed integer.
    Int,
    /// Boolean flag.
    Bool,
    /// UTF-8 string.
    Text,
    /// Array of floats.
    FloatArray,
    /// One-shot event with no value.
    Bang,
}

impl ParamType {
    /// Lowercase name used in messages and listings.
    pub const fn name(self) -> &'static str {
        match self {
            ParamType::Float => "float",
            ParamType::Int => "int",
            ParamType::Bool => "bool",
            ParamType::Text => "text",
            ParamType::FloatArray => "float_array",
            ParamType::Bang => "bang",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Float value.
    Float(f64),
    /// Integer value.
    Int(i64),
    /// Boolean value.
    Bool(bool),
    /// Text value.
    Text(String),
    /// Float array value.
    FloatArray(Vec<f64>),
    /// Event marker.
    Bang,
}

impl ParamValue {
    /// Type of this value.
    pub fn kind(&self) -> ParamType {
        match self {
            ParamValue::Float(_) => ParamType::Float,
            ParamValue::Int(_) => ParamType::Int,
            ParamValue::Bool(_) => ParamType::Bool,
            ParamValue::Text(_) => ParamType::Text,
            ParamValue::FloatArray(_) => ParamType::FloatArray,
            ParamValue::Bang => ParamType::Bang,
        }
    }

    /// Converts in place to `expected`, widening `Int` to `Float`.
    ///
    /// Returns the value's own type on mismatch.
    pub fn coerce(&mut self, expected: ParamType) -> Result<(), ParamType> {
        match (expected, &*self) {
            (ParamType::Float, ParamValue::Int(i)) => {
                *self = ParamValue::Float(*i as f64);
                Ok(())
            }
            (expected, value) if value.kind() == expected => Ok(()),
            (_, value) => Err(value.kind()),
        }
    }

    /// Numeric value of a `Float` or `Int`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Integer value. Floats are truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Float array value.
    pub fn as_array(&self) -> Option<&[f64]> {
        match self {
            ParamValue::FloatArray(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(f64::from(v))
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(v: Vec<f64>) -> Self {
        ParamValue::FloatArray(v)
    }
}

/// Declaration of one parameter of a processor type.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Parameter name, unique within the type.
    pub name: &'static str,
    /// Declared type.
    pub kind: ParamType,
    /// Initial value. Its type equals `kind`.
    pub default: ParamValue,
}

impl ParamSpec {
    /// Float parameter.
    pub fn float(name: &'static str, default: f64) -> Self {
        Self {
            name,
            kind: ParamType::Float,
            default: ParamValue::Float(default),
        }
    }

    /// Integer parameter.
    pub fn int(name: &'static str, default: i64) -> Self {
        Self {
            name,
            kind: ParamType::Int,
            default: ParamValue::Int(default),
        }
    }

    /// Boolean parameter.
    pub fn bool(name: &'static str, default: bool) -> Self {
        Self {
            name,
            kind: ParamType::Bool,
            default: ParamValue::Bool(default),
        }
    }

    /// Text parameter.
    pub fn text(name: &'static str, default: &str) -> Self {
        Self {
            name,
            kind: ParamType::Text,
            default: ParamValue::Text(default.to_owned()),
        }
    }

    /// Float array parameter, initially empty.
    pub fn float_array(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamType::FloatArray,
            default: ParamValue::FloatArray(Vec::new()),
        }
    }

    /// Event parameter.
    pub fn bang(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamType::Bang,
            default: ParamValue::Bang,
        }
    }
}

#[derive(Debug, Clone)]
struct ParamEntry {
    name: &'static str,
    kind: ParamType,
    value: ParamValue,
    changed: bool,
}

/// Current parameter values of one processor instance.
///
/// Entries are fixed at creation (one per declared [`ParamSpec`], in declaration
/// order) so lookups and updates never allocate.
#[derive(Debug, Clone, Default)]
pub struct ParamMap {
    entries: Vec<ParamEntry>,
}

impl ParamMap {
    /// Builds a map holding each spec's default.
    ///
    /// Every entry except bangs starts out changed so the first `config` sees
    /// the full initial state.
    pub fn from_specs(specs: &[ParamSpec]) -> Self {
        let entries = specs
            .iter()
            .map(|spec| ParamEntry {
                name: spec.name,
                kind: spec.kind,
                value: spec.default.clone(),
                changed: spec.kind != ParamType::Bang,
            })
            .collect();
        Self { entries }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Number of declared parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the type declares no parameters.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if `name` is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Declared type of `name`.
    pub fn kind(&self, name: &str) -> Option<ParamType> {
        self.position(name).map(|i| self.entries[i].kind)
    }

    /// Current value of `name`.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.position(name).map(|i| &self.entries[i].value)
    }

    /// Numeric value of `name`, or 0.0.
    pub fn float(&self, name: &str) -> f64 {
        self.get(name).and_then(ParamValue::as_f64).unwrap_or(0.0)
    }

    /// Integer value of `name`, or 0.
    pub fn int(&self, name: &str) -> i64 {
        self.get(name).and_then(ParamValue::as_i64).unwrap_or(0)
    }

    /// Boolean value of `name`, or false.
    pub fn bool(&self, name: &str) -> bool {
        self.get(name).and_then(ParamValue::as_bool).unwrap_or(false)
    }

    /// Text value of `name`, or the empty string.
    pub fn text(&self, name: &str) -> &str {
        self.get(name).and_then(ParamValue::as_str).unwrap_or("")
    }

    /// Returns true if `name` was updated since the last `config`.
    ///
    /// For bang parameters this is the only observable state.
    pub fn changed(&self, name: &str) -> bool {
        self.position(name).is_some_and(|i| self.entries[i].changed)
    }

    /// Returns true if any parameter was updated since the last `config`.
    pub fn any_changed(&self) -> bool {
        self.entries.iter().any(|e| e.changed)
    }

    /// Clears every changed marker.
    pub fn clear_changed(&mut self) {
        for entry in &mut self.entries {
            entry.changed = false;
        }
    }

    /// Checks that `value` is acceptable for `name`, coercing it in place.
    pub fn check(&self, name: &str, value: &mut ParamValue) -> Result<(), ConfigError> {
        let i = self
            .position(name)
            .ok_or_else(|| ConfigError::UnknownParam(name.to_owned()))?;
        let expected = self.entries[i].kind;
        value
            .coerce(expected)
            .map_err(|found| ConfigError::TypeMismatch {
                name: name.to_owned(),
                expected,
                found,
            })
    }

    /// Stores `value` under `name` and marks it changed.
    ///
    /// On success `value` holds the previous value, so the caller decides where
    /// it is dropped. On failure nothing changes.
    pub fn swap(&mut self, name: &str, value: &mut ParamValue) -> Result<(), ConfigError> {
        self.check(name, value)?;
        let Some(i) = self.position(name) else {
            return Err(ConfigError::UnknownParam(name.to_owned()));
        };
        let entry = &mut self.entries[i];
        core::mem::swap(&mut entry.value, value);
        entry.changed = true;
        Ok(())
    }

    /// Stores `value` under `name`, dropping the previous value.
    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) -> Result<(), ConfigError> {
        let mut value = value.into();
        self.swap(name, &mut value)
    }

    /// Iterates over `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ParamValue)> {
        self.entries.iter().map(|e| (e.name, &e.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::float("freq", 440.0),
            ParamSpec::int("seed", 1),
            ParamSpec::text("mode", "play_once"),
            ParamSpec::bang("bang"),
        ]
    }

    #[test]
    fn defaults_start_changed_except_bangs() {
        let map = ParamMap::from_specs(&specs());
        assert_eq!(map.float("freq"), 440.0);
        assert_eq!(map.text("mode"), "play_once");
        assert!(map.changed("freq"));
        assert!(!map.changed("bang"));
    }

    #[test]
    fn int_widens_to_float() {
        let mut map = ParamMap::from_specs(&specs());
        map.clear_changed();
        map.set("freq", 220).unwrap();
        assert_eq!(map.get("freq"), Some(&ParamValue::Float(220.0)));
        assert!(map.changed("freq"));
    }

    #[test]
    fn float_does_not_narrow_to_int() {
        let mut map = ParamMap::from_specs(&specs());
        let err = map.set("seed", 1.5).unwrap_err();
        assert_eq!(
            err,
            ConfigError::TypeMismatch {
                name: "seed".into(),
                expected: ParamType::Int,
                found: ParamType::Float,
            }
        );
        assert_eq!(map.int("seed"), 1);
    }

    #[test]
    fn unknown_param_rejected() {
        let mut map = ParamMap::from_specs(&specs());
        assert!(matches!(
            map.set("nope", 1.0),
            Err(ConfigError::UnknownParam(name)) if name == "nope"
        ));
    }

    #[test]
    fn swap_returns_previous_value() {
        let mut map = ParamMap::from_specs(&specs());
        let mut value = ParamValue::from("record_loop");
        map.swap("mode", &mut value).unwrap();
        assert_eq!(value, ParamValue::from("play_once"));
        assert_eq!(map.text("mode"), "record_loop");
    }

    #[test]
    fn bang_visible_only_through_changed() {
        let mut map = ParamMap::from_specs(&specs());
        map.set("bang", ParamValue::Bang).unwrap();
        assert!(map.changed("bang"));
        map.clear_changed();
        assert!(!map.changed("bang"));
        assert!(!map.any_changed());
    }
}
