//! Validation report accumulation and JSON serialization.
//!
//! Report metadata is held as [`MetaValue`], a closed set of the value shapes
//! a NIfTI header can produce. [`canonicalize`] is the single conversion from
//! that model to JSON and is applied to every value before it is written.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use ndarray::{ArrayD, ArrayViewD};
use serde_json::{Map, Number, Value};
use std::path::Path;

/// A metadata value destined for the report.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Raw byte string, decoded as UTF-8 at serialization.
    Bytes(Vec<u8>),
    IntArray(ArrayD<i64>),
    FloatArray(ArrayD<f64>),
    Map(IndexMap<String, MetaValue>),
}

macro_rules! meta_from {
    ($variant:ident as $target:ty: $($source:ty),+) => {
        $(impl From<$source> for MetaValue {
            fn from(v: $source) -> Self {
                MetaValue::$variant(v as $target)
            }
        })+
    };
}

meta_from!(Int as i64: i8, i16, i32, i64);
meta_from!(UInt as u64: u8, u16, u32, u64);
meta_from!(Float as f64: f32, f64);

impl From<&[u8]> for MetaValue {
    fn from(v: &[u8]) -> Self {
        MetaValue::Bytes(v.to_vec())
    }
}

impl From<ArrayD<i64>> for MetaValue {
    fn from(v: ArrayD<i64>) -> Self {
        MetaValue::IntArray(v)
    }
}

impl From<ArrayD<f64>> for MetaValue {
    fn from(v: ArrayD<f64>) -> Self {
        MetaValue::FloatArray(v)
    }
}

impl From<IndexMap<String, MetaValue>> for MetaValue {
    fn from(v: IndexMap<String, MetaValue>) -> Self {
        MetaValue::Map(v)
    }
}

/// Convert a metadata value into its JSON-native equivalent.
///
/// Non-finite floats become `null`; arrays become nested lists in row-major
/// order; byte strings are decoded as UTF-8. A byte string that is not UTF-8
/// fails with [`Error::Serialization`].
pub fn canonicalize(value: &MetaValue) -> Result<Value> {
    Ok(match value {
        MetaValue::Int(v) => Value::from(*v),
        MetaValue::UInt(v) => Value::from(*v),
        MetaValue::Float(v) => float(*v),
        MetaValue::Bytes(b) => Value::String(
            std::str::from_utf8(b)
                .map_err(|e| Error::Serialization(format!("byte string {:?} is not UTF-8: {}", b, e)))?
                .to_string(),
        ),
        MetaValue::IntArray(a) => nested(a.view(), &|v: &i64| Ok(Value::from(*v)))?,
        MetaValue::FloatArray(a) => nested(a.view(), &|v: &f64| Ok(float(*v)))?,
        MetaValue::Map(entries) => Value::Object(canonicalize_map(entries)?),
    })
}

fn canonicalize_map(entries: &IndexMap<String, MetaValue>) -> Result<Map<String, Value>> {
    entries
        .iter()
        .map(|(k, v)| Ok((k.clone(), canonicalize(v)?)))
        .collect()
}

// JSON has no NaN or infinity
fn float(v: f64) -> Value {
    Number::from_f64(v).map_or(Value::Null, Value::Number)
}

fn nested<T, F>(array: ArrayViewD<'_, T>, leaf: &F) -> Result<Value>
where
    F: Fn(&T) -> Result<Value>,
{
    if array.ndim() == 0 {
        return array.iter().next().map_or(Ok(Value::Null), leaf);
    }
    array
        .outer_iter()
        .map(|sub| nested(sub, leaf))
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

/// Accumulated outcome of one validation run.
///
/// Errors and warnings are append-only and keep insertion order. The report
/// is written once, by [`ValidationReport::write`], after every step has run.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    errors: Vec<String>,
    warnings: Vec<String>,
    meta: IndexMap<String, MetaValue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error.
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        self.errors.push(message);
    }

    /// Record a warning.
    pub fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    /// Set a top-level metadata entry, replacing any previous value.
    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.meta.insert(key.into(), value.into());
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn meta(&self) -> &IndexMap<String, MetaValue> {
        &self.meta
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// JSON form: `{"errors": [...], "warnings": [...], "meta": {...}}`.
    pub fn to_json(&self) -> Result<Value> {
        let mut root = Map::new();
        root.insert("errors".into(), Value::from(self.errors.clone()));
        root.insert("warnings".into(), Value::from(self.warnings.clone()));
        root.insert("meta".into(), Value::Object(canonicalize_map(&self.meta)?));
        Ok(Value::Object(root))
    }

    /// Serialize the report to `path`.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.to_json()?)?;
        std::fs::write(path.as_ref(), bytes)?;
        Ok(())
    }
}
