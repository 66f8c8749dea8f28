//! Aggregation function registry.
//!
//! Functions receive every value of the source field within one group,
//! missing fields included as `Null`, and return a single value. All
//! built-ins ignore nulls except `count`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::record::{FieldType, FieldValue};

/// Signature of an aggregation function.
pub type AggregateFn = dyn Fn(&[FieldValue]) -> FieldValue + Send + Sync;

/// A named aggregation with its declared output type.
#[derive(Clone)]
pub struct AggregateFunction {
    /// Type of the produced column in the synthesized schema
    pub output_type: FieldType,
    pub func: Arc<AggregateFn>,
}

impl AggregateFunction {
    pub fn new<F>(output_type: FieldType, func: F) -> Self
    where
        F: Fn(&[FieldValue]) -> FieldValue + Send + Sync + 'static,
    {
        Self {
            output_type,
            func: Arc::new(func),
        }
    }

    pub fn apply(&self, values: &[FieldValue]) -> FieldValue {
        (self.func)(values)
    }
}

impl fmt::Debug for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateFunction")
            .field("output_type", &self.output_type)
            .finish_non_exhaustive()
    }
}

/// Name to function map, pre-populated with the built-ins.
#[derive(Debug, Clone)]
pub struct AggregationRegistry {
    functions: BTreeMap<String, AggregateFunction>,
}

impl AggregationRegistry {
    /// Creates a registry holding only the built-in functions.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            functions: BTreeMap::new(),
        };
        registry.register("sum", FieldType::Float, sum);
        registry.register("avg", FieldType::Float, avg);
        registry.register("min", FieldType::Float, min);
        registry.register("max", FieldType::Float, max);
        registry.register("count", FieldType::Integer, count);
        registry.register("count_distinct", FieldType::Integer, count_distinct);
        registry.register("first", FieldType::String, first);
        registry.register("last", FieldType::String, last);
        registry.register("concat", FieldType::String, concat);
        registry.register("list", FieldType::Json, list);
        registry
    }

    /// Registers (or replaces) a function.
    pub fn register<F>(&mut self, name: impl Into<String>, output_type: FieldType, func: F)
    where
        F: Fn(&[FieldValue]) -> FieldValue + Send + Sync + 'static,
    {
        self.functions
            .insert(name.into(), AggregateFunction::new(output_type, func));
    }

    pub fn get(&self, name: &str) -> Option<&AggregateFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }
}

impl Default for AggregationRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn numbers(values: &[FieldValue]) -> impl Iterator<Item = f64> + '_ {
    values.iter().filter_map(FieldValue::as_f64)
}

fn non_null(values: &[FieldValue]) -> impl Iterator<Item = &FieldValue> {
    values.iter().filter(|v| !v.is_null())
}

pub fn sum(values: &[FieldValue]) -> FieldValue {
    FieldValue::Float(numbers(values).sum())
}

pub fn avg(values: &[FieldValue]) -> FieldValue {
    let (total, count) = numbers(values).fold((0.0, 0usize), |(t, c), v| (t + v, c + 1));
    if count == 0 {
        FieldValue::Null
    } else {
        FieldValue::Float(total / count as f64)
    }
}

pub fn min(values: &[FieldValue]) -> FieldValue {
    numbers(values)
        .reduce(f64::min)
        .map_or(FieldValue::Null, FieldValue::Float)
}

pub fn max(values: &[FieldValue]) -> FieldValue {
    numbers(values)
        .reduce(f64::max)
        .map_or(FieldValue::Null, FieldValue::Float)
}

pub fn count(values: &[FieldValue]) -> FieldValue {
    FieldValue::from(values.len())
}

pub fn count_distinct(values: &[FieldValue]) -> FieldValue {
    let mut seen: Vec<String> = non_null(values).map(ToString::to_string).collect();
    seen.sort();
    seen.dedup();
    FieldValue::from(seen.len())
}

pub fn first(values: &[FieldValue]) -> FieldValue {
    non_null(values).next().cloned().unwrap_or_default()
}

pub fn last(values: &[FieldValue]) -> FieldValue {
    non_null(values).last().cloned().unwrap_or_default()
}

pub fn concat(values: &[FieldValue]) -> FieldValue {
    let parts: Vec<String> = non_null(values).map(ToString::to_string).collect();
    FieldValue::String(parts.join(", "))
}

pub fn list(values: &[FieldValue]) -> FieldValue {
    FieldValue::Array(non_null(values).cloned().collect())
}
