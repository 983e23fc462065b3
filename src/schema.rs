//! Column names and scalar types, fixed once ingestion starts.

use crate::row::Scalar;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    String,
    Integer,
    Float,
    Boolean,
}

impl ScalarType {
    pub fn of(value: &Scalar) -> Option<ScalarType> {
        match value {
            Scalar::Null => None,
            Scalar::Int(_) => Some(ScalarType::Integer),
            Scalar::Float(_) => Some(ScalarType::Float),
            Scalar::Bool(_) => Some(ScalarType::Boolean),
            Scalar::Str(_) => Some(ScalarType::String),
        }
    }

    /// Smallest type that holds values of both.
    pub fn widen(self, other: ScalarType) -> ScalarType {
        use ScalarType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            _ => String,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::String => "string",
            ScalarType::Integer => "integer",
            ScalarType::Float => "float",
            ScalarType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

impl FromStr for ScalarType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" | "str" | "utf8" => Ok(ScalarType::String),
            "integer" | "int" | "int64" => Ok(ScalarType::Integer),
            "float" | "float64" | "double" => Ok(ScalarType::Float),
            "boolean" | "bool" => Ok(ScalarType::Boolean),
            other => Err(format!("unsupported scalar type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    /// `None` means each field is coerced on its own.
    pub dtype: Option<ScalarType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Build from raw header names. Blank names become `column_<n>` and
    /// repeats get a `.k` suffix.
    pub fn from_header<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut columns = Vec::new();
        for (idx, name) in names.into_iter().enumerate() {
            let mut name: String = name.into();
            if name.trim().is_empty() {
                name = generated_name(idx);
            }
            if seen.contains(&name) {
                let mut k = 1;
                while seen.contains(&format!("{}.{}", name, k)) {
                    k += 1;
                }
                name = format!("{}.{}", name, k);
            }
            seen.insert(name.clone());
            columns.push(Column { name, dtype: None });
        }
        Self { columns }
    }

    /// `column_1..column_n` for header-less sources.
    pub fn generated(width: usize) -> Self {
        Self {
            columns: (0..width)
                .map(|idx| Column {
                    name: generated_name(idx),
                    dtype: None,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Keep the named columns in the given order. Unknown names are
    /// returned separately; the result pairs each kept column with its
    /// source index. A name repeated in `names` is kept once, at its first
    /// position.
    pub(crate) fn project(&self, names: &[String]) -> (Schema, Vec<usize>, Vec<String>) {
        let mut indices = Vec::new();
        let mut missing = Vec::new();
        for name in names {
            match self.index_of(name) {
                Some(idx) if indices.contains(&idx) => {}
                Some(idx) => indices.push(idx),
                None => missing.push(name.clone()),
            }
        }
        let columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        (Schema { columns }, indices, missing)
    }

    pub(crate) fn apply_dtypes(&mut self, dtypes: &HashMap<String, ScalarType>) {
        for col in &mut self.columns {
            if let Some(t) = dtypes.get(&col.name) {
                col.dtype = Some(*t);
            }
        }
    }
}

fn generated_name(idx: usize) -> String {
    format!("column_{}", idx + 1)
}

/// Accumulates per-column types over sample rows.
#[derive(Debug, Clone)]
pub struct TypeInference {
    types: Vec<Option<ScalarType>>,
}

impl TypeInference {
    pub fn new(width: usize) -> Self {
        Self {
            types: vec![None; width],
        }
    }

    pub fn observe(&mut self, values: &[Scalar]) {
        for (slot, value) in self.types.iter_mut().zip(values) {
            if let Some(t) = ScalarType::of(value) {
                *slot = Some(match *slot {
                    Some(prev) => prev.widen(t),
                    None => t,
                });
            }
        }
    }

    /// Fill in inferred types for columns without a declared one. Columns
    /// that only held nulls become strings.
    pub fn finish(self, schema: &mut Schema) {
        for (col, inferred) in schema.columns.iter_mut().zip(self.types) {
            if col.dtype.is_none() {
                col.dtype = Some(inferred.unwrap_or(ScalarType::String));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_hygiene() {
        let schema = Schema::from_header(["a", "", "a", "a", " "]);
        let names: Vec<&str> = schema.names().collect();
        assert_eq!(names, vec!["a", "column_2", "a.1", "a.2", "column_5"]);
    }

    #[test]
    fn test_widen() {
        assert_eq!(ScalarType::Integer.widen(ScalarType::Float), ScalarType::Float);
        assert_eq!(ScalarType::Integer.widen(ScalarType::Boolean), ScalarType::String);
        assert_eq!(ScalarType::Boolean.widen(ScalarType::Boolean), ScalarType::Boolean);
    }

    #[test]
    fn test_inference() {
        let mut schema = Schema::from_header(["id", "score", "flag", "empty", "label"]);
        schema.apply_dtypes(&HashMap::from([("label".to_string(), ScalarType::String)]));

        let mut inference = TypeInference::new(schema.len());
        inference.observe(&[
            Scalar::Int(1),
            Scalar::Int(3),
            Scalar::Bool(true),
            Scalar::Null,
            Scalar::Int(7),
        ]);
        inference.observe(&[
            Scalar::Int(2),
            Scalar::Float(2.5),
            Scalar::Null,
            Scalar::Null,
            Scalar::Int(8),
        ]);
        inference.finish(&mut schema);

        let types: Vec<Option<ScalarType>> = schema.columns().iter().map(|c| c.dtype).collect();
        assert_eq!(
            types,
            vec![
                Some(ScalarType::Integer),
                Some(ScalarType::Float),
                Some(ScalarType::Boolean),
                Some(ScalarType::String),
                Some(ScalarType::String),
            ]
        );
    }

    #[test]
    fn test_project_keeps_requested_order() {
        let schema = Schema::from_header(["a", "b", "c"]);
        let (projected, indices, missing) =
            schema.project(&["c".to_string(), "zz".to_string(), "a".to_string()]);
        assert_eq!(projected.names().collect::<Vec<_>>(), vec!["c", "a"]);
        assert_eq!(indices, vec![2, 0]);
        assert_eq!(missing, vec!["zz".to_string()]);
    }

    #[test]
    fn test_project_drops_repeated_names() {
        let schema = Schema::from_header(["a", "b"]);
        let (projected, indices, missing) =
            schema.project(&["b".to_string(), "a".to_string(), "b".to_string()]);
        assert_eq!(projected.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(indices, vec![1, 0]);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_parse_scalar_type() {
        assert_eq!("Int64".parse::<ScalarType>(), Ok(ScalarType::Integer));
        assert!("decimal".parse::<ScalarType>().is_err());
    }
}
