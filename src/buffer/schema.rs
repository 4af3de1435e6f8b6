// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! `Schema`: ordered named fields with fixed physical types (spec.md §3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhysicalType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    /// Fixed-width byte blob, e.g. a char(N) field. Genuinely
    /// variable-length payloads (strings, arbitrary blobs) are carried out
    /// of band through `VariableSizedData` (spec.md §3, §4.4 "Open
    /// questions": variable-sized aggregation inputs are out of scope).
    FixedBytes(usize),
}

impl PhysicalType {
    pub fn size_bytes(&self) -> usize {
        match self {
            PhysicalType::Bool | PhysicalType::I8 => 1,
            PhysicalType::I16 => 2,
            PhysicalType::I32 | PhysicalType::F32 => 4,
            PhysicalType::I64 | PhysicalType::F64 => 8,
            PhysicalType::FixedBytes(n) => *n,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub physical_type: PhysicalType,
}

impl Field {
    pub fn new(name: impl Into<String>, physical_type: PhysicalType) -> Self {
        Self {
            name: name.into(),
            physical_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    RowMajor,
    ColumnMajor,
}

/// An ordered list of named fields with a single layout (spec.md §3: "the
/// core enforces a single layout per operator boundary").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
    layout: Layout,
}

impl Schema {
    pub fn new(fields: Vec<Field>, layout: Layout) -> Self {
        Self { fields, layout }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Row size is the sum of physical-type sizes (spec.md §3).
    pub fn row_size_bytes(&self) -> usize {
        self.fields.iter().map(|f| f.physical_type.size_bytes()).sum()
    }

    pub fn field_offset(&self, name: &str) -> Option<usize> {
        match self.layout {
            Layout::RowMajor => {
                let mut offset = 0;
                for field in &self.fields {
                    if field.name == name {
                        return Some(offset);
                    }
                    offset += field.physical_type.size_bytes();
                }
                None
            }
            Layout::ColumnMajor => self.fields.iter().position(|f| f.name == name),
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_size_is_sum_of_field_sizes() {
        let schema = Schema::new(
            vec![
                Field::new("key", PhysicalType::I64),
                Field::new("value", PhysicalType::I32),
            ],
            Layout::RowMajor,
        );
        assert_eq!(schema.row_size_bytes(), 12);
        assert_eq!(schema.field_offset("value"), Some(8));
    }
}
