//! Engine-neutral table definitions.

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Bounded string.
    Varchar(u32),
    /// Unbounded text.
    Text,
    /// Signed 64-bit integer.
    BigInt,
    /// Unsigned 32-bit integer.
    UnsignedInt,
    /// Double-precision float.
    Float,
    /// Small integer (booleans).
    SmallInt,
}

/// Type plus nullability of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnSpec {
    /// Data type.
    pub column_type: ColumnType,
    /// Whether NULL is rejected.
    pub not_null: bool,
}

impl ColumnSpec {
    /// A nullable column of the given type.
    pub fn nullable(column_type: ColumnType) -> Self {
        Self {
            column_type,
            not_null: false,
        }
    }

    /// A NOT NULL column of the given type.
    pub fn required(column_type: ColumnType) -> Self {
        Self {
            column_type,
            not_null: true,
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Type and nullability.
    pub spec: ColumnSpec,
}

impl ColumnDef {
    /// Creates a column definition.
    pub fn new(name: impl Into<String>, spec: ColumnSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }
}

/// A secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    /// Index name, unique per database.
    pub name: String,
    /// Indexed columns in order.
    pub columns: Vec<String>,
}

/// A table to be created.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// Columns in order.
    pub columns: Vec<ColumnDef>,
    /// Primary key columns.
    pub primary_key: Vec<String>,
    /// Secondary indexes.
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    /// Starts a table definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a column.
    pub fn column(mut self, name: impl Into<String>, spec: ColumnSpec) -> Self {
        self.columns.push(ColumnDef::new(name, spec));
        self
    }

    /// Sets the primary key.
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a secondary index.
    pub fn index<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.push(IndexDef {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }
}
