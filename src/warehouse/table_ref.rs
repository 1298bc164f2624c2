use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Resolves a dotted identifier to a schema and table.
    ///
    /// `db.schema.table` keeps only `schema.table`: the catalog segment is
    /// discarded. `schema.table` is taken as written. Anything else lands in
    /// `default_schema` with the whole identifier as the table name.
    pub fn resolve(identifier: &str, default_schema: &str) -> Self {
        let tokens: Vec<&str> = identifier.split('.').collect();
        match tokens.as_slice() {
            [_, schema, table] => Self::new(*schema, *table),
            [schema, table] => Self::new(*schema, *table),
            _ => Self::new(default_schema, identifier),
        }
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_part_drops_catalog() {
        let table = TableRef::resolve("DB.SCHEMA.TABLE", "PUBLIC");
        assert_eq!(table.schema, "SCHEMA");
        assert_eq!(table.table, "TABLE");
    }

    #[test]
    fn test_two_part() {
        let table = TableRef::resolve("raw.students", "PUBLIC");
        assert_eq!(table, TableRef::new("raw", "students"));
    }

    #[test]
    fn test_one_part_uses_default_schema() {
        let table = TableRef::resolve("TABLE", "ANALYTICS");
        assert_eq!(table, TableRef::new("ANALYTICS", "TABLE"));
    }

    #[test]
    fn test_four_part_falls_back_to_default_schema() {
        let table = TableRef::resolve("a.b.c.d", "ANALYTICS");
        assert_eq!(table, TableRef::new("ANALYTICS", "a.b.c.d"));
    }

    #[test]
    fn test_display() {
        assert_eq!(TableRef::new("s", "t").to_string(), "s.t");
    }
}
