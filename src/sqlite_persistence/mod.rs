//! Declarative SQLite schema definitions.
//!
//! Tables are declared as consts with the [`sqlite_column!`] macro and created
//! through [`VersionedSchema::initialize`], which stamps `PRAGMA user_version`
//! so a database created by a different schema version is refused instead of
//! silently misread.

use anyhow::{bail, Result};
use rusqlite::{params, Connection};

pub const DEFAULT_TIMESTAMP: &str = "(cast(strftime('%s','now') as int))";

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Allow unused_mut because the variable is only mutated when optional
            // field assignments are passed to the macro (e.g., `is_primary_key = true`)
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                is_unique: false,
                default_value: None,
                foreign_key: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Blob,
}

#[allow(unused)]
pub enum ForeignKeyOnChange {
    NoAction,
    Restrict,
    SetNull,
    SetDefault,
    Cascade,
}

pub struct ForeignKey {
    pub foreign_table: &'static str,
    pub foreign_column: &'static str,
    pub on_delete: ForeignKeyOnChange,
}

pub struct Column<'a, S: AsRef<str>> {
    pub name: S,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub is_unique: bool,
    pub default_value: Option<S>,
    pub foreign_key: Option<&'a ForeignKey>,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static, &'static str>],
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let mut create_sql = format!("CREATE TABLE {} (", self.name);
        for (column_index, column) in self.columns.iter().enumerate() {
            if column_index > 0 {
                create_sql.push_str(", ");
            }
            create_sql.push_str(&format!(
                "{} {}",
                column.name,
                match column.sql_type {
                    SqlType::Text => "TEXT",
                    SqlType::Integer => "INTEGER",
                    SqlType::Real => "REAL",
                    SqlType::Blob => "BLOB",
                }
            ));
            if column.is_primary_key {
                create_sql.push_str(" PRIMARY KEY");
            }
            if column.non_null {
                create_sql.push_str(" NOT NULL");
            }
            if column.is_unique {
                create_sql.push_str(" UNIQUE");
            }
            if let Some(default_value) = column.default_value {
                create_sql.push_str(&format!(" DEFAULT {}", default_value));
            }
            if let Some(foreign_key) = column.foreign_key {
                create_sql.push_str(&format!(
                    " REFERENCES {}({}) ON DELETE {}",
                    foreign_key.foreign_table,
                    foreign_key.foreign_column,
                    match foreign_key.on_delete {
                        ForeignKeyOnChange::NoAction => "NO ACTION",
                        ForeignKeyOnChange::Restrict => "RESTRICT",
                        ForeignKeyOnChange::SetNull => "SET NULL",
                        ForeignKeyOnChange::SetDefault => "SET DEFAULT",
                        ForeignKeyOnChange::Cascade => "CASCADE",
                    }
                ));
            }
        }

        for unique_constraint in self.unique_constraints {
            create_sql.push_str(&format!(", UNIQUE ({})", unique_constraint.join(", ")));
        }
        create_sql.push_str(");");
        conn.execute(&create_sql, params![])?;

        for (index_name, column_name) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON {}({});",
                    index_name, self.name, column_name
                ),
                params![],
            )?;
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
}

impl VersionedSchema {
    /// Create the schema on a fresh database, or verify the version stamp on
    /// an existing one.
    pub fn initialize(&self, conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON;", params![])?;

        let current: usize =
            conn.query_row("SELECT * FROM pragma_user_version;", [], |row| row.get(0))?;

        if current == 0 && !self.schema_exists(conn)? {
            for table in self.tables {
                table.create(conn)?;
            }
            conn.execute(&format!("PRAGMA user_version = {}", self.version), [])?;
            return Ok(());
        }

        if current != self.version {
            bail!(
                "Database schema version mismatch: found {}, expected {}",
                current,
                self.version
            );
        }
        Ok(())
    }

    fn schema_exists(&self, conn: &Connection) -> Result<bool> {
        let first_table = match self.tables.first() {
            Some(table) => table.name,
            None => return Ok(false),
        };
        let count: usize = conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1;",
            params![first_table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_TABLE: Table = Table {
        name: "widget",
        columns: &[
            sqlite_column!("id", &SqlType::Text, is_primary_key = true),
            sqlite_column!("count", &SqlType::Integer, non_null = true),
            sqlite_column!(
                "created",
                &SqlType::Integer,
                default_value = Some(DEFAULT_TIMESTAMP)
            ),
        ],
        indices: &[("idx_widget_count", "count")],
        unique_constraints: &[],
    };

    const TEST_SCHEMA: VersionedSchema = VersionedSchema {
        version: 3,
        tables: &[TEST_TABLE],
    };

    #[test]
    fn creates_and_stamps_version() {
        let conn = Connection::open_in_memory().unwrap();
        TEST_SCHEMA.initialize(&conn).unwrap();

        let version: usize = conn
            .query_row("SELECT * FROM pragma_user_version;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 3);

        conn.execute("INSERT INTO widget (id, count) VALUES ('a', 1);", [])
            .unwrap();
    }

    #[test]
    fn initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        TEST_SCHEMA.initialize(&conn).unwrap();
        TEST_SCHEMA.initialize(&conn).unwrap();
    }

    #[test]
    fn rejects_version_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        TEST_SCHEMA.initialize(&conn).unwrap();
        conn.execute("PRAGMA user_version = 99;", []).unwrap();

        let other = VersionedSchema {
            version: 3,
            tables: &[],
        };
        assert!(other.initialize(&conn).is_err());
    }
}
