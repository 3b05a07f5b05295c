use std::io;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};

use super::{Conn, MEMORY, is_memory};
use crate::error::SqliteLeaseError;
use crate::quote::{is_valid_schema_name, quote_identifier};

impl Conn {
    /// Attach the store at `path` under `schema`.
    ///
    /// The schema name is checked before the engine is touched. A missing
    /// file is created first when `create` is set, otherwise the call fails
    /// with [`SqliteLeaseError::StoreNotFound`]. An empty path attaches a
    /// fresh in-memory store.
    ///
    /// # Errors
    /// Returns `InvalidSchemaName`, `StoreNotFound`, or the engine error.
    pub fn attach(
        &self,
        schema: &str,
        path: impl AsRef<Path>,
        create: bool,
        flags: OpenFlags,
    ) -> Result<(), SqliteLeaseError> {
        let schema = schema.trim();
        if !is_valid_schema_name(schema) {
            return Err(SqliteLeaseError::InvalidSchemaName(schema.to_owned()));
        }

        let path = path.as_ref();
        let target = if is_memory(path) {
            MEMORY.to_owned()
        } else {
            if !is_uri(path) {
                ensure_store(path, create, flags)?;
            }
            path.to_string_lossy().into_owned()
        };

        let sql = format!("ATTACH DATABASE ?1 AS {}", quote_identifier(schema));
        self.conn.execute(&sql, [&target])?;
        tracing::debug!(schema, path = %target, "attached database");
        Ok(())
    }

    /// Detach a previously attached schema.
    ///
    /// # Errors
    /// Returns `InvalidSchemaName` or the engine error.
    pub fn detach(&self, schema: &str) -> Result<(), SqliteLeaseError> {
        let schema = schema.trim();
        if !is_valid_schema_name(schema) {
            return Err(SqliteLeaseError::InvalidSchemaName(schema.to_owned()));
        }
        self.conn
            .execute_batch(&format!("DETACH DATABASE {}", quote_identifier(schema)))?;
        tracing::debug!(schema, "detached database");
        Ok(())
    }

    /// Names of every schema on this connection except `temp`, in attach order.
    ///
    /// # Errors
    /// Propagates engine failures.
    pub fn schemas(&self) -> Result<Vec<String>, SqliteLeaseError> {
        Ok(self
            .database_list()?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    /// File backing `schema`; `None` for in-memory or unknown schemas.
    ///
    /// # Errors
    /// Propagates engine failures.
    pub fn filename(&self, schema: &str) -> Result<Option<PathBuf>, SqliteLeaseError> {
        Ok(self
            .database_list()?
            .into_iter()
            .find(|(name, _)| name == schema)
            .and_then(|(_, file)| (!file.is_empty()).then(|| PathBuf::from(file))))
    }

    /// User tables of `schema` (the main schema when `None`), sorted by name.
    ///
    /// # Errors
    /// Returns `InvalidSchemaName` for a malformed name or the engine error.
    pub fn tables(&self, schema: Option<&str>) -> Result<Vec<String>, SqliteLeaseError> {
        let prefix = match schema.map(str::trim) {
            None | Some("main") => String::new(),
            Some(name) if is_valid_schema_name(name) => format!("{}.", quote_identifier(name)),
            Some(name) => return Err(SqliteLeaseError::InvalidSchemaName(name.to_owned())),
        };
        let sql = format!(
            "SELECT name FROM {prefix}sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn database_list(&self) -> Result<Vec<(String, String)>, SqliteLeaseError> {
        let mut stmt = self.conn.prepare("PRAGMA database_list")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().filter(|(name, _)| name != "temp").collect())
    }
}

fn is_uri(path: &Path) -> bool {
    path.to_str().is_some_and(|p| p.starts_with("file:"))
}

fn ensure_store(path: &Path, create: bool, flags: OpenFlags) -> Result<(), SqliteLeaseError> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            if !create {
                return Err(SqliteLeaseError::StoreNotFound(path.to_path_buf()));
            }
            let conn = Connection::open_with_flags(
                path,
                flags | OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            )?;
            conn.close().map_err(|(_, err)| SqliteLeaseError::from(err))?;
            tracing::debug!(path = %path.display(), "created database file");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::connection::default_open_flags;

    #[test]
    fn invalid_schema_name_is_rejected_first() {
        let conn = Conn::open_in_memory().unwrap();
        let err = conn
            .attach("1bad", "/definitely/not/here.db", false, default_open_flags())
            .unwrap_err();
        assert!(matches!(err, SqliteLeaseError::InvalidSchemaName(name) if name == "1bad"));
    }

    #[test]
    fn memory_attach_lists_schema() {
        let conn = Conn::open_in_memory().unwrap();
        conn.attach("scratch", "", true, default_open_flags()).unwrap();
        assert_eq!(conn.schemas().unwrap(), vec!["main", "scratch"]);
        assert_eq!(conn.filename("scratch").unwrap(), None);

        conn.execute_batch("CREATE TABLE scratch.notes (body TEXT)")
            .unwrap();
        assert_eq!(conn.tables(Some("scratch")).unwrap(), vec!["notes"]);
        assert!(conn.tables(None).unwrap().is_empty());

        conn.detach("scratch").unwrap();
        assert_eq!(conn.schemas().unwrap(), vec!["main"]);
    }
}
