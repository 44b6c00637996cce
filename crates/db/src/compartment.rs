//! A compartment: one access-identifier-scoped `libsql` connection
//! (`spec.md` §3 "Lifecycle").
//!
//! Creation and destruction of the storage backing a given access
//! identifier is an external collaborator's concern (`spec.md` §1
//! "Out of scope"). This type is the minimal seam that collaborator needs:
//! it opens either an in-memory or file-backed `libsql::Connection` and
//! hands it to [`crate::service::StagingService`] uniformly, without the
//! engine itself choosing *where* a compartment lives on disk.

use crate::error::DbError;

/// A handle to one staging compartment's database connection.
pub struct Compartment {
    conn: libsql::Connection,
}

impl Compartment {
    /// Open an in-memory compartment. Useful for tests and for
    /// collaborators that manage durability themselves (e.g. by
    /// snapshotting elsewhere).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::LibSql`] if the embedded engine cannot open an
    /// in-memory database.
    pub async fn open_in_memory() -> Result<Self, DbError> {
        Self::open(":memory:").await
    }

    /// Open a file-backed compartment at `path`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::LibSql`] if the path cannot be opened.
    pub async fn open_file(path: &str) -> Result<Self, DbError> {
        Self::open(path).await
    }

    async fn open(path: &str) -> Result<Self, DbError> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(DbError::LibSql)?;
        let conn = db.connect().map_err(DbError::LibSql)?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &libsql::Connection {
        &self.conn
    }

    /// Consume the compartment, returning its connection.
    #[must_use]
    pub fn into_connection(self) -> libsql::Connection {
        self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_in_memory_compartment() {
        let compartment = Compartment::open_in_memory().await.unwrap();
        compartment.connection().execute("CREATE TABLE t (id INTEGER)", ()).await.unwrap();
    }

    #[tokio::test]
    async fn opens_file_backed_compartment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compartment.db");
        let compartment = Compartment::open_file(path.to_str().unwrap()).await.unwrap();
        compartment.connection().execute("CREATE TABLE t (id INTEGER)", ()).await.unwrap();
    }
}
