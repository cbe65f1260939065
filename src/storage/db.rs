// Database - Abstraction RocksDB
use rocksdb::{Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

/// Wrapper autour de RocksDB
pub struct Database {
    db: Arc<DB>,
}

impl Database {
    fn options() -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        // Limiter l'accumulation de fichiers de log
        opts.set_keep_log_file_num(5);
        opts.set_max_manifest_file_size(64 * 1024 * 1024);
        opts.set_max_background_jobs(2);
        opts
    }

    /// Ouvre ou crée une base de données
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let db = DB::open(&Self::options(), path).map_err(|e| DatabaseError::OpenFailed(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Supprime entièrement la base située à `path`
    pub fn destroy<P: AsRef<Path>>(path: P) -> Result<(), DatabaseError> {
        DB::destroy(&Self::options(), path).map_err(|e| DatabaseError::WriteFailed(e.to_string()))
    }

    /// Lit une valeur
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DatabaseError> {
        self.db
            .get(key)
            .map_err(|e| DatabaseError::ReadFailed(e.to_string()))
    }

    /// Vérifie si une clé existe
    pub fn exists(&self, key: &[u8]) -> Result<bool, DatabaseError> {
        Ok(self.get(key)?.is_some())
    }

    /// Écrit toutes les opérations ou aucune
    pub fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), DatabaseError> {
        let mut batch = WriteBatch::default();

        for op in ops {
            match op {
                WriteOp::Put { key, value } => batch.put(&key, &value),
                WriteOp::Delete { key } => batch.delete(&key),
            }
        }

        self.db
            .write(batch)
            .map_err(|e| DatabaseError::WriteFailed(e.to_string()))
    }
}

/// Opération d'écriture pour batch
#[derive(Debug, Clone)]
pub enum WriteOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Erreurs de base de données
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Échec d'ouverture de la DB: {0}")]
    OpenFailed(String),

    #[error("Échec de lecture: {0}")]
    ReadFailed(String),

    #[error("Échec d'écriture: {0}")]
    WriteFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_database_batch_is_visible() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(temp_dir.path()).unwrap();

        db.batch_write(vec![
            WriteOp::Put { key: b"request:a".to_vec(), value: b"1".to_vec() },
            WriteOp::Put { key: b"response:a".to_vec(), value: b"2".to_vec() },
        ])
        .unwrap();

        assert_eq!(db.get(b"request:a").unwrap(), Some(b"1".to_vec()));
        assert!(db.exists(b"response:a").unwrap());
        assert!(!db.exists(b"response:b").unwrap());

        db.batch_write(vec![WriteOp::Delete { key: b"request:a".to_vec() }]).unwrap();
        assert!(!db.exists(b"request:a").unwrap());
    }

    #[test]
    fn test_database_reopen_and_destroy() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db");
        {
            let db = Database::open(&path).unwrap();
            db.batch_write(vec![WriteOp::Put { key: b"k".to_vec(), value: b"v".to_vec() }]).unwrap();
        }
        {
            let db = Database::open(&path).unwrap();
            assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));
        }
        Database::destroy(&path).unwrap();
        let db = Database::open(&path).unwrap();
        assert!(!db.exists(b"k").unwrap());
    }
}
