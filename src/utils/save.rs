use serde::{de::DeserializeOwned, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

/// Serialize to a file or load from a serialized file.
pub trait SaveLoad {
    type SaveErr;
    type LoadErr;

    /// Serialize to a file.
    fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Self::SaveErr>;

    /// Load from a file created by [`SaveLoad::save`].
    fn load<P: AsRef<Path>>(path: P) -> Result<Self, Self::LoadErr>
    where
        Self: Sized;
}

#[derive(Debug, Error)]
pub enum SerdeSaveLoadError {
    #[error("file error {0}")]
    Io(#[from] std::io::Error),
    #[error("(de)serialization error {0}")]
    Serialize(#[from] serde_cbor::Error),
}

/// CBOR files
impl<T: Serialize + DeserializeOwned> SaveLoad for T {
    type SaveErr = SerdeSaveLoadError;
    type LoadErr = SerdeSaveLoadError;

    fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Self::SaveErr> {
        let file = BufWriter::new(File::create(path)?);
        serde_cbor::to_writer(file, self)?;
        Ok(())
    }

    fn load<P: AsRef<Path>>(path: P) -> Result<Self, Self::LoadErr>
    where
        Self: Sized,
    {
        let file = BufReader::new(File::open(path)?);
        let this = serde_cbor::from_reader(file)?;
        Ok(this)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn save_load_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.cbor");
        let map: BTreeMap<String, Vec<u8>> =
            [("a".into(), vec![1, 2]), ("b".into(), vec![])].into_iter().collect();
        map.save(&path).unwrap();
        assert_eq!(BTreeMap::<String, Vec<u8>>::load(&path).unwrap(), map);
    }

    #[test]
    fn load_missing_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Vec::<u8>::load(dir.path().join("missing.cbor"));
        assert!(matches!(result, Err(SerdeSaveLoadError::Io(_))));
    }
}
