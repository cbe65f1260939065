// Memory - Store en mémoire, pour les tests et les exécutions éphémères
use super::state::{compacted_history, installed_manifest, touched_objects, Store, StoreError, StoreView};
use crate::types::{StorageReference, TransactionReference, TransactionRequest, TransactionResponse};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    requests: BTreeMap<TransactionReference, TransactionRequest>,
    responses: BTreeMap<TransactionReference, TransactionResponse>,
    histories: HashMap<StorageReference, Vec<TransactionReference>>,
    log: Vec<TransactionReference>,
    manifest: Option<StorageReference>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreView for MemoryStore {
    fn request(&self, reference: &TransactionReference) -> Result<Option<TransactionRequest>, StoreError> {
        Ok(self.requests.get(reference).cloned())
    }

    fn response(&self, reference: &TransactionReference) -> Result<Option<TransactionResponse>, StoreError> {
        Ok(self.responses.get(reference).cloned())
    }

    fn history(&self, object: &StorageReference) -> Result<Vec<TransactionReference>, StoreError> {
        Ok(self.histories.get(object).cloned().unwrap_or_default())
    }

    fn manifest(&self) -> Result<Option<StorageReference>, StoreError> {
        Ok(self.manifest)
    }

    fn contains(&self, reference: &TransactionReference) -> Result<bool, StoreError> {
        Ok(self.responses.contains_key(reference))
    }
}

impl Store for MemoryStore {
    fn commit(
        &mut self,
        reference: TransactionReference,
        request: &TransactionRequest,
        response: &TransactionResponse,
    ) -> Result<(), StoreError> {
        if self.responses.contains_key(&reference) {
            return Err(StoreError::AlreadyCommitted(reference));
        }

        let mut histories = Vec::new();
        for object in touched_objects(response) {
            histories.push((object, compacted_history(&*self, &object, reference, response)?));
        }
        self.histories.extend(histories);
        if let Some(manifest) = installed_manifest(response) {
            self.manifest = Some(manifest);
        }
        self.requests.insert(reference, request.clone());
        self.responses.insert(reference, response.clone());
        self.log.push(reference);
        Ok(())
    }

    fn transactions(&self) -> Result<Vec<TransactionReference>, StoreError> {
        Ok(self.log.clone())
    }
}
