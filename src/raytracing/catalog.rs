use std::{path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{PrimitiveStore, TriangleBuffer};
use crate::{
    gpu::{GpuDevice, GpuError},
    loader::SceneImporter,
    scene::{FilterMode, Model},
};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("There is no model {index}, the catalog has {count}")]
    UnknownModel { index: usize, count: usize },
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub path: PathBuf,
}

/// The models that can be shown, and which one of them is in the primitive store.
pub struct ModelCatalog {
    entries: Vec<CatalogEntry>,
    models: Vec<Model>,
    store: PrimitiveStore,
    active: Option<usize>,
    rebuild_count: usize,
}

impl ModelCatalog {
    /// Loads every entry. Nothing is uploaded until a model is selected.
    pub fn load(
        entries: &[CatalogEntry],
        filter: FilterMode,
        importer: &dyn SceneImporter,
        device: &Arc<dyn GpuDevice>,
    ) -> Result<Self, CatalogError> {
        let models = entries
            .iter()
            .map(|entry| {
                log::info!("Loading model '{}' from {}", entry.name, entry.path.display());
                Model::load(&entry.path, filter, importer, device)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            entries: entries.to_vec(),
            models,
            store: PrimitiveStore::new(device.clone()),
            active: None,
            rebuild_count: 0,
        })
    }

    /// Makes model `index` the active one and uploads its triangles.
    ///
    /// Returns `false` if it already is active and uploaded. If the upload fails the
    /// previously active model stays active.
    pub fn select(&mut self, index: usize) -> Result<bool, CatalogError> {
        let model = self.models.get(index).ok_or(CatalogError::UnknownModel {
            index,
            count: self.models.len(),
        })?;
        if self.active == Some(index) && self.store.is_allocated() {
            return Ok(false);
        }

        let triangles = TriangleBuffer::rebuild(model);
        self.rebuild_count += 1;
        self.store.upload(&triangles)?;
        self.active = Some(index);

        log::info!(
            "Selected model '{}' ({} triangles)",
            self.entries[index].name,
            triangles.len()
        );
        Ok(true)
    }

    /// Selects the model after the active one, wrapping around.
    pub fn select_next(&mut self) -> Result<bool, CatalogError> {
        let next = match self.active {
            Some(active) if !self.models.is_empty() => (active + 1) % self.models.len(),
            _ => 0,
        };
        self.select(next)
    }

    pub fn active(&self) -> Option<&Model> {
        self.active.and_then(|index| self.models.get(index))
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active_entry(&self) -> Option<&CatalogEntry> {
        self.active.and_then(|index| self.entries.get(index))
    }

    pub fn store(&self) -> &PrimitiveStore {
        &self.store
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// How many triangle buffers were built so far.
    pub fn rebuild_count(&self) -> usize {
        self.rebuild_count
    }

    /// Frees the primitive buffer and every model. The catalog is empty afterwards.
    pub fn release_gpu_resources(&mut self) {
        self.store.release();
        self.models.clear();
        self.entries.clear();
        self.active = None;
    }
}
