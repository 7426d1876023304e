//! Process-wide holders for the loaded models. Each slot is filled once at
//! startup and only read afterwards.

use std::sync::{Arc, OnceLock};

use inference_common::face::FaceLocator;
use inference_common::prediction::Classifier;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0} is not initialized")]
    NotInitialized(&'static str),

    #[error("{0} is already initialized")]
    AlreadyInitialized(&'static str),
}

/// A write-once slot for a shared, read-only model.
pub struct Registry<T: ?Sized> {
    name: &'static str,
    slot: OnceLock<Arc<T>>,
}

impl<T: ?Sized> Registry<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: OnceLock::new(),
        }
    }

    pub fn install(&self, value: Arc<T>) -> Result<(), RegistryError> {
        self.slot
            .set(value)
            .map_err(|_| RegistryError::AlreadyInitialized(self.name))?;
        log::info!("{} installed", self.name);
        Ok(())
    }

    pub fn get(&self) -> Result<Arc<T>, RegistryError> {
        self.slot
            .get()
            .cloned()
            .ok_or(RegistryError::NotInitialized(self.name))
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.get().is_some()
    }
}

/// The models a serving process needs.
pub struct Models {
    pub classifier: Registry<dyn Classifier>,
    pub face_locator: Registry<dyn FaceLocator>,
}

impl Models {
    pub const fn new() -> Self {
        Self {
            classifier: Registry::new("classifier"),
            face_locator: Registry::new("face locator"),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.classifier.is_initialized() && self.face_locator.is_initialized()
    }
}

impl Default for Models {
    fn default() -> Self {
        Self::new()
    }
}

/// Models shared by the whole process.
pub static MODELS: Models = Models::new();
