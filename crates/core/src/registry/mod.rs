//! Format registry: conversion identifier to spec and converter.
//!
//! The registry is built once at startup and only read afterwards, so it is
//! shared behind an `Arc` without locking. Adding a conversion means one
//! [`FormatRegistry::register`] call; nothing else dispatches on identifiers.

mod builtin;
mod types;

pub use builtin::builtin_registry;
pub use types::{Arity, BackendKind, ConversionSpec, OutputKind};

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::converter::Converter;
use crate::error::ConversionError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Conversion not registered: {0}")]
    NotFound(String),

    #[error("Conversion already registered: {0}")]
    Duplicate(String),
}

impl From<RegistryError> for ConversionError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(identifier) => {
                ConversionError::UnsupportedConversion { identifier }
            }
            RegistryError::Duplicate(_) => ConversionError::internal(err.to_string()),
        }
    }
}

/// A spec paired with the converter that implements it.
#[derive(Clone)]
pub struct RegisteredConversion {
    pub spec: Arc<ConversionSpec>,
    pub converter: Arc<dyn Converter>,
}

impl std::fmt::Debug for RegisteredConversion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredConversion")
            .field("spec", &self.spec)
            .field("converter", &self.converter.name())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    entries: BTreeMap<String, RegisteredConversion>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        spec: ConversionSpec,
        converter: Arc<dyn Converter>,
    ) -> Result<(), RegistryError> {
        if self.entries.contains_key(&spec.identifier) {
            return Err(RegistryError::Duplicate(spec.identifier));
        }
        self.entries.insert(
            spec.identifier.clone(),
            RegisteredConversion {
                spec: Arc::new(spec),
                converter,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, identifier: &str) -> Result<&ConversionSpec, RegistryError> {
        self.entries
            .get(identifier)
            .map(|entry| entry.spec.as_ref())
            .ok_or_else(|| RegistryError::NotFound(identifier.to_string()))
    }

    pub fn resolve(&self, identifier: &str) -> Result<RegisteredConversion, RegistryError> {
        self.entries
            .get(identifier)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(identifier.to_string()))
    }

    /// Entries in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredConversion> {
        self.entries.values()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
