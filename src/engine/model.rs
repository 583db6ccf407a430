// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Device model boundary: named attributes on indexed components.

use std::sync::Mutex;

use dashmap::DashMap;

use crate::models::{
    common::ComponentType,
    element::{AttrValue, AttrWrite, Attribute, ComponentRef},
    status::ModelError,
};

/// Store the engine reads topology from and writes decoded pages into.
///
/// Implementations must make `apply_batch` all-or-nothing with respect to
/// missing components: every target is checked before anything is written.
pub trait DeviceModel: Send + Sync {
    fn component_count(&self, ty: ComponentType) -> usize;

    fn set_component_count(&self, ty: ComponentType, count: usize);

    fn get_attribute(&self, target: ComponentRef, attr: Attribute)
    -> Result<AttrValue, ModelError>;

    /// Returns `true` when the stored value changed.
    fn set_attribute(
        &self,
        target: ComponentRef,
        attr: Attribute,
        value: AttrValue,
    ) -> Result<bool, ModelError>;

    /// Apply `writes` under one lock; returns how many values changed.
    fn apply_batch(&self, writes: Vec<AttrWrite>) -> Result<usize, ModelError>;

    fn get_u8(&self, target: ComponentRef, attr: Attribute) -> Result<u8, ModelError> {
        self.get_attribute(target, attr)?
            .as_u8()
            .ok_or_else(|| mismatch(target, attr))
    }

    fn get_u32(&self, target: ComponentRef, attr: Attribute) -> Result<u32, ModelError> {
        self.get_attribute(target, attr)?
            .as_u32()
            .ok_or_else(|| mismatch(target, attr))
    }

    fn get_bool(&self, target: ComponentRef, attr: Attribute) -> Result<bool, ModelError> {
        self.get_attribute(target, attr)?
            .as_bool()
            .ok_or_else(|| mismatch(target, attr))
    }

    fn get_text(&self, target: ComponentRef, attr: Attribute) -> Result<String, ModelError> {
        let v = self.get_attribute(target, attr)?;
        v.as_text()
            .map(str::to_string)
            .ok_or_else(|| mismatch(target, attr))
    }
}

fn mismatch(target: ComponentRef, attr: Attribute) -> ModelError {
    ModelError::TypeMismatch {
        ty: target.ty,
        index: target.index,
        attr: attr.name(),
    }
}

/// `DashMap`-backed model used by the CLI and the tests.
#[derive(Debug, Default)]
pub struct InMemoryModel {
    counts: DashMap<ComponentType, usize>,
    attrs: DashMap<(ComponentRef, Attribute), AttrValue>,
    batch: Mutex<()>,
}

impl InMemoryModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size several component kinds at once.
    pub fn with_counts(counts: &[(ComponentType, usize)]) -> Self {
        let m = Self::new();
        for (ty, n) in counts {
            m.set_component_count(*ty, *n);
        }
        m
    }

    fn check(&self, target: ComponentRef) -> Result<(), ModelError> {
        if target.index < self.component_count(target.ty) {
            Ok(())
        } else {
            Err(ModelError::NotFound(target.ty, target.index))
        }
    }

    fn store(&self, target: ComponentRef, attr: Attribute, value: AttrValue) -> bool {
        match self.attrs.insert((target, attr), value.clone()) {
            Some(old) => old != value,
            None => true,
        }
    }

    /// Every attribute currently set on `target`, sorted by name.
    pub fn attributes_of(&self, target: ComponentRef) -> Vec<(Attribute, AttrValue)> {
        let mut out: Vec<_> = self
            .attrs
            .iter()
            .filter(|e| e.key().0 == target)
            .map(|e| (e.key().1, e.value().clone()))
            .collect();
        out.sort_by_key(|(a, _)| a.name());
        out
    }
}

impl DeviceModel for InMemoryModel {
    fn component_count(&self, ty: ComponentType) -> usize {
        self.counts.get(&ty).map(|c| *c).unwrap_or(0)
    }

    fn set_component_count(&self, ty: ComponentType, count: usize) {
        self.counts.insert(ty, count);
        self.attrs
            .retain(|(target, _), _| target.ty != ty || target.index < count);
    }

    fn get_attribute(
        &self,
        target: ComponentRef,
        attr: Attribute,
    ) -> Result<AttrValue, ModelError> {
        self.check(target)?;
        self.attrs
            .get(&(target, attr))
            .map(|v| v.clone())
            .ok_or(ModelError::AttributeMissing {
                ty: target.ty,
                index: target.index,
                attr: attr.name(),
            })
    }

    fn set_attribute(
        &self,
        target: ComponentRef,
        attr: Attribute,
        value: AttrValue,
    ) -> Result<bool, ModelError> {
        self.check(target)?;
        Ok(self.store(target, attr, value))
    }

    fn apply_batch(&self, writes: Vec<AttrWrite>) -> Result<usize, ModelError> {
        let _g = self.batch.lock().unwrap_or_else(|p| p.into_inner());
        for w in &writes {
            self.check(w.target)?;
        }
        Ok(writes
            .into_iter()
            .filter(|w| self.store(w.target, w.attr, w.value.clone()))
            .count())
    }
}
