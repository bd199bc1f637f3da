//! Component driver registry owned by the orchestrator.

use alloc::boxed::Box;
use alloc::vec::Vec;

use super::{Component, ComponentDescriptor, ComponentType};
use crate::error::{Error, Result};

/// Constructor registered for one component type.
pub type ComponentCtor = fn(&ComponentDescriptor) -> Result<Box<dyn Component>>;

/// Maps component types to their constructors.
///
/// Built once at startup and passed by reference; there is no global table.
#[derive(Default)]
pub struct ComponentRegistry {
    drivers: Vec<(ComponentType, ComponentCtor)>,
}

impl ComponentRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every engine enabled at build time.
    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        #[cfg(feature = "eq-fir")]
        reg.register(ComponentType::EqFir, new_eq_fir);
        #[cfg(feature = "eq-iir")]
        reg.register(ComponentType::EqIir, new_eq_iir);
        #[cfg(feature = "mixer")]
        reg.register(ComponentType::Mixer, new_mixer);
        #[cfg(feature = "src")]
        reg.register(ComponentType::Src, new_src);
        reg
    }

    /// Register `ctor` for `comp_type`, replacing any previous entry.
    pub fn register(&mut self, comp_type: ComponentType, ctor: ComponentCtor) {
        match self.drivers.iter_mut().find(|(t, _)| *t == comp_type) {
            Some(entry) => entry.1 = ctor,
            None => self.drivers.push((comp_type, ctor)),
        }
    }

    pub fn contains(&self, comp_type: ComponentType) -> bool {
        self.drivers.iter().any(|(t, _)| *t == comp_type)
    }

    /// Instantiate the component `desc` describes.
    pub fn create(&self, desc: &ComponentDescriptor) -> Result<Box<dyn Component>> {
        let comp_type = desc.comp_type();
        let (_, ctor) = self
            .drivers
            .iter()
            .find(|(t, _)| *t == comp_type)
            .ok_or_else(|| {
                log::error!("comp_new(): no driver for {:?}", comp_type);
                Error::Unsupported("no driver registered for component type")
            })?;
        log::debug!("comp_new(): id {} type {:?}", desc.id, comp_type);
        ctor(desc)
    }
}

#[cfg(feature = "eq-fir")]
fn new_eq_fir(desc: &ComponentDescriptor) -> Result<Box<dyn Component>> {
    Ok(Box::new(crate::eq_fir::EqFir::new(desc)?))
}

#[cfg(feature = "eq-iir")]
fn new_eq_iir(desc: &ComponentDescriptor) -> Result<Box<dyn Component>> {
    Ok(Box::new(crate::eq_iir::EqIir::new(desc)?))
}

#[cfg(feature = "mixer")]
fn new_mixer(desc: &ComponentDescriptor) -> Result<Box<dyn Component>> {
    Ok(Box::new(crate::mixer::Mixer::new(desc)?))
}

#[cfg(feature = "src")]
fn new_src(desc: &ComponentDescriptor) -> Result<Box<dyn Component>> {
    Ok(Box::new(crate::src::Src::new(desc)?))
}
