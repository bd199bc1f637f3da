//! Creation-time description of a component.

use alloc::vec::Vec;

use super::ComponentType;
use crate::error::{Error, Result};

/// Engine-specific creation payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentConfig {
    Mixer,
    /// FIR EQ with an optional initial coefficient blob (empty = none).
    EqFir { blob: Vec<u8> },
    /// IIR EQ with an optional initial coefficient blob (empty = none).
    EqIir { blob: Vec<u8> },
    /// SRC with fixed rates; `0` means "take it from the stream parameters".
    Src { source_rate: u32, sink_rate: u32 },
}

/// Everything `new` needs to instantiate a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor {
    pub id: u32,
    pub pipeline_id: u32,
    /// Periods held by the sink buffer.
    pub periods_sink: u32,
    /// Periods held by the source buffer.
    pub periods_source: u32,
    pub config: ComponentConfig,
}

impl ComponentDescriptor {
    pub fn new(id: u32, config: ComponentConfig) -> Self {
        ComponentDescriptor {
            id,
            pipeline_id: 0,
            periods_sink: 2,
            periods_source: 2,
            config,
        }
    }

    pub fn mixer(id: u32) -> Self {
        Self::new(id, ComponentConfig::Mixer)
    }

    pub fn eq_fir(id: u32, blob: &[u8]) -> Self {
        Self::new(id, ComponentConfig::EqFir { blob: blob.to_vec() })
    }

    pub fn eq_iir(id: u32, blob: &[u8]) -> Self {
        Self::new(id, ComponentConfig::EqIir { blob: blob.to_vec() })
    }

    pub fn src(id: u32, source_rate: u32, sink_rate: u32) -> Self {
        Self::new(
            id,
            ComponentConfig::Src {
                source_rate,
                sink_rate,
            },
        )
    }

    pub fn comp_type(&self) -> ComponentType {
        match self.config {
            ComponentConfig::Mixer => ComponentType::Mixer,
            ComponentConfig::EqFir { .. } => ComponentType::EqFir,
            ComponentConfig::EqIir { .. } => ComponentType::EqIir,
            ComponentConfig::Src { .. } => ComponentType::Src,
        }
    }

    /// Bounds shared by every component type.
    pub fn validate(&self, expected: ComponentType) -> Result<()> {
        if self.comp_type() != expected {
            log::error!(
                "comp_new(): descriptor is {:?}, expected {:?}",
                self.comp_type(),
                expected
            );
            return Err(Error::InvalidArgument("descriptor type mismatch"));
        }
        if self.periods_sink == 0 || self.periods_source == 0 {
            log::error!("comp_new(): zero periods");
            return Err(Error::InvalidArgument("periods must be non-zero"));
        }
        Ok(())
    }
}
