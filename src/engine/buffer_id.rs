// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Resolution of a logical resume-PROM target to the numeric buffer id
//! learned from the Configuration page.

use serde::{Deserialize, Serialize};

use crate::{
    cfg::enums::SideId,
    engine::model::DeviceModel,
    models::{
        common::ComponentType,
        element::{Attribute, ComponentRef},
        status::BuildError,
    },
};

/// Where a resume PROM (or other component buffer) lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferTarget {
    Midplane,
    Lcc(SideId),
    PsA,
    PsB,
    /// Fan pack 1 to 3.
    Fan(u8),
}

pub const MAX_FAN_PACKS: u8 = 3;

/// Component that carries the buffer-id attribute for `target`.
pub fn buffer_component(
    model: &dyn DeviceModel,
    target: BufferTarget,
) -> Result<ComponentRef, BuildError> {
    Ok(match target {
        BufferTarget::Midplane => ComponentRef::new(ComponentType::Enclosure, 0),
        BufferTarget::Lcc(side) => ComponentRef::new(ComponentType::Lcc, side.index() as usize),
        BufferTarget::PsA => ComponentRef::new(ComponentType::PowerSupply, 0),
        BufferTarget::PsB => {
            // the B supply follows however many sub-elements side A reports
            let first = ComponentRef::new(ComponentType::PowerSupply, 0);
            let index = match model.get_u8(first, Attribute::PsSubelementCount) {
                Ok(0) | Err(_) => 1,
                Ok(n) => n as usize,
            };
            ComponentRef::new(ComponentType::PowerSupply, index)
        },
        BufferTarget::Fan(n) if (1..=MAX_FAN_PACKS).contains(&n) => {
            ComponentRef::new(ComponentType::Cooling, (n - 1) as usize)
        },
        BufferTarget::Fan(n) => {
            return Err(BuildError::Parameter(format!("fan pack {n} out of range")));
        },
    })
}

/// Buffer id for reading (`write == false`) or writing `target`.
pub fn resolve_buffer_id(
    model: &dyn DeviceModel,
    target: BufferTarget,
    write: bool,
) -> Result<u8, BuildError> {
    let comp = buffer_component(model, target)?;
    let attr = if write {
        Attribute::BufferIdWritable
    } else {
        Attribute::BufferId
    };
    Ok(model.get_u8(comp, attr)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::model::InMemoryModel, models::element::AttrValue};

    #[test]
    fn ps_b_defaults_to_second_slot() -> anyhow::Result<()> {
        let m = InMemoryModel::with_counts(&[(ComponentType::PowerSupply, 4)]);
        let c = buffer_component(&m, BufferTarget::PsB)?;
        assert_eq!(c.index, 1);
        m.set_attribute(
            ComponentRef::new(ComponentType::PowerSupply, 0),
            Attribute::PsSubelementCount,
            AttrValue::U8(2),
        )?;
        assert_eq!(buffer_component(&m, BufferTarget::PsB)?.index, 2);
        Ok(())
    }

    #[test]
    fn fan_out_of_range_is_parameter_error() {
        let m = InMemoryModel::new();
        assert!(matches!(
            resolve_buffer_id(&m, BufferTarget::Fan(4), false),
            Err(BuildError::Parameter(_))
        ));
    }
}
