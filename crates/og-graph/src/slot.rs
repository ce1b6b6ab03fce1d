use og_tensor::Tensor;

use crate::error::GraphError;
use crate::graph::SlotId;

/// Classification of a slot id within a graph's tensor namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotClass {
    ExternalInput,
    Internal,
    ExternalOutput,
}

/// The slot-count triple declared at graph construction.
///
/// Slot ids partition into external inputs first, internals in between,
/// and external outputs last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    pub input_count: usize,
    pub internal_count: usize,
    pub output_count: usize,
}

impl SlotLayout {
    pub fn total(&self) -> usize {
        self.input_count + self.internal_count + self.output_count
    }

    pub fn class_of(&self, slot: SlotId) -> Option<SlotClass> {
        if slot < self.input_count {
            Some(SlotClass::ExternalInput)
        } else if slot < self.input_count + self.internal_count {
            Some(SlotClass::Internal)
        } else if slot < self.total() {
            Some(SlotClass::ExternalOutput)
        } else {
            None
        }
    }

    /// Index of an internal slot within the internal partition.
    pub fn internal_index(&self, slot: SlotId) -> Option<usize> {
        match self.class_of(slot)? {
            SlotClass::Internal => Some(slot - self.input_count),
            _ => None,
        }
    }

    /// Index of an external-output slot within the output partition.
    pub fn output_index(&self, slot: SlotId) -> Option<usize> {
        match self.class_of(slot)? {
            SlotClass::ExternalOutput => Some(slot - self.input_count - self.internal_count),
            _ => None,
        }
    }
}

/// The graph-scoped table resolving slot ids to tensors for one execute
/// call: caller-bound externals plus graph-owned internals.
pub struct SlotTable<'a> {
    pub(crate) layout: SlotLayout,
    pub(crate) inputs: &'a [&'a Tensor],
    pub(crate) internals: &'a [Option<Tensor>],
    pub(crate) outputs: &'a [&'a Tensor],
}

impl<'a> SlotTable<'a> {
    pub fn get(&self, slot: SlotId) -> Result<&'a Tensor, GraphError> {
        match self.layout.class_of(slot) {
            Some(SlotClass::ExternalInput) => Ok(self.inputs[slot]),
            Some(SlotClass::Internal) => self.internals[slot - self.layout.input_count]
                .as_ref()
                .ok_or(GraphError::UnboundSlot { slot }),
            Some(SlotClass::ExternalOutput) => {
                Ok(self.outputs[slot - self.layout.input_count - self.layout.internal_count])
            }
            None => Err(GraphError::UnboundSlot { slot }),
        }
    }
}
