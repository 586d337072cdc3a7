//! Assignments: bindings of application parameters to device actuators.
//!
//! Each device owns a fixed-size table of [`CC_MAX_ASSIGNMENTS`] slots; an
//! assignment's id is its slot index, so ids are only unique per device and
//! are reused once freed. The table is allocated the first time something is
//! assigned to the device.
//!
//! The engine operations live on [`DeviceRegistry`] because every one of them
//! needs the owning device's actuator bookkeeping in the same breath:
//! adding bumps the actuator's `assignments_count`, removing drops it.
//!
//! ## List browsing
//! List-valued assignments (mode [`Mode::OPTIONS`]) may hold more items than a
//! device display can show. [`update_list_window`] keeps an *enumeration frame*
//! `[enumeration_frame_min, enumeration_frame_max)` around the selected item;
//! only that slice is sent to the device.

use crate::device::{DeviceId, Mode};
use crate::error::AssignmentError;
use crate::registry::DeviceRegistry;
use log::debug;
use serde::{Deserialize, Serialize};

/// Per-device assignment id (slot index).
pub type AssignmentId = u8;

/// Actuator index within a device (all pages).
pub type ActuatorId = u8;

/// Slots in each device's assignment table.
pub const CC_MAX_ASSIGNMENTS: usize = AssignmentId::MAX as usize + 1;

/// Longest list an assignment frame can address with one-byte indices.
pub const CC_MAX_LIST_ITEMS: usize = u8::MAX as usize;

/// Longest label, unit or item label the wire format carries.
pub const CC_MAX_STRING_LEN: usize = u8::MAX as usize;

/// One entry of a list-valued assignment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub label: String,
    pub value: f32,
}

impl Item {
    pub fn new(label: impl Into<String>, value: f32) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// A parameter bound to an actuator.
///
/// Callers fill one in and pass it to [`DeviceRegistry::add_assignment`]; the
/// engine stores its own copy and ignores the caller's `id`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub device_id: DeviceId,
    pub actuator_id: ActuatorId,
    pub label: String,
    pub value: f32,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub mode: Mode,
    pub steps: u16,
    pub unit: String,
    /// Partner assignment when two actuators form one control.
    pub assignment_pair_id: Option<AssignmentId>,
    pub list_items: Vec<Item>,
    pub list_index: usize,
    pub enumeration_frame_min: usize,
    pub enumeration_frame_max: usize,
}

impl Assignment {
    pub fn new(device_id: DeviceId, actuator_id: ActuatorId, label: impl Into<String>) -> Self {
        Self {
            device_id,
            actuator_id,
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn list_count(&self) -> usize {
        self.list_items.len()
    }

    /// Browsed as a list: options mode with at least one item.
    pub fn is_list(&self) -> bool {
        self.mode.contains(Mode::OPTIONS) && !self.list_items.is_empty()
    }

    /// Items inside the current enumeration frame.
    pub fn visible_items(&self) -> &[Item] {
        let max = self.enumeration_frame_max.min(self.list_items.len());
        let min = self.enumeration_frame_min.min(max);
        &self.list_items[min..max]
    }

    /// Index of the first item whose value equals `value`.
    pub fn index_of_value(&self, value: f32) -> Option<usize> {
        self.list_items.iter().position(|item| item.value == value)
    }
}

/// Identifies an assignment for removal or lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentKey {
    pub id: AssignmentId,
    pub device_id: DeviceId,
}

/// Host-initiated value change.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetValue {
    pub device_id: DeviceId,
    pub assignment_id: AssignmentId,
    pub actuator_id: ActuatorId,
    pub value: f32,
}

/// A device's assignment slots.
#[derive(Clone, Debug)]
pub struct AssignmentTable {
    slots: Vec<Option<Assignment>>,
}

impl Default for AssignmentTable {
    fn default() -> Self {
        Self {
            slots: vec![None; CC_MAX_ASSIGNMENTS],
        }
    }
}

impl AssignmentTable {
    pub fn get(&self, id: AssignmentId) -> Option<&Assignment> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: AssignmentId) -> Option<&mut Assignment> {
        self.slots.get_mut(id as usize).and_then(Option::as_mut)
    }

    /// Live assignments.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.slots.iter().flatten()
    }

    fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }
}

/// Recompute the enumeration frame around `index`.
///
/// `frame_item_count` is the device's window size `W`. The window is centred
/// on the selection (`W / 2` items either side) and slid back inside
/// `[0, list_count)` at either edge. When the list is shorter than `W` the
/// frame is the whole list. An out-of-range index is clamped to the last item.
pub fn update_list_window(assignment: &mut Assignment, frame_item_count: usize, index: usize) {
    let count = assignment.list_items.len() as i64;
    if count == 0 {
        assignment.list_index = 0;
        assignment.enumeration_frame_min = 0;
        assignment.enumeration_frame_max = 0;
        return;
    }

    let index = (index as i64).min(count - 1);
    let width = frame_item_count as i64;
    let half = width / 2;

    let mut min = index - half;
    let mut max = index + half + 1;

    if min < 0 {
        min = 0;
        max = width;
        if max > count {
            max = count;
        }
    } else if max > count {
        max = count;
        min = max - width;
        if min < 0 {
            min = 0;
        }
    }

    assignment.list_index = index as usize;
    assignment.enumeration_frame_min = min as usize;
    assignment.enumeration_frame_max = max as usize;
}

/// Refuse data the assignment frame could only carry truncated.
fn check_wire_limits(assignment: &Assignment) -> Result<(), AssignmentError> {
    let device_id = assignment.device_id;
    let count = assignment.list_items.len();
    if count > CC_MAX_LIST_ITEMS {
        return Err(AssignmentError::ListTooLong { device_id, count });
    }

    let strings = [("label", &assignment.label), ("unit", &assignment.unit)]
        .into_iter()
        .chain(assignment.list_items.iter().map(|item| ("item label", &item.label)));
    for (field, s) in strings {
        if s.len() > CC_MAX_STRING_LEN {
            return Err(AssignmentError::StringTooLong {
                device_id,
                field,
                len: s.len(),
            });
        }
    }
    Ok(())
}

impl DeviceRegistry {
    /// Store a copy of `assignment` and bind it to its actuator.
    ///
    /// Returns the slot index, which becomes the stored copy's id. A list
    /// assignment starts on the item matching its `value` (or the first item).
    pub fn add_assignment(&mut self, assignment: &Assignment) -> Result<AssignmentId, AssignmentError> {
        let device_id = assignment.device_id;
        let actuator_id = assignment.actuator_id;
        let device = self
            .get_mut(device_id)
            .ok_or(AssignmentError::UnknownDevice(device_id))?;

        if actuator_id as usize >= device.total_actuators() {
            return Err(AssignmentError::InvalidActuator {
                device_id,
                actuator_id,
            });
        }

        check_wire_limits(assignment)?;

        let frame_item_count = device.enumeration_frame_item_count as usize;
        let table = device.assignments.get_or_insert_with(AssignmentTable::default);

        let actuator = device
            .actuators
            .get_mut(actuator_id as usize)
            .ok_or(AssignmentError::InvalidActuator {
                device_id,
                actuator_id,
            })?;
        if actuator.is_full() {
            return Err(AssignmentError::ActuatorCapacityExceeded {
                device_id,
                actuator_id,
            });
        }

        let slot = table
            .first_free()
            .ok_or(AssignmentError::AssignmentCapacityExceeded(device_id))?;

        let mut stored = assignment.clone();
        stored.id = slot as AssignmentId;
        if stored.is_list() {
            let index = stored.index_of_value(stored.value).unwrap_or(0);
            update_list_window(&mut stored, frame_item_count, index);
        }

        debug!(
            "device {device_id}: assignment {slot} '{}' -> actuator {actuator_id}",
            stored.label
        );
        table.slots[slot] = Some(stored);
        actuator.assignments_count += 1;

        Ok(slot as AssignmentId)
    }

    /// Release an assignment and unbind it from its actuator.
    pub fn remove_assignment(
        &mut self,
        device_id: DeviceId,
        assignment_id: AssignmentId,
    ) -> Result<AssignmentId, AssignmentError> {
        let not_found = AssignmentError::NotFound {
            device_id,
            assignment_id,
        };
        let device = self.get_mut(device_id).ok_or(not_found.clone())?;
        let removed = device
            .assignments
            .as_mut()
            .and_then(|table| table.slots.get_mut(assignment_id as usize))
            .and_then(Option::take)
            .ok_or(not_found)?;

        if let Some(actuator) = device.actuators.get_mut(removed.actuator_id as usize) {
            actuator.assignments_count = actuator.assignments_count.saturating_sub(1);
        }

        debug!("device {device_id}: assignment {assignment_id} removed");
        Ok(assignment_id)
    }

    pub fn assignment(&self, device_id: DeviceId, assignment_id: AssignmentId) -> Option<&Assignment> {
        self.get(device_id)?.assignments.as_ref()?.get(assignment_id)
    }

    pub fn assignment_mut(
        &mut self,
        device_id: DeviceId,
        assignment_id: AssignmentId,
    ) -> Option<&mut Assignment> {
        self.get_mut(device_id)?
            .assignments
            .as_mut()?
            .get_mut(assignment_id)
    }

    /// First assignment bound to `actuator_id`. Actuators that take several
    /// assignments need [`AssignmentTable::iter`] to see the rest.
    pub fn assignment_by_actuator(
        &self,
        device_id: DeviceId,
        actuator_id: ActuatorId,
    ) -> Option<&Assignment> {
        self.get(device_id)?
            .assignments
            .as_ref()?
            .iter()
            .find(|a| a.actuator_id == actuator_id)
    }

    pub fn check_assignment(&self, device_id: DeviceId, assignment_id: AssignmentId) -> bool {
        self.assignment(device_id, assignment_id).is_some()
    }

    /// Link an assignment to its partner. `false` if it does not exist.
    pub fn set_pair_id(
        &mut self,
        device_id: DeviceId,
        assignment_id: AssignmentId,
        pair_id: AssignmentId,
    ) -> bool {
        match self.assignment_mut(device_id, assignment_id) {
            Some(assignment) => {
                assignment.assignment_pair_id = Some(pair_id);
                true
            }
            None => false,
        }
    }

    /// Move a list assignment's selection and refresh its window.
    pub fn update_list(
        &mut self,
        device_id: DeviceId,
        assignment_id: AssignmentId,
        index: usize,
    ) -> Result<&Assignment, AssignmentError> {
        let device = self
            .get_mut(device_id)
            .ok_or(AssignmentError::UnknownDevice(device_id))?;
        let frame_item_count = device.enumeration_frame_item_count as usize;
        let assignment = device
            .assignments
            .as_mut()
            .and_then(|table| table.get_mut(assignment_id))
            .ok_or(AssignmentError::NotFound {
                device_id,
                assignment_id,
            })?;

        update_list_window(assignment, frame_item_count, index);
        if let Some(item) = assignment.list_items.get(assignment.list_index) {
            assignment.value = item.value;
        }
        Ok(assignment)
    }
}
