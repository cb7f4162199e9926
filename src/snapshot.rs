//! Point-in-time view of the attached controllers.
//!
//! [`Snapshot`] is an **owned**, read-only copy of the registry's canonical map,
//! taken under the same lock every registry write uses, so it never shows half
//! of a synchronization cycle. It is cheap to clone for fan-out and serialises
//! to JSON for diagnostics.
//!
//! # Examples
//! ```no_run
//! use stickenv::EnvironmentRegistry;
//!
//! let mut registry = EnvironmentRegistry::default();
//! registry.initialize().expect("initialize");
//! for info in registry.snapshot().iter() {
//!     println!("{} {} {:?}", info.id, info.name, info.meta.vid_pid());
//! }
//! ```

use std::collections::BTreeMap;

use serde::Serialize;

use crate::controller::{ControllerRef, InstanceId};
use crate::metadata::ControllerMeta;

/// Owned description of one attached controller.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ControllerInfo {
    pub id: InstanceId,
    pub name: String,
    pub meta: ControllerMeta,
}

impl From<&ControllerRef> for ControllerInfo {
    fn from(controller: &ControllerRef) -> Self {
        Self {
            id: controller.instance_id(),
            name: controller.name().to_string(),
            meta: controller.meta(),
        }
    }
}

/// Attached controllers keyed (and ordered) by instance id.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot(pub BTreeMap<InstanceId, ControllerInfo>);

impl Snapshot {
    #[inline]
    pub fn get(&self, id: InstanceId) -> Option<&ControllerInfo> {
        self.0.get(&id)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &ControllerInfo> {
        self.0.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> Vec<InstanceId> {
        self.0.keys().copied().collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    #[inline]
    pub fn into_inner(self) -> BTreeMap<InstanceId, ControllerInfo> {
        self.0
    }
}

impl<'a> FromIterator<&'a ControllerRef> for Snapshot {
    fn from_iter<I: IntoIterator<Item = &'a ControllerRef>>(iter: I) -> Self {
        Snapshot(
            iter.into_iter()
                .map(|c| (c.instance_id(), ControllerInfo::from(c)))
                .collect(),
        )
    }
}
