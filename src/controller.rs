//! Controller references.
//!
//! A [`Controller`] is produced and owned by the backend that discovered it. The
//! registry only holds shared, read-only [`ControllerRef`]s for as long as the
//! controller is attached, keyed by its [`InstanceId`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::metadata::ControllerMeta;

/// Stable identifier of one attached controller instance.
///
/// Backends must keep the id stable for the controller's attached lifetime; it
/// is the key of the registry's canonical map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub u64);

impl From<u64> for InstanceId {
    fn from(value: u64) -> Self {
        InstanceId(value)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub trait Controller: Send + Sync {
    fn instance_id(&self) -> InstanceId;
    fn name(&self) -> &str;

    /// Descriptive metadata. Backends that know nothing beyond a name can keep the default.
    fn meta(&self) -> ControllerMeta {
        ControllerMeta::default()
    }
}

/// Shared handle to a backend-owned controller.
pub type ControllerRef = Arc<dyn Controller>;

impl fmt::Debug for dyn Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("id", &self.instance_id())
            .field("name", &self.name())
            .finish()
    }
}
