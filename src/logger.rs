use crate::controller::ControllerRef;
use crate::listener::ControllerListener;

/// A simple listener that logs every attach/detach through `tracing`.
#[derive(Debug, Default)]
pub struct LoggingListener;

impl LoggingListener {
    pub fn new() -> Self {
        LoggingListener
    }
}

impl ControllerListener for LoggingListener {
    fn controller_added(&self, controller: &ControllerRef) {
        tracing::info!(
            target: "stickenv::events",
            id = %controller.instance_id(),
            name = controller.name(),
            "controller attached"
        );
    }

    fn controller_removed(&self, controller: &ControllerRef) {
        tracing::info!(
            target: "stickenv::events",
            id = %controller.instance_id(),
            name = controller.name(),
            "controller detached"
        );
    }
}
