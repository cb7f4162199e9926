use std::sync::Arc;
use std::time::Duration;

use stickenv::backends::virtual_input::{VirtualController, VirtualHandle};
use stickenv::backends::VIRTUAL;
use stickenv::{
    BackendCatalog, ControllerEnvironment, EnvironmentConfig, EnvironmentRegistry, InstanceId,
    LoggingListener,
};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // A virtual bus we can plug pads into while the registry is running.
    let bus = VirtualHandle::new();
    let mut catalog = BackendCatalog::with_builtins();
    {
        let bus = bus.clone();
        catalog.register(VIRTUAL, move |_| {
            Ok(Box::new(bus.environment()) as Box<dyn ControllerEnvironment>)
        });
    }

    let mut config = EnvironmentConfig::from_env();
    if config.backends.is_none() {
        config.backends = Some(VIRTUAL.to_string());
    }

    let mut registry = EnvironmentRegistry::new(config, catalog);
    registry.subscribe(Arc::new(LoggingListener::new()));
    let report = registry.initialize().expect("initialize registry");
    println!("Loaded backends: {:?}", report.loaded);
    for skipped in &report.skipped {
        println!("Skipped {}: {:?}", skipped.candidate, skipped.reason);
    }

    for tick in 0..6u64 {
        if tick % 2 == 0 {
            bus.attach(VirtualController::new(tick, &format!("Virtual Pad {tick}")));
        } else {
            bus.detach(InstanceId(tick - 1));
        }
        registry.update_controllers().expect("registry is ready");
        println!("{}", registry.snapshot().to_json().expect("serialize snapshot"));
        std::thread::sleep(Duration::from_millis(200));
    }

    registry.destroy().expect("destroy registry");
}
