//! Module composition.
//!
//! The application builds one shared registry, wires the sample modules
//! together and drives their lifecycles. Modules are enabled in
//! configuration order and disabled in reverse.

use bundle_runtime::{HandleRegistry, HostModule, LifecycleController, NativeModules};
use plugin_greeter::{CoreHooks, CoreModule, GreeterHooks, GreeterModule};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::AppConfig;

/// Registered handle types of one module, for `--dump-registry`.
#[derive(Debug, Serialize)]
pub struct ModuleRegistrations {
    pub plugin: String,
    pub state: bundle_runtime::LifecycleState,
    pub prefix: String,
    pub handles: Vec<String>,
}

pub struct Application {
    registry: Arc<HandleRegistry>,
    controllers: Vec<LifecycleController>,
}

impl Application {
    /// Builds the controllers described by `config`.
    pub fn compose(config: &AppConfig) -> Self {
        let registry = Arc::new(HandleRegistry::new());
        plugin_greeter::register_factories(&registry);

        let natives = Arc::new(NativeModules::with_libraries());
        let requirements = config.native_requirements();
        let data_root = config.data_root();

        let greeter: Arc<dyn HostModule> = Arc::new(GreeterModule::new(data_root.join("greeter")));
        let mut controllers = Vec::new();

        for name in &config.modules.enabled {
            let controller = match name.as_str() {
                "greeter" => LifecycleController::builder(greeter.clone(), registry.clone())
                    .hooks(GreeterHooks)
                    .natives(natives.clone(), requirements.clone())
                    .build(),
                "core" => {
                    let mut builder = LifecycleController::builder(
                        Arc::new(CoreModule::new(data_root.join("core"))),
                        registry.clone(),
                    )
                    .hooks(CoreHooks)
                    .natives(natives.clone(), requirements.clone());
                    if config.modules.chain_greeter_into_core && config.module_enabled("greeter") {
                        builder = builder.sibling(greeter.clone());
                    }
                    builder.build()
                }
                other => {
                    warn!("Skipping unknown module {}", other);
                    continue;
                }
            };
            controllers.push(controller);
        }

        info!("🧩 Composed {} modules under {}", controllers.len(), data_root.display());
        Self {
            registry,
            controllers,
        }
    }

    /// Enables every module in order. A failing module is logged and left
    /// disabled; the rest still start.
    pub fn enable_all(&self) -> usize {
        let mut enabled = 0;
        for controller in &self.controllers {
            match controller.enable() {
                Ok(()) => enabled += 1,
                Err(e) => error!("❌ {} failed to enable: {}", controller.host().declared_name(), e),
            }
        }
        info!("✅ {}/{} modules enabled", enabled, self.controllers.len());
        enabled
    }

    /// Runs the reload hook of every enabled module, in order.
    ///
    /// Returns how many reloads succeeded.
    pub fn reload_all(&self) -> usize {
        let mut reloaded = 0;
        for controller in self.controllers.iter().filter(|c| !c.is_disabled()) {
            match controller.reload() {
                Ok(()) => reloaded += 1,
                Err(e) => error!("❌ {} failed to reload: {}", controller.host().declared_name(), e),
            }
        }
        info!("🔄 Reloaded {} modules", reloaded);
        reloaded
    }

    /// Disables enabled modules in reverse order.
    pub fn disable_all(&self) {
        for controller in self.controllers.iter().rev() {
            if controller.is_disabled() {
                continue;
            }
            if let Err(e) = controller.disable() {
                error!("❌ {} failed to disable cleanly: {}", controller.host().declared_name(), e);
            }
        }
    }

    pub fn registrations(&self) -> Vec<ModuleRegistrations> {
        self.controllers
            .iter()
            .map(|controller| ModuleRegistrations {
                plugin: controller.host().declared_name().to_string(),
                state: controller.state(),
                prefix: controller.prefix().to_string(),
                handles: self
                    .registry
                    .handled_types_of(&controller.id())
                    .iter()
                    .map(|type_ref| type_ref.short_name().to_string())
                    .collect(),
            })
            .collect()
    }

    /// The registry as pretty JSON, keyed by module name.
    pub fn registry_json(&self) -> serde_json::Result<String> {
        let by_name: BTreeMap<String, ModuleRegistrations> = self
            .registrations()
            .into_iter()
            .map(|entry| (entry.plugin.clone(), entry))
            .collect();
        serde_json::to_string_pretty(&by_name)
    }

    pub fn controllers(&self) -> &[LifecycleController] {
        &self.controllers
    }
}
