//! The process-wide table of device and manager factories.
//!
//! Plug-ins register a named constructor and the schema of options it
//! accepts, once, at startup; configuration loaders and the inventory's
//! restore path then construct devices by name. Registration is immutable
//! after startup, so lookups only ever take the read side of the lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;
use thiserror::Error;

use super::{Device, Manager};

/// Declaration of one configuration option a factory accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceOption {
    pub description: String,
    /// Filled in for options the caller leaves unset.
    pub default: String,
    pub required: bool,
}

/// Option name to declaration, fixed at registration time.
pub type OptionSchema = HashMap<String, DeviceOption>;

type DeviceCtor = Arc<dyn Fn(&HashMap<String, String>) -> anyhow::Result<Arc<dyn Device>> + Send + Sync>;
type ManagerCtor =
    Arc<dyn Fn(&HashMap<String, String>) -> anyhow::Result<Arc<dyn Manager>> + Send + Sync>;

struct Factory<C> {
    ctor: C,
    options: OptionSchema,
}

lazy_static! {
    static ref DEVICES: RwLock<HashMap<String, Factory<DeviceCtor>>> = RwLock::new(HashMap::new());
    static ref MANAGERS: RwLock<HashMap<String, Factory<ManagerCtor>>> =
        RwLock::new(HashMap::new());
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no device factory named \"{0}\" is registered")]
    UnknownDevice(String),
    #[error("no manager factory named \"{0}\" is registered")]
    UnknownManager(String),
    #[error("factory \"{0}\" is already registered with conflicting options")]
    ConflictingRegistration(String),
    #[error("unknown option \"{option}\" for factory \"{name}\"")]
    UnknownOption { name: String, option: String },
    #[error("required option \"{option}\" not provided for factory \"{name}\"")]
    MissingRequiredOption { name: String, option: String },
    #[error("factory \"{name}\" failed to construct: {error}")]
    Constructor { name: String, error: anyhow::Error },
}

/// Registers a device factory under `name`.
///
/// Re-registering the same name with an identical option schema is a no-op;
/// a conflicting schema is an error.
pub fn register_device<F>(name: &str, ctor: F, options: OptionSchema) -> Result<(), RegistryError>
where
    F: Fn(&HashMap<String, String>) -> anyhow::Result<Arc<dyn Device>> + Send + Sync + 'static,
{
    let mut devices = DEVICES.write().expect("device factory table poisoned");
    register(&mut devices, name, Arc::new(ctor) as DeviceCtor, options)
}

/// Registers a manager factory under `name`; same semantics as
/// [`register_device`].
pub fn register_manager<F>(name: &str, ctor: F, options: OptionSchema) -> Result<(), RegistryError>
where
    F: Fn(&HashMap<String, String>) -> anyhow::Result<Arc<dyn Manager>> + Send + Sync + 'static,
{
    let mut managers = MANAGERS.write().expect("manager factory table poisoned");
    register(&mut managers, name, Arc::new(ctor) as ManagerCtor, options)
}

fn register<C>(
    table: &mut HashMap<String, Factory<C>>,
    name: &str,
    ctor: C,
    options: OptionSchema,
) -> Result<(), RegistryError> {
    if let Some(existing) = table.get(name) {
        if existing.options == options {
            return Ok(());
        }
        return Err(RegistryError::ConflictingRegistration(name.to_string()));
    }
    table.insert(name.to_string(), Factory { ctor, options });
    Ok(())
}

/// Constructs a device from the factory registered under `name`, after
/// validating `options` against the factory's schema.
pub fn create_device(
    name: &str,
    options: &HashMap<String, String>,
) -> Result<Arc<dyn Device>, RegistryError> {
    let (ctor, schema) = {
        let devices = DEVICES.read().expect("device factory table poisoned");
        let factory = devices
            .get(name)
            .ok_or_else(|| RegistryError::UnknownDevice(name.to_string()))?;
        (Arc::clone(&factory.ctor), factory.options.clone())
    };
    let sanitized = sanitized_options(name, &schema, options)?;
    ctor(&sanitized).map_err(|error| RegistryError::Constructor {
        name: name.to_string(),
        error,
    })
}

/// Constructs a manager from the factory registered under `name`.
pub fn create_manager(
    name: &str,
    options: &HashMap<String, String>,
) -> Result<Arc<dyn Manager>, RegistryError> {
    let (ctor, schema) = {
        let managers = MANAGERS.read().expect("manager factory table poisoned");
        let factory = managers
            .get(name)
            .ok_or_else(|| RegistryError::UnknownManager(name.to_string()))?;
        (Arc::clone(&factory.ctor), factory.options.clone())
    };
    let sanitized = sanitized_options(name, &schema, options)?;
    ctor(&sanitized).map_err(|error| RegistryError::Constructor {
        name: name.to_string(),
        error,
    })
}

/// Rejects undeclared options, requires the required ones, and fills in
/// declared defaults for the rest.
fn sanitized_options(
    name: &str,
    schema: &OptionSchema,
    provided: &HashMap<String, String>,
) -> Result<HashMap<String, String>, RegistryError> {
    for option in provided.keys() {
        if !schema.contains_key(option) {
            return Err(RegistryError::UnknownOption {
                name: name.to_string(),
                option: option.clone(),
            });
        }
    }

    let mut sanitized = provided.clone();
    for (option, declaration) in schema {
        if sanitized.contains_key(option) {
            continue;
        }
        if declaration.required {
            return Err(RegistryError::MissingRequiredOption {
                name: name.to_string(),
                option: option.clone(),
            });
        }
        sanitized.insert(option.clone(), declaration.default.clone());
    }
    Ok(sanitized)
}

/// The names of all registered device factories, sorted for help output.
pub fn registered_devices() -> Vec<String> {
    let devices = DEVICES.read().expect("device factory table poisoned");
    let mut names: Vec<String> = devices.keys().cloned().collect();
    names.sort();
    names
}

/// The names of all registered manager factories, sorted for help output.
pub fn registered_managers() -> Vec<String> {
    let managers = MANAGERS.read().expect("manager factory table poisoned");
    let mut names: Vec<String> = managers.keys().cloned().collect();
    names.sort();
    names
}

/// The option schema of the device factory registered under `name`.
pub fn option_help(name: &str) -> Result<OptionSchema, RegistryError> {
    let devices = DEVICES.read().expect("device factory table poisoned");
    devices
        .get(name)
        .map(|factory| factory.options.clone())
        .ok_or_else(|| RegistryError::UnknownDevice(name.to_string()))
}

/// The option schema of the manager factory registered under `name`.
pub fn manager_option_help(name: &str) -> Result<OptionSchema, RegistryError> {
    let managers = MANAGERS.read().expect("manager factory table poisoned");
    managers
        .get(name)
        .map(|factory| factory.options.clone())
        .ok_or_else(|| RegistryError::UnknownManager(name.to_string()))
}
