use {
    super::TestScript,
    knotline::{fatal, LineRawData},
    std::{collections::HashMap, sync::Arc},
};

pub type ScriptFactory = Box<dyn Fn() -> Arc<dyn TestScript> + Send + Sync>;
pub type ArgumentScriptFactory = Box<dyn Fn(&LineRawData) -> Arc<dyn TestScript> + Send + Sync>;

/// Maps script names to factories.
///
/// Slave harness components hold one of these: the master names a script
/// over the wire (plus argument data for the scripts that take it) and
/// the manager instantiates it. Asking for an unregistered script is a
/// protocol violation.
#[derive(Default)]
pub struct ScriptManager {
    no_argument: HashMap<String, ScriptFactory>,
    with_argument: HashMap<String, ArgumentScriptFactory>,
}

impl ScriptManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_script(&mut self, name: &str, factory: ScriptFactory) {
        self.no_argument.insert(name.to_string(), factory);
    }

    /// The factory receives the argument data with all wrappers (the
    /// RUNSCRIPT envelope and the script name) already stripped.
    pub fn add_argument_script(&mut self, name: &str, factory: ArgumentScriptFactory) {
        self.with_argument.insert(name.to_string(), factory);
    }

    pub fn get_script(&self, name: &str) -> Arc<dyn TestScript> {
        match self.no_argument.get(name) {
            Some(factory) => factory(),
            None => fatal!("could not find a script named {:?}", name),
        }
    }

    pub fn get_argument_script(&self, name: &str, argument: &LineRawData) -> Arc<dyn TestScript> {
        match self.with_argument.get(name) {
            Some(factory) => factory(argument),
            None => fatal!("could not find a script named {:?}", name),
        }
    }

    /// Which table the name lives in, if any.
    pub fn takes_argument(&self, name: &str) -> Option<bool> {
        if self.with_argument.contains_key(name) {
            Some(true)
        } else if self.no_argument.contains_key(name) {
            Some(false)
        } else {
            None
        }
    }
}
