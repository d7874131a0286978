use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::plugins::base::{CdcPlugin, FullLoadPlugin};
use crate::plugins::postgres::{PgDefaultCDCPlugin, PgDefaultFullLoadPlugin};

/// Capability a plugin provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    FullLoad,
    Cdc,
}

impl PluginKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginKind::FullLoad => "full load",
            PluginKind::Cdc => "cdc",
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered implementation of either capability.
#[derive(Debug, Clone)]
pub enum Plugin {
    FullLoad(Arc<dyn FullLoadPlugin>),
    Cdc(Arc<dyn CdcPlugin>),
}

impl Plugin {
    pub fn kind(&self) -> PluginKind {
        match self {
            Plugin::FullLoad(_) => PluginKind::FullLoad,
            Plugin::Cdc(_) => PluginKind::Cdc,
        }
    }
}

/// Name to implementation table, one namespace per [`PluginKind`].
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    full_load: BTreeMap<String, Arc<dyn FullLoadPlugin>>,
    cdc: BTreeMap<String, Arc<dyn CdcPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in plugins.
    pub fn with_known() -> Self {
        let mut registry = Self::new();
        registry.load_known();

        registry
    }

    /// Registers `plugin` under `name` in the namespace of its kind, replacing any previous
    /// plugin with that name.
    pub fn register(&mut self, name: impl Into<String>, plugin: Plugin) {
        let name = name.into();
        debug!(plugin = %name, kind = %plugin.kind(), "registering plugin");

        match plugin {
            Plugin::FullLoad(plugin) => {
                self.full_load.insert(name, plugin);
            }
            Plugin::Cdc(plugin) => {
                self.cdc.insert(name, plugin);
            }
        }
    }

    pub fn register_full_load<P>(&mut self, plugin: P)
    where
        P: FullLoadPlugin + 'static,
    {
        let name = plugin.name().to_string();
        self.register(name, Plugin::FullLoad(Arc::new(plugin)));
    }

    pub fn register_cdc<P>(&mut self, plugin: P)
    where
        P: CdcPlugin + 'static,
    {
        let name = plugin.name().to_string();
        self.register(name, Plugin::Cdc(Arc::new(plugin)));
    }

    /// Registers the built-in Postgres plugins. Names already taken are left untouched, so
    /// calling this more than once has no further effect.
    pub fn load_known(&mut self) {
        self.full_load
            .entry(PgDefaultFullLoadPlugin::NAME.to_string())
            .or_insert_with(|| Arc::new(PgDefaultFullLoadPlugin));
        self.cdc
            .entry(PgDefaultCDCPlugin::NAME.to_string())
            .or_insert_with(|| Arc::new(PgDefaultCDCPlugin));
    }

    pub fn resolve(&self, kind: PluginKind, name: &str) -> Option<Plugin> {
        match kind {
            PluginKind::FullLoad => self.full_load(name).map(Plugin::FullLoad),
            PluginKind::Cdc => self.cdc(name).map(Plugin::Cdc),
        }
    }

    pub fn full_load(&self, name: &str) -> Option<Arc<dyn FullLoadPlugin>> {
        self.full_load.get(name).cloned()
    }

    pub fn cdc(&self, name: &str) -> Option<Arc<dyn CdcPlugin>> {
        self.cdc.get(name).cloned()
    }

    /// Names registered for `kind`, sorted.
    pub fn names(&self, kind: PluginKind) -> Vec<String> {
        match kind {
            PluginKind::FullLoad => self.full_load.keys().cloned().collect(),
            PluginKind::Cdc => self.cdc.keys().cloned().collect(),
        }
    }
}
