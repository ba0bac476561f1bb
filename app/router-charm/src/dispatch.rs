use std::path::Path;

use router_charm_core::charm::settings::CharmSettings;

/// Hook kinds the charm knows, before relation data is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookKind {
    Install,
    Remove,
    ContainerReady,
    RelationChanged,
    /// Delivered but not handled, e.g. `start` or `config-changed`.
    Ignored(String),
}

/// Resolves `hooks/<name>` (or a bare hook name) against the charm settings.
pub fn parse_dispatch_path(path: &str, settings: &CharmSettings) -> HookKind {
    let hook = Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path);

    if hook == "install" {
        return HookKind::Install;
    }

    if hook == "remove" {
        return HookKind::Remove;
    }

    if hook == format!("{}-pebble-ready", settings.container_name) {
        return HookKind::ContainerReady;
    }

    if hook == format!("{}-relation-changed", settings.relation_name) {
        return HookKind::RelationChanged;
    }

    HookKind::Ignored(hook.to_owned())
}
