//! # Platform Collaborators
//!
//! The engine never talks to the host OS directly. Installed-app discovery
//! and widget refresh broadcasts go through the traits below so hosts (and
//! tests) can plug in their own implementations.

use std::collections::BTreeSet;

/// What the host knows about installed applications
pub trait AppCatalog: Send + Sync {
    /// Every installed package id
    fn installed_packages(&self) -> Vec<String>;

    /// Whether the package has an entry point the launcher can start
    fn is_launchable(&self, package_name: &str) -> bool;

    /// The package currently registered as the default home launcher
    fn home_launcher(&self) -> Option<String> {
        None
    }
}

/// Receiver of "redraw your widgets" broadcasts
pub trait WidgetNotifier: Send + Sync {
    fn refresh_widgets(&self);
}

/// Catalog backed by a fixed package list
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    launchable: BTreeSet<String>,
    hidden: BTreeSet<String>,
    home_launcher: Option<String>,
}

impl StaticCatalog {
    pub fn new<I, S>(launchable: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            launchable: launchable.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Add an installed package that has no launchable entry point
    pub fn with_hidden(mut self, package_name: impl Into<String>) -> Self {
        self.hidden.insert(package_name.into());
        self
    }

    pub fn with_home_launcher(mut self, package_name: impl Into<String>) -> Self {
        self.home_launcher = Some(package_name.into());
        self
    }
}

impl AppCatalog for StaticCatalog {
    fn installed_packages(&self) -> Vec<String> {
        self.launchable
            .iter()
            .chain(self.hidden.iter())
            .cloned()
            .collect()
    }

    fn is_launchable(&self, package_name: &str) -> bool {
        self.launchable.contains(package_name)
    }

    fn home_launcher(&self) -> Option<String> {
        self.home_launcher.clone()
    }
}

/// Catalog that treats every package it is asked about as launchable.
///
/// Used by the CLI, where there is no package manager to consult.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveCatalog;

impl AppCatalog for PermissiveCatalog {
    fn installed_packages(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_launchable(&self, package_name: &str) -> bool {
        !package_name.is_empty()
    }
}

/// Notifier that only logs the broadcast
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl WidgetNotifier for LogNotifier {
    fn refresh_widgets(&self) {
        log::info!("Widget refresh requested");
    }
}
