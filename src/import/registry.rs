use std::path::Path;
use std::sync::Arc;

use super::error::ImportError;
use super::format::FormatPlugin;

/// Named formats, checked in registration order when sniffing.
#[derive(Default, Clone)]
pub struct FormatRegistry {
    formats: Vec<(String, Arc<dyn FormatPlugin>)>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a format, or replaces an existing one of the same name in place.
    pub fn register(&mut self, name: impl Into<String>, plugin: impl FormatPlugin + 'static) {
        let name = name.into();
        let plugin: Arc<dyn FormatPlugin> = Arc::new(plugin);
        match self.formats.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = plugin,
            None => self.formats.push((name, plugin)),
        }
    }

    /// Name of the first registered format whose sniff accepts the upload.
    pub fn resolve(&self, claimed_name: &str, actual_path: &Path) -> Result<&str, ImportError> {
        self.formats
            .iter()
            .find(|(_, plugin)| plugin.sniff(claimed_name, actual_path))
            .map(|(name, _)| name.as_str())
            .ok_or_else(|| ImportError::UnsupportedFormat {
                file_name: claimed_name.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FormatPlugin>> {
        self.formats
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, plugin)| plugin.clone())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.formats.iter().map(|(n, _)| n.as_str())
    }
}
