//! Language descriptors: how each registered language is built and run
//!
//! A descriptor is pure data. Adding a language means adding a descriptor
//! (built in here, or in the `languages.definitions` section of the config),
//! never a new branch in the pipeline. Commands are argv templates rendered
//! against the in-sandbox source location.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Placeholder replaced by the full in-sandbox source path, extension included.
pub const SOURCE_PLACEHOLDER: &str = "{source}";
/// Placeholder replaced by the in-sandbox source base path, without extension.
pub const BINARY_PLACEHOLDER: &str = "{binary}";

/// One command as an argv list; items may contain placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(pub Vec<String>);

impl CommandTemplate {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(argv.into_iter().map(Into::into).collect())
    }

    /// Renders the template for a source staged at `<base_path>.<extension>`.
    pub fn render(&self, base_path: &str, extension: &str) -> Vec<String> {
        let source = format!("{}.{}", base_path, extension);
        self.0
            .iter()
            .map(|arg| {
                arg.replace(SOURCE_PLACEHOLDER, &source)
                    .replace(BINARY_PLACEHOLDER, base_path)
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageDescriptor {
    pub id: String,
    /// File extension of the staged source; the id when omitted.
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub build: Vec<CommandTemplate>,
    pub run: CommandTemplate,
}

impl LanguageDescriptor {
    pub fn interpreted(id: &str, run: CommandTemplate) -> Self {
        Self {
            id: id.to_string(),
            extension: None,
            build: Vec::new(),
            run,
        }
    }

    pub fn compiled(id: &str, build: CommandTemplate, run: CommandTemplate) -> Self {
        Self {
            id: id.to_string(),
            extension: None,
            build: vec![build],
            run,
        }
    }

    pub fn extension(&self) -> &str {
        self.extension.as_deref().unwrap_or(&self.id)
    }

    /// File name the source is staged under, e.g. `main.cpp`.
    pub fn source_filename(&self, base_filename: &str) -> String {
        format!("{}.{}", base_filename, self.extension())
    }

    pub fn build_commands(&self, base_path: &str) -> Vec<Vec<String>> {
        self.build
            .iter()
            .map(|template| template.render(base_path, self.extension()))
            .collect()
    }

    pub fn run_command(&self, base_path: &str) -> Vec<String> {
        self.run.render(base_path, self.extension())
    }
}

/// The descriptors shipped with the service.
pub fn builtin_descriptors() -> Vec<LanguageDescriptor> {
    vec![
        LanguageDescriptor::compiled(
            "c",
            CommandTemplate::new(["gcc", SOURCE_PLACEHOLDER, "-o", BINARY_PLACEHOLDER]),
            CommandTemplate::new([BINARY_PLACEHOLDER]),
        ),
        LanguageDescriptor::compiled(
            "cpp",
            CommandTemplate::new(["g++", SOURCE_PLACEHOLDER, "-o", BINARY_PLACEHOLDER]),
            CommandTemplate::new([BINARY_PLACEHOLDER]),
        ),
        LanguageDescriptor::interpreted("js", CommandTemplate::new(["node", SOURCE_PLACEHOLDER])),
        LanguageDescriptor::interpreted("py", CommandTemplate::new(["python", SOURCE_PLACEHOLDER])),
    ]
}

/// Ids enabled when the configuration does not list any.
pub fn default_allowed_languages() -> Vec<String> {
    builtin_descriptors().into_iter().map(|d| d.id).collect()
}

/// Read-only table of the languages this process accepts.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    order: Vec<String>,
    descriptors: HashMap<String, Arc<LanguageDescriptor>>,
}

impl LanguageRegistry {
    /// Builds the registry from the built-ins overlaid with `definitions`,
    /// restricted to `allowed`.
    pub fn new(
        allowed: &[String],
        definitions: &[LanguageDescriptor],
    ) -> Result<Self, ConfigError> {
        let mut known: HashMap<String, LanguageDescriptor> = builtin_descriptors()
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        for definition in definitions {
            if definition.id.trim().is_empty() {
                return Err(ConfigError::invalid("Language definition with an empty id"));
            }
            if known.insert(definition.id.clone(), definition.clone()).is_some() {
                log::info!("Language '{}' overridden by configuration", definition.id);
            }
        }

        let mut order = Vec::with_capacity(allowed.len());
        let mut descriptors = HashMap::with_capacity(allowed.len());
        for id in allowed {
            if descriptors.contains_key(id) {
                continue;
            }
            let descriptor = known.remove(id).ok_or_else(|| {
                ConfigError::invalid(format!("No descriptor registered for language '{}'", id))
            })?;
            if descriptor.run.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "Language '{}' has an empty run command",
                    id
                )));
            }
            if descriptor.build.iter().any(CommandTemplate::is_empty) {
                return Err(ConfigError::invalid(format!(
                    "Language '{}' has an empty build command",
                    id
                )));
            }
            order.push(id.clone());
            descriptors.insert(id.clone(), Arc::new(descriptor));
        }

        Ok(Self { order, descriptors })
    }

    pub fn builtin() -> Self {
        let allowed = default_allowed_languages();
        let descriptors = builtin_descriptors()
            .into_iter()
            .map(|d| (d.id.clone(), Arc::new(d)))
            .collect();
        Self {
            order: allowed,
            descriptors,
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<LanguageDescriptor>> {
        self.descriptors.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.descriptors.contains_key(id)
    }

    /// Registered ids in configuration order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_builtin_registry_lists_reference_languages() {
        let registry = LanguageRegistry::builtin();
        assert_eq!(registry.ids(), ids(&["c", "cpp", "js", "py"]).as_slice());
        assert!(registry.contains("py"));
        assert!(!registry.contains("rb"));
    }

    #[test]
    fn test_compiled_language_renders_build_and_run() {
        let registry = LanguageRegistry::builtin();
        let c = registry.get("c").unwrap();

        assert_eq!(
            c.build_commands("/sandbox/main"),
            vec![vec!["gcc", "/sandbox/main.c", "-o", "/sandbox/main"]]
        );
        assert_eq!(c.run_command("/sandbox/main"), vec!["/sandbox/main"]);
        assert_eq!(c.source_filename("main"), "main.c");
    }

    #[test]
    fn test_interpreted_language_has_no_build_step() {
        let registry = LanguageRegistry::builtin();
        let py = registry.get("py").unwrap();

        assert!(py.build_commands("/sandbox/main").is_empty());
        assert_eq!(py.run_command("/sandbox/main"), vec!["python", "/sandbox/main.py"]);
    }

    #[test]
    fn test_allowed_list_restricts_and_orders_registry() {
        let registry = LanguageRegistry::new(&ids(&["py", "c"]), &[]).unwrap();
        assert_eq!(registry.ids(), ids(&["py", "c"]).as_slice());
        assert!(!registry.contains("js"));
    }

    #[test]
    fn test_custom_definition_adds_language() {
        let ruby = LanguageDescriptor {
            id: "ruby".to_string(),
            extension: Some("rb".to_string()),
            build: Vec::new(),
            run: CommandTemplate::new(["ruby", SOURCE_PLACEHOLDER]),
        };
        let registry = LanguageRegistry::new(&ids(&["ruby"]), &[ruby]).unwrap();
        let descriptor = registry.get("ruby").unwrap();

        assert_eq!(descriptor.source_filename("main"), "main.rb");
        assert_eq!(descriptor.run_command("/w/main"), vec!["ruby", "/w/main.rb"]);
    }

    #[test]
    fn test_unknown_allowed_language_is_rejected() {
        let err = LanguageRegistry::new(&ids(&["c", "cobol"]), &[]).unwrap_err();
        assert!(err.to_string().contains("cobol"));
    }

    #[test]
    fn test_empty_run_command_is_rejected() {
        let broken = LanguageDescriptor::interpreted("sh", CommandTemplate(Vec::new()));
        assert!(LanguageRegistry::new(&ids(&["sh"]), &[broken]).is_err());
    }
}
