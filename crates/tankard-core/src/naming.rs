//! User-facing item aliases.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::Deserialize;

use crate::ports::NameResolver;
use crate::quality::QualityLevel;
use crate::{CoreError, Result};

#[derive(Debug, Default, Deserialize)]
struct AliasFile {
    /// public alias -> internal name
    #[serde(default)]
    aliases: HashMap<String, String>,
}

/// Alias table backed by a JSON file, hot-swapped on `reload`.
pub struct AliasNameResolver {
    path: Option<PathBuf>,
    aliases: RwLock<HashMap<String, String>>,
}

impl AliasNameResolver {
    /// Empty resolver: every public name falls through to itself.
    pub fn empty() -> Self {
        Self {
            path: None,
            aliases: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let resolver = Self {
            path: Some(path.into()),
            aliases: RwLock::new(HashMap::new()),
        };
        resolver.reload()?;
        Ok(resolver)
    }

    #[cfg(test)]
    fn with_aliases(aliases: HashMap<String, String>) -> Self {
        Self {
            path: None,
            aliases: RwLock::new(aliases),
        }
    }
}

impl NameResolver for AliasNameResolver {
    fn resolve_public_name(&self, public: &str) -> Option<String> {
        self.aliases
            .read()
            .expect("alias table lock poisoned")
            .get(public)
            .cloned()
    }

    fn display_name(&self, internal: &str, quality: QualityLevel) -> String {
        // Strip the machine prefix and title-case the remainder.
        let bare = internal
            .rsplit_once('_')
            .map(|(_, tail)| tail)
            .unwrap_or(internal);
        let mut chars = bare.chars();
        let titled = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
        if quality == QualityLevel::Common {
            titled
        } else {
            format!("{} {}", quality.as_str(), titled)
        }
    }

    fn reload(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("failed to read alias file: {e}")))?;
        let parsed: AliasFile = serde_json::from_str(&content)
            .map_err(|e| CoreError::Config(format!("failed to parse alias file: {e}")))?;

        let mut aliases = self.aliases.write().expect("alias table lock poisoned");
        *aliases = parsed.aliases;
        Ok(())
    }
}
