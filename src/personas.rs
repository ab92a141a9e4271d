//! Persona file store.
//!
//! Personas live in one JSON or YAML file holding a list of persona records. The
//! format follows the file extension.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{FoundryError, Result};
use crate::models::Persona;
use crate::validation::InputValidator;

/// On-disk format of a persona file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonaFormat {
    Json,
    Yaml,
}

impl PersonaFormat {
    /// Pick the format from the file extension, JSON unless it is `.yaml`/`.yml`
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase) {
            Some(ext) if ext == "yaml" || ext == "yml" => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// Personas loaded from a file
#[derive(Debug, Clone)]
pub struct PersonaStore {
    path: PathBuf,
    personas: Vec<Persona>,
}

impl PersonaStore {
    /// Load personas from `path`. A missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            debug!(path = %path.display(), "Persona file not found, starting empty");
            return Ok(Self {
                path,
                personas: Vec::new(),
            });
        }

        let raw = fs::read_to_string(&path)?;
        let personas: Vec<Persona> = if raw.trim().is_empty() {
            Vec::new()
        } else {
            match PersonaFormat::for_path(&path) {
                PersonaFormat::Json => serde_json::from_str(&raw)?,
                PersonaFormat::Yaml => serde_yaml::from_str(&raw)?,
            }
        };
        info!(path = %path.display(), count = personas.len(), "Loaded personas");
        Ok(Self { path, personas })
    }

    /// Write every persona back to the store's file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let body = match PersonaFormat::for_path(&self.path) {
            PersonaFormat::Json => serde_json::to_string_pretty(&self.personas)?,
            PersonaFormat::Yaml => serde_yaml::to_string(&self.personas)?,
        };
        fs::write(&self.path, body)?;
        debug!(path = %self.path.display(), count = self.personas.len(), "Saved personas");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn list(&self) -> &[Persona] {
        &self.personas
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// Add a persona after validating it.
    ///
    /// Only one persona may be the self persona.
    pub fn add(&mut self, persona: Persona) -> Result<&Persona> {
        InputValidator::validate_persona(&persona)?;
        if self.personas.iter().any(|p| p.id == persona.id) {
            return Err(FoundryError::validation(format!("Persona {} already exists", persona.id)));
        }
        if persona.is_self {
            if let Some(existing) = self.get_self() {
                return Err(FoundryError::validation(format!(
                    "{} is already the self persona",
                    existing.name
                )));
            }
        }
        self.personas.push(persona);
        let index = self.personas.len() - 1;
        Ok(&self.personas[index])
    }

    /// Exact id lookup
    pub fn get(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    /// The self persona, if any
    pub fn get_self(&self) -> Option<&Persona> {
        self.personas.iter().find(|p| p.is_self)
    }

    /// Resolve a full or partial id. Fails when nothing or more than one persona matches.
    pub fn find_by_prefix(&self, prefix: &str) -> Result<&Persona> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(FoundryError::validation("Persona id cannot be empty"));
        }
        if let Some(exact) = self.get(prefix) {
            return Ok(exact);
        }

        let matches: Vec<&Persona> = self.personas.iter().filter(|p| p.id.starts_with(prefix)).collect();
        match matches.as_slice() {
            [] => Err(FoundryError::validation(format!("No persona found matching: {prefix}"))),
            [only] => Ok(*only),
            many => {
                let names = many
                    .iter()
                    .map(|p| format!("{} - {}", short_id(&p.id), p.name))
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(FoundryError::validation(format!("Ambiguous id '{prefix}', matches: {names}")))
            }
        }
    }

    /// Resolve several partial ids, in order
    pub fn select(&self, prefixes: &[&str]) -> Result<Vec<Persona>> {
        prefixes
            .iter()
            .map(|prefix| self.find_by_prefix(prefix).cloned())
            .collect()
    }

    /// Remove a persona by full or partial id
    pub fn remove(&mut self, prefix: &str) -> Result<Persona> {
        let id = self.find_by_prefix(prefix)?.id.clone();
        let index = self
            .personas
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| FoundryError::validation(format!("No persona found matching: {prefix}")))?;
        Ok(self.personas.remove(index))
    }
}

/// First eight characters of an id, for display
#[must_use]
pub fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(end, _)| &id[..end])
}
