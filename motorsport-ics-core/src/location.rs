use std::{collections::HashMap, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{ResolvedLocation, Result, text::normalize_name};

static PAREN_COUNTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*\(([^()]+)\)\s*$").expect("valid regex"));

/// Known venue: every alias resolves to the canonical name and country.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueMapping {
    pub name: String,
    pub country: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Venue normalizer
pub struct LocationManager {
    venues: Vec<VenueMapping>,
    /// normalized alias → index into `venues`
    index: HashMap<String, usize>,
}

impl LocationManager {
    pub fn new() -> Self {
        Self {
            venues: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Load additional venue mappings from a JSON list.
    pub fn load_from_json(&mut self, json_data: &str) -> Result<()> {
        let venues: Vec<VenueMapping> = serde_json::from_str(json_data)?;
        for venue in venues {
            self.add_mapping(venue);
        }
        Ok(())
    }

    pub fn add_mapping(&mut self, venue: VenueMapping) {
        let idx = self.venues.len();
        self.index.insert(normalize_name(&venue.name), idx);
        for alias in &venue.aliases {
            self.index.insert(normalize_name(alias), idx);
        }
        self.venues.push(venue);
    }

    pub fn get_all_mappings(&self) -> &[VenueMapping] {
        &self.venues
    }

    pub fn export_to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.venues)?)
    }

    /// Resolve a free-text venue.
    ///
    /// Exact alias match first, then an alias contained in the text
    /// ("Autódromo de Interlagos - São Paulo"), then "Venue, Country" /
    /// "Venue (Country)" splitting, then the trimmed text as is.
    pub fn resolve(&self, original: &str) -> ResolvedLocation {
        let trimmed = original.trim();
        if trimmed.is_empty() {
            return ResolvedLocation::default();
        }

        let key = normalize_name(trimmed);
        if let Some(&idx) = self.index.get(&key) {
            return self.resolved(idx);
        }

        // Longest alias wins so "spa francorchamps" beats "spa"
        let padded = format!(" {} ", key);
        if let Some(idx) = self
            .index
            .iter()
            .filter(|(alias, _)| alias.len() >= 3 && padded.contains(&format!(" {} ", alias)))
            .max_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| b.cmp(a)))
            .map(|(_, &idx)| idx)
        {
            return self.resolved(idx);
        }

        if let Some(caps) = PAREN_COUNTRY.captures(trimmed) {
            return ResolvedLocation {
                name: caps[1].trim().to_string(),
                country: Some(caps[2].trim().to_string()),
            };
        }

        if let Some((name, country)) = trimmed.rsplit_once(',') {
            let (name, country) = (name.trim(), country.trim());
            if !name.is_empty() && !country.is_empty() && !country.chars().any(|c| c.is_ascii_digit())
            {
                return ResolvedLocation {
                    name: name.to_string(),
                    country: Some(country.to_string()),
                };
            }
        }

        ResolvedLocation {
            name: basic_normalize(trimmed),
            country: None,
        }
    }

    fn resolved(&self, idx: usize) -> ResolvedLocation {
        let venue = &self.venues[idx];
        ResolvedLocation {
            name: venue.name.clone(),
            country: venue.country.clone(),
        }
    }
}

/// Collapse whitespace runs.
fn basic_normalize(location: &str) -> String {
    location.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Default for LocationManager {
    fn default() -> Self {
        let mut manager = Self::new();
        let venue = |name: &str, country: &str, aliases: &[&str]| VenueMapping {
            name: name.to_string(),
            country: Some(country.to_string()),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        };

        for mapping in [
            venue(
                "Autódromo José Carlos Pace",
                "Brasil",
                &["Interlagos", "Autódromo de Interlagos", "São Paulo GP"],
            ),
            venue("Velocitta", "Brasil", &["Autódromo Velocitta", "Mogi Guaçu"]),
            venue("Autódromo Internacional de Goiânia", "Brasil", &["Goiânia"]),
            venue("Circuito de Cascavel", "Brasil", &["Cascavel"]),
            venue(
                "Autódromo Internacional do Algarve",
                "Portugal",
                &["Portimão", "Algarve International Circuit"],
            ),
            venue("Autódromo do Estoril", "Portugal", &["Estoril"]),
            venue("Circuit de Spa-Francorchamps", "Bélgica", &["Spa-Francorchamps", "Spa"]),
            venue("Silverstone Circuit", "Reino Unido", &["Silverstone"]),
            venue("Autodromo Nazionale Monza", "Itália", &["Monza"]),
            venue("Circuit de Monaco", "Mônaco", &["Monaco", "Mônaco", "Monte Carlo"]),
            venue(
                "Circuit of the Americas",
                "Estados Unidos",
                &["COTA", "Austin"],
            ),
            venue(
                "Indianapolis Motor Speedway",
                "Estados Unidos",
                &["Indianapolis", "IMS"],
            ),
            venue("Circuit de la Sarthe", "França", &["Le Mans"]),
            venue("Suzuka Circuit", "Japão", &["Suzuka"]),
            venue("Circuito de Jerez", "Espanha", &["Jerez", "Jerez de la Frontera"]),
            venue("Mugello Circuit", "Itália", &["Mugello"]),
            venue("TT Circuit Assen", "Países Baixos", &["Assen"]),
        ] {
            manager.add_mapping(mapping);
        }

        manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_to_canonical_venue() {
        let manager = LocationManager::default();
        let loc = manager.resolve("Interlagos");
        assert_eq!(loc.name, "Autódromo José Carlos Pace");
        assert_eq!(loc.country.as_deref(), Some("Brasil"));

        let loc = manager.resolve("autodromo de interlagos");
        assert_eq!(loc.name, "Autódromo José Carlos Pace");
    }

    #[test]
    fn alias_inside_longer_text() {
        let manager = LocationManager::default();
        let loc = manager.resolve("Circuito: Spa-Francorchamps (BEL)");
        assert_eq!(loc.name, "Circuit de Spa-Francorchamps");
    }

    #[test]
    fn unknown_venues_split_country() {
        let manager = LocationManager::default();
        let loc = manager.resolve("Autódromo de Tarumã, Brasil");
        assert_eq!(loc.name, "Autódromo de Tarumã");
        assert_eq!(loc.country.as_deref(), Some("Brasil"));

        let loc = manager.resolve("Termas de Río Hondo (Argentina)");
        assert_eq!(loc.name, "Termas de Río Hondo");
        assert_eq!(loc.country.as_deref(), Some("Argentina"));

        let loc = manager.resolve("  Some   Street Circuit ");
        assert_eq!(loc.name, "Some Street Circuit");
        assert_eq!(loc.country, None);

        assert!(manager.resolve("   ").is_empty());
    }

    #[test]
    fn json_import_export() {
        let mut manager = LocationManager::new();
        manager
            .load_from_json(
                r#"[{"name": "Autódromo de Tarumã", "country": "Brasil", "aliases": ["Tarumã"]}]"#,
            )
            .unwrap();
        assert_eq!(manager.resolve("taruma").name, "Autódromo de Tarumã");

        let exported = manager.export_to_json().unwrap();
        let mut reloaded = LocationManager::new();
        reloaded.load_from_json(&exported).unwrap();
        assert_eq!(reloaded.get_all_mappings().len(), 1);
    }
}
