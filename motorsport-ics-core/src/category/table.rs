use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Result, text::normalize_name};

/// A canonical category and the names it is printed under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub code: String,
    pub label: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Canonical category table with a normalized alias index.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    categories: Vec<CategoryDefinition>,
    /// normalized alias (code and label included) → index into `categories`
    index: HashMap<String, usize>,
}

impl CategoryTable {
    pub fn new() -> Self {
        Self {
            categories: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add a category; a category with the same code is replaced.
    pub fn add_category(&mut self, category: CategoryDefinition) {
        match self.categories.iter().position(|c| c.code == category.code) {
            Some(idx) => {
                self.index.retain(|_, i| *i != idx);
                self.categories[idx] = category;
                self.index_category(idx);
            }
            None => {
                self.categories.push(category);
                self.index_category(self.categories.len() - 1);
            }
        }
    }

    fn index_category(&mut self, idx: usize) {
        let category = &self.categories[idx];
        let names = std::iter::once(&category.code)
            .chain(std::iter::once(&category.label))
            .chain(category.aliases.iter());
        for name in names {
            let key = normalize_name(name);
            if !key.is_empty() {
                self.index.insert(key, idx);
            }
        }
    }

    /// Merge categories from a JSON list over the current table.
    pub fn load_from_json(&mut self, json_data: &str) -> Result<()> {
        let categories: Vec<CategoryDefinition> = serde_json::from_str(json_data)?;
        for category in categories {
            self.add_category(category);
        }
        Ok(())
    }

    pub fn export_to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.categories)?)
    }

    pub fn categories(&self) -> &[CategoryDefinition] {
        &self.categories
    }

    pub fn get(&self, code: &str) -> Option<&CategoryDefinition> {
        self.categories
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(code))
    }

    /// Category whose normalized alias equals `normalized`.
    pub fn exact(&self, normalized: &str) -> Option<&CategoryDefinition> {
        self.index.get(normalized).map(|&idx| &self.categories[idx])
    }

    /// Category whose alias occurs as a whole phrase in `normalized`.
    ///
    /// The longest alias wins so "f1 academy" beats "f1"; equal lengths fall
    /// back to alias order.
    pub fn containing(&self, normalized: &str) -> Option<&CategoryDefinition> {
        self.index
            .iter()
            .filter(|(alias, _)| crate::text::contains_phrase(normalized, alias))
            .max_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| b.cmp(a)))
            .map(|(_, &idx)| &self.categories[idx])
    }

    /// Normalized aliases with the category they point to, in a stable order.
    pub fn aliases(&self) -> Vec<(&str, &CategoryDefinition)> {
        let mut aliases: Vec<_> = self
            .index
            .iter()
            .map(|(alias, &idx)| (alias.as_str(), &self.categories[idx]))
            .collect();
        aliases.sort_by(|a, b| a.0.cmp(b.0));
        aliases
    }

    /// Normalized aliases of one category, longest first.
    pub fn alias_phrases(&self, code: &str) -> Vec<&str> {
        let Some(idx) = self.categories.iter().position(|c| c.code == code) else {
            return Vec::new();
        };
        let mut phrases: Vec<&str> = self
            .index
            .iter()
            .filter(|(_, i)| **i == idx)
            .map(|(alias, _)| alias.as_str())
            .collect();
        phrases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        phrases
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        let mut table = Self::new();
        let category = |code: &str, label: &str, aliases: &[&str]| CategoryDefinition {
            code: code.to_string(),
            label: label.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        };

        for definition in [
            category("F1", "Formula 1", &["Fórmula 1", "Formula One", "Fórmula Um", "F-1"]),
            category("F2", "Formula 2", &["Fórmula 2", "FIA F2", "F-2"]),
            category("F3", "Formula 3", &["Fórmula 3", "FIA F3", "F-3"]),
            category("F1A", "F1 Academy", &["Formula 1 Academy", "Fórmula 1 Academy"]),
            category("F4", "Formula 4", &["Fórmula 4", "F4 Brasil", "F-4"]),
            category("FE", "Formula E", &["Fórmula E", "E-Prix", "Formula-E"]),
            category("MOTOGP", "MotoGP", &["Moto GP", "Motovelocidade GP"]),
            category("MOTO2", "Moto2", &["Moto 2"]),
            category("MOTO3", "Moto3", &["Moto 3"]),
            category(
                "WSBK",
                "World Superbike",
                &["WorldSBK", "Superbike", "Mundial de Superbike", "SBK"],
            ),
            category(
                "WEC",
                "World Endurance Championship",
                &["FIA WEC", "Mundial de Endurance", "24 Horas de Le Mans", "Le Mans 24h"],
            ),
            category("IMSA", "IMSA SportsCar Championship", &["IMSA WeatherTech", "WeatherTech"]),
            category("INDYCAR", "IndyCar", &["Indy Car", "Fórmula Indy", "Formula Indy", "Indy 500"]),
            category("NASCAR", "NASCAR Cup Series", &["NASCAR Cup", "Nascar"]),
            category("STOCKCAR", "Stock Car Pro Series", &["Stock Car", "Stock Car Pro"]),
            category("DTM", "DTM", &["Deutsche Tourenwagen Masters"]),
            category("SF", "Super Formula", &["Superformula", "Super Fórmula"]),
            category("WRC", "World Rally Championship", &["Mundial de Rally", "Rally Mundial"]),
            category("PORSCHE", "Porsche Cup", &["Porsche Carrera Cup", "Porsche Cup Brasil"]),
            category("TCR", "TCR", &["TCR South America", "TCR Brasil", "TCR World Tour"]),
        ] {
            table.add_category(definition);
        }

        table
    }
}
