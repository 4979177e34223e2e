//! Immutable troop and tower specifications.
//!
//! The catalog is read once at process start from `troops.json` and
//! `towers.json` and then shared read-only by every match.

use log::info;
use serde::de::IntoDeserializer;
use serde::{Deserialize, Deserializer, Serialize};
use shared::TowerType;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("no tower spec of type {0}")]
    MissingTower(TowerType),
    #[error("troop {0} is defined more than once")]
    DuplicateTroop(String),
    #[error("at least one troop that can attack is required")]
    NoRegularTroops,
}

/// Non-combat abilities a special-only troop can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialAbility {
    /// Heals the friendly tower with the lowest HP fraction.
    #[serde(rename = "HEAL_LOWEST_HP_TOWER_300")]
    HealLowestHpTower,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TroopSpec {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "BaseHP")]
    pub base_hp: u32,
    #[serde(rename = "BaseATK")]
    pub base_atk: u32,
    #[serde(rename = "BaseDEF")]
    pub base_def: u32,
    #[serde(rename = "ManaCost", default)]
    pub mana_cost: u32,
    #[serde(rename = "DestroyEXP", default)]
    pub destroy_exp: u32,
    #[serde(
        rename = "SpecialAbility",
        default,
        deserialize_with = "empty_as_none"
    )]
    pub special_ability: Option<SpecialAbility>,
    #[serde(rename = "IsSpecialOnly", default)]
    pub is_special_only: bool,
}

/// Towers never strike back; `BaseATK` only shows up in snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerSpec {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type")]
    pub tower_type: TowerType,
    #[serde(rename = "BaseHP")]
    pub base_hp: u32,
    #[serde(rename = "BaseATK")]
    pub base_atk: u32,
    #[serde(rename = "BaseDEF")]
    pub base_def: u32,
    #[serde(rename = "DestroyEXP", default)]
    pub destroy_exp: u32,
}

// The spec files write "" for troops without an ability.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<SpecialAbility>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(other) => SpecialAbility::deserialize(other.into_deserializer()).map(Some),
    }
}

#[derive(Debug, Clone)]
pub struct SpecCatalog {
    troops: Vec<Arc<TroopSpec>>,
    king: Arc<TowerSpec>,
    guard1: Arc<TowerSpec>,
    guard2: Arc<TowerSpec>,
}

impl SpecCatalog {
    pub fn new(troops: Vec<TroopSpec>, towers: Vec<TowerSpec>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for troop in &troops {
            if !seen.insert(troop.name.as_str()) {
                return Err(CatalogError::DuplicateTroop(troop.name.clone()));
            }
        }
        if troops.iter().all(|t| t.is_special_only) {
            return Err(CatalogError::NoRegularTroops);
        }

        let find = |tower_type: TowerType| {
            towers
                .iter()
                .find(|t| t.tower_type == tower_type)
                .cloned()
                .map(Arc::new)
                .ok_or(CatalogError::MissingTower(tower_type))
        };

        Ok(Self {
            king: find(TowerType::King)?,
            guard1: find(TowerType::Guard1)?,
            guard2: find(TowerType::Guard2)?,
            troops: troops.into_iter().map(Arc::new).collect(),
        })
    }

    /// Loads `troops.json` and `towers.json` from `dir`.
    pub fn load(dir: &Path) -> Result<Self, CatalogError> {
        let troops: Vec<TroopSpec> = read_json(&dir.join("troops.json"))?;
        let towers: Vec<TowerSpec> = read_json(&dir.join("towers.json"))?;
        let catalog = Self::new(troops, towers)?;
        info!(
            "Loaded {} troop specs and 3 tower specs from {}",
            catalog.troops.len(),
            dir.display()
        );
        Ok(catalog)
    }

    pub fn troops(&self) -> &[Arc<TroopSpec>] {
        &self.troops
    }

    pub fn regular_troops(&self) -> impl Iterator<Item = &Arc<TroopSpec>> {
        self.troops.iter().filter(|t| !t.is_special_only)
    }

    pub fn special_troops(&self) -> impl Iterator<Item = &Arc<TroopSpec>> {
        self.troops.iter().filter(|t| t.is_special_only)
    }

    pub fn tower(&self, tower_type: TowerType) -> &Arc<TowerSpec> {
        match tower_type {
            TowerType::King => &self.king,
            TowerType::Guard1 => &self.guard1,
            TowerType::Guard2 => &self.guard2,
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CatalogError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CatalogError::Parse {
        path: path.display().to_string(),
        source,
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use std::fs;

    #[test]
    fn test_troop_spec_parses_pascal_case_fields() {
        let raw = r#"[
            {"Name":"Pawn","BaseHP":50,"BaseATK":150,"BaseDEF":100,"ManaCost":3,"DestroyEXP":5,"SpecialAbility":"","IsSpecialOnly":false},
            {"Name":"Queen","BaseHP":0,"BaseATK":0,"BaseDEF":0,"ManaCost":5,"DestroyEXP":0,"SpecialAbility":"HEAL_LOWEST_HP_TOWER_300","IsSpecialOnly":true}
        ]"#;
        let troops: Vec<TroopSpec> = serde_json::from_str(raw).unwrap();

        assert_eq!(troops[0].special_ability, None);
        assert_eq!(
            troops[1].special_ability,
            Some(SpecialAbility::HealLowestHpTower)
        );
        assert!(troops[1].is_special_only);
    }

    #[test]
    fn test_unknown_ability_is_rejected() {
        let raw = r#"{"Name":"Wizard","BaseHP":1,"BaseATK":1,"BaseDEF":1,"SpecialAbility":"FIREBALL"}"#;
        assert!(serde_json::from_str::<TroopSpec>(raw).is_err());
    }

    #[test]
    fn test_missing_tower_type_is_rejected() {
        let result = SpecCatalog::new(
            vec![troop("Pawn", 150, 100, 3)],
            vec![
                tower(TowerType::King, 2000, 50, 200),
                tower(TowerType::Guard1, 100, 50, 100),
            ],
        );
        assert!(matches!(
            result,
            Err(CatalogError::MissingTower(TowerType::Guard2))
        ));
    }

    #[test]
    fn test_catalog_needs_a_regular_troop() {
        let result = SpecCatalog::new(
            vec![queen()],
            vec![
                tower(TowerType::King, 2000, 50, 200),
                tower(TowerType::Guard1, 100, 50, 100),
                tower(TowerType::Guard2, 1000, 50, 100),
            ],
        );
        assert!(matches!(result, Err(CatalogError::NoRegularTroops)));
    }

    #[test]
    fn test_duplicate_troop_names_are_rejected() {
        let result = SpecCatalog::new(
            vec![troop("Pawn", 1, 1, 1), troop("Pawn", 2, 2, 2)],
            vec![],
        );
        assert!(matches!(result, Err(CatalogError::DuplicateTroop(name)) if name == "Pawn"));
    }

    #[test]
    fn test_regular_and_special_partition() {
        let catalog = catalog();
        assert_eq!(catalog.regular_troops().count(), 4);
        assert_eq!(catalog.special_troops().count(), 1);
        assert_eq!(catalog.tower(TowerType::Guard1).base_hp, 100);
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("troops.json"),
            serde_json::to_string(&vec![troop("Pawn", 150, 100, 3), queen()]).unwrap(),
        )
        .unwrap();
        fs::write(
            dir.path().join("towers.json"),
            serde_json::to_string(&vec![
                tower(TowerType::King, 2000, 300, 200),
                tower(TowerType::Guard1, 1000, 100, 100),
                tower(TowerType::Guard2, 1000, 100, 100),
            ])
            .unwrap(),
        )
        .unwrap();

        let catalog = SpecCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.troops().len(), 2);
        assert_eq!(catalog.tower(TowerType::King).base_def, 300);
    }

    #[test]
    fn test_shipped_configs_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs");
        let catalog = SpecCatalog::load(&dir).unwrap();

        assert_eq!(catalog.regular_troops().count(), 5);
        assert_eq!(catalog.special_troops().count(), 1);
        let king = catalog.tower(TowerType::King);
        assert_eq!((king.base_hp, king.base_def, king.destroy_exp), (2000, 300, 200));

        let raw = fs::read_to_string(dir.join("towers.json")).unwrap();
        let written = serde_json::to_value(&**king).unwrap();
        let fields: Vec<&String> = written.as_object().unwrap().keys().collect();
        // Every key in the shipped file is one the catalog actually reads.
        let shipped: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        for tower in &shipped {
            for key in tower.as_object().unwrap().keys() {
                assert!(fields.contains(&key), "unused tower field {}", key);
            }
        }
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SpecCatalog::load(dir.path()),
            Err(CatalogError::Read { .. })
        ));
    }
}
