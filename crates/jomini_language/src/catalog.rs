//! The definition catalog: immutable tables of known effects, triggers,
//! scope links, iterator lists, animations, themes, and traits.
//!
//! The tables live in YAML data files compiled into the crate. Names are
//! interned once at load; every lookup afterwards is a symbol-keyed map hit,
//! not a string comparison. The catalog is immutable after startup and shared
//! freely across analyses.

use std::collections::{HashMap, HashSet};
use std::fmt;

use once_cell::sync::Lazy;
use serde::Deserialize;

use jomini_base::{Interner, Symbol};

use crate::config::ConfigError;

static EMBEDDED_CATALOG: Lazy<Catalog> = Lazy::new(|| {
    Catalog::load_embedded().expect("embedded catalog tables shipped with the crate")
});

const SCOPE_TYPES_YAML: &str = include_str!("../data/scope_types.yaml");
const EFFECTS_YAML: &str = include_str!("../data/effects.yaml");
const TRIGGERS_YAML: &str = include_str!("../data/triggers.yaml");
const ANIMATIONS_YAML: &str = include_str!("../data/animations.yaml");
const THEMES_YAML: &str = include_str!("../data/themes.yaml");
const TRAITS_YAML: &str = include_str!("../data/traits.yaml");

/// The closed set of Jomini scope types.
///
/// `Unknown` is the "cannot decide" type: every link and command check passes
/// on it, so an unresolvable prefix silences downstream noise instead of
/// cascading false positives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeType {
    Character,
    LandedTitle,
    Province,
    Faith,
    Culture,
    Dynasty,
    DynastyHouse,
    StoryCycle,
    CombatSide,
    Combat,
    Army,
    Activity,
    Scheme,
    Secret,
    War,
    CasusBelli,
    TravelPlan,
    Accolade,
    HolyOrder,
    GreatHolyWar,
    Value,
    Flag,
    None,
    Unknown,
}

impl ScopeType {
    pub fn from_name(name: &str) -> Option<ScopeType> {
        Some(match name {
            "character" => ScopeType::Character,
            "landed_title" | "title" => ScopeType::LandedTitle,
            "province" => ScopeType::Province,
            "faith" => ScopeType::Faith,
            "culture" => ScopeType::Culture,
            "dynasty" => ScopeType::Dynasty,
            "dynasty_house" | "house" => ScopeType::DynastyHouse,
            "story_cycle" | "story" => ScopeType::StoryCycle,
            "combat_side" => ScopeType::CombatSide,
            "combat" => ScopeType::Combat,
            "army" => ScopeType::Army,
            "activity" => ScopeType::Activity,
            "scheme" => ScopeType::Scheme,
            "secret" => ScopeType::Secret,
            "war" => ScopeType::War,
            "casus_belli" => ScopeType::CasusBelli,
            "travel_plan" => ScopeType::TravelPlan,
            "accolade" => ScopeType::Accolade,
            "holy_order" => ScopeType::HolyOrder,
            "great_holy_war" => ScopeType::GreatHolyWar,
            "value" => ScopeType::Value,
            "flag" => ScopeType::Flag,
            "none" => ScopeType::None,
            _ => return Option::None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScopeType::Character => "character",
            ScopeType::LandedTitle => "landed_title",
            ScopeType::Province => "province",
            ScopeType::Faith => "faith",
            ScopeType::Culture => "culture",
            ScopeType::Dynasty => "dynasty",
            ScopeType::DynastyHouse => "dynasty_house",
            ScopeType::StoryCycle => "story_cycle",
            ScopeType::CombatSide => "combat_side",
            ScopeType::Combat => "combat",
            ScopeType::Army => "army",
            ScopeType::Activity => "activity",
            ScopeType::Scheme => "scheme",
            ScopeType::Secret => "secret",
            ScopeType::War => "war",
            ScopeType::CasusBelli => "casus_belli",
            ScopeType::TravelPlan => "travel_plan",
            ScopeType::Accolade => "accolade",
            ScopeType::HolyOrder => "holy_order",
            ScopeType::GreatHolyWar => "great_holy_war",
            ScopeType::Value => "value",
            ScopeType::Flag => "flag",
            ScopeType::None => "none",
            ScopeType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One effect or trigger: where it may appear and what to show on hover.
#[derive(Debug, Clone)]
pub struct CommandDef {
    pub name: String,
    /// Scope types the command is valid in. Empty means any scope.
    pub scopes: Vec<ScopeType>,
    pub doc: String,
}

impl CommandDef {
    pub fn valid_in(&self, scope: ScopeType) -> bool {
        scope == ScopeType::Unknown || self.scopes.is_empty() || self.scopes.contains(&scope)
    }
}

/// Navigation links and iterable lists available on one scope type.
#[derive(Debug, Default)]
pub struct ScopeDef {
    /// `liege` → character, `primary_title` → landed_title, ...
    links: HashMap<Symbol, ScopeType>,
    /// Iterable collections: `vassal` → character means `any_vassal`,
    /// `every_vassal`, ... iterate characters.
    lists: HashMap<Symbol, ScopeType>,
}

/// The loaded, immutable catalog.
pub struct Catalog {
    interner: Interner,
    scopes: HashMap<ScopeType, ScopeDef>,
    effects: Vec<CommandDef>,
    effect_index: HashMap<Symbol, usize>,
    triggers: Vec<CommandDef>,
    trigger_index: HashMap<Symbol, usize>,
    animations: HashSet<String>,
    themes: HashSet<String>,
    traits: HashSet<String>,
}

// ---------------------------------------------------------------------------
// On-disk shapes

#[derive(Deserialize)]
struct RawScopeDef {
    #[serde(default)]
    links: HashMap<String, String>,
    #[serde(default)]
    lists: HashMap<String, String>,
}

#[derive(Deserialize)]
struct RawCommand {
    name: String,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default)]
    doc: String,
}

impl Catalog {
    /// Loads the tables compiled into the crate. A malformed table is a fatal
    /// configuration error; a partially-loaded catalog is never returned.
    pub fn load_embedded() -> Result<Catalog, ConfigError> {
        let mut interner = Interner::new();

        let raw_scopes: HashMap<String, RawScopeDef> = parse_yaml("scope_types.yaml", SCOPE_TYPES_YAML)?;
        let mut scopes: HashMap<ScopeType, ScopeDef> = HashMap::new();
        for (scope_name, raw) in raw_scopes {
            let scope = require_scope("scope_types.yaml", &scope_name)?;
            let mut def = ScopeDef::default();
            for (link, target) in raw.links {
                let target = require_scope("scope_types.yaml", &target)?;
                def.links.insert(interner.intern(&link), target);
            }
            for (list, target) in raw.lists {
                let target = require_scope("scope_types.yaml", &target)?;
                def.lists.insert(interner.intern(&list), target);
            }
            scopes.insert(scope, def);
        }

        let (effects, effect_index) =
            load_commands("effects.yaml", EFFECTS_YAML, &mut interner)?;
        let (triggers, trigger_index) =
            load_commands("triggers.yaml", TRIGGERS_YAML, &mut interner)?;

        let animations: Vec<String> = parse_yaml("animations.yaml", ANIMATIONS_YAML)?;
        let themes: Vec<String> = parse_yaml("themes.yaml", THEMES_YAML)?;
        let traits: Vec<String> = parse_yaml("traits.yaml", TRAITS_YAML)?;

        Ok(Catalog {
            interner,
            scopes,
            effects,
            effect_index,
            triggers,
            trigger_index,
            animations: animations.into_iter().collect(),
            themes: themes.into_iter().collect(),
            traits: traits.into_iter().collect(),
        })
    }

    /// Shared instance of the embedded tables. Panics only if the data files
    /// compiled into the crate are broken; the server path goes through
    /// [`Catalog::load_embedded`] and reports instead.
    pub fn embedded() -> &'static Catalog {
        &EMBEDDED_CATALOG
    }

    pub fn effect(&self, name: &str) -> Option<&CommandDef> {
        let sym = self.interner.lookup(name)?;
        self.effect_index.get(&sym).map(|&i| &self.effects[i])
    }

    pub fn trigger(&self, name: &str) -> Option<&CommandDef> {
        let sym = self.interner.lookup(name)?;
        self.trigger_index.get(&sym).map(|&i| &self.triggers[i])
    }

    pub fn is_effect(&self, name: &str) -> bool {
        self.effect(name).is_some()
    }

    pub fn is_trigger(&self, name: &str) -> bool {
        self.trigger(name).is_some()
    }

    /// Scope navigation: `link` applied to `scope` yields the returned type.
    pub fn link_target(&self, scope: ScopeType, link: &str) -> Option<ScopeType> {
        let sym = self.interner.lookup(link)?;
        self.scopes.get(&scope)?.links.get(&sym).copied()
    }

    /// `true` if any scope type has a link of this name (used to distinguish
    /// "unknown link" from "link not valid here").
    pub fn link_exists(&self, link: &str) -> bool {
        match self.interner.lookup(link) {
            Some(sym) => self.scopes.values().any(|def| def.links.contains_key(&sym)),
            Option::None => false,
        }
    }

    /// Iterable list lookup for the current scope; global lists (valid from
    /// any scope) live under [`ScopeType::None`].
    pub fn list_target(&self, scope: ScopeType, list: &str) -> Option<ScopeType> {
        let sym = self.interner.lookup(list)?;
        if let Some(def) = self.scopes.get(&scope) {
            if let Some(&target) = def.lists.get(&sym) {
                return Some(target);
            }
        }
        self.scopes
            .get(&ScopeType::None)
            .and_then(|def| def.lists.get(&sym).copied())
    }

    pub fn list_exists(&self, list: &str) -> bool {
        match self.interner.lookup(list) {
            Some(sym) => self.scopes.values().any(|def| def.lists.contains_key(&sym)),
            Option::None => false,
        }
    }

    /// All list names valid for `scope`, for completion.
    pub fn lists_for(&self, scope: ScopeType) -> Vec<&str> {
        let mut out = Vec::new();
        for key in [scope, ScopeType::None] {
            if let Some(def) = self.scopes.get(&key) {
                out.extend(def.lists.keys().map(|&sym| self.interner.resolve(sym)));
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// All link names valid for `scope`, for completion.
    pub fn links_for(&self, scope: ScopeType) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .scopes
            .get(&scope)
            .map(|def| def.links.keys().map(|&sym| self.interner.resolve(sym)).collect())
            .unwrap_or_default();
        out.sort_unstable();
        out
    }

    pub fn effects_for(&self, scope: ScopeType) -> impl Iterator<Item = &CommandDef> {
        self.effects.iter().filter(move |def| def.valid_in(scope))
    }

    pub fn triggers_for(&self, scope: ScopeType) -> impl Iterator<Item = &CommandDef> {
        self.triggers.iter().filter(move |def| def.valid_in(scope))
    }

    pub fn has_animation(&self, name: &str) -> bool {
        self.animations.contains(name)
    }

    pub fn animations(&self) -> impl Iterator<Item = &str> {
        self.animations.iter().map(String::as_str)
    }

    pub fn has_theme(&self, name: &str) -> bool {
        self.themes.contains(name)
    }

    pub fn has_trait(&self, name: &str) -> bool {
        self.traits.contains(name)
    }

    pub fn traits(&self) -> impl Iterator<Item = &str> {
        self.traits.iter().map(String::as_str)
    }

    /// Every command name plus the structural keywords, for the parser's
    /// merged-identifier check.
    pub fn keyword_set(&self) -> HashSet<String> {
        let mut set: HashSet<String> = HashSet::new();
        set.extend(self.effects.iter().map(|c| c.name.clone()));
        set.extend(self.triggers.iter().map(|c| c.name.clone()));
        set.extend(self.traits.iter().cloned());
        for structural in [
            "trigger", "immediate", "option", "desc", "limit", "after", "if", "else",
            "trigger_if", "trigger_else", "modifier", "first_valid", "random_valid",
            "hidden", "name", "title", "theme", "type",
        ] {
            set.insert(structural.to_string());
        }
        set
    }
}

fn parse_yaml<T: serde::de::DeserializeOwned>(file: &str, text: &str) -> Result<T, ConfigError> {
    serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
        file: file.to_string(),
        source,
    })
}

fn require_scope(file: &str, name: &str) -> Result<ScopeType, ConfigError> {
    ScopeType::from_name(name).ok_or_else(|| ConfigError::Catalog {
        file: file.to_string(),
        message: format!("unknown scope type `{}`", name),
    })
}

fn load_commands(
    file: &str,
    text: &str,
    interner: &mut Interner,
) -> Result<(Vec<CommandDef>, HashMap<Symbol, usize>), ConfigError> {
    let raw: Vec<RawCommand> = parse_yaml(file, text)?;
    let mut commands = Vec::with_capacity(raw.len());
    let mut index = HashMap::with_capacity(raw.len());
    for cmd in raw {
        let mut scopes = Vec::with_capacity(cmd.scopes.len());
        for scope in &cmd.scopes {
            scopes.push(require_scope(file, scope)?);
        }
        let sym = interner.intern(&cmd.name);
        if index.insert(sym, commands.len()).is_some() {
            return Err(ConfigError::Catalog {
                file: file.to_string(),
                message: format!("`{}` is defined twice", cmd.name),
            });
        }
        commands.push(CommandDef {
            name: cmd.name,
            scopes,
            doc: cmd.doc,
        });
    }
    Ok((commands, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::load_embedded().expect("embedded catalog tables must load")
    }

    #[test]
    fn embedded_tables_load() {
        let cat = catalog();
        assert!(cat.is_effect("add_gold"));
        assert!(cat.is_trigger("is_alive"));
        assert!(!cat.is_effect("is_alive"));
    }

    #[test]
    fn character_links_resolve() {
        let cat = catalog();
        assert_eq!(
            cat.link_target(ScopeType::Character, "liege"),
            Some(ScopeType::Character)
        );
        assert_eq!(
            cat.link_target(ScopeType::Character, "primary_title"),
            Some(ScopeType::LandedTitle)
        );
        assert_eq!(
            cat.link_target(ScopeType::LandedTitle, "holder"),
            Some(ScopeType::Character)
        );
    }

    #[test]
    fn link_not_valid_everywhere() {
        let cat = catalog();
        assert_eq!(cat.link_target(ScopeType::Province, "liege"), None);
        assert!(cat.link_exists("liege"));
        assert!(!cat.link_exists("not_a_link_at_all"));
    }

    #[test]
    fn vassal_list_is_character_only() {
        let cat = catalog();
        assert_eq!(
            cat.list_target(ScopeType::Character, "vassal"),
            Some(ScopeType::Character)
        );
        assert_eq!(cat.list_target(ScopeType::Faith, "vassal"), None);
        assert!(cat.list_exists("vassal"));
    }

    #[test]
    fn global_lists_work_from_any_scope() {
        let cat = catalog();
        assert!(cat.list_target(ScopeType::Faith, "ruler").is_some());
        assert!(cat.list_target(ScopeType::Character, "ruler").is_some());
    }

    #[test]
    fn scope_restricted_commands() {
        let cat = catalog();
        let add_gold = cat.effect("add_gold").unwrap();
        assert!(add_gold.valid_in(ScopeType::Character));
        assert!(!add_gold.valid_in(ScopeType::Province));
        assert!(add_gold.valid_in(ScopeType::Unknown), "unknown scope must pass");
    }

    #[test]
    fn universal_commands_have_no_scope_list() {
        let cat = catalog();
        let save = cat.effect("save_scope_as").unwrap();
        assert!(save.scopes.is_empty());
        assert!(save.valid_in(ScopeType::StoryCycle));
    }

    #[test]
    fn keyword_set_contains_commands_and_structure() {
        let set = catalog().keyword_set();
        assert!(set.contains("add_gold"));
        assert!(set.contains("trigger"));
        assert!(set.contains("option"));
    }

    #[test]
    fn traits_and_animations_present() {
        let cat = catalog();
        assert!(cat.has_trait("brave"));
        assert!(cat.has_animation("anger"));
        assert!(cat.has_theme("diplomacy"));
    }

    #[test]
    fn scope_type_name_round_trip() {
        for scope in [
            ScopeType::Character,
            ScopeType::LandedTitle,
            ScopeType::StoryCycle,
            ScopeType::None,
        ] {
            assert_eq!(ScopeType::from_name(scope.as_str()), Some(scope));
        }
        assert_eq!(ScopeType::from_name("starship"), None);
    }
}
