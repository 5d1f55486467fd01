//! Champion lookup tools backed by the local wiki database

use serde_json::{Value, json};

use super::ToolDefinition;
use crate::db::{JsonRow, LookupStore};
use crate::error::ToolError;

/// Ability slots accepted by `get_champion_spell_by_slot`
pub const SPELL_SLOTS: [&str; 5] = ["Q", "W", "E", "R", "Passive"];

/// Read-only lookups the model may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupTool {
    /// Base stats (hp, mp, armor, attack damage)
    ChampionStat,
    /// Every ability of a champion
    ChampionSpells,
    /// Short story
    ChampionStory,
    /// Lore summary, role and region
    ChampionBackground,
    /// One ability by slot
    ChampionSpellBySlot,
    /// Recommended item order
    ChampionBuild,
}

impl LookupTool {
    /// Every registered tool, in advertised order
    pub const ALL: [Self; 6] = [
        Self::ChampionStat,
        Self::ChampionSpells,
        Self::ChampionStory,
        Self::ChampionBackground,
        Self::ChampionSpellBySlot,
        Self::ChampionBuild,
    ];

    /// Name the model uses to request this tool
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ChampionStat => "get_champion_stat",
            Self::ChampionSpells => "get_champion_spells",
            Self::ChampionStory => "get_champion_story",
            Self::ChampionBackground => "get_champions_background",
            Self::ChampionSpellBySlot => "get_champion_spell_by_slot",
            Self::ChampionBuild => "get_champion_build",
        }
    }

    /// Resolve a tool by its advertised name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ChampionStat => {
                "Retrieves the statistics for a given champion by their ID. \
                 This includes attributes like hp, mp, armor, and attack damage."
            }
            Self::ChampionSpells => {
                "Retrieves the spells for a given champion by their name. \
                 This includes details like spell name, description, cooldown, and cost."
            }
            Self::ChampionStory => {
                "Retrieves the story for a given champion by their name. \
                 This includes the title and content of the story."
            }
            Self::ChampionBackground => {
                "Retrieves the background information for a given champion by their name. \
                 This includes details like title, quote, biography, role, and region."
            }
            Self::ChampionSpellBySlot => {
                "Retrieves the spell for a given champion by their name and slot. \
                 The slot can be Q, W, E, R, or Passive."
            }
            Self::ChampionBuild => {
                "Retrieves the recommended build for a champion: the items to buy \
                 and the order to buy them in."
            }
        }
    }

    /// JSON schema of the tool input
    #[must_use]
    pub fn input_schema(self) -> Value {
        match self {
            Self::ChampionStat => json!({
                "type": "object",
                "properties": {
                    "champion_id": {
                        "type": "string",
                        "description": "The unique identifier for the champion."
                    }
                },
                "required": ["champion_id"]
            }),
            Self::ChampionBackground => json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "The name of the champion."
                    }
                },
                "required": ["name"]
            }),
            Self::ChampionSpellBySlot => json!({
                "type": "object",
                "properties": {
                    "champion_name": {
                        "type": "string",
                        "description": "The name of the champion."
                    },
                    "slot": {
                        "type": "string",
                        "enum": SPELL_SLOTS,
                        "description": "The slot of the spell (Q, W, E, R, or Passive)."
                    }
                },
                "required": ["champion_name", "slot"]
            }),
            Self::ChampionSpells | Self::ChampionStory | Self::ChampionBuild => json!({
                "type": "object",
                "properties": {
                    "champion_name": {
                        "type": "string",
                        "description": "The name of the champion."
                    }
                },
                "required": ["champion_name"]
            }),
        }
    }

    /// Definition advertised to the model
    #[must_use]
    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }

    /// Run the lookup
    ///
    /// Missing rows are not failures: the result then carries an `error`
    /// field the model can relay to the user.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for missing or bad arguments and `Execution` if
    /// the database query fails
    pub fn execute(self, input: &Value, store: &LookupStore) -> Result<Value, ToolError> {
        match self {
            Self::ChampionStat => {
                // Older prompts pass the champion name under `champion_name`
                let id = self
                    .string_arg(input, "champion_id")
                    .or_else(|_| self.string_arg(input, "champion_name"))?;
                let row = self.query_one(
                    store,
                    "SELECT * FROM champion_stat WHERE champion_id = ?1",
                    &[id],
                )?;
                Ok(row_or_missing(row, &format!("No stats found for champion {id}")))
            }
            Self::ChampionSpells => {
                let name = self.string_arg(input, "champion_name")?;
                let rows = self.query(
                    store,
                    "SELECT * FROM champion_spells WHERE champion_name = ?1
                     ORDER BY CASE slot WHEN 'Passive' THEN 0 WHEN 'Q' THEN 1
                     WHEN 'W' THEN 2 WHEN 'E' THEN 3 ELSE 4 END",
                    &[name],
                )?;
                Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
            }
            Self::ChampionStory => {
                let name = self.string_arg(input, "champion_name")?;
                let row = self.query_one(
                    store,
                    "SELECT * FROM champion_story WHERE champion_name = ?1",
                    &[name],
                )?;
                Ok(row_or_missing(row, &format!("No story found for champion {name}")))
            }
            Self::ChampionBackground => {
                let name = self
                    .string_arg(input, "name")
                    .or_else(|_| self.string_arg(input, "champion_name"))?;
                let row = self.query_one(
                    store,
                    "SELECT * FROM champions_background WHERE name = ?1",
                    &[name],
                )?;
                Ok(row_or_missing(
                    row,
                    &format!("No background found for champion {name}"),
                ))
            }
            Self::ChampionSpellBySlot => {
                let name = self.string_arg(input, "champion_name")?;
                let slot = self.string_arg(input, "slot")?;
                if !SPELL_SLOTS.contains(&slot) {
                    return Err(ToolError::InvalidInput {
                        tool: self.name().to_string(),
                        reason: format!(
                            "invalid slot {slot}, allowed slots are {}",
                            SPELL_SLOTS.join(", ")
                        ),
                    });
                }

                let row = self.query_one(
                    store,
                    "SELECT * FROM champion_spells WHERE champion_name = ?1 AND slot = ?2",
                    &[name, slot],
                )?;
                let Some(row) = row else {
                    return Ok(json!({
                        "error": format!("No spell found for champion {name} in slot {slot}")
                    }));
                };

                Ok(Value::Object(annotate_spell(row)))
            }
            Self::ChampionBuild => {
                let name = self.string_arg(input, "champion_name")?;
                let items = self.query(
                    store,
                    "SELECT item_id, item_name FROM champion_build
                     WHERE champion_name = ?1 ORDER BY position",
                    &[name],
                )?;
                if items.is_empty() {
                    return Ok(json!({
                        "error": format!("No build found for champion {name}")
                    }));
                }
                Ok(json!({
                    "champion_name": name,
                    "items": items,
                }))
            }
        }
    }

    fn string_arg<'a>(self, input: &'a Value, key: &str) -> Result<&'a str, ToolError> {
        input
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::InvalidInput {
                tool: self.name().to_string(),
                reason: format!("missing string argument `{key}`"),
            })
    }

    fn query(self, store: &LookupStore, sql: &str, params: &[&str]) -> Result<Vec<JsonRow>, ToolError> {
        store
            .query(sql, rusqlite::params_from_iter(params))
            .map_err(|e| self.execution(&e))
    }

    fn query_one(
        self,
        store: &LookupStore,
        sql: &str,
        params: &[&str],
    ) -> Result<Option<JsonRow>, ToolError> {
        store
            .query_one(sql, rusqlite::params_from_iter(params))
            .map_err(|e| self.execution(&e))
    }

    fn execution(self, err: &crate::Error) -> ToolError {
        tracing::warn!(tool = self.name(), error = %err, "lookup query failed");
        ToolError::Execution {
            tool: self.name().to_string(),
            reason: err.to_string(),
        }
    }
}

fn row_or_missing(row: Option<JsonRow>, message: &str) -> Value {
    row.map_or_else(|| json!({ "error": message }), Value::Object)
}

/// Drop empty fields and explain the per-level cooldown string
fn annotate_spell(row: JsonRow) -> JsonRow {
    let mut spell: JsonRow = row
        .into_iter()
        .filter(|(_, v)| !v.is_null() && v.as_str() != Some(""))
        .collect();

    if spell.contains_key("cooldown") {
        spell.insert(
            "cooldown_description".to_string(),
            Value::String(
                "This is a split string containing cooldown time at each level.".to_string(),
            ),
        );
    }
    spell
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    fn store() -> LookupStore {
        let pool = init_memory().unwrap();
        pool.get()
            .unwrap()
            .execute_batch(
                "INSERT INTO champion_spells (champion_name, slot, name, description, cooldown, cost)
                 VALUES ('Jax', 'E', 'Counter Strike', 'Dodges attacks.', '14/12.5/11/9.5/8', '');
                 INSERT INTO champion_spells (champion_name, slot, name, description, cooldown, cost)
                 VALUES ('Jax', 'Q', 'Leap Strike', 'Leaps to a unit.', '8/7.5/7/6.5/6', '65 mana');
                 INSERT INTO champion_build (champion_name, position, item_id, item_name)
                 VALUES ('Jax', 2, 3153, 'Blade of the Ruined King'),
                        ('Jax', 1, 3078, 'Trinity Force');",
            )
            .unwrap();
        LookupStore::new(pool)
    }

    #[test]
    fn names_resolve_to_variants() {
        for tool in LookupTool::ALL {
            assert_eq!(LookupTool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(LookupTool::from_name("get_summoner_spells"), None);
    }

    #[test]
    fn definitions_require_their_arguments() {
        let def = LookupTool::ChampionSpellBySlot.definition();
        assert_eq!(def.input_schema["required"], json!(["champion_name", "slot"]));
    }

    #[test]
    fn spell_by_slot_strips_empty_fields() {
        let spell = LookupTool::ChampionSpellBySlot
            .execute(&json!({"champion_name": "Jax", "slot": "E"}), &store())
            .unwrap();
        assert_eq!(spell["name"], "Counter Strike");
        assert!(spell.get("cost").is_none());
        assert!(spell["cooldown_description"].is_string());
    }

    #[test]
    fn spell_by_slot_rejects_unknown_slot() {
        let err = LookupTool::ChampionSpellBySlot
            .execute(&json!({"champion_name": "Jax", "slot": "F"}), &store())
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput { .. }));
    }

    #[test]
    fn missing_spell_is_reported_in_result() {
        let result = LookupTool::ChampionSpellBySlot
            .execute(&json!({"champion_name": "Jax", "slot": "R"}), &store())
            .unwrap();
        assert!(result["error"].as_str().unwrap().contains("slot R"));
    }

    #[test]
    fn spells_are_listed_passive_first() {
        let spells = LookupTool::ChampionSpells
            .execute(&json!({"champion_name": "Jax"}), &store())
            .unwrap();
        let slots: Vec<_> = spells
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["slot"].as_str().unwrap())
            .collect();
        assert_eq!(slots, ["Q", "E"]);
    }

    #[test]
    fn build_is_ordered_by_position() {
        let build = LookupTool::ChampionBuild
            .execute(&json!({"champion_name": "Jax"}), &store())
            .unwrap();
        assert_eq!(build["items"][0]["item_name"], "Trinity Force");
        assert_eq!(build["items"][1]["item_id"], 3153);
    }

    #[test]
    fn missing_argument_is_invalid_input() {
        let err = LookupTool::ChampionStory
            .execute(&json!({}), &store())
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput { ref tool, .. } if tool == "get_champion_story"));
    }
}
