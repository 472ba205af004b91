use agproxy_protocol::openai::list_models::response::{
    ListModelsResponse, ListObjectType, Model, ModelObjectType,
};

pub const MODEL_OWNER: &str = "antigravity";

/// Public alias → backend model id.
pub const DEFAULT_MODEL_ALIASES: &[(&str, &str)] = &[
    ("ag-pro", "gemini-3-pro-high"),
    ("ag-flash", "gemini-3-flash"),
    ("ag-sonnet", "claude-sonnet-4-5-thinking"),
    ("ag-opus", "claude-opus-4-5-thinking"),
    ("ag-haiku", "gemini-2.5-flash-lite[1m]"),
    ("gpt-4o", "gemini-3-pro-high"),
    ("gpt-4o-mini", "gemini-3-flash"),
    ("claude-3-5-sonnet", "claude-sonnet-4-5-thinking"),
    ("claude-3-5-sonnet-20241022", "claude-sonnet-4-5-thinking"),
    ("claude-3-opus", "claude-opus-4-5-thinking"),
    ("claude-3-haiku", "gemini-2.5-flash-lite[1m]"),
    ("gemini-1.5-flash", "gemini-3-flash"),
    ("gemini-1.5-pro", "gemini-3-pro-high"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCard {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

/// Human-facing descriptions of the primary aliases, shown on the status page.
pub const DEFAULT_MODEL_CARDS: &[ModelCard] = &[
    ModelCard {
        id: "ag-pro",
        name: "Gemini 3 Pro",
        description: "Highest intelligence, best for complex logic & architecture.",
    },
    ModelCard {
        id: "ag-flash",
        name: "Gemini 3 Flash",
        description: "Lighting fast, perfect for quick edits and chats.",
    },
    ModelCard {
        id: "ag-sonnet",
        name: "Claude 4.5 Sonnet (Thinking)",
        description: "Advanced reasoning and deep context understanding.",
    },
    ModelCard {
        id: "ag-opus",
        name: "Claude 4.5 Opus (Thinking)",
        description: "Maximum intelligence for the most challenging tasks.",
    },
    ModelCard {
        id: "ag-haiku",
        name: "Gemini 2.5 Lite",
        description: "Ultra-lightweight and efficient for simple tasks.",
    },
];

#[derive(Debug, Clone, Copy)]
pub struct ModelCatalog {
    aliases: &'static [(&'static str, &'static str)],
    cards: &'static [ModelCard],
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_ALIASES, DEFAULT_MODEL_CARDS)
    }
}

impl ModelCatalog {
    pub const fn new(
        aliases: &'static [(&'static str, &'static str)],
        cards: &'static [ModelCard],
    ) -> Self {
        Self { aliases, cards }
    }

    /// Unknown aliases pass through unchanged so new backend ids work without a release.
    pub fn resolve<'a>(&self, alias: &'a str) -> &'a str {
        self.aliases
            .iter()
            .find(|(public, _)| *public == alias)
            .map(|(_, backend)| *backend)
            .unwrap_or(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.aliases.iter().map(|(public, _)| *public)
    }

    pub fn cards(&self) -> &'static [ModelCard] {
        self.cards
    }

    pub fn list(&self, created: i64) -> ListModelsResponse {
        ListModelsResponse {
            object: ListObjectType::List,
            data: self
                .aliases()
                .map(|id| Model {
                    id: id.to_string(),
                    object: ModelObjectType::Model,
                    created,
                    owned_by: MODEL_OWNER.to_string(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_aliases() {
        let catalog = ModelCatalog::default();
        assert_eq!(catalog.resolve("ag-pro"), "gemini-3-pro-high");
        assert_eq!(catalog.resolve("gpt-4o-mini"), "gemini-3-flash");
        assert_eq!(catalog.resolve("claude-3-haiku"), "gemini-2.5-flash-lite[1m]");
    }

    #[test]
    fn unknown_alias_passes_through() {
        let catalog = ModelCatalog::default();
        assert_eq!(catalog.resolve("gemini-9-ultra"), "gemini-9-ultra");
    }

    #[test]
    fn list_reports_every_alias_in_order() {
        let list = ModelCatalog::default().list(1_700_000_000);
        assert_eq!(list.data.len(), DEFAULT_MODEL_ALIASES.len());
        assert_eq!(list.data[0].id, "ag-pro");
        assert!(list.data.iter().all(|model| model.owned_by == "antigravity"
            && model.created == 1_700_000_000));

        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json["object"], "list");
        assert_eq!(json["data"][0]["object"], "model");
    }
}
