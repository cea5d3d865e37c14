use serde::{Deserialize, Serialize};

/// A custom emoji as the chat platform reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildEmoji {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub animated: bool,
    #[serde(default)]
    pub managed: bool,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl GuildEmoji {
    /// Inline chat markup, e.g. `<:party:123>` or `<a:party:123>`.
    pub fn mention(&self) -> String {
        let prefix = if self.animated { "a" } else { "" };
        format!("<{prefix}:{}:{}>", self.name, self.id)
    }

    pub fn extension(&self) -> &'static str {
        if self.animated {
            "gif"
        } else {
            "png"
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateEmoji {
    pub name: String,
    pub image: String, // base64 data URI
}
