use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::embed::Embed;

/// An invoked command, as delivered by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    #[serde(rename = "type")]
    pub interaction_type: String,
    pub data: Option<InteractionData>,
    pub space_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub member_permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOptionValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOptionValue {
    pub name: String,
    pub value: Option<Value>,
}

impl InteractionData {
    fn option(&self, name: &str) -> Option<&Value> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| o.value.as_ref())
            .filter(|v| !v.is_null())
    }

    pub fn option_str(&self, name: &str) -> Option<String> {
        match self.option(name)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Integers may arrive as JSON numbers or numeric strings.
    pub fn option_i64(&self, name: &str) -> Option<i64> {
        match self.option(name)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn option_bool(&self, name: &str) -> Option<bool> {
        match self.option(name)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Reply to an interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub response_type: String,
    pub data: MessageData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub ephemeral: bool,
}

impl InteractionResponse {
    fn message(data: MessageData) -> Self {
        Self {
            response_type: "message".to_string(),
            data,
        }
    }

    pub fn content(text: impl Into<String>) -> Self {
        Self::message(MessageData {
            content: Some(text.into()),
            ..MessageData::default()
        })
    }

    pub fn embed(embed: Embed) -> Self {
        Self::message(MessageData {
            embeds: vec![embed],
            ..MessageData::default()
        })
    }

    /// Visible only to the invoking user.
    pub fn ephemeral(mut self) -> Self {
        self.data.ephemeral = true;
        self
    }
}

/// Slash-command description, published so the platform can register it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOption {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub option_type: String,
    pub required: bool,
}
