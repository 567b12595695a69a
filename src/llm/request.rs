use serde::{Deserialize, Serialize};
use std::str::FromStr;

const ANALYZE_INSTRUCTION: &str =
    "Please analyze these images and provide a valuation for the items shown.";

const VALUATION_PROMPT: &str = r#"You are a knowledgeable pricing analyst specializing in resale valuations. Assess items based on:

CONDITION SCALE:
- New with Tags (NWT): 90-100% of retail
- Like New: 70-85% of retail
- Good: 50-65% of retail
- Fair: 30-45% of retail
- Poor: 15-25% of retail

For each item, consider:
1. Brand value and current market demand
2. Age and technological relevance
3. Seasonal timing and local market conditions
4. Similar completed sales on eBay, Facebook Marketplace, and other platforms
5. Shipping costs and platform fees
6. Any unique features or collectible value

Settle on a target price that balances time to sell against value, and include brief reasoning
and any relevant selling tips in the description.

In the description, include the estimated dimensions of the item using the metric system.
"#;

const STRICT_PROMPT: &str = r#"You are a resale pricing analyst. Inspect the photos of a single physical item and
produce a marketplace listing for it. The first photo is the primary shot; later photos show details.

Grade condition on this scale: New with Tags (90-100% of retail), Like New (70-85%),
Good (50-65%), Fair (30-45%), Poor (15-25%). Weigh brand demand, age, comparable completed
sales, shipping costs and platform fees.

Respond with JSON only, exactly matching:
{"title": string, "description": string, "category": string, "tags": [string], "estimated_price": integer}

- `estimated_price` is a non-negative whole number in the store currency, no symbol.
- `tags` is an ordered list of short search keywords, most relevant first.
- `description` includes the estimated metric dimensions of the item.
No markdown, no extra keys.
"#;

/// System prompt selection. Either variant is validated against the listing schema
/// after the oracle answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptVariant {
    #[default]
    Valuation,
    Strict,
}

impl PromptVariant {
    pub fn system_prompt(&self) -> &'static str {
        match self {
            PromptVariant::Valuation => VALUATION_PROMPT,
            PromptVariant::Strict => STRICT_PROMPT,
        }
    }
}

impl FromStr for PromptVariant {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "valuation" | "pricing" | "free_form" => Ok(PromptVariant::Valuation),
            "strict" | "schema" => Ok(PromptVariant::Strict),
            other => Err(format!("unknown prompt variant `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OracleRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageRef },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRef {
    pub url: String,
}

impl OracleRequest {
    pub fn image_urls(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter_map(|message| match &message.content {
                MessageContent::Parts(parts) => Some(parts),
                MessageContent::Text(_) => None,
            })
            .flatten()
            .filter_map(|part| match part {
                ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
                ContentPart::Text { .. } => None,
            })
            .collect()
    }
}

/// Builds the two-role prompt. Image order is kept as given: the oracle treats the first
/// photo as the primary shot.
pub fn build_request(images: &[String], variant: PromptVariant) -> OracleRequest {
    let mut parts = Vec::with_capacity(images.len() + 1);
    parts.push(ContentPart::Text {
        text: ANALYZE_INSTRUCTION.to_string(),
    });
    parts.extend(images.iter().map(|image| ContentPart::ImageUrl {
        image_url: ImageRef {
            url: as_image_reference(image),
        },
    }));

    OracleRequest {
        messages: vec![
            ChatMessage {
                role: "system",
                content: MessageContent::Text(variant.system_prompt().to_string()),
            },
            ChatMessage {
                role: "user",
                content: MessageContent::Parts(parts),
            },
        ],
    }
}

fn as_image_reference(image: &str) -> String {
    let trimmed = image.trim();
    if trimmed.starts_with("data:image") {
        trimmed.to_string()
    } else {
        format!("{}{trimmed}", crate::imaging::JPEG_DATA_URL_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn system_role_comes_first() {
        let request = build_request(&["abc".to_string()], PromptVariant::Valuation);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(
            request.messages[0].content,
            MessageContent::Text(VALUATION_PROMPT.to_string())
        );
        assert_eq!(request.messages[1].role, "user");
    }

    #[test]
    fn image_order_is_preserved_without_dedup() {
        let images = vec![
            "data:image/png;base64,BBBB".to_string(),
            "AAAA".to_string(),
            "data:image/png;base64,BBBB".to_string(),
        ];
        let request = build_request(&images, PromptVariant::Strict);
        assert_eq!(
            request.image_urls(),
            vec![
                "data:image/png;base64,BBBB",
                "data:image/jpeg;base64,AAAA",
                "data:image/png;base64,BBBB",
            ]
        );
    }

    #[test]
    fn user_message_serializes_as_content_parts() {
        let request = build_request(&["QUJD".to_string()], PromptVariant::Valuation);
        let value = serde_json::to_value(&request.messages[1]).expect("serialize");
        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": ANALYZE_INSTRUCTION},
                    {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,QUJD"}},
                ],
            })
        );
    }

    #[test]
    fn strict_variant_names_every_schema_field() {
        let prompt = PromptVariant::Strict.system_prompt();
        for field in ["title", "description", "category", "tags", "estimated_price"] {
            assert!(prompt.contains(field), "missing {field}");
        }
    }

    #[test]
    fn variant_parses_from_config_strings() {
        assert_eq!("strict".parse::<PromptVariant>(), Ok(PromptVariant::Strict));
        assert_eq!(" Valuation ".parse::<PromptVariant>(), Ok(PromptVariant::Valuation));
        assert!("poetry".parse::<PromptVariant>().is_err());
    }
}
