//! Batch NFT metadata generation.
//!
//! A collection is generated in two phases. A single seed NFT is requested
//! first with a style-oriented system prompt; its trait types are then pinned
//! in the system prompt for every following batch so that the whole
//! collection shares one trait schema.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::llm::{ChatBackend, LlmError};

pub const DEFAULT_COLLECTION_SIZE: usize = 10;
pub const MAX_COLLECTION_SIZE: usize = 1_000;
pub const MAX_BATCH_SIZE: usize = 10;

pub const STYLE_SYSTEM_PROMPT: &str = r#"You are an NFT metadata generator creating high-end digital art in a specific style.
The artwork should follow these stylistic guidelines:
- Modern digital art style similar to popular NFT collections
- Bold, vibrant colors with psychedelic or rainbow gradients where appropriate
- Clean, cartoon-like linework with a professional finish
- Potential for accessories like crowns, sunglasses, or other status symbols
- Flat color backgrounds or simple gradient backgrounds

CRITICAL REQUIREMENTS:
1. First, determine 4-6 relevant trait types based on the collection theme
2. Use these SAME trait types consistently across ALL NFTs
3. CRUCIAL: Each generation prompt must include:
   - Specific art style reference (e.g., "digital cartoon art style with clean linework")
   - Color palette description (e.g., "vibrant psychedelic colors", "rainbow gradient pattern")
   - Detailed description of each trait and its visual implementation
   - Background style specification
4. Use a consistent perspective and style across all prompts

Example prompt structure:
"Create a digital cartoon artwork in the style of modern NFT collections, featuring [subject] with [specific trait details].
Use vibrant colors with [color palette description]. The character should have [detailed trait descriptions].
Set against a [background description]. Maintain clean linework and bold colors throughout."

Remember: Each prompt should be detailed enough to consistently reproduce the intended artistic style.
Respond with a JSON object of the form {"nfts": [...]}."#;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Failed to generate initial batch")]
    InitialBatch(#[source] Box<MetadataError>),

    #[error("Could not find trait types in response")]
    MissingTraitTypes,

    #[error("Invalid response format from model: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// System prompt that pins every following batch to the seed's trait schema.
pub fn consistency_system_prompt(trait_types: &[String]) -> String {
    format!(
        r#"You are an NFT metadata generator. Generate unique metadata for each NFT in a collection.
CRITICAL REQUIREMENTS:
1. You MUST use EXACTLY these trait types for ALL NFTs: {traits}
2. The generation prompt MUST explicitly mention ALL trait values
3. Use a consistent perspective and style across all prompts

Each NFT must have:
1. A unique description
2. A detailed generation prompt that incorporates ALL trait values
3. Metadata with EXACTLY the trait types listed above

Example of good alignment between traits and prompt:
{{
    "description": "A noble knight with golden armor",
    "prompt": "Generate an image of a knight wearing golden armor (Armor: Gold), wielding a longsword (Weapon: Longsword), with a red plume on the helmet (Helmet: Red Plume), standing in a castle courtyard (Background: Castle)",
    "metadata": {{
        "trait_types": [
            {{"trait_type": "Armor", "value": "Gold"}},
            {{"trait_type": "Weapon", "value": "Longsword"}},
            {{"trait_type": "Helmet", "value": "Red Plume"}},
            {{"trait_type": "Background", "value": "Castle"}}
        ]
    }}
}}
Respond with a JSON object of the form {{"nfts": [...]}}."#,
        traits = trait_types.join(", ")
    )
}

pub fn batch_user_prompt(theme: &str, batch_size: usize) -> String {
    format!(
        r#"Create a collection of {batch_size} NFTs based on this theme: {theme}

REQUIREMENTS:
1. Use the EXACT trait types specified
2. CRUCIAL: The generation prompt must explicitly mention EVERY trait value
3. Use consistent perspective and style in all prompts
4. Follow the rarity distribution guidelines strictly
5. DO NOT include any rarity indicators in the metadata
6. Ensure Legendary and Mythic traits feel truly special and unique

Format each NFT exactly like this:
{{
    "description": "Unique description",
    "prompt": "Detailed prompt that MUST include ALL trait values explicitly",
    "metadata": {{
        "trait_types": [
            {{"trait_type": "Type1", "value": "Value1"}},
            {{"trait_type": "Type2", "value": "Value2"}},
            ... (same traits for all NFTs)
        ]
    }}
}}"#
    )
}

/// Parses a completion into a list of NFT objects.
///
/// Objects contribute their `nfts` member; bare arrays are taken as is.
pub fn parse_batch(content: &str) -> Result<Vec<Value>, MetadataError> {
    let parsed: Value = serde_json::from_str(content.trim())
        .map_err(|err| MetadataError::InvalidResponse(err.to_string()))?;
    let nfts = match parsed {
        Value::Object(mut map) => map.remove("nfts").unwrap_or(Value::Object(map)),
        other => other,
    };
    match nfts {
        Value::Array(items) => Ok(items),
        other => Err(MetadataError::InvalidResponse(format!(
            "expected a list of NFTs, got {}",
            json_kind(&other)
        ))),
    }
}

/// Trait type names of one NFT, in the first layout that yields any.
pub fn extract_trait_types(nft: &Value) -> Vec<String> {
    let candidates = [
        trait_names(nft.get("attributes")),
        plain_names(nft.get("trait_types")),
        trait_names(nft.pointer("/metadata/attributes")),
        trait_names(nft.pointer("/metadata/trait_types")),
    ];
    candidates
        .into_iter()
        .find(|names| !names.is_empty())
        .unwrap_or_default()
}

fn trait_names(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("trait_type").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn plain_names(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| match entry {
                    Value::String(name) => Some(name.clone()),
                    other => other
                        .get("trait_type")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub async fn generate_batch<B: ChatBackend>(
    backend: &B,
    theme: &str,
    batch_size: usize,
    system_prompt: &str,
) -> Result<Vec<Value>, MetadataError> {
    assert!(batch_size > 0, "Batch size must be positive");
    let content = backend
        .chat_json(system_prompt, &batch_user_prompt(theme, batch_size))
        .await?;
    let mut nfts = parse_batch(&content)?;
    if nfts.len() > batch_size {
        debug!(
            requested = batch_size,
            received = nfts.len(),
            "Truncating oversized batch"
        );
        nfts.truncate(batch_size);
    }
    Ok(nfts)
}

/// Generates `total` NFT metadata entries for `theme`.
///
/// The seed batch must succeed; later batches that fail are logged and
/// skipped, so the result can be shorter than `total`.
pub async fn generate_collection<B: ChatBackend>(
    backend: &B,
    theme: &str,
    total: usize,
) -> Result<Vec<Value>, MetadataError> {
    assert!(total > 0, "Collection size must be positive");
    assert!(total <= MAX_COLLECTION_SIZE, "Collection size exceeds bound");

    let mut collection = generate_batch(backend, theme, 1, STYLE_SYSTEM_PROMPT)
        .await
        .map_err(|err| MetadataError::InitialBatch(Box::new(err)))?;
    let Some(seed) = collection.first() else {
        let empty = MetadataError::InvalidResponse("empty seed batch".to_string());
        return Err(MetadataError::InitialBatch(Box::new(empty)));
    };

    let trait_types = extract_trait_types(seed);
    if trait_types.is_empty() {
        return Err(MetadataError::MissingTraitTypes);
    }
    info!(traits = %trait_types.join(", "), "Seed NFT established trait types");

    let system_prompt = consistency_system_prompt(&trait_types);
    let mut remaining = total - 1;
    while remaining > 0 {
        let batch_size = remaining.min(MAX_BATCH_SIZE);
        match generate_batch(backend, theme, batch_size, &system_prompt).await {
            Ok(batch) => collection.extend(batch),
            Err(err) => error!("Skipping failed metadata batch of {batch_size}: {err}"),
        }
        remaining -= batch_size;
    }

    if collection.len() < total {
        warn!(
            requested = total,
            generated = collection.len(),
            "Metadata collection is incomplete"
        );
    }
    Ok(collection)
}
