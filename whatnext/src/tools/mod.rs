//! Tools exposed to the reasoning engine.
//!
//! The tool set is closed: a pending call either parses into one of the
//! registered variants or becomes [`ToolInvocation::Unregistered`].

pub mod arguments;

pub use arguments::{ArgumentValidator, NearbySearchArgs};

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::locations::SortKey;
use crate::reasoning::{ToolCallRequest, ToolDefinition};
use crate::vocabulary::Vocabulary;

pub const NEARBY_TOOL: &str = "fetch_nearby_locations_condensed";
pub const LOOKUP_TOOL: &str = "fetch_specific_location";

const LIMIT_CHOICES: [&str; 3] = ["5", "10", "15"];
const RADIUS_CHOICES: [&str; 5] = ["500", "1600", "5000", "10000", "20000"];

/// JSON-schema definitions of both tools, enumerating the vocabularies.
pub fn tool_definitions(vocab: &Vocabulary) -> Vec<ToolDefinition> {
    let sort_keys: Vec<&str> = SortKey::ALL.iter().map(SortKey::as_str).collect();
    vec![
        ToolDefinition {
            name: NEARBY_TOOL.to_string(),
            description: "Retrieve the locations of potential places for users to visit (DO NOT NEED USERS LOCATION)".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "string",
                        "enum": LIMIT_CHOICES,
                        "description": "Specifies the number of locations to retrieve. Default: 5."
                    },
                    "radius": {
                        "type": "string",
                        "enum": RADIUS_CHOICES,
                        "description": "Defines the search radius in meters. 500 meter is walkable, 1600 is close, 5000 is close/medium, 10000 is medium, and 20000 is far distance. Default: 10000."
                    },
                    "categories": {
                        "type": "string",
                        "enum": vocab.categories(),
                        "description": "Primary categories to filter the search, representing broad sectors or types of locations. You can have a list of categories in string format. Categories must be in 'enum'. Example: 'shopping'."
                    },
                    "cur_open": {
                        "type": "string",
                        "enum": ["0", "1"],
                        "description": "Filter based on current open status. 0 for both closed and open, while 1 is just for open. Use 0 when seeking recommendations for future dates. Default: 1."
                    },
                    "tag": {
                        "type": "string",
                        "enum": vocab.tags(),
                        "description": "Optional tags to refine your search based on specific attributes or specialties within a category. You can have a list of tags. Tags must be in 'enum'."
                    },
                    "sort_by": {
                        "type": "string",
                        "enum": sort_keys,
                        "description": "Sorts the results by the specified criteria. Options: review_count, stars, or random."
                    }
                },
                "required": ["categories", "tag"]
            }),
        },
        ToolDefinition {
            name: LOOKUP_TOOL.to_string(),
            description: "Input a business_id and retrieve its detailed information (ONLY FOR SPECIFIC BUSINESS_ID QUERY).".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "business_id": {
                        "type": "string",
                        "description": "The business_id used to identify a specific location. The business_id is composed of the category and a four-digit number."
                    }
                },
                "required": ["business_id"]
            }),
        },
    ]
}

/// A pending tool call, decoded against the registered tool set.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    NearbyLocations {
        call_id: String,
        args: NearbySearchArgs,
    },
    SpecificLocation {
        call_id: String,
        business_id: String,
    },
    Unregistered {
        call_id: String,
        name: String,
    },
}

impl ToolInvocation {
    pub fn from_request(request: &ToolCallRequest, validator: &ArgumentValidator) -> Self {
        let raw = parse_raw_arguments(&request.name, &request.arguments);
        match request.name.as_str() {
            NEARBY_TOOL => ToolInvocation::NearbyLocations {
                call_id: request.id.clone(),
                args: validator.validate(&raw),
            },
            LOOKUP_TOOL => ToolInvocation::SpecificLocation {
                call_id: request.id.clone(),
                business_id: raw
                    .get("business_id")
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default(),
            },
            other => ToolInvocation::Unregistered {
                call_id: request.id.clone(),
                name: other.to_string(),
            },
        }
    }

    pub fn call_id(&self) -> &str {
        match self {
            ToolInvocation::NearbyLocations { call_id, .. }
            | ToolInvocation::SpecificLocation { call_id, .. }
            | ToolInvocation::Unregistered { call_id, .. } => call_id,
        }
    }

    pub fn tool_name(&self) -> &str {
        match self {
            ToolInvocation::NearbyLocations { .. } => NEARBY_TOOL,
            ToolInvocation::SpecificLocation { .. } => LOOKUP_TOOL,
            ToolInvocation::Unregistered { name, .. } => name,
        }
    }
}

/// Parses the raw argument text; empty or malformed text yields an empty map.
fn parse_raw_arguments(tool: &str, arguments: &str) -> Map<String, Value> {
    if arguments.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(tool, "Tool arguments are not an object ({}), using defaults", other);
            Map::new()
        }
        Err(e) => {
            warn!(tool, "Malformed tool arguments ({}), using defaults", e);
            Map::new()
        }
    }
}
