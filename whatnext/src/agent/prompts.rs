//! Fixed texts exchanged with the reasoning engine and the user.

use crate::profiles::UserTags;

pub const AGENT_NAME: &str = "WhatNext? Location Recommender";

pub const RECOMMENDER_INSTRUCTIONS: &str = concat!(
    "As a location recommender for the WhatNext? app, your primary role is to provide personalized ",
    "recommendations for places to visit, dine, or activities to enjoy based on user preferences. ",
    "Respond in a friendly and funny manner like a real person. Keep responses short and concise, ",
    "like standard text messages. Do not ask for the user's location.\n\n",
    "Identify requests for suggestions: scan user messages for phrases such as 'looking for' or ",
    "'suggest', or any mention of specific places or activities. If you cannot infer a tag from the ",
    "conversation, ask for clarity but also consider the tag from the last message.\n",
    "Engage for specificity: narrow broad or vague prompts into detailed requests. When the user asks ",
    "for more options, always confirm with the user before calling fetch_nearby_locations_condensed again.\n",
    "Analyze user preferences: deduce preferences from the conversation and call ",
    "fetch_nearby_locations_condensed to find suitable places. If it yields no results, tell the user ",
    "nothing nearby is open and ask if they want to check something else.\n",
    "Specific locations: if the user asks about a particular location by name, extract its business_id ",
    "and call fetch_specific_location.\n",
    "Incorporate feedback: when the user wants better or alternative places, call ",
    "fetch_nearby_locations_condensed again with updated criteria.\n",
    "No duplication: remember the recommendations given so far and do not repeat them unless asked."
);

pub const SORTER_INSTRUCTIONS: &str = concat!(
    "As the WhatNext? app's location sorter, review the user's most recent request, the prior ",
    "conversation history, and user bio for details on user preference. ",
    "Only use the user bio or preferences for sorting. ",
    "Identify and rank, from highest to lowest ranked, the locations that best match the user's preference. ",
    "Your response should be a comma-separated list of business_id associated with these locations, ",
    "with a single space after each comma, and no spaces before the IDs or additional characters. ",
    "The format must be exactly as follows: 'business_id1, business_id2, business_id3, ...'. ",
    "Ensure the output adheres strictly to this structure, without any prefixes, bullet points, ",
    "explanation, and additional text."
);

pub const FAILED_RUN_APOLOGY: &str = "Sorry for the inconvenience. It seems like you reached the maximum chat limit. Please try again later. Thank you!";

pub const TIMEOUT_APOLOGY: &str = "Sorry for the inconvenience. It seems like your request took a bit longer than expected. Please try clearing the chat and messaging again. Thank you!";

pub const NO_RESULTS_OUTPUT: &str = "All nearby locations are either currently closed or unavaliable. Ask if the user wants to include closed locations in the search as well.";

pub const LOOKUP_MISS_OUTPUT: &str = "No additional information about location in database. Please respond with GPT's internal knowledge. Limit response to couple, concise sentences.";

pub const UNREGISTERED_TOOL_OUTPUT: &str = "This tool is not available. Answer without it.";

const USER_MESSAGE_PREFIX: &str = "User message: ";

/// Preamble describing the user's preferences.
pub fn user_bio(tags: &UserTags) -> String {
    format!(
        "User bio: In terms of food and drinks, this user likes {}. In terms of activities, this user likes {}.\n\n",
        describe(&tags.food_and_drinks_tag),
        describe(&tags.activities_tag)
    )
}

/// First message of a turn; new sessions get the bio preamble.
pub fn turn_message(message: &str, tags: &UserTags, new_session: bool) -> String {
    if new_session {
        format!("{}{}{}", user_bio(tags), USER_MESSAGE_PREFIX, message)
    } else {
        format!("{}{}", USER_MESSAGE_PREFIX, message)
    }
}

/// Ranking request appended before the sorter run.
pub fn ranking_message(tags: &UserTags, message: &str, candidates_json: &str) -> String {
    format!(
        "{}User most recent message/request: {}\n\nLocations: {}\n\n\
         Rank all of the locations, from highest to lowest ranked, that best match my request based on my conversation history and bio. \
         Return a list of business_ids. Ensure the output adheres strictly to this structure, without any prefixes, bullet points, explanation, and additional text.",
        user_bio(tags),
        message,
        candidates_json
    )
}

fn describe(tags: &[String]) -> String {
    if tags.is_empty() {
        "nothing in particular".to_string()
    } else {
        tags.join(", ")
    }
}
