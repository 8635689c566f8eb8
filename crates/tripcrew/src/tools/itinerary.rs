use async_trait::async_trait;
use serde_json::{json, Value};

use super::ToolHandler;
use crate::errors::ToolResult;
use crate::models::tool::Tool;

pub const FORMAT_TOOL: &str = "format_trip_itinerary";

/// Marks the end of a formatted itinerary. Appended exactly once, only by [`format_itinerary`].
pub const ITINERARY_SENTINEL: &str = "__END_ITINERARY__";

const DISCLAIMER: &str = "Disclaimer: This is a suggested itinerary.";
const UNTITLED: &str = "Untitled Trip";
const TBD: &str = "TBD";
const NOT_AVAILABLE: &str = "N/A";

/// Render structured itinerary data as text.
///
/// Missing or malformed fields are replaced by placeholders, so any JSON value is accepted.
pub fn format_itinerary(itinerary: &Value) -> String {
    let mut out = format!("**{}**\n", field(itinerary, "trip_title", UNTITLED));
    out.push_str(&format!(
        "Destination: {}\n",
        field(itinerary, "destination", TBD)
    ));
    out.push_str(&format!(
        "Duration: {} days\n",
        field(itinerary, "duration_days", TBD)
    ));
    out.push_str(&format!(
        "Overall budget estimate: {}\n",
        field(itinerary, "overall_budget_estimate", NOT_AVAILABLE)
    ));

    let days = itinerary
        .get("daily_plans")
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    if days.is_empty() {
        out.push_str("\nNo daily plans were provided.\n");
    }

    for (index, day) in days.iter().enumerate() {
        let number = day
            .get("day")
            .and_then(scalar)
            .map(strip_sentinel)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| (index + 1).to_string());
        out.push_str(&format!(
            "\n--- Day {}: {} ---\n",
            number,
            field(day, "theme", "Free exploration")
        ));

        let activities = day
            .get("activities")
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();
        if activities.is_empty() {
            out.push_str(&format!("- {}\n", TBD));
        }
        for activity in activities {
            out.push_str(&format!(
                "- {}: {} (Est. cost: {})\n",
                field(activity, "time", "Anytime"),
                field(activity, "description", TBD),
                field(activity, "est_cost", NOT_AVAILABLE)
            ));
        }
        out.push_str(&format!(
            "Daily cost estimate: {}\n",
            field(day, "daily_cost_estimate", NOT_AVAILABLE)
        ));
    }

    out.push_str("\n---\n");
    out.push_str(DISCLAIMER);
    out.push_str("\n\n");
    out.push_str(ITINERARY_SENTINEL);
    out
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn field(value: &Value, key: &str, placeholder: &str) -> String {
    value
        .get(key)
        .and_then(scalar)
        .map(strip_sentinel)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| placeholder.to_string())
}

/// Removing one sentinel can join its neighbours into another, so strip until none is left
fn strip_sentinel(mut text: String) -> String {
    while text.contains(ITINERARY_SENTINEL) {
        text = text.replace(ITINERARY_SENTINEL, "");
    }
    text
}

/// Accepts `{"itinerary": {...}}`, `{"itinerary": "<json string>"}` or the itinerary object itself
fn unwrap_arguments(arguments: Value) -> Value {
    match arguments {
        Value::Object(mut map) if map.contains_key("itinerary") => {
            match map.remove("itinerary").unwrap_or(Value::Null) {
                Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::Null),
                other => other,
            }
        }
        other => other,
    }
}

pub struct ItineraryFormatTool {
    spec: Tool,
}

impl Default for ItineraryFormatTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ItineraryFormatTool {
    pub fn new() -> Self {
        Self {
            spec: Tool::new(
                FORMAT_TOOL,
                "Formats a finalised itinerary into the day-by-day text presented to the user.",
                json!({
                    "type": "object",
                    "properties": {
                        "itinerary": {
                            "type": "object",
                            "properties": {
                                "trip_title": {"type": "string"},
                                "destination": {"type": "string"},
                                "duration_days": {"type": "integer"},
                                "overall_budget_estimate": {"type": "string"},
                                "daily_plans": {
                                    "type": "array",
                                    "items": {
                                        "type": "object",
                                        "properties": {
                                            "day": {"type": "integer"},
                                            "theme": {"type": "string"},
                                            "activities": {
                                                "type": "array",
                                                "items": {
                                                    "type": "object",
                                                    "properties": {
                                                        "time": {"type": "string"},
                                                        "description": {"type": "string"},
                                                        "est_cost": {"type": "string"}
                                                    }
                                                }
                                            },
                                            "daily_cost_estimate": {"type": "string"}
                                        }
                                    }
                                }
                            }
                        }
                    },
                    "required": ["itinerary"]
                }),
            ),
        }
    }
}

#[async_trait]
impl ToolHandler for ItineraryFormatTool {
    fn spec(&self) -> &Tool {
        &self.spec
    }

    async fn invoke(&self, arguments: Value) -> ToolResult<String> {
        Ok(format_itinerary(&unwrap_arguments(arguments)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coastal_trip() -> Value {
        json!({
            "trip_title": "Coastal Escape",
            "destination": "Varkala",
            "duration_days": 3,
            "overall_budget_estimate": "INR 30,000",
            "daily_plans": [
                {"day": 1, "theme": "Cliffs", "activities": [
                    {"time": "Morning", "description": "Walk the North Cliff", "est_cost": "Free"}
                ], "daily_cost_estimate": "INR 2,000"},
                {"day": 2, "theme": "Backwaters", "activities": [], "daily_cost_estimate": "INR 5,000"},
                {"day": 3, "theme": "Departure"}
            ]
        })
    }

    #[test]
    fn test_format_is_pure() {
        let trip = coastal_trip();
        assert_eq!(format_itinerary(&trip), format_itinerary(&trip));
    }

    #[test]
    fn test_sentinel_once_at_end() {
        let mut trip = coastal_trip();
        trip["trip_title"] = json!(format!("Sneaky {}", ITINERARY_SENTINEL));
        let text = format_itinerary(&trip);
        assert!(text.ends_with(ITINERARY_SENTINEL));
        assert_eq!(text.matches(ITINERARY_SENTINEL).count(), 1);

        let nested = format_itinerary(&json!({"trip_title": "__END___END_ITINERARY__ITINERARY__"}));
        assert!(nested.starts_with("**Untitled Trip**\n"));
        assert!(nested.ends_with(ITINERARY_SENTINEL));
        assert_eq!(nested.matches(ITINERARY_SENTINEL).count(), 1);

        let day = format_itinerary(&json!({"daily_plans": [{"day": ITINERARY_SENTINEL}]}));
        assert!(day.contains("--- Day 1: Free exploration ---"));
        assert_eq!(day.matches(ITINERARY_SENTINEL).count(), 1);
    }

    #[test]
    fn test_day_blocks() {
        let text = format_itinerary(&coastal_trip());
        assert!(text.starts_with("**Coastal Escape**\n"));
        assert!(text.contains("--- Day 1: Cliffs ---\n- Morning: Walk the North Cliff (Est. cost: Free)"));
        assert!(text.contains("--- Day 2: Backwaters ---\n- TBD"));
        assert!(text.contains("--- Day 3: Departure ---"));
        assert!(text.contains(DISCLAIMER));
    }

    #[test]
    fn test_malformed_input_uses_placeholders() {
        for input in [json!(null), json!("not an object"), json!({"daily_plans": "oops"})] {
            let text = format_itinerary(&input);
            assert!(text.starts_with("**Untitled Trip**"));
            assert!(text.contains("No daily plans were provided."));
            assert!(text.ends_with(ITINERARY_SENTINEL));
        }
    }

    #[tokio::test]
    async fn test_tool_accepts_stringified_itinerary() {
        let tool = ItineraryFormatTool::new();
        let raw = serde_json::to_string(&coastal_trip()).unwrap();
        let text = tool.invoke(json!({"itinerary": raw})).await.unwrap();
        assert!(text.starts_with("**Coastal Escape**"));

        let direct = tool.invoke(coastal_trip()).await.unwrap();
        assert_eq!(text, direct);
    }
}
