use serde_json::{Map, Value};

use crate::gemini::Prompt;
use crate::table::Row;

const QUERY_SYSTEM: &str =
    "You generate highly relevant web search queries for retrieving information.";

const FACT_SYSTEM: &str = r#"You are a precise data extraction assistant. You must:
- Return ONLY a single list in the format ["Type", "Value"]
- For population data, return ["Population", number], e.g. ["Population", "120000"]
- Never include explanations, acknowledgements or extra formatting
- Remove all thousands separators (commas) from numbers
Example outputs:
["Restaurant", "Mixt"]
["Population", "120000"]"#;

const FACT_SELECTION_RULES: &str = r#"Select the single best and most relevant answer for the search queries.
Even when several options appear in the results, choose only one: the highest rated,
most appropriate or most relevant.
Example:
- Search query: Best restaurants near Salesforce headquarters
- Search results: Top-rated restaurants near Salesforce headquarters include Mixt, a modern salad bar, and Zuni Café, a renowned Californian restaurant.
- Output: ["Restaurant", "Mixt"]"#;

const FACT_FORMAT_RULES: &str = r#"Return exactly one list with exactly two elements:
1. Type, e.g. "City", "County", "Restaurant", "Population"
2. Name or value, e.g. "London", "Yorkshire", "Mixt", "120000"
When the query and results are about population, the type is always "Population"
(never "City" or similar) and the value is a number without commas.
For example, for the query "Population of Buckinghamshire County in current year" and the
result "The population of Buckinghamshire County is around 555,300-560,400, with a higher
female population than the England average." return ["Population", "558300"].
Return ONLY the list, nothing else."#;

/// Row data fields rendered as a JSON object, working fields excluded.
fn row_data_json(row: &Row) -> String {
    let map: Map<String, Value> = row
        .data_fields()
        .map(|(k, v)| {
            let value = serde_json::to_value(v).unwrap_or(Value::Null);
            (k.to_string(), value)
        })
        .collect();
    Value::Object(map).to_string()
}

pub fn search_query_prompt(user_query: &str, row: &Row) -> Prompt {
    Prompt {
        system: QUERY_SYSTEM.to_string(),
        messages: vec![
            "Based on the user's query and the provided data, generate up to 2 of the most effective search queries that would likely yield relevant results.".to_string(),
            format!("User's query: {user_query}"),
            format!("Data from selected columns: {}", row_data_json(row)),
            "Return the best queries as a list of strings, e.g. [\"query one\", \"query two\"].".to_string(),
            "If the data is not relevant to the user's query, is ambiguous, or you have any doubt, return an empty list [].".to_string(),
            "Use the relevant data from the selected columns in the queries.".to_string(),
        ],
    }
}

pub fn fact_prompt(row: &Row) -> Prompt {
    Prompt {
        system: FACT_SYSTEM.to_string(),
        messages: vec![
            format!("Search queries: {}", row.search_queries().join("\n")),
            format!("Search results: {}", row.one_value().join("\n")),
            FACT_SELECTION_RULES.to_string(),
            FACT_FORMAT_RULES.to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        let mut row: Row = [("County", "Kent"), ("Region", "South East")]
            .into_iter()
            .collect();
        row.set_search_queries(vec!["population of Kent".into(), "Kent census".into()]);
        row.set_one_value(vec!["About 1.6 million".into(), "Error".into()]);
        row
    }

    #[test]
    fn query_prompt_embeds_query_and_data_only() {
        let prompt = search_query_prompt("What is the population?", &row());
        let text = prompt.messages.join("\n");
        assert!(text.contains("User's query: What is the population?"));
        assert!(text.contains(r#"{"County":"Kent","Region":"South East"}"#));
        assert!(!text.contains("search_queries"));
    }

    #[test]
    fn fact_prompt_joins_working_fields_with_newlines() {
        let prompt = fact_prompt(&row());
        assert_eq!(
            prompt.messages[0],
            "Search queries: population of Kent\nKent census"
        );
        assert_eq!(prompt.messages[1], "Search results: About 1.6 million\nError");
        assert!(prompt.system.contains("Population"));
    }
}
