// MCP prompts: canned user messages for common Drive/Docs tasks.

use super::protocol::{user_prompt, JsonRpcError};
use serde_json::{json, Map, Value};

struct PromptDef {
    name: &'static str,
    description: &'static str,
    arguments: &'static [(&'static str, &'static str)],
}

const PROMPTS: &[PromptDef] = &[
    PromptDef {
        name: "create-doc-template",
        description: "Draft a well-structured Google Doc on a subject",
        arguments: &[
            ("title", "The title for the new document"),
            ("subject", "The subject/topic the document should be about"),
            ("style", "The writing style (e.g., formal, casual, academic)"),
        ],
    },
    PromptDef {
        name: "analyze-doc",
        description: "Summarize and critique an existing document",
        arguments: &[("doc_id", "The ID of the document to analyze")],
    },
    PromptDef {
        name: "create-folder-structure",
        description: "Suggest a Drive folder hierarchy for a project",
        arguments: &[
            ("project_name", "The name of the main project folder"),
            (
                "project_type",
                "The type of project (e.g., research, marketing, software development)",
            ),
        ],
    },
];

pub fn prompt_list() -> Value {
    let prompts: Vec<Value> = PROMPTS
        .iter()
        .map(|p| {
            let arguments: Vec<Value> = p
                .arguments
                .iter()
                .map(|(name, description)| {
                    json!({ "name": name, "description": description, "required": true })
                })
                .collect();
            json!({ "name": p.name, "description": p.description, "arguments": arguments })
        })
        .collect();
    json!({ "prompts": prompts })
}

/// Renders a prompt. Every argument is required.
pub fn get_prompt(name: &str, arguments: &Map<String, Value>) -> Result<Value, JsonRpcError> {
    let def = PROMPTS
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown prompt: {}", name)))?;

    let arg = |key: &str| -> Result<String, JsonRpcError> {
        match arguments.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) if !other.is_null() => Ok(other.to_string()),
            _ => Err(JsonRpcError::invalid_params(format!(
                "Missing required argument '{}' for prompt {}",
                key, name
            ))),
        }
    };

    let text = match def.name {
        "create-doc-template" => format!(
            "Please create a Google Doc with the title \"{}\" about {} in a {} writing style. \
             Make sure it's well-structured with an introduction, main sections, and a conclusion.",
            arg("title")?,
            arg("subject")?,
            arg("style")?
        ),
        "analyze-doc" => format!(
            "Please analyze the content of the document with ID {}. Provide a summary of its \
             content, structure, key points, and any suggestions for improvement.",
            arg("doc_id")?
        ),
        _ => format!(
            "I need to create a well-organized folder structure in Google Drive for a {} project \
             called \"{}\". Please suggest an appropriate folder hierarchy with subfolders that \
             would help keep files organized. Include folder names and a brief description of \
             what should go in each folder.",
            arg("project_type")?,
            arg("project_name")?
        ),
    };

    Ok(user_prompt(def.description, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn test_prompt_list_names() {
        let list = prompt_list();
        let names: Vec<&str> = list["prompts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec!["create-doc-template", "analyze-doc", "create-folder-structure"]
        );
    }

    #[test]
    fn test_folder_structure_prompt_text() {
        let value = get_prompt(
            "create-folder-structure",
            &args(&[("project_name", "Gearbox"), ("project_type", "research")]),
        )
        .unwrap();

        let text = value["messages"][0]["content"]["text"].as_str().unwrap();
        assert!(text.starts_with(
            "I need to create a well-organized folder structure in Google Drive for a research project called \"Gearbox\"."
        ));
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[test]
    fn test_doc_template_prompt_text() {
        let value = get_prompt(
            "create-doc-template",
            &args(&[("title", "Q3"), ("subject", "bearings"), ("style", "formal")]),
        )
        .unwrap();

        assert_eq!(
            value["messages"][0]["content"]["text"],
            "Please create a Google Doc with the title \"Q3\" about bearings in a formal writing style. \
             Make sure it's well-structured with an introduction, main sections, and a conclusion."
        );
    }

    #[test]
    fn test_missing_argument_is_invalid_params() {
        let err = get_prompt("analyze-doc", &Map::new()).unwrap_err();
        assert_eq!(err.code, -32602);

        let err = get_prompt("nope", &Map::new()).unwrap_err();
        assert!(err.message.contains("Unknown prompt"));
    }
}
