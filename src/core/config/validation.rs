use serde_json::{Map, Value};

use crate::core::errors::ApiError;
use crate::corpus::normalize_alias;

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(corpus) = expect_optional_object(root, "corpus")? {
        validate_optional_string_field(corpus, "corpus.snapshot_path", "snapshot_path")?;
        validate_u64_field(
            corpus,
            "corpus.expected_dimension",
            "expected_dimension",
            1,
            65_536,
        )?;
    }

    if let Some(ollama) = expect_optional_object(root, "ollama")? {
        validate_optional_string_field(ollama, "ollama.base_url", "base_url")?;
        validate_optional_string_field(ollama, "ollama.api_key", "api_key")?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_optional_string_field(embedding, "embedding.model", "model")?;
        validate_u64_field(embedding, "embedding.timeout_secs", "timeout_secs", 1, 3_600)?;
        validate_bool_field(embedding, "embedding.verify_on_startup", "verify_on_startup")?;
    }

    if let Some(generation) = expect_optional_object(root, "generation")? {
        validate_optional_string_field(generation, "generation.model", "model")?;
        validate_u64_field(generation, "generation.timeout_secs", "timeout_secs", 1, 3_600)?;
        validate_u64_field(generation, "generation.max_retries", "max_retries", 0, 1)?;
        validate_f64_field(generation, "generation.temperature", "temperature", 0.0, 2.0)?;
        validate_u64_field(generation, "generation.num_predict", "num_predict", 1, 32_768)?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 1, 100)?;
        validate_f64_field(
            retrieval,
            "retrieval.min_relevance",
            "min_relevance",
            -1.0,
            1.0,
        )?;
    }

    if let Some(guardrails) = expect_optional_object(root, "guardrails")? {
        validate_optional_string_field(guardrails, "guardrails.persona", "persona")?;
        validate_optional_string_field(
            guardrails,
            "guardrails.insufficient_message",
            "insufficient_message",
        )?;

        for (index, entry) in expect_optional_object_array(guardrails, "guardrails.confusable_pairs", "confusable_pairs")?
            .into_iter()
            .enumerate()
        {
            let path_prefix = format!("guardrails.confusable_pairs[{}]", index);
            validate_required_string_field(entry, &format!("{}.first", path_prefix), "first")?;
            validate_required_string_field(entry, &format!("{}.second", path_prefix), "second")?;
            validate_optional_string_field(entry, &format!("{}.note", path_prefix), "note")?;

            let first = entry.get("first").and_then(|v| v.as_str()).unwrap_or_default();
            let second = entry.get("second").and_then(|v| v.as_str()).unwrap_or_default();
            if normalize_alias(first) == normalize_alias(second) {
                return Err(ApiError::BadRequest(format!(
                    "Invalid config at '{}': first and second must name different entities",
                    path_prefix
                )));
            }
        }

        for (index, entry) in expect_optional_object_array(guardrails, "guardrails.entity_titles", "entity_titles")?
            .into_iter()
            .enumerate()
        {
            let path_prefix = format!("guardrails.entity_titles[{}]", index);
            validate_required_string_field(entry, &format!("{}.entity", path_prefix), "entity")?;
            validate_required_string_field(entry, &format!("{}.title", path_prefix), "title")?;
        }
    }

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65_535)?;
        validate_string_array_field(server, "server.allowed_origins", "allowed_origins")?;
        validate_u64_field(
            server,
            "server.max_question_length",
            "max_question_length",
            1,
            100_000,
        )?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn expect_optional_object_array<'a>(
    section: &'a Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<Vec<&'a Map<String, Value>>, ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(Vec::new());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of objects"));
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_object()
                .ok_or_else(|| config_type_error(&format!("{}[{}]", path, index), "object"))
        })
        .collect()
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if !(min..=max).contains(&number) {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_required_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let value = section.get(key).ok_or_else(|| {
        ApiError::BadRequest(format!("Invalid config at '{}': value is required", path))
    })?;
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_str().is_none() {
        return Err(config_type_error(path, "string"));
    }
    Ok(())
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
