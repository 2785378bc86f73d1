use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Result;

fn space_lua_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```space-lua\n(.*?)```").unwrap())
}

fn config_set_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"config\.set\s*\(\s*"([^"]+)"\s*,\s*(.+?)\s*\)\s*$"#).unwrap())
}

fn config_set_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)config\.set\s*\{(.*?)\}\s*$").unwrap())
}

/// Deep-merge `value` into `root` under the dotted path `key`, replacing leaf
/// values and merging sub-maps.
fn set_nested(root: &mut Value, key: &str, value: Value) {
    let mut cursor = root;
    let parts: Vec<&str> = key.split('.').collect();
    for part in &parts[..parts.len() - 1] {
        if !cursor.is_object() {
            *cursor = Value::Object(Default::default());
        }
        cursor = cursor
            .as_object_mut()
            .unwrap()
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }
    if !cursor.is_object() {
        *cursor = Value::Object(Default::default());
    }
    let last = parts[parts.len() - 1];
    match (cursor.get(last), &value) {
        (Some(Value::Object(_)), Value::Object(new_map)) => {
            let existing = cursor.as_object_mut().unwrap().get_mut(last).unwrap();
            deep_merge_object(existing, new_map);
        }
        _ => {
            cursor.as_object_mut().unwrap().insert(last.to_string(), value);
        }
    }
}

fn deep_merge_object(existing: &mut Value, incoming: &serde_json::Map<String, Value>) {
    let existing_map = existing.as_object_mut().expect("existing must be object");
    for (k, v) in incoming {
        match (existing_map.get(k), v) {
            (Some(Value::Object(_)), Value::Object(inner)) => {
                let slot = existing_map.get_mut(k).unwrap();
                deep_merge_object(slot, inner);
            }
            _ => {
                existing_map.insert(k.clone(), v.clone());
            }
        }
    }
}

/// Parse a Lua-ish literal: strings, numbers, booleans, or `{ ... }` tables
/// with bareword/quoted keys and arbitrarily nested values.
///
/// This is a small hand-rolled recursive-descent parser, not a full Lua
/// grammar — just enough for the literal shapes `config.set` calls use.
fn parse_lua_value(input: &str) -> Option<Value> {
    let trimmed = input.trim().trim_end_matches(',');
    if trimmed.is_empty() {
        return None;
    }

    if trimmed == "true" {
        return Some(Value::Bool(true));
    }
    if trimmed == "false" {
        return Some(Value::Bool(false));
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return Some(serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null));
    }
    if (trimmed.starts_with('"') && trimmed.ends_with('"'))
        || (trimmed.starts_with('\'') && trimmed.ends_with('\''))
    {
        if trimmed.len() >= 2 {
            return Some(Value::String(trimmed[1..trimmed.len() - 1].to_string()));
        }
    }
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return parse_lua_table(&trimmed[1..trimmed.len() - 1]);
    }

    None
}

/// Parse the body of a `{ ... }` table literal into a JSON object.
fn parse_lua_table(body: &str) -> Option<Value> {
    let mut map = serde_json::Map::new();
    for entry in split_table_entries(body) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value_str) = entry.split_once('=')?;
        let key = parse_table_key(key.trim());
        let value = parse_lua_value(value_str.trim())?;
        map.insert(key, value);
    }
    Some(Value::Object(map))
}

/// Split a table body into `key = value` entries on top-level commas, i.e.
/// commas not nested inside `{}` or a quoted string.
fn split_table_entries(body: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    let mut current = String::new();

    for ch in body.chars() {
        match in_quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    in_quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => {
                    in_quote = Some(ch);
                    current.push(ch);
                }
                '{' => {
                    depth += 1;
                    current.push(ch);
                }
                '}' => {
                    depth -= 1;
                    current.push(ch);
                }
                ',' if depth == 0 => {
                    entries.push(std::mem::take(&mut current));
                }
                _ => current.push(ch),
            },
        }
    }
    if !current.trim().is_empty() {
        entries.push(current);
    }
    entries
}

fn parse_table_key(key: &str) -> String {
    if (key.starts_with('"') && key.ends_with('"')) || (key.starts_with('\'') && key.ends_with('\'')) {
        key[1..key.len() - 1].to_string()
    } else {
        key.to_string()
    }
}

/// Parse every `` ```space-lua `` fenced block in `content` and return the
/// deep-merged configuration map, applying statements in source order so
/// later `config.set` calls win over earlier ones for the same leaf.
pub fn parse_config_page(content: &str) -> Value {
    let mut config = Value::Object(Default::default());

    for block_match in space_lua_block_re().captures_iter(content) {
        let block = &block_match[1];

        for line in block.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("--") {
                continue;
            }

            if let Some(caps) = config_set_call_re().captures(line) {
                let key = caps[1].to_string();
                match parse_lua_value(&caps[2]) {
                    Some(value) => {
                        debug!(key = %key, "parsed config.set call");
                        set_nested(&mut config, &key, value);
                    }
                    None => warn!(key = %key, raw = &caps[2], "could not parse config value"),
                }
                continue;
            }

            if let Some(caps) = config_set_table_re().captures(line) {
                if let Some(Value::Object(table)) = parse_lua_table(&caps[1]) {
                    for (key, value) in table {
                        set_nested(&mut config, &key, value);
                    }
                } else {
                    warn!(raw = line, "could not parse config.set table literal");
                }
            }
        }
    }

    config
}

/// Parse `content` as `CONFIG.md` and atomically replace the sidecar JSON
/// document at `<db_path's parent>/space_config.json`.
///
/// On parse failure the previous JSON file is left untouched.
pub fn update_space_config(content: &str, db_path: &Path) -> Result<()> {
    let config = parse_config_page(content);

    let config_dir = db_path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)?;
    let config_path = config_dir.join("space_config.json");

    let pretty = serde_json::to_string_pretty(&config)
        .map_err(|e| crate::error::Error::Serialization(e.to_string()))?;

    let tmp_path = config_path.with_extension("json.tmp");
    std::fs::write(&tmp_path, pretty)?;
    std::fs::rename(&tmp_path, &config_path)?;

    info!(path = %config_path.display(), "wrote space config");
    Ok(())
}

/// Load the merged config map previously written by [`update_space_config`].
/// Returns an empty object if no config has ever been written.
pub fn load_space_config(db_path: &Path) -> Result<Value> {
    let config_dir = db_path.parent().unwrap_or_else(|| Path::new("."));
    let config_path = config_dir.join("space_config.json");
    if !config_path.is_file() {
        return Ok(Value::Object(Default::default()));
    }
    let raw = std::fs::read_to_string(&config_path)?;
    serde_json::from_str(&raw).map_err(|e| crate::error::Error::Serialization(e.to_string()))
}

/// Flatten a nested config map into dotted-path -> value pairs, for callers
/// that want a flat view rather than walking the JSON tree themselves.
#[allow(dead_code)]
pub fn flatten(config: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into(config, String::new(), &mut out);
    out
}

fn flatten_into(value: &Value, prefix: String, out: &mut BTreeMap<String, Value>) {
    if let Value::Object(map) = value {
        for (k, v) in map {
            let path = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
            if v.is_object() {
                flatten_into(v, path, out);
            } else {
                out.insert(path, v.clone());
            }
        }
    }
}
