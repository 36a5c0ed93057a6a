//! Expand decoded query-string pairs with bracket keys into nested query params:
//! `author[name]=x` -> `{"author": {"name": "x"}}`, `order[0][0]=id` -> `{"order": [["id"]]}`.

use crate::filter::QueryParams;
use serde_json::{Map, Value};

/// Nesting deeper than this keeps the remainder of the key as a literal segment.
const MAX_DEPTH: usize = 5;

pub fn expand_pairs<I, K, V>(pairs: I) -> QueryParams
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut root = Map::new();
    for (key, value) in pairs {
        let segments = split_key(key.as_ref());
        if segments.is_empty() {
            continue;
        }
        insert(&mut root, &segments, Value::String(value.into()));
    }
    for value in root.values_mut() {
        normalize(value);
    }
    root
}

fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return if key.is_empty() { Vec::new() } else { vec![key.to_string()] };
    };
    if open == 0 {
        return vec![key.to_string()];
    }
    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while segments.len() <= MAX_DEPTH {
        let Some(stripped) = rest.strip_prefix('[') else { break };
        let Some(close) = stripped.find(']') else { break };
        segments.push(stripped[..close].to_string());
        rest = &stripped[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(rest.to_string());
    }
    segments
}

fn insert(map: &mut Map<String, Value>, segments: &[String], value: Value) {
    let (head, tail) = match segments.split_first() {
        Some(parts) => parts,
        None => return,
    };
    if tail.is_empty() {
        match map.get_mut(head) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let previous = existing.take();
                *existing = Value::Array(vec![previous, value]);
            }
            None => {
                map.insert(head.clone(), value);
            }
        }
        return;
    }
    let entry = map
        .entry(head.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        // `a=1&a[b]=2`: keep the scalar under the empty key.
        let previous = entry.take();
        let mut nested = Map::new();
        nested.insert(String::new(), previous);
        *entry = Value::Object(nested);
    }
    if let Value::Object(nested) = entry {
        if tail[0].is_empty() {
            // `ids[]=1&ids[]=2`: append under the next free index.
            let index = nested.len().to_string();
            let mut rest = vec![index];
            rest.extend_from_slice(&tail[1..]);
            insert(nested, &rest, value);
        } else {
            insert(nested, tail, value);
        }
    }
}

/// Objects keyed `0..n` become arrays, recursively.
fn normalize(value: &mut Value) {
    if let Value::Object(map) = value {
        for v in map.values_mut() {
            normalize(v);
        }
        let is_sequence = !map.is_empty()
            && map
                .keys()
                .enumerate()
                .all(|(i, k)| k.parse::<usize>().map(|n| n == i).unwrap_or(false));
        if is_sequence {
            let items = std::mem::take(map).into_iter().map(|(_, v)| v).collect();
            *value = Value::Array(items);
        }
    }
}
