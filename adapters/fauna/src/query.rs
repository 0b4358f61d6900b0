//! FQL v4 expression builders (JSON wire form).
//!
//! Only the handful of forms the record store needs. User data is always
//! passed through `escape` so an object key such as `get` or `ref` is never
//! read as a function call.

use domain::{Collection, DocumentRef, Payload};
use serde_json::{json, Map, Value};

/// Variable bound to each index match inside `find_first`.
const MATCH_VAR: &str = "doc";
/// Variable bound to the key's match set inside `upsert`.
const EXISTING_VAR: &str = "existing";

pub fn index(name: &str) -> Value {
    json!({ "index": name })
}

pub fn collection(name: &str) -> Value {
    json!({ "collection": name })
}

/// `Ref(Collection(c), id)`
pub fn doc_ref(reference: &DocumentRef) -> Value {
    json!({ "ref": collection(reference.collection()), "id": reference.id() })
}

/// `Match(Index(index), term)`
pub fn match_index(index_name: &str, term: &str) -> Value {
    json!({ "match": index(index_name), "terms": term })
}

/// `Map(Paginate(Match(Index(i), term), {size: 1}), Lambda(x, Get(Var(x))))`
///
/// The response is a page whose `data` holds at most one document.
pub fn find_first(index_name: &str, term: &str) -> Value {
    json!({
        "map": {
            "lambda": MATCH_VAR,
            "expr": { "get": { "var": MATCH_VAR } }
        },
        "collection": {
            "paginate": match_index(index_name, term),
            "size": 1
        }
    })
}

/// `Create(Collection(c), { data })`
pub fn create(collection_name: &str, data: &Payload) -> Value {
    json!({ "create": collection(collection_name), "params": params(data) })
}

/// `Replace(Ref(...), { data })`
pub fn replace(reference: &DocumentRef, data: &Payload) -> Value {
    json!({ "replace": doc_ref(reference), "params": params(data) })
}

/// Insert-or-replace keyed by the collection's unique index, evaluated by the
/// database as one transaction:
///
/// ```text
/// Let({existing: Match(Index(i), term)},
///     If(Exists(Var(existing)),
///        Replace(Select("ref", Get(Var(existing))), {data}),
///        Create(Collection(c), {data})))
/// ```
pub fn upsert(target: Collection, term: &str, data: &Payload) -> Value {
    let params = params(data);
    json!({
        "let": [ { EXISTING_VAR: match_index(target.unique_index(), term) } ],
        "in": {
            "if": { "exists": { "var": EXISTING_VAR } },
            "then": {
                "replace": { "select": "ref", "from": { "get": { "var": EXISTING_VAR } } },
                "params": params.clone()
            },
            "else": { "create": collection(target.name()), "params": params }
        }
    })
}

fn params(data: &Payload) -> Value {
    let mut wrapper = Map::new();
    wrapper.insert("data".into(), escape(&Value::Object(data.clone())));
    json!({ "object": wrapper })
}

/// Quote a JSON value so every object is taken as a literal.
pub fn escape(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let inner: Map<String, Value> =
                map.iter().map(|(k, v)| (k.clone(), escape(v))).collect();
            json!({ "object": inner })
        }
        Value::Array(items) => Value::Array(items.iter().map(escape).collect()),
        other => other.clone(),
    }
}
