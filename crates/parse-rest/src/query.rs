//! Query builder for class endpoints.

use std::marker::PhantomData;

use serde::Serialize;
use serde_json::{Map, Value};

use busbar_parse_client::{Error, Result};

use crate::object::ParseObject;

/// Constraints, ordering and paging for a query over `T`'s class.
///
/// Values are serialized as they are added; a value that fails to serialize
/// is reported when the query runs.
///
/// ```rust,ignore
/// let query = Query::<Note>::new()
///     .where_eq("title", "a")
///     .where_gt("score", 10)
///     .order_desc("createdAt")
///     .limit(20)
///     .include("tag");
/// let notes = client.find(&query, &RequestOptions::new()).await?;
/// ```
pub struct Query<T> {
    constraints: Map<String, Value>,
    order: Vec<String>,
    limit: Option<usize>,
    skip: Option<usize>,
    keys: Vec<String>,
    include: Vec<String>,
    error: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            constraints: self.constraints.clone(),
            order: self.order.clone(),
            limit: self.limit,
            skip: self.skip,
            keys: self.keys.clone(),
            include: self.include.clone(),
            error: self.error.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("where", &self.constraints)
            .field("order", &self.order)
            .field("limit", &self.limit)
            .field("skip", &self.skip)
            .finish_non_exhaustive()
    }
}

impl<T> Default for Query<T> {
    fn default() -> Self {
        Self {
            constraints: Map::new(),
            order: Vec::new(),
            limit: None,
            skip: None,
            keys: Vec::new(),
            include: Vec::new(),
            error: None,
            _marker: PhantomData,
        }
    }
}

impl<T: ParseObject> Query<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The class queried.
    pub fn class_name(&self) -> &'static str {
        T::CLASS_NAME
    }

    /// `key == value`.
    pub fn where_eq(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Some(value) = self.value(value) {
            self.constraints.insert(key.into(), value);
        }
        self
    }

    pub fn where_ne(self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.operator(key, "$ne", value)
    }

    pub fn where_lt(self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.operator(key, "$lt", value)
    }

    pub fn where_lte(self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.operator(key, "$lte", value)
    }

    pub fn where_gt(self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.operator(key, "$gt", value)
    }

    pub fn where_gte(self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.operator(key, "$gte", value)
    }

    /// `key` is one of `values`.
    pub fn contained_in<V: Serialize>(self, key: impl Into<String>, values: &[V]) -> Self {
        self.operator(key, "$in", values)
    }

    /// `key` is none of `values`.
    pub fn not_contained_in<V: Serialize>(self, key: impl Into<String>, values: &[V]) -> Self {
        self.operator(key, "$nin", values)
    }

    pub fn exists(self, key: impl Into<String>) -> Self {
        self.operator(key, "$exists", true)
    }

    pub fn does_not_exist(self, key: impl Into<String>) -> Self {
        self.operator(key, "$exists", false)
    }

    /// Objects whose id is one of `ids`.
    pub fn object_ids<S: AsRef<str>>(self, ids: &[S]) -> Self {
        let ids: Vec<&str> = ids.iter().map(AsRef::as_ref).collect();
        self.contained_in("objectId", &ids)
    }

    pub fn order_asc(mut self, key: impl Into<String>) -> Self {
        self.order.push(key.into());
        self
    }

    pub fn order_desc(mut self, key: impl Into<String>) -> Self {
        self.order.push(format!("-{}", key.into()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Restrict returned fields.
    pub fn keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Return the object behind a pointer field instead of the pointer.
    pub fn include(mut self, key: impl Into<String>) -> Self {
        self.include.push(key.into());
        self
    }

    /// Query-string parameters for a find.
    pub fn params(&self) -> Result<Vec<(String, String)>> {
        if let Some(ref message) = self.error {
            return Err(Error::encoding(message.clone()));
        }
        let mut params = Vec::new();
        if !self.constraints.is_empty() {
            params.push((
                "where".to_string(),
                Value::Object(self.constraints.clone()).to_string(),
            ));
        }
        if !self.order.is_empty() {
            params.push(("order".to_string(), self.order.join(",")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(skip) = self.skip {
            params.push(("skip".to_string(), skip.to_string()));
        }
        if !self.keys.is_empty() {
            params.push(("keys".to_string(), self.keys.join(",")));
        }
        if !self.include.is_empty() {
            params.push(("include".to_string(), self.include.join(",")));
        }
        Ok(params)
    }

    /// Query-string parameters for a count: constraints only.
    pub fn count_params(&self) -> Result<Vec<(String, String)>> {
        let mut params: Vec<(String, String)> = self
            .params()?
            .into_iter()
            .filter(|(k, _)| k == "where")
            .collect();
        params.push(("count".to_string(), "1".to_string()));
        params.push(("limit".to_string(), "0".to_string()));
        Ok(params)
    }

    fn operator(mut self, key: impl Into<String>, op: &str, value: impl Serialize) -> Self {
        let Some(value) = self.value(value) else {
            return self;
        };
        let entry = self
            .constraints
            .entry(key.into())
            .or_insert_with(|| Value::Object(Map::new()));
        // An equality constraint on the same key is replaced.
        if !is_operator_map(entry) {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(ops) = entry {
            ops.insert(op.to_string(), value);
        }
        self
    }

    fn value(&mut self, value: impl Serialize) -> Option<Value> {
        match serde_json::to_value(value) {
            Ok(value) => Some(value),
            Err(e) => {
                self.error.get_or_insert_with(|| e.to_string());
                None
            }
        }
    }
}

fn is_operator_map(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectMeta;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Note {
        #[serde(flatten)]
        meta: ObjectMeta,
    }

    impl ParseObject for Note {
        const CLASS_NAME: &'static str = "Note";
        fn meta(&self) -> &ObjectMeta {
            &self.meta
        }
        fn meta_mut(&mut self) -> &mut ObjectMeta {
            &mut self.meta
        }
    }

    fn where_of(query: &Query<Note>) -> Value {
        let params = query.params().unwrap();
        let (_, raw) = params.iter().find(|(k, _)| k == "where").unwrap();
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_constraints_combine_per_key() {
        let query = Query::<Note>::new()
            .where_eq("title", "a")
            .where_gt("score", 1)
            .where_lte("score", 9)
            .contained_in("tag", &["x", "y"])
            .exists("due");

        assert_eq!(
            where_of(&query),
            json!({
                "title": "a",
                "score": {"$gt": 1, "$lte": 9},
                "tag": {"$in": ["x", "y"]},
                "due": {"$exists": true}
            })
        );
    }

    #[test]
    fn test_operator_replaces_equality() {
        let query = Query::<Note>::new().where_eq("score", 3).where_ne("score", 4);
        assert_eq!(where_of(&query), json!({"score": {"$ne": 4}}));
    }

    #[test]
    fn test_params_order() {
        let query = Query::<Note>::new()
            .order_asc("title")
            .order_desc("createdAt")
            .limit(10)
            .skip(5)
            .keys(["title", "tag"])
            .include("tag");
        let params = query.params().unwrap();
        let names: Vec<&str> = params.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["order", "limit", "skip", "keys", "include"]);
        assert_eq!(params[0].1, "title,-createdAt");
    }

    #[test]
    fn test_count_params() {
        let query = Query::<Note>::new().where_eq("title", "a").limit(3);
        let params = query.count_params().unwrap();
        let names: Vec<&str> = params.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["where", "count", "limit"]);
        assert_eq!(params[2].1, "0");
    }

    #[test]
    fn test_object_ids() {
        let query = Query::<Note>::new().object_ids(&["a", "b"]);
        assert_eq!(where_of(&query), json!({"objectId": {"$in": ["a", "b"]}}));
    }
}
