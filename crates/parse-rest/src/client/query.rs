//! Query execution and the server health check.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::instrument;

use busbar_parse_client::{Error, ErrorKind, RequestMethod, RequestOptions, Result};

use crate::coding;
use crate::command::Command;
use crate::object::{self, ParseObject};
use crate::query::Query;

#[derive(Debug, Deserialize)]
struct FindResponse {
    results: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

impl super::ParseClient {
    /// Objects matching `query`.
    #[instrument(skip(self, query, options), fields(class = T::CLASS_NAME))]
    pub async fn find<T: ParseObject>(
        &self,
        query: &Query<T>,
        options: &RequestOptions,
    ) -> Result<Vec<T>> {
        self.find_maps(query, options)
            .await?
            .into_iter()
            .map(coding::from_map)
            .collect()
    }

    /// The first object matching `query`.
    pub async fn first<T: ParseObject>(
        &self,
        query: &Query<T>,
        options: &RequestOptions,
    ) -> Result<T> {
        let query = query.clone().limit(1);
        self.find(&query, options)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::new(ErrorKind::ObjectNotFound(format!(
                    "no {} matches the query",
                    T::CLASS_NAME
                )))
            })
    }

    /// Number of objects matching `query`.
    #[instrument(skip(self, query, options), fields(class = T::CLASS_NAME))]
    pub async fn count<T: ParseObject>(
        &self,
        query: &Query<T>,
        options: &RequestOptions,
    ) -> Result<u64> {
        let mut command = Command::<CountResponse>::json(
            RequestMethod::Get,
            object::endpoint(T::CLASS_NAME, None),
        );
        for (key, value) in query.count_params()? {
            command = command.param(key, value);
        }
        Ok(self.execute(&command, options).await?.count)
    }

    /// `GET /health`: the server's reported status, e.g. `"ok"`.
    #[instrument(skip(self, options))]
    pub async fn health(&self, options: &RequestOptions) -> Result<String> {
        let command = Command::<HealthResponse>::json(RequestMethod::Get, "/health");
        Ok(self.execute(&command, options).await?.status)
    }

    pub(crate) async fn find_maps<T: ParseObject>(
        &self,
        query: &Query<T>,
        options: &RequestOptions,
    ) -> Result<Vec<Map<String, Value>>> {
        let mut command = Command::<FindResponse>::json(
            RequestMethod::Get,
            object::endpoint(T::CLASS_NAME, None),
        );
        for (key, value) in query.params()? {
            command = command.param(key, value);
        }
        Ok(self.execute(&command, options).await?.results)
    }
}
