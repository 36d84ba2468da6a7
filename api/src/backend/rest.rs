use async_trait::async_trait;
use serde_json::Value;

use super::{Backend, BackendError};

/// Row filters, rendered as `column=op.value` query parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter(Vec<(String, String)>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.0.push((column.into(), format!("eq.{}", value.to_string())));
        self
    }

    pub fn in_list<T: ToString>(mut self, column: &str, values: &[T]) -> Self {
        let list = values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.0.push((column.into(), format!("in.({list})")));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub columns: String,
    pub filter: Filter,
    order: Option<(String, bool)>,
    limit: Option<usize>,
}

impl Query {
    pub fn select(columns: &str) -> Self {
        Self {
            columns: columns.into(),
            filter: Filter::new(),
            order: None,
            limit: None,
        }
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filter = self.filter.eq(column, value);
        self
    }

    pub fn in_list<T: ToString>(mut self, column: &str, values: &[T]) -> Self {
        self.filter = self.filter.in_list(column, values);
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some((column.into(), ascending));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), self.columns.clone())];
        pairs.extend(self.filter.pairs().iter().cloned());
        if let Some((column, ascending)) = &self.order {
            let direction = if *ascending { "asc" } else { "desc" };
            pairs.push(("order".into(), format!("{column}.{direction}")));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".into(), limit.to_string()));
        }
        pairs
    }
}

/// Table-level access to the backend. Every call runs with the caller's
/// access token when there is one, so row-level policies apply to the user
/// rather than to this service.
#[async_trait]
pub trait TableSource: Send + Sync {
    async fn select(
        &self,
        table: &str,
        query: &Query,
        token: Option<&str>,
    ) -> Result<Vec<Value>, BackendError>;

    async fn insert(
        &self,
        table: &str,
        row: Value,
        token: Option<&str>,
    ) -> Result<Vec<Value>, BackendError>;

    /// Insert, or merge into the row that conflicts on `on_conflict` columns.
    async fn upsert(
        &self,
        table: &str,
        row: Value,
        on_conflict: &str,
        token: Option<&str>,
    ) -> Result<Vec<Value>, BackendError>;

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        patch: Value,
        token: Option<&str>,
    ) -> Result<Vec<Value>, BackendError>;

    async fn delete(
        &self,
        table: &str,
        filter: &Filter,
        token: Option<&str>,
    ) -> Result<(), BackendError>;
}

impl Backend {
    fn table_url(&self, table: &str) -> Result<url::Url, BackendError> {
        self.endpoint(&format!("rest/v1/{table}"))
    }
}

#[async_trait]
impl TableSource for Backend {
    async fn select(
        &self,
        table: &str,
        query: &Query,
        token: Option<&str>,
    ) -> Result<Vec<Value>, BackendError> {
        let request = self
            .http
            .get(self.table_url(table)?)
            .query(&query.pairs())
            .header(reqwest::header::ACCEPT, "application/json");

        let response = self.send(self.authorize(request, token)).await?;
        Ok(response.json().await?)
    }

    async fn insert(
        &self,
        table: &str,
        row: Value,
        token: Option<&str>,
    ) -> Result<Vec<Value>, BackendError> {
        let request = self
            .http
            .post(self.table_url(table)?)
            .header("Prefer", "return=representation")
            .json(&row);

        let response = self.send(self.authorize(request, token)).await?;
        Ok(response.json().await?)
    }

    async fn upsert(
        &self,
        table: &str,
        row: Value,
        on_conflict: &str,
        token: Option<&str>,
    ) -> Result<Vec<Value>, BackendError> {
        let request = self
            .http
            .post(self.table_url(table)?)
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&row);

        let response = self.send(self.authorize(request, token)).await?;
        Ok(response.json().await?)
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        patch: Value,
        token: Option<&str>,
    ) -> Result<Vec<Value>, BackendError> {
        // An unfiltered PATCH would touch every row the policies allow
        if filter.is_empty() {
            return Err(BackendError::Api {
                status: reqwest::StatusCode::BAD_REQUEST,
                code: None,
                message: "Refusing to update without a filter".into(),
            });
        }

        let request = self
            .http
            .patch(self.table_url(table)?)
            .query(filter.pairs())
            .header("Prefer", "return=representation")
            .json(&patch);

        let response = self.send(self.authorize(request, token)).await?;
        Ok(response.json().await?)
    }

    async fn delete(
        &self,
        table: &str,
        filter: &Filter,
        token: Option<&str>,
    ) -> Result<(), BackendError> {
        if filter.is_empty() {
            return Err(BackendError::Api {
                status: reqwest::StatusCode::BAD_REQUEST,
                code: None,
                message: "Refusing to delete without a filter".into(),
            });
        }

        let request = self
            .http
            .delete(self.table_url(table)?)
            .query(filter.pairs())
            .header("Prefer", "return=minimal");

        self.send(self.authorize(request, token)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn query_pairs_in_order() {
        let query = Query::select("id,content")
            .eq("slug", "intro")
            .order("created_at", true)
            .limit(10);

        assert_eq!(
            query.pairs(),
            vec![
                ("select".to_string(), "id,content".to_string()),
                ("slug".to_string(), "eq.intro".to_string()),
                ("order".to_string(), "created_at.asc".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn in_list_filter() {
        let filter = Filter::new().in_list("comment_id", &[1, 2, 3]);
        assert_eq!(
            filter.pairs(),
            &[("comment_id".to_string(), "in.(1,2,3)".to_string())]
        );
    }

    #[test]
    fn descending_order() {
        let pairs = Query::select("*").order("created_at", false).pairs();
        assert_eq!(pairs[1], ("order".to_string(), "created_at.desc".to_string()));
    }
}
