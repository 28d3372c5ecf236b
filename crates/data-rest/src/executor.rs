//! Request executor
//!
//! Runs one CRUD operation against a collection:
//!
//! 1. write bodies must carry exactly one document (`NoData` / `BadRequest`)
//! 2. the collection must exist in the live catalog (`CollectionNotFound`)
//! 3. filters are parsed, submitted keys are narrowed to legal columns
//! 4. the statement is rendered and executed
//! 5. rows are mapped to documents; single-resource operations that touch
//!    nothing fail with `ResourceNotFound`
//!
//! Catalog checks and the main statement are separate round-trips without a
//! surrounding transaction, so a table dropped in between surfaces as an
//! execution failure of the main statement.

use std::sync::Arc;

use tracing::{debug, warn};

use data_common::config::{FilterPolicy, ServerConfig};
use data_common::error::{Error, Result};
use data_common::types::Document;

use crate::backend::Database;
use crate::catalog::{retain_legal, Catalog, IDENTITY_COLUMN};
use crate::filter::Predicate;
use crate::params::QueryParams;
use crate::query::Query;
use crate::rows::map_rows;

/// Executes CRUD operations on arbitrary collections
#[derive(Clone)]
pub struct Executor {
    db: Arc<dyn Database>,
    catalog: Catalog,
    max_rows: Option<u64>,
    filter_policy: FilterPolicy,
}

impl Executor {
    pub fn new(db: Arc<dyn Database>, config: &ServerConfig) -> Self {
        Self {
            catalog: Catalog::new(db.clone(), &config.schema),
            db,
            max_rows: config.max_rows,
            filter_policy: config.filter_policy,
        }
    }

    /// All documents of a collection matching the request filter
    pub async fn read(&self, collection: &str, params: &QueryParams) -> Result<Vec<Document>> {
        self.ensure_collection(collection).await?;

        let query = self
            .select(collection, params)?
            .filter(self.filter(params)?);

        let rows = self.db.query(&query.render()).await?;
        Ok(map_rows(rows))
    }

    /// The document with the given id, if it also satisfies the request filter
    pub async fn find(
        &self,
        collection: &str,
        id: &str,
        params: &QueryParams,
    ) -> Result<Vec<Document>> {
        self.ensure_collection(collection).await?;

        let query = self
            .select(collection, params)?
            .filter(by_id(self.filter(params)?, id));

        let rows = self.db.query(&query.render()).await?;
        found(collection, id, map_rows(rows))
    }

    /// Insert one document and return the stored row
    pub async fn create(&self, collection: &str, documents: Vec<Document>) -> Result<Vec<Document>> {
        let document = single_document(documents)?;
        self.ensure_collection(collection).await?;

        let columns = self.catalog.legal_columns(collection).await?;
        let values = retain_legal(&document, &columns);
        debug!(
            collection,
            submitted = document.len(),
            kept = values.len(),
            "creating document"
        );

        let query = Query::insert(collection)
            .schema(self.catalog.schema())
            .values(values)
            .returning(true);

        let rows = self.db.query(&query.render()).await?;
        Ok(map_rows(rows))
    }

    /// Update one document by id and return the stored row.
    ///
    /// With no recognized columns this is a lookup that leaves the row untouched.
    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        documents: Vec<Document>,
        params: &QueryParams,
    ) -> Result<Vec<Document>> {
        let document = single_document(documents)?;
        self.ensure_collection(collection).await?;

        let columns = self.catalog.legal_columns(collection).await?;
        let values = retain_legal(&document, &columns);
        if values.is_empty() {
            debug!(collection, id, "no recognized columns, update is a lookup");
        }

        let query = Query::update(collection)
            .schema(self.catalog.schema())
            .values(values)
            .filter(by_id(self.filter(params)?, id))
            .returning(true);

        let rows = self.db.query(&query.render()).await?;
        found(collection, id, map_rows(rows))
    }

    /// Delete one document by id; returns the affected-row count
    pub async fn delete(&self, collection: &str, id: &str, params: &QueryParams) -> Result<u64> {
        self.ensure_collection(collection).await?;

        let query = Query::delete(collection)
            .schema(self.catalog.schema())
            .filter(by_id(self.filter(params)?, id))
            .limit(params.limit()?)
            .offset(params.offset()?);

        let affected = self.db.execute(&query.render()).await?;
        if affected == 0 {
            return Err(not_found(collection, id));
        }
        Ok(affected)
    }

    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        if self.catalog.collection_exists(collection).await? {
            Ok(())
        } else {
            Err(Error::CollectionNotFound(collection.to_string()))
        }
    }

    fn select(&self, collection: &str, params: &QueryParams) -> Result<Query> {
        Ok(Query::select(collection)
            .schema(self.catalog.schema())
            .fields(params.fields())
            .limit(self.effective_limit(params.limit()?))
            .offset(params.offset()?))
    }

    fn effective_limit(&self, requested: Option<u64>) -> Option<u64> {
        match (requested, self.max_rows) {
            (Some(limit), Some(max)) => Some(limit.min(max)),
            (limit, None) => limit,
            (None, max) => max,
        }
    }

    fn filter(&self, params: &QueryParams) -> Result<Predicate> {
        let Some(raw) = params.filter.as_deref() else {
            return Ok(Predicate::Empty);
        };

        match Predicate::parse(raw) {
            Ok(predicate) => Ok(predicate),
            Err(err) if self.filter_policy == FilterPolicy::Lenient => {
                warn!(error = %err, "ignoring malformed where filter");
                Ok(Predicate::Empty)
            }
            Err(err) => Err(err),
        }
    }
}

/// User filter AND identity equality, identity clause last
fn by_id(filter: Predicate, id: &str) -> Predicate {
    Predicate::and(filter, Predicate::eq(IDENTITY_COLUMN, id))
}

fn single_document(documents: Vec<Document>) -> Result<Document> {
    let mut documents = documents.into_iter();
    match (documents.next(), documents.next()) {
        (None, _) => Err(Error::NoData),
        (Some(document), None) => Ok(document),
        (Some(_), Some(_)) => Err(Error::BadRequest(
            "only one document per request is supported".to_string(),
        )),
    }
}

fn found(collection: &str, id: &str, documents: Vec<Document>) -> Result<Vec<Document>> {
    if documents.is_empty() {
        Err(not_found(collection, id))
    } else {
        Ok(documents)
    }
}

fn not_found(collection: &str, id: &str) -> Error {
    Error::ResourceNotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Cell, Reply, RowSet, ScriptedDatabase};
    use serde_json::{json, Value as JsonValue};

    fn executor(db: &Arc<ScriptedDatabase>) -> Executor {
        Executor::new(db.clone(), &ServerConfig::default())
    }

    fn doc(value: JsonValue) -> Document {
        serde_json::from_value(value).unwrap()
    }

    fn post(id: i64, name: &str) -> Vec<Cell> {
        vec![Cell::Int(id), Cell::Text(name.to_string())]
    }

    fn posts(rows: Vec<Vec<Cell>>) -> RowSet {
        RowSet::new(vec!["id".into(), "name".into()], rows)
    }

    #[tokio::test]
    async fn test_read_all() {
        let db = Arc::new(
            ScriptedDatabase::new()
                .rows(RowSet::count(1))
                .rows(posts(vec![post(1, "foobar"), post(2, "foofoo")])),
        );

        let docs = executor(&db)
            .read("posts", &QueryParams::default())
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["name"], json!("foofoo"));
        assert_eq!(db.statements()[1].sql, r#"SELECT * FROM "public"."posts""#);
    }

    #[tokio::test]
    async fn test_read_unknown_collection_stops_early() {
        let db = Arc::new(ScriptedDatabase::new().rows(RowSet::count(0)));

        let err = executor(&db)
            .read("POSTS", &QueryParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CollectionNotFound(ref c) if c == "POSTS"));
        assert_eq!(db.statements().len(), 1);
    }

    #[tokio::test]
    async fn test_read_with_filter_and_window() {
        let db = Arc::new(
            ScriptedDatabase::new()
                .rows(RowSet::count(1))
                .rows(posts(vec![])),
        );
        let params = QueryParams::parse("where=%7B%22name%22%3A%22title%22%7D&limit=1&offset=1");

        let docs = executor(&db).read("posts", &params).await.unwrap();
        assert!(docs.is_empty());

        let stmt = &db.statements()[1];
        assert_eq!(
            stmt.sql,
            r#"SELECT * FROM "public"."posts" WHERE "name" = $1 LIMIT 1 OFFSET 1"#
        );
        assert_eq!(stmt.params, vec![json!("title")]);
    }

    #[tokio::test]
    async fn test_lenient_filter_matches_all() {
        let db = Arc::new(
            ScriptedDatabase::new()
                .rows(RowSet::count(1))
                .rows(posts(vec![post(1, "foobar")])),
        );
        let params = QueryParams {
            filter: Some("{broken".into()),
            ..QueryParams::default()
        };

        let docs = executor(&db).read("posts", &params).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(db.statements()[1].sql, r#"SELECT * FROM "public"."posts""#);
    }

    #[tokio::test]
    async fn test_strict_filter_rejects() {
        let db = Arc::new(ScriptedDatabase::new().rows(RowSet::count(1)));
        let config = ServerConfig {
            filter_policy: FilterPolicy::Strict,
            ..ServerConfig::default()
        };
        let params = QueryParams {
            filter: Some("{broken".into()),
            ..QueryParams::default()
        };

        let err = Executor::new(db.clone(), &config)
            .read("posts", &params)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(_)));
    }

    #[tokio::test]
    async fn test_max_rows_caps_limit() {
        let db = Arc::new(
            ScriptedDatabase::new()
                .rows(RowSet::count(1))
                .rows(posts(vec![]))
                .rows(RowSet::count(1))
                .rows(posts(vec![])),
        );
        let config = ServerConfig {
            max_rows: Some(50),
            ..ServerConfig::default()
        };
        let executor = Executor::new(db.clone(), &config);

        executor
            .read("posts", &QueryParams::parse("limit=500"))
            .await
            .unwrap();
        executor.read("posts", &QueryParams::default()).await.unwrap();

        let statements = db.statements();
        assert!(statements[1].sql.ends_with("LIMIT 50"));
        assert!(statements[3].sql.ends_with("LIMIT 50"));
    }

    #[tokio::test]
    async fn test_invalid_limit() {
        let db = Arc::new(ScriptedDatabase::new().rows(RowSet::count(1)));
        let err = executor(&db)
            .read("posts", &QueryParams::parse("limit=abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQueryParam(_)));
    }

    #[tokio::test]
    async fn test_find_combines_filter_and_id() {
        let db = Arc::new(
            ScriptedDatabase::new()
                .rows(RowSet::count(1))
                .rows(posts(vec![post(1, "foobar")])),
        );
        let params = QueryParams::parse("where=%7B%22name%22%3A%22foobar%22%7D");

        let docs = executor(&db).find("posts", "1", &params).await.unwrap();
        assert_eq!(docs.len(), 1);

        let stmt = &db.statements()[1];
        assert_eq!(
            stmt.sql,
            r#"SELECT * FROM "public"."posts" WHERE ("name" = $1) AND ("id" = $2)"#
        );
        assert_eq!(stmt.params, vec![json!("foobar"), json!("1")]);
    }

    #[tokio::test]
    async fn test_find_missing() {
        let db = Arc::new(
            ScriptedDatabase::new()
                .rows(RowSet::count(1))
                .rows(posts(vec![])),
        );

        let err = executor(&db)
            .find("posts", "2", &QueryParams::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ResourceNotFound { ref collection, ref id } if collection == "posts" && id == "2"
        ));
    }

    #[tokio::test]
    async fn test_create_drops_unknown_fields() {
        let db = Arc::new(
            ScriptedDatabase::new()
                .rows(RowSet::count(1))
                .rows(RowSet::column("column_name", &["name"]))
                .rows(posts(vec![vec![Cell::Int(3), Cell::Null]])),
        );

        let docs = executor(&db)
            .create("posts", vec![doc(json!({"unknown": "x"}))])
            .await
            .unwrap();

        assert_eq!(JsonValue::Object(docs[0].clone()), json!({"id": 3, "name": null}));
        assert_eq!(
            db.statements()[2].sql,
            r#"INSERT INTO "public"."posts" DEFAULT VALUES RETURNING *"#
        );
    }

    #[tokio::test]
    async fn test_create_binds_values() {
        let db = Arc::new(
            ScriptedDatabase::new()
                .rows(RowSet::count(1))
                .rows(RowSet::column("column_name", &["name"]))
                .rows(posts(vec![post(1, "foobar")])),
        );

        executor(&db)
            .create("posts", vec![doc(json!({"name": "foobar", "id": 42}))])
            .await
            .unwrap();

        let stmt = &db.statements()[2];
        assert_eq!(
            stmt.sql,
            r#"INSERT INTO "public"."posts" ("name") VALUES ($1) RETURNING *"#
        );
        assert_eq!(stmt.params, vec![json!("foobar")]);
    }

    #[tokio::test]
    async fn test_write_without_documents_touches_nothing() {
        let db = Arc::new(ScriptedDatabase::new());
        let executor = executor(&db);

        let err = executor.create("posts", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::NoData));

        let err = executor
            .update("posts", "1", vec![], &QueryParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoData));

        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn test_write_rejects_batches() {
        let db = Arc::new(ScriptedDatabase::new());
        let err = executor(&db)
            .create(
                "posts",
                vec![doc(json!({"name": "a"})), doc(json!({"name": "b"}))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn test_update() {
        let db = Arc::new(
            ScriptedDatabase::new()
                .rows(RowSet::count(1))
                .rows(RowSet::column("column_name", &["name"]))
                .rows(posts(vec![post(1, "newfoobar")])),
        );

        let docs = executor(&db)
            .update(
                "posts",
                "1",
                vec![doc(json!({"name": "newfoobar"}))],
                &QueryParams::default(),
            )
            .await
            .unwrap();

        assert_eq!(docs[0]["name"], json!("newfoobar"));
        let stmt = &db.statements()[2];
        assert_eq!(
            stmt.sql,
            r#"UPDATE "public"."posts" SET "name" = $1 WHERE "id" = $2 RETURNING *"#
        );
        assert_eq!(stmt.params, vec![json!("newfoobar"), json!("1")]);
    }

    #[tokio::test]
    async fn test_update_without_known_columns_is_lookup() {
        let db = Arc::new(
            ScriptedDatabase::new()
                .rows(RowSet::count(1))
                .rows(RowSet::column("column_name", &["name"]))
                .rows(posts(vec![post(1, "newfoobar")])),
        );

        let docs = executor(&db)
            .update(
                "posts",
                "1",
                vec![doc(json!({"unknown": "newfoobar2"}))],
                &QueryParams::default(),
            )
            .await
            .unwrap();

        assert_eq!(docs[0]["name"], json!("newfoobar"));
        assert_eq!(
            db.statements()[2].sql,
            r#"SELECT * FROM "public"."posts" WHERE "id" = $1"#
        );
    }

    #[tokio::test]
    async fn test_update_filtered_out() {
        let db = Arc::new(
            ScriptedDatabase::new()
                .rows(RowSet::count(1))
                .rows(RowSet::column("column_name", &["name"]))
                .rows(posts(vec![])),
        );

        let err = executor(&db)
            .update(
                "posts",
                "1",
                vec![doc(json!({"name": "newfoobar3"}))],
                &QueryParams::parse("where=%7B%22name%22%3A%22foo%22%7D"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete() {
        let db = Arc::new(
            ScriptedDatabase::new()
                .rows(RowSet::count(1))
                .reply(Reply::Affected(1)),
        );

        let affected = executor(&db)
            .delete("posts", "1", &QueryParams::default())
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(
            db.statements()[1].sql,
            r#"DELETE FROM "public"."posts" WHERE "id" = $1"#
        );
    }

    #[tokio::test]
    async fn test_delete_filtered_out() {
        let db = Arc::new(
            ScriptedDatabase::new()
                .rows(RowSet::count(1))
                .reply(Reply::Affected(0)),
        );

        let err = executor(&db)
            .delete(
                "posts",
                "2",
                &QueryParams::parse("where=%7B%22name%22%3A%22foo%22%7D"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound { ref id, .. } if id == "2"));

        let stmt = &db.statements()[1];
        assert_eq!(
            stmt.sql,
            r#"DELETE FROM "public"."posts" WHERE ("name" = $1) AND ("id" = $2)"#
        );
    }

    #[tokio::test]
    async fn test_execution_failure_is_surfaced() {
        let db = Arc::new(
            ScriptedDatabase::new()
                .rows(RowSet::count(1))
                .rows(RowSet::column("column_name", &["name"]))
                .reply(Reply::Fail("null value violates not-null constraint".into())),
        );

        let err = executor(&db)
            .create("posts", vec![doc(json!({"name": null}))])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }
}
