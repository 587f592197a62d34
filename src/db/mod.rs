use crate::{errors::DocError, models::schema::TableSchema};
use async_trait::async_trait;
use log::debug;

pub mod mysql;

#[async_trait]
pub trait DbClient: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<String>, DocError>;
    async fn describe_table(&self, table_name: &str) -> Result<TableSchema, DocError>;

    /// Describes every table except the excluded ones, in catalog order.
    async fn snapshot(&self, exclude: &[String]) -> Result<Vec<TableSchema>, DocError> {
        let mut tables = Vec::new();

        for table_name in self.list_tables().await? {
            if exclude.contains(&table_name) {
                debug!("Skipping excluded table {}", table_name);
                continue;
            }
            tables.push(self.describe_table(&table_name).await?);
        }

        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::{mock, predicate};

    mock! {
        pub DbClientMock {}

        #[async_trait]
        impl DbClient for DbClientMock {
            async fn list_tables(&self) -> Result<Vec<String>, DocError>;
            async fn describe_table(&self, table_name: &str) -> Result<TableSchema, DocError>;
        }
    }

    fn described(name: &str) -> TableSchema {
        TableSchema {
            table_name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_snapshot_skips_excluded_tables() {
        let mut mock_db = MockDbClientMock::new();

        mock_db.expect_list_tables().returning(|| {
            Ok(vec![
                "users".to_string(),
                "migrations".to_string(),
                "orders".to_string(),
            ])
        });
        mock_db
            .expect_describe_table()
            .with(predicate::eq("users"))
            .returning(|name| Ok(described(name)));
        mock_db
            .expect_describe_table()
            .with(predicate::eq("orders"))
            .returning(|name| Ok(described(name)));

        let tables = mock_db
            .snapshot(&["migrations".to_string()])
            .await
            .unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.table_name.as_str()).collect();
        assert_eq!(names, vec!["users", "orders"]);
    }

    #[tokio::test]
    async fn test_snapshot_propagates_failure() {
        let mut mock_db = MockDbClientMock::new();

        mock_db
            .expect_list_tables()
            .returning(|| Ok(vec!["users".to_string()]));
        mock_db
            .expect_describe_table()
            .returning(|name| Err(DocError::Introspection(format!("table {} vanished", name))));

        let err = mock_db.snapshot(&[]).await.unwrap_err();
        assert!(matches!(err, DocError::Introspection(_)));
    }
}
