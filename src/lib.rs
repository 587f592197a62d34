use config::Config;
use db::{mysql::MySqlClient, DbClient};
use errors::DocError;
use log::info;
use metadata::{
    EnrichedTable, Enricher, GenerateOutcome, MetadataDiff, MetadataFile, Reconciler, UpdateStats,
};
use models::schema::TableSchema;

pub mod config;
pub mod db;
pub mod errors;
pub mod metadata;
pub mod models;

/// Ties the live schema to the metadata file: introspects through a
/// [`DbClient`] and reconciles or enriches through a [`Reconciler`].
pub struct TableDocument {
    client: Box<dyn DbClient>,
    reconciler: Reconciler,
    exclude_tables: Vec<String>,
}

impl TableDocument {
    pub fn new(client: Box<dyn DbClient>, reconciler: Reconciler, exclude_tables: Vec<String>) -> Self {
        TableDocument {
            client,
            reconciler,
            exclude_tables,
        }
    }

    pub async fn connect(config: &Config) -> Result<Self, DocError> {
        let client = MySqlClient::connect(config.connection()?).await?;
        info!("Connected to schema {}", client.schema());
        let reconciler = Reconciler::open(MetadataFile::new(&config.metadata_path))?;

        Ok(Self::new(
            Box::new(client),
            reconciler,
            config.exclude_tables.clone(),
        ))
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub async fn snapshot(&self) -> Result<Vec<TableSchema>, DocError> {
        self.client.snapshot(&self.exclude_tables).await
    }

    pub async fn all_tables_info(&self) -> Result<Vec<EnrichedTable>, DocError> {
        let enricher = Enricher::new(self.reconciler.store());
        let tables = self.snapshot().await?;
        Ok(tables
            .into_iter()
            .map(|table| enricher.enrich_table_info(table))
            .collect())
    }

    pub async fn table_info(&self, table_name: &str) -> Result<EnrichedTable, DocError> {
        let table = self.client.describe_table(table_name).await?;
        Ok(Enricher::new(self.reconciler.store()).enrich_table_info(table))
    }

    pub async fn generate_metadata(&mut self, force: bool) -> Result<GenerateOutcome, DocError> {
        let tables = self.snapshot().await?;
        self.reconciler.generate(&tables, force)
    }

    pub async fn update_metadata(&mut self, backup: bool) -> Result<UpdateStats, DocError> {
        let tables = self.snapshot().await?;
        self.reconciler.update(&tables, backup)
    }

    pub async fn check_diff(&self) -> Result<MetadataDiff, DocError> {
        let tables = self.snapshot().await?;
        Ok(self.reconciler.diff(&tables))
    }

    pub fn cleanup_removed(&mut self) -> Result<usize, DocError> {
        self.reconciler.cleanup_removed_items()
    }
}
