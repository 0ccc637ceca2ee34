use anyhow::{Context, Result};
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexWriter, ReloadPolicy, TantivyDocument};
use uuid::Uuid;

use crate::models::Record;

/// Full-text index over the searchable record fields, built on tantivy.
/// Only the record id is stored; hits are resolved against the store.
pub struct TextIndex {
    index: Index,
    f_id: Field,
    f_title: Field,
    f_symptoms: Field,
    f_root_cause: Field,
    f_solution: Field,
    f_tags: Field,
}

impl TextIndex {
    /// Create or open the index at the given directory.
    pub fn open_or_create(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir)?;

        let mut schema_builder = Schema::builder();
        let f_id = schema_builder.add_text_field("id", STRING | STORED);
        let f_title = schema_builder.add_text_field("title", TEXT);
        let f_symptoms = schema_builder.add_text_field("symptoms", TEXT);
        let f_root_cause = schema_builder.add_text_field("root_cause", TEXT);
        let f_solution = schema_builder.add_text_field("solution", TEXT);
        let f_tags = schema_builder.add_text_field("tags", TEXT);
        let schema = schema_builder.build();

        let index = if index_dir.join("meta.json").exists() {
            Index::open_in_dir(index_dir).context("Failed to open existing text index")?
        } else {
            Index::create_in_dir(index_dir, schema).context("Failed to create text index")?
        };

        Ok(Self {
            index,
            f_id,
            f_title,
            f_symptoms,
            f_root_cause,
            f_solution,
            f_tags,
        })
    }

    fn writer(&self) -> Result<IndexWriter> {
        self.index
            .writer(50_000_000)
            .context("Failed to create index writer")
    }

    /// Add a record's searchable fields to the index.
    pub fn add(&self, record: &Record) -> Result<()> {
        let mut writer = self.writer()?;
        self.add_with_writer(&mut writer, record)?;
        writer.commit().context("Failed to commit index")?;
        Ok(())
    }

    /// Index a batch of records in a single commit.
    pub fn add_all(&self, records: &[Record]) -> Result<()> {
        let mut writer = self.writer()?;
        for record in records {
            self.add_with_writer(&mut writer, record)?;
        }
        writer.commit().context("Failed to commit index")?;
        Ok(())
    }

    fn add_with_writer(&self, writer: &mut IndexWriter, record: &Record) -> Result<()> {
        writer.add_document(doc!(
            self.f_id => record.id.to_string(),
            self.f_title => record.title.clone(),
            self.f_symptoms => record.symptoms.clone(),
            self.f_root_cause => record.root_cause.clone(),
            self.f_solution => record.solution.clone(),
            self.f_tags => record.tags.join(" "),
        ))?;
        Ok(())
    }

    /// Replace a record's index entry after an update.
    pub fn update(&self, record: &Record) -> Result<()> {
        let mut writer = self.writer()?;
        let term = tantivy::Term::from_field_text(self.f_id, &record.id.to_string());
        writer.delete_term(term);
        self.add_with_writer(&mut writer, record)?;
        writer.commit().context("Failed to commit index update")?;
        Ok(())
    }

    /// Remove a record from the index.
    pub fn delete(&self, id: Uuid) -> Result<()> {
        let mut writer = self.writer()?;
        let term = tantivy::Term::from_field_text(self.f_id, &id.to_string());
        writer.delete_term(term);
        writer.commit().context("Failed to commit index delete")?;
        Ok(())
    }

    /// Drop every entry. Used when reseeding.
    pub fn clear(&self) -> Result<()> {
        let mut writer = self.writer()?;
        writer.delete_all_documents()?;
        writer.commit().context("Failed to commit index clear")?;
        Ok(())
    }

    /// Search the index, returning ranked record ids.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<(Uuid, f32)>> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .context("Failed to create index reader")?;

        let searcher = reader.searcher();

        let query_parser = QueryParser::for_index(
            &self.index,
            vec![
                self.f_title,
                self.f_symptoms,
                self.f_root_cause,
                self.f_solution,
                self.f_tags,
            ],
        );
        let query = query_parser
            .parse_query(query_str)
            .context("Failed to parse search query")?;

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .context("Index search failed")?;

        let mut hits = Vec::new();
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .context("Failed to retrieve document")?;

            let id_str = doc
                .get_first(self.f_id)
                .and_then(|v| v.as_str())
                .unwrap_or_default();

            if let Ok(id) = Uuid::parse_str(id_str) {
                hits.push((id, score));
            }
        }

        Ok(hits)
    }
}
