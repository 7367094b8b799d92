use super::{Companion, DbPool, FragmentMatch, MessageRole};
use anyhow::{Context, Result};
use pgvector::Vector;
use tracing::debug;

pub struct Repository {
    pub pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool.get_pool())
            .await
            .context("Database ping failed")?;
        Ok(())
    }

    pub async fn find_companion(&self, companion_id: &str) -> Result<Option<Companion>> {
        let companion = sqlx::query_as::<_, Companion>(
            r#"SELECT
                id,
                user_id,
                user_name,
                name,
                description,
                instructions,
                seed,
                category_id
               FROM companions
               WHERE id = $1"#,
        )
        .bind(companion_id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(companion)
    }

    pub async fn insert_message(
        &self,
        companion_id: &str,
        user_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            r#"INSERT INTO messages (id, companion_id, user_id, role, content, created_at)
               VALUES ($1, $2, $3, $4, $5, NOW())"#,
        )
        .bind(&id)
        .bind(companion_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(content)
        .execute(self.pool.get_pool())
        .await?;

        Ok(id)
    }

    /// Swaps every fragment of `document_id` for `fragments` in one transaction.
    pub async fn replace_fragments(
        &self,
        document_id: &str,
        fragments: Vec<(String, Vector)>,
    ) -> Result<usize> {
        let mut tx = self.pool.get_pool().begin().await?;

        sqlx::query("DELETE FROM companion_fragments WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        let count = fragments.len();
        for (index, (content, embedding)) in fragments.into_iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO companion_fragments (document_id, fragment_index, content, embedding)
                   VALUES ($1, $2, $3, $4)"#,
            )
            .bind(document_id)
            .bind(index as i32)
            .bind(content)
            .bind(embedding)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Stored {} fragments for {}", count, document_id);

        Ok(count)
    }

    /// Cosine search restricted to one document; empty when nothing is indexed.
    pub async fn search_fragments(
        &self,
        document_id: &str,
        query_embedding: Vector,
        limit: i64,
    ) -> Result<Vec<FragmentMatch>> {
        let matches = sqlx::query_as::<_, FragmentMatch>(
            r#"SELECT
                document_id,
                content,
                (1 - (embedding <=> $2))::float4 AS similarity
               FROM companion_fragments
               WHERE document_id = $1
               ORDER BY embedding <=> $2
               LIMIT $3"#,
        )
        .bind(document_id)
        .bind(query_embedding)
        .bind(limit)
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!("Found {} fragments for {}", matches.len(), document_id);

        Ok(matches)
    }
}
