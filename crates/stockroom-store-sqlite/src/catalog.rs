//! The article catalog.

use rusqlite::{Connection, OptionalExtension as _};
use serde_json::json;
use stockroom_core::{
  actor::Actor,
  article::{Article, ArticlePatch, NewArticle},
  audit::{event, NewAuditEvent},
  store::CatalogStore,
  Error as CoreError,
};
use tracing::info;
use uuid::Uuid;

use crate::{
  audit::append,
  encode::{encode_dt, encode_qty, encode_uuid, RawArticle, ARTICLE_COLUMNS},
  store::now,
  Result, SqliteStore,
};

fn find(conn: &Connection, column: &str, value: String) -> Result<Option<Article>> {
  conn
    .query_row(
      &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE {column} = ?1"),
      rusqlite::params![value],
      RawArticle::from_row,
    )
    .optional()?
    .map(RawArticle::into_article)
    .transpose()
}

/// Fetch an article or fail with `NotFound`.
pub(crate) fn load_article(conn: &Connection, article_id: Uuid) -> Result<Article> {
  find(conn, "article_id", encode_uuid(article_id))?
    .ok_or_else(|| CoreError::not_found("article", article_id).into())
}

fn save_descriptive(conn: &Connection, a: &Article) -> Result<()> {
  conn.execute(
    "UPDATE articles SET
       name = ?2, description = ?3, unit = ?4, category = ?5, manufacturer = ?6,
       model_number = ?7, safety_stock = ?8, cost_price = ?9, is_active = ?10,
       updated_at = ?11
     WHERE article_id = ?1",
    rusqlite::params![
      encode_uuid(a.article_id),
      a.name,
      a.description,
      a.unit.as_str(),
      a.category,
      a.manufacturer,
      a.model_number,
      encode_qty(a.safety_stock),
      a.cost_price.map(encode_qty),
      a.is_active,
      encode_dt(a.updated_at),
    ],
  )?;
  Ok(())
}

// ─── CatalogStore impl ───────────────────────────────────────────────────────

impl CatalogStore for SqliteStore {
  async fn create_article(&self, actor: Actor, input: NewArticle) -> Result<Article> {
    actor.require_admin("create an article")?;
    input.validate()?;

    let article = self
      .write(move |tx| {
        let reference = input.reference.trim().to_string();
        if find(tx, "reference", reference.clone())?.is_some() {
          return Err(CoreError::DuplicateReference(reference).into());
        }

        let at = now();
        let article = Article {
          article_id: Uuid::new_v4(),
          reference,
          name: input.name.trim().to_string(),
          description: input.description,
          unit: input.unit,
          category: input.category,
          manufacturer: input.manufacturer,
          model_number: input.model_number,
          safety_stock: input.safety_stock,
          cost_price: input.cost_price,
          is_active: true,
          created_at: at,
          updated_at: at,
        };
        tx.execute(
          &format!(
            "INSERT INTO articles ({ARTICLE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
          ),
          rusqlite::params![
            encode_uuid(article.article_id),
            article.reference,
            article.name,
            article.description,
            article.unit.as_str(),
            article.category,
            article.manufacturer,
            article.model_number,
            encode_qty(article.safety_stock),
            article.cost_price.map(encode_qty),
            article.is_active,
            encode_dt(article.created_at),
            encode_dt(article.updated_at),
          ],
        )?;
        append(
          tx,
          NewAuditEvent::new(
            actor.user_id,
            event::ARTICLE_CREATED,
            "article",
            article.article_id,
            json!({ "reference": article.reference, "name": article.name }),
          ),
          at,
        )?;
        Ok(article)
      })
      .await?;

    info!(article_id = %article.article_id, reference = %article.reference, "article created");
    Ok(article)
  }

  async fn get_article(&self, article_id: Uuid) -> Result<Option<Article>> {
    self.read(move |conn| find(conn, "article_id", encode_uuid(article_id))).await
  }

  async fn find_article(&self, reference: String) -> Result<Option<Article>> {
    self.read(move |conn| find(conn, "reference", reference.trim().to_string())).await
  }

  async fn list_articles(&self, include_inactive: bool) -> Result<Vec<Article>> {
    let raws: Vec<RawArticle> = self
      .read(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ARTICLE_COLUMNS} FROM articles WHERE (?1 OR is_active) ORDER BY reference"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![include_inactive], RawArticle::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawArticle::into_article).collect()
  }

  async fn update_article(
    &self,
    actor: Actor,
    article_id: Uuid,
    patch: ArticlePatch,
  ) -> Result<Article> {
    actor.require_admin("update an article")?;

    self
      .write(move |tx| {
        let at = now();
        let mut article = load_article(tx, article_id)?;
        let changes = serde_json::to_value(&patch)?;
        patch.apply(&mut article);
        if article.name.trim().is_empty() {
          return Err(CoreError::validation("name", "must not be empty").into());
        }
        if article.safety_stock.is_sign_negative() {
          return Err(CoreError::validation("safety_stock", "must not be negative").into());
        }
        article.updated_at = at;
        save_descriptive(tx, &article)?;
        append(
          tx,
          NewAuditEvent::new(actor.user_id, event::ARTICLE_UPDATED, "article", article_id, changes),
          at,
        )?;
        Ok(article)
      })
      .await
  }

  async fn set_article_active(
    &self,
    actor: Actor,
    article_id: Uuid,
    active: bool,
  ) -> Result<Article> {
    actor.require_admin("change article status")?;

    self
      .write(move |tx| {
        let at = now();
        let mut article = load_article(tx, article_id)?;
        if article.is_active == active {
          return Ok(article);
        }
        article.is_active = active;
        article.updated_at = at;
        save_descriptive(tx, &article)?;
        append(
          tx,
          NewAuditEvent::new(
            actor.user_id,
            event::ARTICLE_UPDATED,
            "article",
            article_id,
            json!({ "is_active": active }),
          ),
          at,
        )?;
        Ok(article)
      })
      .await
  }
}
