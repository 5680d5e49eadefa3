use tracing::debug;

use super::{Client, ClientError};
use crate::resource::Resource;
use crate::schema::ResourceSchema;

/// One page of listed resources.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
  pub items: Vec<Resource>,
  /// Cursor for the following page; `None` on the last page.
  pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Cursor {
  Start,
  Next(String),
  Done,
  Failed,
}

/// Walks a paginated listing page by page.
///
/// A pager can be restarted from the first page at any time, but it cannot
/// resume from the middle after a page fails.
pub struct Pager<'a> {
  client: &'a Client,
  schema: &'a ResourceSchema,
  parent: &'a Resource,
  page_size: Option<u32>,
  cursor: Cursor,
}

impl<'a> Pager<'a> {
  pub(super) fn new(
    client: &'a Client,
    schema: &'a ResourceSchema,
    parent: &'a Resource,
    page_size: Option<u32>,
  ) -> Self {
    Self {
      client,
      schema,
      parent,
      page_size,
      cursor: Cursor::Start,
    }
  }

  /// Fetch the next page, or `None` once the listing is exhausted.
  pub async fn next_page(&mut self) -> Result<Option<Vec<Resource>>, ClientError> {
    let token = match &self.cursor {
      Cursor::Start => None,
      Cursor::Next(token) => Some(token.clone()),
      Cursor::Done => return Ok(None),
      Cursor::Failed => return Err(ClientError::PagerFailed),
    };

    match self
      .client
      .list_page(self.schema, self.parent, token.as_deref(), self.page_size)
      .await
    {
      Ok(page) => {
        debug!(kind = %self.schema.kind, items = page.items.len(), more = page.next.is_some(), "fetched page");
        self.cursor = match page.next {
          Some(next) => Cursor::Next(next),
          None => Cursor::Done,
        };
        Ok(Some(page.items))
      }
      Err(e) => {
        self.cursor = Cursor::Failed;
        Err(e)
      }
    }
  }

  pub fn has_more(&self) -> bool {
    matches!(self.cursor, Cursor::Start | Cursor::Next(_))
  }

  /// Go back to the first page.
  pub fn restart(&mut self) {
    self.cursor = Cursor::Start;
  }

  /// Fetch every remaining page.
  pub async fn collect_all(mut self) -> Result<Vec<Resource>, ClientError> {
    let mut all = Vec::new();
    while let Some(items) = self.next_page().await? {
      all.extend(items);
    }
    Ok(all)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::schema::SchemaRegistry;
  use crate::transport::Method;
  use crate::util::testutil::{FakeTransport, test_config};
  use crate::value::Field;

  #[tokio::test]
  async fn failed_page_blocks_resume_until_restart() {
    let transport = Arc::new(FakeTransport::new());
    let client = Client::new(test_config(), transport.clone());
    let schema = SchemaRegistry::builtin().unwrap().get("firebaserules.Ruleset").unwrap().clone();
    let parent = Resource::new("firebaserules.Ruleset").with("project", Field::string("p"));

    transport.respond(
      Method::Get,
      "/v1/projects/p/rulesets",
      200,
      r#"{"rulesets":[{"name":"projects/p/rulesets/a"}],"nextPageToken":"t1"}"#,
    );
    transport.respond(Method::Get, "/v1/projects/p/rulesets", 500, "unavailable");
    transport.respond(
      Method::Get,
      "/v1/projects/p/rulesets",
      200,
      r#"{"rulesets":[{"name":"projects/p/rulesets/a"}]}"#,
    );

    let mut pager = client.list(&schema, &parent, None);
    assert_eq!(pager.next_page().await.unwrap().unwrap().len(), 1);
    assert!(pager.has_more());
    assert!(pager.next_page().await.is_err());
    assert!(matches!(pager.next_page().await, Err(ClientError::PagerFailed)));

    pager.restart();
    assert_eq!(pager.next_page().await.unwrap().unwrap().len(), 1);
    assert!(pager.next_page().await.unwrap().is_none());
    assert!(!pager.has_more());
  }
}
