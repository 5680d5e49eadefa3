//! Schema-driven REST client.
//!
//! Every call builds its URL from the schema's path templates and the
//! resource's URL parameters, then goes through the [`Transport`].

mod pager;

pub use pager::{Page, Pager};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::codec::{self, CodecError};
use crate::config::ClientConfig;
use crate::diff::FieldDiff;
use crate::resource::{Resource, ValidationError, expand_template, extract_from_template};
use crate::schema::{Pagination, ResourceSchema, UpdateOperation};
use crate::transport::{HttpTransport, Method, Request, Transport, TransportError};
use crate::value::Field;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
  #[error(transparent)]
  Transport(#[from] TransportError),

  #[error(transparent)]
  Codec(#[from] CodecError),

  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error("{kind} cannot be listed: schema has no list path")]
  NotListable { kind: String },

  #[error("pager cannot resume after a failed page; restart it")]
  PagerFailed,

  #[error("failed to delete {failed} of {total} resources:\n{}", .messages.join("\n"))]
  DeleteAll {
    failed: usize,
    total: usize,
    messages: Vec<String>,
  },
}

impl ClientError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, ClientError::Transport(e) if e.is_not_found())
  }

  pub fn is_conflict(&self) -> bool {
    matches!(self, ClientError::Transport(e) if e.is_conflict())
  }
}

/// Generic REST client.
#[derive(Clone)]
pub struct Client {
  config: ClientConfig,
  transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Client {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Client").field("config", &self.config).finish_non_exhaustive()
  }
}

impl Client {
  pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
    Self { config, transport }
  }

  /// Client over the reqwest-backed transport.
  pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
    let transport = HttpTransport::new(&config)?;
    Ok(Self::new(config, Arc::new(transport)))
  }

  pub fn config(&self) -> &ClientConfig {
    &self.config
  }

  fn url(&self, schema: &ResourceSchema, template: &str, resource: &Resource) -> Result<String, ClientError> {
    let base = self.config.base_url.as_deref().unwrap_or(&schema.base_url);
    let path = expand_template(template, &resource.url_params(schema))?;
    Ok(format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/')))
  }

  async fn send(&self, request: Request) -> Result<crate::transport::Response, ClientError> {
    Ok(self.transport.send(request, &self.config.retry).await?)
  }

  /// Copy URL parameters from the request resource onto a decoded response.
  fn inherit_parameters(schema: &ResourceSchema, from: &Resource, into: &mut Resource) {
    for field in schema.parameter_fields() {
      let value = from.get(&field.name);
      if !value.is_blank() {
        into.set(field.name.clone(), value.clone());
      }
    }
  }

  /// Fill blank parameter fields from the self-link in the identity fields.
  /// Failure to parse is not an error: the parameters are then simply left unset.
  fn extract_identity(schema: &ResourceSchema, resource: &mut Resource) {
    let links: Vec<String> = schema
      .identity_fields()
      .filter_map(|f| resource.get(&f.name).as_str())
      .filter(|v| v.contains('/'))
      .map(str::to_string)
      .collect();
    for link in links {
      let Some(bound) = extract_from_template(&schema.paths.get, &link) else {
        continue;
      };
      for field in schema.parameter_fields() {
        if resource.get(&field.name).is_blank() {
          if let Some(value) = bound.get(&field.name) {
            resource.set(field.name.clone(), Field::string(value.clone()));
          }
        }
      }
    }
  }

  /// Fetch a single resource by its identity.
  pub async fn get(&self, schema: &ResourceSchema, resource: &Resource) -> Result<Resource, ClientError> {
    let url = self.url(schema, &schema.paths.get, resource)?;
    debug!(kind = %schema.kind, url = %url, "get");
    let response = self
      .send(Request::new(Method::Get, url))
      .await
      .map_err(|e| not_found_statuses(schema, e))?;

    let mut fetched = codec::from_wire(schema, &response.body)?;
    Self::inherit_parameters(schema, resource, &mut fetched);
    Self::extract_identity(schema, &mut fetched);
    if let Some(etag_field) = &schema.etag_field {
      if fetched.get(etag_field).is_blank() {
        if let Some(etag) = response.header("etag") {
          fetched.set(etag_field.clone(), Field::string(etag));
        }
      }
    }
    Ok(fetched)
  }

  /// Fetch one page of resources under `parent`.
  pub async fn list_page(
    &self,
    schema: &ResourceSchema,
    parent: &Resource,
    cursor: Option<&str>,
    page_size: Option<u32>,
  ) -> Result<Page, ClientError> {
    let template = schema.paths.list.as_deref().ok_or_else(|| ClientError::NotListable {
      kind: schema.kind.clone(),
    })?;
    let base = self.url(schema, template, parent)?;
    let mut url = url::Url::parse(&base).map_err(|source| TransportError::InvalidUrl {
      url: base.clone(),
      source,
    })?;
    {
      let mut query = url.query_pairs_mut();
      match schema.pagination {
        Pagination::PageToken => {
          if let Some(size) = page_size {
            query.append_pair("pageSize", &size.to_string());
          }
          if let Some(token) = cursor {
            query.append_pair("pageToken", token);
          }
        }
        Pagination::StartLimit => {
          if let Some(size) = page_size {
            query.append_pair("limit", &size.to_string());
          }
          if let Some(start) = cursor {
            query.append_pair("start", start);
          }
        }
        Pagination::None => {}
      }
    }
    // `query_pairs_mut` leaves a dangling `?` when nothing was appended.
    if url.query() == Some("") {
      url.set_query(None);
    }

    debug!(kind = %schema.kind, url = %url, "list page");
    let response = self.send(Request::new(Method::Get, url.to_string())).await?;
    let body: serde_json::Value = if response.body.is_empty() {
      serde_json::Value::Object(Default::default())
    } else {
      serde_json::from_slice(&response.body).map_err(CodecError::from)?
    };

    let list_key = schema.list_key.as_deref().unwrap_or("items");
    let mut items = Vec::new();
    if let Some(values) = body.get(list_key).and_then(|v| v.as_array()) {
      for value in values {
        let mut item = codec::from_json(schema, value)?;
        Self::inherit_parameters(schema, parent, &mut item);
        items.push(item);
      }
    }

    let next = match schema.pagination {
      Pagination::PageToken => body.get("nextPageToken").and_then(|v| v.as_str()),
      Pagination::StartLimit => body.pointer("/next/start").and_then(|v| v.as_str()),
      Pagination::None => None,
    }
    .filter(|token| !token.is_empty())
    .map(str::to_string);

    Ok(Page { items, next })
  }

  /// Iterate all pages under `parent`.
  pub fn list<'a>(&'a self, schema: &'a ResourceSchema, parent: &'a Resource, page_size: Option<u32>) -> Pager<'a> {
    Pager::new(self, schema, parent, page_size)
  }

  /// Create a resource. Server-generated fields must be unset.
  pub async fn create(&self, schema: &ResourceSchema, resource: &Resource) -> Result<Resource, ClientError> {
    for field in schema.fields.iter().filter(|f| f.server_generated) {
      let value = resource.get(&field.name);
      if !value.is_blank() {
        return Err(
          ValidationError::ServerGeneratedSet {
            field: field.name.clone(),
            value: value.to_string(),
          }
          .into(),
        );
      }
    }

    let url = self.url(schema, &schema.paths.create, resource)?;
    let body = codec::to_wire(schema, resource)?;
    info!(kind = %schema.kind, url = %url, "creating resource");
    let response = self.send(Request::new(Method::Post, url).with_body(body)).await?;

    let mut created = codec::from_wire(schema, &response.body)?;
    Self::inherit_parameters(schema, resource, &mut created);
    Ok(created)
  }

  /// Run a named update operation for the given diffs.
  pub async fn update(
    &self,
    schema: &ResourceSchema,
    operation: &UpdateOperation,
    resource: &Resource,
    diffs: &[FieldDiff],
    etag: Option<&str>,
  ) -> Result<(), ClientError> {
    let mut url = self.url(schema, &operation.path, resource)?;
    if operation.update_mask {
      let mut mask: Vec<&str> = Vec::new();
      for name in diffs.iter().filter_map(|d| d.path.top_level()) {
        if !mask.contains(&name) {
          mask.push(name);
        }
      }
      let mut parsed = url::Url::parse(&url).map_err(|source| TransportError::InvalidUrl {
        url: url.clone(),
        source,
      })?;
      parsed.query_pairs_mut().append_pair("updateMask", &mask.join(","));
      url = parsed.to_string();
    }

    let mut body = codec::to_json(schema, resource, codec::Encoding::Request)?;
    if let (Some(allowed), Some(map)) = (&operation.body_fields, body.as_object_mut()) {
      map.retain(|name, _| allowed.iter().any(|a| a == name));
    }
    if let Some(key) = &operation.body_key {
      let mut wrapped = serde_json::Map::new();
      wrapped.insert(key.clone(), body);
      body = serde_json::Value::Object(wrapped);
    }

    let body = serde_json::to_vec(&body).map_err(CodecError::from)?;
    let mut request = Request::new(operation.method, url.clone()).with_body(body);
    if operation.if_match {
      match etag {
        Some(etag) => request = request.with_header("If-Match", etag),
        None => warn!(kind = %schema.kind, operation = %operation.name, "no etag observed, sending without If-Match"),
      }
    }

    info!(kind = %schema.kind, operation = %operation.name, url = %url, "updating resource");
    self.send(request).await?;
    Ok(())
  }

  /// Delete a resource. A resource that is already gone counts as deleted.
  pub async fn delete(&self, schema: &ResourceSchema, resource: &Resource) -> Result<(), ClientError> {
    match self.get(schema, resource).await {
      Err(e) if e.is_not_found() => {
        info!(resource = %resource.describe(schema), "resource already absent");
        return Ok(());
      }
      Err(e) => return Err(e),
      Ok(_) => {}
    }

    let url = self.url(schema, &schema.paths.delete, resource)?;
    info!(kind = %schema.kind, url = %url, "deleting resource");
    match self.send(Request::new(Method::Delete, url)).await {
      Ok(_) => Ok(()),
      Err(e) => {
        let e = not_found_statuses(schema, e);
        if e.is_not_found() { Ok(()) } else { Err(e) }
      }
    }
  }

  /// Delete every resource under `parent` matching `keep`. Failures do not
  /// stop the sweep; they are reported together. Returns the number deleted.
  pub async fn delete_all<F>(&self, schema: &ResourceSchema, parent: &Resource, filter: F) -> Result<usize, ClientError>
  where
    F: Fn(&Resource) -> bool,
  {
    let items = self.list(schema, parent, None).collect_all().await?;
    let targets: Vec<&Resource> = items.iter().filter(|r| filter(*r)).collect();
    let total = targets.len();
    let mut messages = Vec::new();
    for target in targets {
      if let Err(e) = self.delete(schema, target).await {
        warn!(resource = %target.describe(schema), error = %e, "delete failed");
        messages.push(format!("{}: {}", target.describe(schema), e));
      }
    }
    if messages.is_empty() {
      Ok(total)
    } else {
      Err(ClientError::DeleteAll {
        failed: messages.len(),
        total,
        messages,
      })
    }
  }
}

fn not_found_statuses(schema: &ResourceSchema, err: ClientError) -> ClientError {
  match err {
    ClientError::Transport(e) => ClientError::Transport(e.into_not_found_if(&schema.not_found_statuses)),
    other => other,
  }
}
