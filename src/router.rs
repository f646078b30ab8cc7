//! Request router
//!
//! Maps inbound verb+path pairs onto the storage adapter (CRUD) or the
//! recovery orchestrator (backup triggers). Parameters are validated before
//! any handler runs, so a rejected request has no side effects; the required
//! capability is checked even earlier. The transport in front of this is an
//! external concern: the router consumes [`Request`] values and produces
//! [`ApiResponse`] values with JSON bodies.

use crate::config::Capability;
use crate::error::{Error, Result};
use crate::managers::orchestrator::RecoveryOrchestrator;
use crate::store::{Product, StorageAdapter};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            other => Err(Error::BadRequest(format!("unsupported method '{}'", other))),
        }
    }
}

/// An inbound request, already stripped of transport details
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Response with an HTTP-style status and a JSON body
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn from_error(error: &Error) -> Self {
        Self {
            status: error.http_status(),
            body: json!({
                "error_code": error.code(),
                "message": error.to_string(),
            }),
        }
    }

    fn forbidden(required: Capability) -> Self {
        Self {
            status: 403,
            body: json!({
                "error_code": "forbidden",
                "message": format!("caller lacks the '{:?}' capability", required).to_lowercase(),
            }),
        }
    }
}

/// The caller identity as resolved by the transport's authorizer
#[derive(Debug, Clone)]
pub struct Principal {
    pub name: String,
    capabilities: Vec<Capability>,
}

impl Principal {
    pub fn new(name: impl Into<String>, capabilities: Vec<Capability>) -> Self {
        Self {
            name: name.into(),
            capabilities,
        }
    }

    /// A principal holding every capability; the default for local
    /// administration.
    pub fn admin(name: impl Into<String>) -> Self {
        Self::new(
            name,
            vec![Capability::Read, Capability::Write, Capability::Backup],
        )
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

pub struct Router {
    adapter: Arc<StorageAdapter>,
    orchestrator: Arc<RecoveryOrchestrator>,
}

impl Router {
    pub fn new(adapter: Arc<StorageAdapter>, orchestrator: Arc<RecoveryOrchestrator>) -> Self {
        Self {
            adapter,
            orchestrator,
        }
    }

    /// Dispatch a request: capability check, parameter validation, handler.
    pub async fn dispatch(&self, request: Request, principal: &Principal) -> ApiResponse {
        debug!(
            "Dispatching {} {} for principal '{}'",
            request.method, request.path, principal.name
        );

        let required = match (request.path.as_str(), request.method) {
            ("/addProduct", Method::Post) => Capability::Write,
            ("/getProduct", Method::Get) => Capability::Read,
            ("/getProducts", Method::Get) => Capability::Read,
            ("/updateProduct", Method::Put) => Capability::Write,
            ("/deleteProduct", Method::Delete) => Capability::Write,
            ("/createBackup", Method::Post) => Capability::Backup,
            _ => {
                return ApiResponse::from_error(&Error::NotFound(format!(
                    "no route for {} {}",
                    request.method, request.path
                )))
            }
        };

        if !principal.can(required) {
            return ApiResponse::forbidden(required);
        }

        let result = match (request.path.as_str(), request.method) {
            ("/addProduct", _) => self.add_product(&request).await,
            ("/getProduct", _) => self.get_product(&request).await,
            ("/getProducts", _) => self.get_products().await,
            ("/updateProduct", _) => self.update_product(&request).await,
            ("/deleteProduct", _) => self.delete_product(&request).await,
            ("/createBackup", _) => self.create_backup().await,
            _ => unreachable!("route table already matched"),
        };

        match result {
            Ok(body) => ApiResponse::ok(body),
            Err(e) => ApiResponse::from_error(&e),
        }
    }

    /// `product_id` is optional on add; a UUID is generated when absent.
    async fn add_product(&self, request: &Request) -> Result<Value> {
        let body = json_body(request)?;
        let title = required_field(body, "product_title")?;
        let category = required_field(body, "product_category")?;
        let product_id = match optional_field(body, "product_id")? {
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        let product = self
            .adapter
            .put(Product::new(product_id, title, category))
            .await?;
        Ok(json!(product))
    }

    async fn get_product(&self, request: &Request) -> Result<Value> {
        let product_id = query_param(request, "product_id")?;
        let product = self.adapter.get(&product_id).await?;
        Ok(json!(product))
    }

    async fn get_products(&self) -> Result<Value> {
        let products = self.adapter.scan().await?;
        Ok(json!(products))
    }

    /// Update requires the id; the adapter's upsert semantics apply.
    async fn update_product(&self, request: &Request) -> Result<Value> {
        let body = json_body(request)?;
        let product_id = required_field(body, "product_id")?;
        let title = required_field(body, "product_title")?;
        let category = required_field(body, "product_category")?;

        let product = self
            .adapter
            .put(Product::new(product_id, title, category))
            .await?;
        Ok(json!(product))
    }

    async fn delete_product(&self, request: &Request) -> Result<Value> {
        let product_id = query_param(request, "product_id")?;
        self.adapter.delete(&product_id).await?;
        Ok(json!({ "deleted_product_id": product_id }))
    }

    async fn create_backup(&self) -> Result<Value> {
        let snapshot = self.orchestrator.start_manual_backup().await?;
        Ok(json!({
            "snapshot_id": snapshot.snapshot_id,
            "status": snapshot.status.label(),
        }))
    }
}

fn json_body(request: &Request) -> Result<&Map<String, Value>> {
    request
        .body
        .as_ref()
        .ok_or_else(|| Error::BadRequest("missing request body".to_string()))?
        .as_object()
        .ok_or_else(|| Error::BadRequest("request body must be a JSON object".to_string()))
}

fn required_field(body: &Map<String, Value>, name: &str) -> Result<String> {
    optional_field(body, name)?
        .ok_or_else(|| Error::BadRequest(format!("missing required field '{}'", name)))
}

fn optional_field(body: &Map<String, Value>, name: &str) -> Result<Option<String>> {
    match body.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.clone())),
        Some(Value::String(_)) => Err(Error::BadRequest(format!(
            "field '{}' must not be empty",
            name
        ))),
        Some(_) => Err(Error::BadRequest(format!(
            "field '{}' must be a string",
            name
        ))),
    }
}

fn query_param(request: &Request, name: &str) -> Result<String> {
    match request.query.get(name) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(Error::BadRequest(format!(
            "missing required query parameter '{}'",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::from_str("get").unwrap(), Method::Get);
        assert_eq!(Method::from_str("POST").unwrap(), Method::Post);
        assert!(Method::from_str("PATCH").is_err());
    }

    #[test]
    fn test_principal_capabilities() {
        let viewer = Principal::new("viewer", vec![Capability::Read]);
        assert!(viewer.can(Capability::Read));
        assert!(!viewer.can(Capability::Write));
        assert!(!viewer.can(Capability::Backup));

        let admin = Principal::admin("admin");
        assert!(admin.can(Capability::Backup));
    }

    #[test]
    fn test_field_validation() {
        let body = json!({
            "product_title": "Widget",
            "product_category": "tools",
            "count": 3,
            "empty": "",
        });
        let body = body.as_object().unwrap();

        assert_eq!(required_field(body, "product_title").unwrap(), "Widget");
        assert!(required_field(body, "product_id").is_err());
        assert!(optional_field(body, "product_id").unwrap().is_none());
        assert!(optional_field(body, "count").is_err());
        assert!(optional_field(body, "empty").is_err());
    }

    #[test]
    fn test_error_response_shape() {
        let response = ApiResponse::from_error(&Error::NotFound("product 'p1'".to_string()));
        assert_eq!(response.status, 404);
        assert_eq!(response.body["error_code"], "not_found");
        assert!(response.body["message"].as_str().unwrap().contains("p1"));
    }
}
