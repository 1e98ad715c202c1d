//! Test utilities for mcpcodegen integration tests

// Internal imports (std, crate)
use std::path::{Path, PathBuf};
use std::sync::Arc;

// External imports (alphabetized)
use anyhow::Context;
use mcpcodegen_core::{CodegenConfig, NoopFormatter, Pipeline};
use serde_json::json;
use tempfile::TempDir;

/// Creates a temporary directory for test outputs
pub fn create_temp_dir() -> anyhow::Result<(TempDir, PathBuf)> {
    let temp_dir = tempfile::tempdir()?;
    let temp_path = temp_dir.path().to_path_buf();
    Ok((temp_dir, temp_path))
}

/// Pipeline without LLM or external formatter
pub fn rule_based_pipeline(config: CodegenConfig) -> Pipeline {
    Pipeline::new(config).with_formatter(Arc::new(NoopFormatter))
}

fn write_spec(dir: &Path, name: &str, content: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write fixture {}", path.display()))?;
    Ok(path)
}

/// Pet store with a list operation and a create operation taking a `Pet` body
pub fn create_petstore_spec(dir: &Path) -> anyhow::Result<PathBuf> {
    let spec_content = r#"
openapi: 3.0.0
info:
  title: Pet Store
  version: 1.0.0
  description: Pet store API used by the mcpcodegen integration tests
servers:
  - url: http://localhost:8080/api/v1
    description: Development server
paths:
  /pets:
    get:
      operationId: listPets
      summary: List all pets
      parameters:
        - name: limit
          in: query
          required: false
          schema:
            type: integer
      responses:
        '200':
          description: A list of pets
          content:
            application/json:
              schema:
                type: array
                items:
                  $ref: '#/components/schemas/Pet'
    post:
      operationId: createPet
      summary: Create a pet
      requestBody:
        required: true
        content:
          application/json:
            schema:
              $ref: '#/components/schemas/Pet'
      responses:
        '201':
          description: Created
components:
  schemas:
    Pet:
      type: object
      required:
        - name
      properties:
        name:
          type: string
        tags:
          type: array
          items:
            type: string
"#;
    write_spec(dir, "petstore.yaml", spec_content)
}

/// Swagger 2.0 document posting an `Item` through a legacy body parameter
pub fn create_swagger_body_spec(dir: &Path) -> anyhow::Result<PathBuf> {
    let spec = json!({
        "swagger": "2.0",
        "info": {"title": "Inventory", "version": "2.1.0"},
        "host": "inventory.example.com",
        "basePath": "/v2",
        "schemes": ["https"],
        "paths": {
            "/items": {
                "post": {
                    "operationId": "createItem",
                    "parameters": [
                        {"name": "body", "in": "body", "required": true, "schema": {"$ref": "#/definitions/Item"}}
                    ],
                    "responses": {"200": {"description": "OK"}}
                }
            }
        },
        "definitions": {
            "Item": {
                "type": "object",
                "properties": {"sku": {"type": "string"}, "quantity": {"type": "integer"}}
            }
        }
    });
    write_spec(dir, "inventory.json", &serde_json::to_string_pretty(&spec)?)
}

/// Query parameter carrying neither `schema` nor `type`
pub fn create_missing_schema_spec(dir: &Path) -> anyhow::Result<PathBuf> {
    let spec_content = r#"
openapi: 3.0.0
info:
  title: Jobs
  version: 1.0.0
paths:
  /jobs:
    get:
      operationId: listJobs
      parameters:
        - name: timeoutSeconds
          in: query
          required: false
      responses:
        '200':
          description: OK
"#;
    write_spec(dir, "jobs.yaml", spec_content)
}

/// Operation without a description, for overlay creation
pub fn create_undocumented_spec(dir: &Path) -> anyhow::Result<PathBuf> {
    let spec_content = r#"
openapi: 3.0.0
info:
  title: X
  version: 1.0.0
paths:
  /x:
    get:
      operationId: listX
      responses:
        '200':
          description: OK
"#;
    write_spec(dir, "x.yaml", spec_content)
}

/// Two paths whose operationIds normalize to the same function name
pub fn create_duplicate_ids_spec(dir: &Path) -> anyhow::Result<PathBuf> {
    let spec_content = r#"
openapi: 3.0.0
info:
  title: Zoo
  version: 1.0.0
paths:
  /pets:
    get:
      operationId: getPet
      responses:
        '200':
          description: OK
  /animals:
    get:
      operationId: get_pet
      responses:
        '200':
          description: OK
"#;
    write_spec(dir, "zoo.yaml", spec_content)
}

/// Read a generated file as UTF-8 text
pub fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
