//! Documentation pages: a Swagger UI page and the OpenAPI document it renders.

use serde_json::{json, Value};

use crate::markup::escape;

const SWAGGER_UI_VERSION: &str = "5";

/// Swagger UI page titled `"{title} - Swagger UI"` that loads `openapi_url`.
pub fn swagger_ui_html(title: &str, openapi_url: &str) -> String {
    let title = escape(&format!("{} - Swagger UI", title));
    // The URL ends up inside a JS string literal; serde_json does the quoting.
    let url = Value::String(openapi_url.to_string()).to_string();

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/swagger-ui-dist@{version}/swagger-ui.css">
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://cdn.jsdelivr.net/npm/swagger-ui-dist@{version}/swagger-ui-bundle.js"></script>
    <script>
        const ui = SwaggerUIBundle({{
            url: {url},
            dom_id: '#swagger-ui',
            layout: 'BaseLayout',
            deepLinking: true,
            showExtensions: true,
            showCommonExtensions: true,
            presets: [
                SwaggerUIBundle.presets.apis,
                SwaggerUIBundle.SwaggerUIStandalonePreset
            ],
        }})
    </script>
</body>
</html>
"##,
        title = title,
        version = SWAGGER_UI_VERSION,
        url = url
    )
}

/// OpenAPI 3.1 description of the routes served under `prefix`.
pub fn openapi_document(title: &str, prefix: &str, docs_path: &str) -> Value {
    let html = |description: &str| {
        json!({
            "description": description,
            "content": { "text/html": { "schema": { "type": "string" } } }
        })
    };

    json!({
        "openapi": "3.1.0",
        "info": {
            "title": title,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": {
            format!("{}/status", prefix): {
                "get": {
                    "summary": "Status",
                    "operationId": "status",
                    "responses": {
                        "200": {
                            "description": "The service is operational",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": { "status": { "type": "string", "example": "operational" } },
                                        "required": ["status"]
                                    }
                                }
                            }
                        }
                    }
                }
            },
            format!("{}{}", prefix, docs_path): {
                "get": {
                    "summary": "API documentation",
                    "operationId": "custom_docs",
                    "responses": { "200": html("Swagger UI page") }
                }
            },
            format!("{}/", prefix): {
                "get": {
                    "summary": "Tile proxy index",
                    "description": "Every other path under the prefix is answered by the tile proxy (TMS, WMTS, demo).",
                    "operationId": "tile_proxy",
                    "responses": { "200": html("Index of the configured tile services") }
                }
            }
        }
    })
}
