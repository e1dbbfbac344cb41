use axum::response::{Html, IntoResponse};

/// Serve Swagger UI at /v1/docs
pub async fn serve_swagger_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

// Assets come from unpkg; the page itself only points them at our document.
const SWAGGER_UI_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Activity Marketplace API</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui.css" />
    <style>
        body { margin: 0; font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; }
        #swagger-ui { max-width: 1280px; margin: 0 auto; padding: 16px; }
        .topbar { display: none; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: '/v1/docs/openapi.json',
                dom_id: '#swagger-ui',
                deepLinking: true,
                docExpansion: "list",
                filter: true,
                persistAuthorization: true,
                validatorUrl: null
            });
        }
    </script>
</body>
</html>"#;
