pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::evaluation::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/api/health", get(health::health_handler))
        .route(
            "/api/evaluate",
            post(handlers::handle_evaluate).options(handlers::handle_preflight),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::llm_client::stub::StubProvider;

    const BOUNDARY: &str = "coachtestboundary";

    fn test_config() -> Config {
        Config {
            gemini_api_key: "test-key".into(),
            gemini_model: "stub-model".into(),
            gemini_api_base: "http://localhost".into(),
            port: 5000,
            rust_log: "debug".into(),
            max_upload_bytes: 1024 * 1024,
            retry_backoff_ms: 0,
        }
    }

    fn app(provider: Arc<StubProvider>) -> Router {
        app_with_config(provider, test_config())
    }

    fn app_with_config(provider: Arc<StubProvider>, config: Config) -> Router {
        build_router(AppState { config, provider })
    }

    enum Part<'a> {
        Text(&'a str, &'a str),
        /// A text field that still declares a Content-Type, as some clients send.
        TypedText {
            name: &'a str,
            content_type: &'a str,
            value: &'a str,
        },
        File {
            name: &'a str,
            filename: &'a str,
            content_type: &'a str,
            data: &'a [u8],
        },
    }

    fn multipart_body(parts: &[Part]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::TypedText {
                    name,
                    content_type,
                    value,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"\r\n\
                             Content-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File {
                    name,
                    filename,
                    content_type,
                    data,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                             Content-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post_evaluate(router: Router, parts: &[Part<'_>]) -> Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/evaluate")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        router.oneshot(request).await.unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_port() {
        let provider = Arc::new(StubProvider::replying("{}"));
        let request = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let response = app(provider).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["port"], 5000);
        assert!(body["status"].is_string());
    }

    #[tokio::test]
    async fn test_preflight_returns_empty_200() {
        let provider = Arc::new(StubProvider::replying("{}"));
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/evaluate")
            .body(Body::empty())
            .unwrap();
        let response = app(provider).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_text_only_evaluation_returns_model_body() {
        let provider = Arc::new(StubProvider::replying(
            r#"{"score":72,"evaluation":"Solid example"}"#,
        ));
        let response = post_evaluate(
            app(provider.clone()),
            &[
                Part::Text("text_input", "I led a team of 5"),
                Part::Text("goal", "Engineering"),
            ],
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"score": 72, "evaluation": "Solid example"})
        );

        let prompt = &provider.prompts()[0];
        assert!(prompt.contains("I led a team of 5"));
        assert!(prompt.contains("for Engineering (Interview)"));
        assert!(prompt.contains("No resume provided."));
        assert!(provider.last_parts().is_empty());
    }

    #[tokio::test]
    async fn test_text_fields_with_content_type_are_read_as_text() {
        let provider = Arc::new(StubProvider::replying(r#"{"score":70,"evaluation":"ok"}"#));
        let response = post_evaluate(
            app(provider.clone()),
            &[
                Part::TypedText {
                    name: "goal",
                    content_type: "text/plain",
                    value: "Engineering",
                },
                Part::TypedText {
                    name: "text_input",
                    content_type: "text/plain; charset=utf-8",
                    value: "I led a team of 5",
                },
            ],
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let prompt = &provider.prompts()[0];
        assert!(prompt.contains("for Engineering (Interview)"));
        assert!(prompt.contains("I led a team of 5"));
    }

    #[tokio::test]
    async fn test_quoted_score_is_returned_as_is() {
        let provider = Arc::new(StubProvider::replying(r#"{"score":"85","evaluation":"good"}"#));
        let response = post_evaluate(app(provider), &[Part::Text("text_input", "hi")]).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"score": "85", "evaluation": "good"})
        );
    }

    #[tokio::test]
    async fn test_oversized_body_yields_413() {
        let provider = Arc::new(StubProvider::replying("{}"));
        let config = Config {
            max_upload_bytes: 1024,
            ..test_config()
        };
        let answer = "a".repeat(4096);
        let response = post_evaluate(
            app_with_config(provider.clone(), config),
            &[Part::Text("text_input", &answer)],
        )
        .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(response).await["score"], 0);
        assert_eq!(provider.attempts(), 0);
    }

    #[tokio::test]
    async fn test_fenced_reply_is_unwrapped() {
        let provider = Arc::new(StubProvider::replying(
            "```json\n{\"score\":80,\"evaluation\":\"ok\"}\n```",
        ));
        let response = post_evaluate(app(provider), &[Part::Text("text_input", "hi")]).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"score": 80, "evaluation": "ok"})
        );
    }

    #[tokio::test]
    async fn test_rate_limited_provider_yields_429() {
        let provider = Arc::new(StubProvider::always_rate_limited());
        let response =
            post_evaluate(app(provider.clone()), &[Part::Text("text_input", "hi")]).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Server busy, please try again"})
        );
        assert_eq!(provider.attempts(), 3);
    }

    #[tokio::test]
    async fn test_non_json_reply_yields_zeroed_500() {
        let provider = Arc::new(StubProvider::replying("not json"));
        let response = post_evaluate(app(provider), &[Part::Text("text_input", "hi")]).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["score"], 0);
        assert!(body["evaluation"].is_string());
    }

    #[tokio::test]
    async fn test_unreadable_resume_does_not_abort() {
        let provider = Arc::new(StubProvider::replying(r#"{"score":50,"evaluation":"ok"}"#));
        let response = post_evaluate(
            app(provider.clone()),
            &[
                Part::Text("text_input", "my answer"),
                Part::File {
                    name: "file",
                    filename: "resume.pdf",
                    content_type: "application/pdf",
                    data: b"garbage that is not a pdf",
                },
            ],
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(provider.prompts()[0].contains("Could not read PDF: "));
    }

    #[tokio::test]
    async fn test_audio_is_uploaded_and_cleaned_up() {
        let provider = Arc::new(StubProvider::replying(r#"{"score":64,"evaluation":"ok"}"#));
        let response = post_evaluate(
            app(provider.clone()),
            &[
                Part::Text("context_text", "Why this role?"),
                Part::File {
                    name: "audio_recording",
                    filename: "answer.webm",
                    content_type: "audio/webm;codecs=opus",
                    data: b"\x1a\x45\xdf\xa3 webm bytes",
                },
            ],
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let uploads = provider.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].mime_type, "audio/webm");
        assert!(uploads[0].existed);
        assert!(!uploads[0].path.exists());
    }

    #[tokio::test]
    async fn test_bad_camera_frame_yields_zeroed_500() {
        let provider = Arc::new(StubProvider::replying(r#"{"score":64,"evaluation":"ok"}"#));
        let response = post_evaluate(
            app(provider.clone()),
            &[Part::File {
                name: "camera_frame",
                filename: "frame.jpg",
                content_type: "image/jpeg",
                data: b"not really a jpeg",
            }],
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["score"], 0);
        assert_eq!(provider.attempts(), 0);
    }

    #[tokio::test]
    async fn test_non_multipart_body_yields_zeroed_500() {
        let provider = Arc::new(StubProvider::replying("{}"));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/evaluate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app(provider.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["score"], 0);
        assert_eq!(provider.attempts(), 0);
    }
}
