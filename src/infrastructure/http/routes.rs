//! HTTP Routes
//!
//! API Endpoints:
//! - /api/ping               GET   健康检查（含生成服务可达性）
//! - /api/story/create       POST  创建故事
//! - /api/story/get          POST  获取故事详情（id 或 slug）
//! - /api/story/list         GET   列出所有故事
//! - /api/story/delete       POST  删除故事
//! - /api/story/style        POST  设置/清除全局文风
//! - /api/story/analyze      POST  审阅大纲（需要步骤 9，报告通过 WS 推送）
//! - /api/step/generate      POST  生成步骤（后台执行，通过 WS 推送进度）
//! - /api/step/refine        POST  按指令精修步骤（前沿之前的步骤会级联删除后续步骤）
//! - /api/step/advance       POST  接受前沿步骤的现有内容
//! - /api/step/rollback      POST  回滚到指定步骤
//! - /api/step/cancel        POST  取消活跃生成
//! - /api/step/status        POST  查询生成状态
//! - /api/chapter/generate   POST  生成下一章或重写前沿章节
//! - /api/chapter/refine     POST  精修前沿章节
//! - /api/chapter/regenerate POST  重新生成章节（删除其后章节）
//! - /ws/story/{id}          WS    故事事件

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api", api_routes())
        .route("/ws/story/:story_id", get(handlers::story_websocket_handler))
}

/// API 路由
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(handlers::ping))
        .nest("/story", story_routes())
        .nest("/step", step_routes())
        .nest("/chapter", chapter_routes())
}

/// Story 路由
fn story_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/create", post(handlers::create_story))
        .route("/get", post(handlers::get_story))
        .route("/list", get(handlers::list_stories))
        .route("/delete", post(handlers::delete_story))
        .route("/style", post(handlers::set_writing_style))
        .route("/analyze", post(handlers::analyze_story))
}

/// Step 路由
fn step_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/generate", post(handlers::generate_step))
        .route("/refine", post(handlers::refine_step))
        .route("/advance", post(handlers::advance_step))
        .route("/rollback", post(handlers::rollback_step))
        .route("/cancel", post(handlers::cancel_generation))
        .route("/status", post(handlers::generation_status))
}

/// Chapter 路由
fn chapter_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/generate", post(handlers::generate_chapter))
        .route("/refine", post(handlers::refine_chapter))
        .route("/regenerate", post(handlers::regenerate_chapter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::util::ServiceExt;

    use crate::application::ports::{GenerationEvent, StoryRepositoryPort};
    use crate::infrastructure::adapters::FakeGenerationClient;
    use crate::domain::{schema, ContentKind, Slug, StepContent, StepNumber, Story};
    use crate::infrastructure::events::{EventPublisher, StoryEvent};
    use crate::infrastructure::http::build_router;
    use crate::infrastructure::memory::InMemoryFlightRegistry;
    use crate::infrastructure::persistence::sqlite::{
        create_pool, run_migrations, DatabaseConfig, SqliteStoryRepository,
    };
    use crate::infrastructure::worker::GenerationRunnerConfig;

    async fn app() -> (Router, Arc<FakeGenerationClient>) {
        let (app, client, _state) = app_with_state().await;
        (app, client)
    }

    async fn app_with_state() -> (Router, Arc<FakeGenerationClient>, Arc<AppState>) {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let client = Arc::new(FakeGenerationClient::new());
        let state = Arc::new(AppState::new(
            Arc::new(SqliteStoryRepository::new(pool)),
            client.clone(),
            InMemoryFlightRegistry::new().arc(),
            EventPublisher::new().arc(),
            GenerationRunnerConfig::default(),
        ));
        (build_router(state.clone()), client, state)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Value {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create(app: &Router, slug: &str) -> String {
        let body = call(
            app,
            "POST",
            "/api/story/create",
            Some(json!({"slug": slug, "premise": "A lighthouse keeper hears a bell"})),
        )
        .await;
        assert_eq!(body["errno"], 0);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    /// 轮询直到步骤出现内容
    async fn wait_for_step(app: &Router, id: &str, step: usize) -> Value {
        for _ in 0..200 {
            let body = call(app, "POST", "/api/story/get", Some(json!({"id": id}))).await;
            if !body["data"]["steps"][step - 1]["content"].is_null() {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("step {} was never committed", step);
    }

    #[tokio::test]
    async fn test_ping() {
        let (app, _) = app().await;
        let body = call(&app, "GET", "/api/ping", None).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["generator"], true);
    }

    #[tokio::test]
    async fn test_create_get_and_duplicate() {
        let (app, _) = app().await;
        let id = create(&app, "Bell Tower").await;

        let body = call(&app, "POST", "/api/story/get", Some(json!({"slug": "bell-tower"}))).await;
        assert_eq!(body["errno"], 0);
        assert_eq!(body["data"]["id"], id.as_str());
        assert_eq!(body["data"]["current_step"], 1);
        assert_eq!(body["data"]["steps"].as_array().unwrap().len(), 10);

        let dup = call(
            &app,
            "POST",
            "/api/story/create",
            Some(json!({"slug": "bell-tower", "premise": "again"})),
        )
        .await;
        assert_eq!(dup["errno"], 409);

        let list = call(&app, "GET", "/api/story/list", None).await;
        assert_eq!(list["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_story_and_bad_body() {
        let (app, _) = app().await;
        let missing = call(
            &app,
            "POST",
            "/api/story/get",
            Some(json!({"id": uuid::Uuid::new_v4()})),
        )
        .await;
        assert_eq!(missing["errno"], 404);

        let bad = call(&app, "POST", "/api/step/generate", Some(json!({"step": 1}))).await;
        assert_eq!(bad["errno"], 400);
    }

    #[tokio::test]
    async fn test_generate_runs_in_background() {
        let (app, client) = app().await;
        let id = create(&app, "keeper").await;
        client.push_text("A keeper answers a bell that should not ring.");

        let accepted = call(
            &app,
            "POST",
            "/api/step/generate",
            Some(json!({"story_id": id, "step": 1, "mode": "complete"})),
        )
        .await;
        assert_eq!(accepted["errno"], 0);
        assert_eq!(accepted["data"]["target"], "step-1");

        let story = wait_for_step(&app, &id, 1).await;
        assert_eq!(
            story["data"]["steps"][0]["content"],
            "A keeper answers a bell that should not ring."
        );
        assert_eq!(story["data"]["current_step"], 2);
    }

    #[tokio::test]
    async fn test_prerequisite_rejected_synchronously() {
        let (app, client) = app().await;
        let id = create(&app, "fog").await;

        let body = call(
            &app,
            "POST",
            "/api/step/generate",
            Some(json!({"story_id": id, "step": 3})),
        )
        .await;
        assert_eq!(body["errno"], 400);
        assert!(client.requests().is_empty());

        let unknown = call(
            &app,
            "POST",
            "/api/step/generate",
            Some(json!({"story_id": id, "step": 11})),
        )
        .await;
        assert_eq!(unknown["errno"], 400);
    }

    #[tokio::test]
    async fn test_busy_then_cancel() {
        let (app, client) = app().await;
        let id = create(&app, "tide").await;
        let tx = client.push_channel();

        let first = call(
            &app,
            "POST",
            "/api/step/generate",
            Some(json!({"story_id": id, "step": 1})),
        )
        .await;
        assert_eq!(first["errno"], 0);
        let attempt = first["data"]["attempt"].as_u64().unwrap();

        let second = call(
            &app,
            "POST",
            "/api/step/generate",
            Some(json!({"story_id": id, "step": 1})),
        )
        .await;
        assert_eq!(second["errno"], 409);

        let status = call(&app, "POST", "/api/step/status", Some(json!({"story_id": id}))).await;
        assert_eq!(status["data"]["state"], "generating");
        assert_eq!(status["data"]["active"]["attempt"], attempt);

        let cancelled = call(&app, "POST", "/api/step/cancel", Some(json!({"story_id": id}))).await;
        assert_eq!(cancelled["data"]["cancelled_attempt"], attempt);

        let again = call(&app, "POST", "/api/step/cancel", Some(json!({"story_id": id}))).await;
        assert!(again["data"]["cancelled_attempt"].is_null());

        // 取消后的内容不会提交
        tx.send(GenerationEvent::Content {
            text: "late".to_string(),
        })
        .ok();
        tx.send(GenerationEvent::Complete { word_count: None }).ok();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let story = call(&app, "POST", "/api/story/get", Some(json!({"id": id}))).await;
        assert!(story["data"]["steps"][0]["content"].is_null());
    }

    #[tokio::test]
    async fn test_chapter_requires_planning() {
        let (app, _) = app().await;
        let id = create(&app, "harbor").await;
        let body = call(
            &app,
            "POST",
            "/api/chapter/generate",
            Some(json!({"story_id": id, "chapter": 1})),
        )
        .await;
        assert_eq!(body["errno"], 400);
    }

    #[tokio::test]
    async fn test_analyze_requires_scene_expansion() {
        let (app, client) = app().await;
        let id = create(&app, "reef").await;

        let body = call(&app, "POST", "/api/story/analyze", Some(json!({"id": id}))).await;
        assert_eq!(body["errno"], 400);
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_analyze_reports_over_events() {
        let (app, client, state) = app_with_state().await;
        let mut story = Story::new(Slug::new("reef").unwrap(), "A signal from the reef").unwrap();
        for n in 1..=9u8 {
            let step = StepNumber::new(n).unwrap();
            let content = match schema::slot(step).kind {
                ContentKind::FreeText => StepContent::Text(format!("step {}", n)),
                kind => StepContent::from_json(kind, json!([{"title": "Reef"}])).unwrap(),
            };
            story.commit(step, content).unwrap();
        }
        state.story_repo.create(&story).await.unwrap();
        let mut rx = state.event_publisher.subscribe(story.id());
        let tx = client.push_channel();

        let id = story.id().to_string();
        let accepted = call(&app, "POST", "/api/story/analyze", Some(json!({"id": id}))).await;
        assert_eq!(accepted["errno"], 0);
        assert_eq!(accepted["data"]["target"], "analysis");

        // 审阅期间占用单飞登记
        let busy = call(
            &app,
            "POST",
            "/api/step/advance",
            Some(json!({"story_id": id})),
        )
        .await;
        assert_eq!(busy["errno"], 409);

        tx.send(GenerationEvent::Content {
            text: r#"{"overall_assessment": {"readiness_score": "5/10"}}"#.to_string(),
        })
        .ok();
        tx.send(GenerationEvent::Complete { word_count: None }).ok();

        let report = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match rx.recv().await {
                    Ok(StoryEvent::AnalysisCompleted { analysis, .. }) => return analysis,
                    Ok(_) => continue,
                    Err(e) => panic!("event stream closed: {}", e),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(report.overall_assessment.readiness_score, "5/10");

        let stored = call(&app, "POST", "/api/story/get", Some(json!({"id": id}))).await;
        assert_eq!(stored["data"]["current_step"], 10);
    }
}
