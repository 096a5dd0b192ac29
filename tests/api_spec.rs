use speculate2::speculate;

speculate! {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use sprintify::ai::{GeminiError, PlanGenerator};
    use sprintify::api::{auth::issue_token, create_router, AppState};
    use sprintify::config::Config;
    use sprintify::db::Database;
    use sprintify::models::Role;

    const SECRET: &str = "test-secret";

    const PLAN: &str = r#"```json
{
  "title": "Marathon base",
  "description": "Build aerobic base",
  "tasks": [
    {"title": "Easy 5k", "priority": "low", "day": 1, "estimated_hours": 0.5},
    {"title": "Long run", "priority": "high", "day": 6, "estimated_hours": 2}
  ],
  "milestones": [
    {"title": "First long run", "day": 6, "criteria": ["15 km without stopping"]}
  ]
}
```"#;

    struct CannedPlan(String);

    #[async_trait]
    impl PlanGenerator for CannedPlan {
        async fn complete(&self, _prompt: &str) -> Result<String, GeminiError> {
            Ok(self.0.clone())
        }
    }

    fn setup_with_plan(config: Config, plan: String) -> (TestServer, Database) {
        let db = Database::open_in_memory().expect("Failed to create test database");
        db.migrate().expect("Failed to migrate");
        let state = AppState::new(db.clone(), config, SECRET).with_ai(Arc::new(CannedPlan(plan)));
        let server = TestServer::new(create_router(state)).expect("Failed to start test server");
        (server, db)
    }

    fn setup_with(config: Config) -> (TestServer, Database) {
        setup_with_plan(config, PLAN.to_string())
    }

    fn setup() -> (TestServer, Database) {
        setup_with(Config::default())
    }

    fn token(uid: &str) -> String {
        issue_token(SECRET, uid, &format!("{uid}@example.com"), Some(uid), chrono::Duration::hours(1))
            .expect("Failed to sign token")
    }

    async fn register(server: &TestServer, uid: &str) -> String {
        let token = token(uid);
        server
            .post("/api/auth/register")
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::CREATED);
        token
    }

    async fn create_sprint(server: &TestServer, token: &str, title: &str) -> Value {
        let response = server
            .post("/api/sprints")
            .authorization_bearer(token)
            .json(&json!({
                "title": title,
                "start_date": "2026-06-01",
                "end_date": "2026-06-14",
                "tasks": [{"title": "Outline"}, {"title": "Draft"}]
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()["data"].clone()
    }

    describe "health" {
        it "responds without authentication" {
            tokio_test::block_on(async {
                let (server, _db) = setup();
                let response = server.get("/api/health").await;
                response.assert_status_ok();
                assert_eq!(response.json::<Value>()["data"]["status"], "ok");
            });
        }
    }

    describe "storage" {
        it "keeps accounts in a database file across restarts" {
            tokio_test::block_on(async {
                let dir = tempfile::tempdir().unwrap();
                let path = dir.path().join("sprintify.db");

                let db = Database::open(&path).unwrap();
                db.migrate().unwrap();
                let server = TestServer::new(create_router(AppState::new(db, Config::default(), SECRET))).unwrap();
                let token = register(&server, "alice").await;
                create_sprint(&server, &token, "Persisted").await;
                drop(server);

                let db = Database::open(&path).unwrap();
                db.migrate().unwrap();
                let server = TestServer::new(create_router(AppState::new(db, Config::default(), SECRET))).unwrap();
                let sprints = server.get("/api/sprints").authorization_bearer(&token).await;
                sprints.assert_status_ok();
                assert_eq!(sprints.json::<Value>()["data"][0]["title"], "Persisted");
            });
        }
    }

    describe "authentication" {
        it "rejects missing and forged tokens" {
            tokio_test::block_on(async {
                let (server, _db) = setup();
                server.get("/api/sprints").await.assert_status(StatusCode::UNAUTHORIZED);

                let forged = issue_token("other-secret", "mallory", "m@example.com", None, chrono::Duration::hours(1)).unwrap();
                let response = server.get("/api/sprints").authorization_bearer(&forged).await;
                response.assert_status(StatusCode::UNAUTHORIZED);
                assert_eq!(response.json::<Value>()["success"], false);
            });
        }

        it "requires registration before use" {
            tokio_test::block_on(async {
                let (server, _db) = setup();
                let token = token("alice");
                server
                    .get("/api/sprints")
                    .authorization_bearer(&token)
                    .await
                    .assert_status(StatusCode::FORBIDDEN);

                let response = server
                    .post("/api/auth/register")
                    .authorization_bearer(&token)
                    .json(&json!({"display_name": "Alice A."}))
                    .await;
                response.assert_status(StatusCode::CREATED);
                assert_eq!(response.json::<Value>()["data"]["display_name"], "Alice A.");

                server
                    .post("/api/auth/register")
                    .authorization_bearer(&token)
                    .await
                    .assert_status(StatusCode::CONFLICT);

                let me = server.get("/api/auth/me").authorization_bearer(&token).await;
                me.assert_status_ok();
                let me = me.json::<Value>();
                assert_eq!(me["data"]["role"], "normal");
                assert_eq!(me["data"]["ai_usage"]["daily"]["limit"], 5);
            });
        }

        it "blocks disabled accounts" {
            tokio_test::block_on(async {
                let (server, db) = setup();
                let token = register(&server, "alice").await;
                db.set_disabled("alice", true).unwrap();
                server
                    .get("/api/auth/me")
                    .authorization_bearer(&token)
                    .await
                    .assert_status(StatusCode::FORBIDDEN);
            });
        }
    }

    describe "sprints" {
        it "creates, reads and deletes a sprint" {
            tokio_test::block_on(async {
                let (server, _db) = setup();
                let token = register(&server, "alice").await;
                let sprint = create_sprint(&server, &token, "Write the book").await;
                assert_eq!(sprint["status"], "draft");
                assert_eq!(sprint["stats"]["total_tasks"], 2);

                let id = sprint["id"].as_str().unwrap().to_string();
                let detail = server
                    .get(&format!("/api/sprints/{id}"))
                    .authorization_bearer(&token)
                    .await;
                detail.assert_status_ok();
                assert_eq!(detail.json::<Value>()["data"]["tasks"].as_array().unwrap().len(), 2);

                server
                    .delete(&format!("/api/sprints/{id}"))
                    .authorization_bearer(&token)
                    .await
                    .assert_status_ok();
                server
                    .get(&format!("/api/sprints/{id}"))
                    .authorization_bearer(&token)
                    .await
                    .assert_status(StatusCode::NOT_FOUND);
            });
        }

        it "refuses duplicate titles" {
            tokio_test::block_on(async {
                let (server, _db) = setup();
                let token = register(&server, "alice").await;
                create_sprint(&server, &token, "Focus").await;
                let response = server
                    .post("/api/sprints")
                    .authorization_bearer(&token)
                    .json(&json!({"title": "  focus ", "start_date": "2026-06-01", "end_date": "2026-06-02"}))
                    .await;
                response.assert_status(StatusCode::CONFLICT);
                assert_eq!(response.json::<Value>()["success"], false);
            });
        }

        it "answers malformed ids and filters with the error envelope" {
            tokio_test::block_on(async {
                let (server, _db) = setup();
                let token = register(&server, "alice").await;

                let bad_id = server.get("/api/sprints/not-a-uuid").authorization_bearer(&token).await;
                bad_id.assert_status(StatusCode::BAD_REQUEST);
                let body = bad_id.json::<Value>();
                assert_eq!(body["success"], false);
                assert!(body["error"].as_str().unwrap().contains("not-a-uuid"));

                let bad_filter = server.get("/api/sprints?status=bogus").authorization_bearer(&token).await;
                bad_filter.assert_status(StatusCode::BAD_REQUEST);
                let body = bad_filter.json::<Value>();
                assert_eq!(body["success"], false);
                assert!(body["error"].is_string());
            });
        }

        it "clears optional fields set to null" {
            tokio_test::block_on(async {
                let (server, _db) = setup();
                let token = register(&server, "alice").await;
                let sprint = create_sprint(&server, &token, "Clearable").await;
                let id = sprint["id"].as_str().unwrap().to_string();

                let kept = server
                    .put(&format!("/api/sprints/{id}"))
                    .authorization_bearer(&token)
                    .json(&json!({"goal": "Finish chapter one"}))
                    .await
                    .json::<Value>();
                assert_eq!(kept["data"]["goal"], "Finish chapter one");

                let renamed = server
                    .put(&format!("/api/sprints/{id}"))
                    .authorization_bearer(&token)
                    .json(&json!({"title": "Still clearable"}))
                    .await
                    .json::<Value>();
                assert_eq!(renamed["data"]["goal"], "Finish chapter one");

                let cleared = server
                    .put(&format!("/api/sprints/{id}"))
                    .authorization_bearer(&token)
                    .json(&json!({"goal": null}))
                    .await
                    .json::<Value>();
                assert!(cleared["data"]["goal"].is_null());
            });
        }

        it "caps open sprints for normal users only" {
            tokio_test::block_on(async {
                let (server, db) = setup();
                let token = register(&server, "alice").await;
                for title in ["One", "Two", "Three"] {
                    create_sprint(&server, &token, title).await;
                }
                server
                    .post("/api/sprints")
                    .authorization_bearer(&token)
                    .json(&json!({"title": "Four", "start_date": "2026-06-01", "end_date": "2026-06-02"}))
                    .await
                    .assert_status(StatusCode::FORBIDDEN);

                db.set_role("alice", Role::Premium).unwrap();
                create_sprint(&server, &token, "Four").await;
            });
        }

        it "enforces the status lifecycle" {
            tokio_test::block_on(async {
                let (server, _db) = setup();
                let token = register(&server, "alice").await;
                let id = create_sprint(&server, &token, "Lifecycle").await["id"].as_str().unwrap().to_string();

                server
                    .put(&format!("/api/sprints/{id}"))
                    .authorization_bearer(&token)
                    .json(&json!({"status": "paused"}))
                    .await
                    .assert_status(StatusCode::CONFLICT);

                let active = server
                    .put(&format!("/api/sprints/{id}"))
                    .authorization_bearer(&token)
                    .json(&json!({"status": "active"}))
                    .await;
                active.assert_status_ok();
                assert_eq!(active.json::<Value>()["data"]["status"], "active");
            });
        }

        it "will not finish a task before its dependencies" {
            tokio_test::block_on(async {
                let (server, _db) = setup();
                let token = register(&server, "alice").await;
                let id = create_sprint(&server, &token, "Deps").await["id"].as_str().unwrap().to_string();
                let tasks = server
                    .get(&format!("/api/sprints/{id}/tasks"))
                    .authorization_bearer(&token)
                    .await
                    .json::<Value>();
                let outline = tasks["data"][0]["id"].as_str().unwrap().to_string();
                let draft = tasks["data"][1]["id"].as_str().unwrap().to_string();

                server
                    .put(&format!("/api/sprints/{id}/tasks/{draft}"))
                    .authorization_bearer(&token)
                    .json(&json!({"depends_on": [outline]}))
                    .await
                    .assert_status_ok();
                server
                    .put(&format!("/api/sprints/{id}/tasks/{outline}"))
                    .authorization_bearer(&token)
                    .json(&json!({"depends_on": [draft]}))
                    .await
                    .assert_status(StatusCode::CONFLICT);
                server
                    .put(&format!("/api/sprints/{id}/tasks/{draft}"))
                    .authorization_bearer(&token)
                    .json(&json!({"status": "done"}))
                    .await
                    .assert_status(StatusCode::CONFLICT);

                server
                    .put(&format!("/api/sprints/{id}/tasks/{outline}"))
                    .authorization_bearer(&token)
                    .json(&json!({"status": "done"}))
                    .await
                    .assert_status_ok();
                let done = server
                    .put(&format!("/api/sprints/{id}/tasks/{draft}"))
                    .authorization_bearer(&token)
                    .json(&json!({"status": "done"}))
                    .await;
                done.assert_status_ok();
                assert!(done.json::<Value>()["data"]["completed_at"].is_string());

                let report = server
                    .get(&format!("/api/stats/sprints/{id}"))
                    .authorization_bearer(&token)
                    .await
                    .json::<Value>();
                assert_eq!(report["data"]["sprint"]["stats"]["progress"], 100);
            });
        }

        it "completes milestones" {
            tokio_test::block_on(async {
                let (server, _db) = setup();
                let token = register(&server, "alice").await;
                let id = create_sprint(&server, &token, "Milestones").await["id"].as_str().unwrap().to_string();
                let milestone = server
                    .post(&format!("/api/sprints/{id}/milestones"))
                    .authorization_bearer(&token)
                    .json(&json!({"title": "Halfway", "criteria": ["first draft"]}))
                    .await;
                milestone.assert_status(StatusCode::CREATED);
                let mid = milestone.json::<Value>()["data"]["id"].as_str().unwrap().to_string();

                let done = server
                    .post(&format!("/api/sprints/{id}/milestones/{mid}/complete"))
                    .authorization_bearer(&token)
                    .await;
                done.assert_status_ok();
                assert_eq!(done.json::<Value>()["data"]["completed"], true);
            });
        }
    }

    describe "ai planning" {
        it "saves a generated plan as a draft sprint" {
            tokio_test::block_on(async {
                let (server, db) = setup();
                let token = register(&server, "alice").await;
                let body = json!({"goal": "Run a marathon", "duration_days": 14, "start_date": "2026-07-01", "save": true});

                let first = server.post("/api/ai/generate-plan").authorization_bearer(&token).json(&body).await;
                first.assert_status_ok();
                let first = first.json::<Value>();
                assert_eq!(first["data"]["sprint"]["title"], "Marathon base");
                assert_eq!(first["data"]["sprint"]["status"], "draft");
                assert_eq!(first["data"]["sprint"]["ai_generated"], true);
                assert_eq!(first["data"]["sprint"]["end_date"], "2026-07-14");
                assert_eq!(first["data"]["usage"]["daily"]["used"], 1);

                let second = server.post("/api/ai/generate-plan").authorization_bearer(&token).json(&body).await;
                second.assert_status_ok();
                assert_eq!(second.json::<Value>()["data"]["sprint"]["title"], "Marathon base (2)");
                assert_eq!(db.unread_count("alice").unwrap(), 2);
            });
        }

        it "trims oversized titles from the model before saving" {
            tokio_test::block_on(async {
                let long = "t".repeat(250);
                let plan = format!(r#"{{"title": "Long haul", "tasks": [{{"title": "{long}", "day": 1}}]}}"#);
                let (server, _db) = setup_with_plan(Config::default(), plan);
                let token = register(&server, "alice").await;

                let response = server
                    .post("/api/ai/generate-plan")
                    .authorization_bearer(&token)
                    .json(&json!({"goal": "Go far", "duration_days": 5, "save": true}))
                    .await;
                response.assert_status_ok();
                let body = response.json::<Value>();
                assert_eq!(body["data"]["sprint"]["stats"]["total_tasks"], 1);
                assert_eq!(body["data"]["plan"]["tasks"][0]["title"].as_str().unwrap().chars().count(), 200);
                assert_eq!(body["data"]["usage"]["daily"]["used"], 1);
            });
        }

        it "rejects calls beyond the daily quota" {
            tokio_test::block_on(async {
                let (server, _db) = setup_with(Config {
                    normal_daily_quota: 1,
                    ..Config::default()
                });
                let token = register(&server, "alice").await;
                let body = json!({"goal": "Learn piano", "duration_days": 7});

                server.post("/api/ai/generate-plan").authorization_bearer(&token).json(&body).await.assert_status_ok();
                let denied = server.post("/api/ai/generate-plan").authorization_bearer(&token).json(&body).await;
                denied.assert_status(StatusCode::TOO_MANY_REQUESTS);

                let usage = server.get("/api/ai/usage").authorization_bearer(&token).await.json::<Value>();
                assert_eq!(usage["data"]["quota"]["daily"]["remaining"], 0);
                assert_eq!(usage["data"]["usage"]["total_count"], 1);
            });
        }

        it "validates the requested duration" {
            tokio_test::block_on(async {
                let (server, _db) = setup();
                let token = register(&server, "alice").await;
                server
                    .post("/api/ai/generate-plan")
                    .authorization_bearer(&token)
                    .json(&json!({"goal": "Anything", "duration_days": 91}))
                    .await
                    .assert_status(StatusCode::BAD_REQUEST);
            });
        }

        it "reports an unconfigured AI service" {
            tokio_test::block_on(async {
                let db = Database::open_in_memory().unwrap();
                db.migrate().unwrap();
                let server = TestServer::new(create_router(AppState::new(db, Config::default(), SECRET))).unwrap();
                let token = register(&server, "alice").await;
                server
                    .post("/api/ai/generate-plan")
                    .authorization_bearer(&token)
                    .json(&json!({"goal": "Anything", "duration_days": 3}))
                    .await
                    .assert_status(StatusCode::SERVICE_UNAVAILABLE);
            });
        }
    }

    describe "rate limiting" {
        it "answers 429 with Retry-After once the window is spent" {
            tokio_test::block_on(async {
                let (server, _db) = setup_with(Config {
                    rate_limit: 2,
                    ..Config::default()
                });
                server.get("/api/health").await.assert_status_ok();
                server.get("/api/health").await.assert_status_ok();
                let limited = server.get("/api/health").await;
                limited.assert_status(StatusCode::TOO_MANY_REQUESTS);
                assert!(limited.headers().contains_key("retry-after"));
            });
        }

        it "limits AI routes on their own window" {
            tokio_test::block_on(async {
                let (server, _db) = setup_with(Config {
                    ai_rate_limit: 1,
                    ..Config::default()
                });
                let token = register(&server, "alice").await;

                server.get("/api/ai/usage").authorization_bearer(&token).await.assert_status_ok();
                let limited = server.get("/api/ai/usage").authorization_bearer(&token).await;
                limited.assert_status(StatusCode::TOO_MANY_REQUESTS);
                assert!(limited.headers().contains_key("retry-after"));
                assert_eq!(limited.json::<Value>()["success"], false);

                server.get("/api/sprints").authorization_bearer(&token).await.assert_status_ok();
            });
        }
    }

    describe "admin" {
        it "keeps user management to admins" {
            tokio_test::block_on(async {
                let (server, db) = setup();
                let alice = register(&server, "alice").await;
                let root = register(&server, "root").await;
                db.set_role("root", Role::Admin).unwrap();

                server.get("/api/users").authorization_bearer(&alice).await.assert_status(StatusCode::FORBIDDEN);

                let page = server.get("/api/users?search=ali").authorization_bearer(&root).await;
                page.assert_status_ok();
                assert_eq!(page.json::<Value>()["data"]["total"], 1);

                server
                    .delete("/api/users/root")
                    .authorization_bearer(&root)
                    .await
                    .assert_status(StatusCode::BAD_REQUEST);
                server
                    .put("/api/users/root/role")
                    .authorization_bearer(&root)
                    .json(&json!({"role": "normal"}))
                    .await
                    .assert_status(StatusCode::BAD_REQUEST);

                let promoted = server
                    .put("/api/users/alice/role")
                    .authorization_bearer(&root)
                    .json(&json!({"role": "premium"}))
                    .await;
                promoted.assert_status_ok();
                assert_eq!(promoted.json::<Value>()["data"]["role"], "premium");
                assert_eq!(db.unread_count("alice").unwrap(), 1);

                server.get("/api/stats/admin").authorization_bearer(&root).await.assert_status_ok();
                server.get("/api/stats/admin").authorization_bearer(&alice).await.assert_status(StatusCode::FORBIDDEN);
            });
        }

        it "approves upgrade requests" {
            tokio_test::block_on(async {
                let (server, db) = setup();
                let alice = register(&server, "alice").await;
                let root = register(&server, "root").await;
                db.set_role("root", Role::Admin).unwrap();

                let request = server
                    .post("/api/upgrade-requests")
                    .authorization_bearer(&alice)
                    .json(&json!({"reason": "I run many sprints"}))
                    .await;
                request.assert_status(StatusCode::CREATED);
                let id = request.json::<Value>()["data"]["id"].as_str().unwrap().to_string();

                server
                    .post("/api/upgrade-requests")
                    .authorization_bearer(&alice)
                    .json(&json!({}))
                    .await
                    .assert_status(StatusCode::CONFLICT);
                server
                    .get("/api/upgrade-requests")
                    .authorization_bearer(&alice)
                    .await
                    .assert_status(StatusCode::FORBIDDEN);

                let pending = server
                    .get("/api/upgrade-requests?status=pending")
                    .authorization_bearer(&root)
                    .await
                    .json::<Value>();
                assert_eq!(pending["data"].as_array().unwrap().len(), 1);

                let malformed = server
                    .post(&format!("/api/upgrade-requests/{id}/approve"))
                    .authorization_bearer(&root)
                    .text("{\"note\": ")
                    .await;
                malformed.assert_status(StatusCode::BAD_REQUEST);
                assert_eq!(malformed.json::<Value>()["success"], false);

                server
                    .post(&format!("/api/upgrade-requests/{id}/approve"))
                    .authorization_bearer(&root)
                    .json(&json!({"note": "enjoy"}))
                    .await
                    .assert_status_ok();

                let me = server.get("/api/auth/me").authorization_bearer(&alice).await.json::<Value>();
                assert_eq!(me["data"]["role"], "premium");

                let unread = server
                    .get("/api/notifications/unread-count")
                    .authorization_bearer(&alice)
                    .await
                    .json::<Value>();
                assert_eq!(unread["data"]["count"], 1);

                server
                    .put("/api/notifications/read-all")
                    .authorization_bearer(&alice)
                    .await
                    .assert_status_ok();
                let list = server
                    .get("/api/notifications?unread=true")
                    .authorization_bearer(&alice)
                    .await
                    .json::<Value>();
                assert!(list["data"].as_array().unwrap().is_empty());
            });
        }
    }
}
