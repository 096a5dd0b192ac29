use speculate2::speculate;

speculate! {
    use chrono::NaiveDate;
    use sprintify_core::models::*;
    use sprintify_core::{Database, StoreError};

    fn setup_db() -> Database {
        let db = Database::open_in_memory().expect("Failed to create test database");
        db.migrate().expect("Failed to migrate");
        db
    }

    fn create_user(db: &Database, uid: &str) -> User {
        db.create_user(CreateUserInput {
            uid: uid.into(),
            email: format!("{uid}@example.com"),
            display_name: None,
            role: None,
        })
        .expect("Failed to create user")
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn sprint_input(title: &str) -> CreateSprintInput {
        CreateSprintInput {
            title: title.into(),
            description: None,
            goal: Some("Ship it".into()),
            status: None,
            start_date: date(3, 1),
            end_date: date(3, 14),
            ai_generated: false,
            tasks: vec![],
            milestones: vec![],
        }
    }

    fn create_sprint(db: &Database, uid: &str, title: &str) -> Sprint {
        db.create_sprint(uid, sprint_input(title)).expect("Failed to create sprint")
    }

    describe "users" {
        it "rejects a second profile for the same uid" {
            let db = setup_db();
            create_user(&db, "alice");
            let err = db.create_user(CreateUserInput {
                uid: "alice".into(),
                email: "other@example.com".into(),
                display_name: None,
                role: None,
            }).unwrap_err();
            assert!(matches!(err, StoreError::Conflict(_)));
        }

        it "filters users by search text" {
            let db = setup_db();
            create_user(&db, "alice");
            create_user(&db, "bob");
            let page = db.list_users(&UserFilter {
                search: Some("ALI".into()),
                ..Default::default()
            }).unwrap();
            assert_eq!(page.total, 1);
            assert_eq!(page.users[0].uid, "alice");
        }

        it "keeps device tokens unique and bounded" {
            let db = setup_db();
            create_user(&db, "alice");
            for i in 0..12 {
                db.add_fcm_token("alice", &format!("tok-{i}")).unwrap();
            }
            let tokens = db.add_fcm_token("alice", "tok-5").unwrap().unwrap();
            assert_eq!(tokens.len(), 10);
            assert_eq!(tokens.last().map(String::as_str), Some("tok-5"));
            assert_eq!(tokens.iter().filter(|t| *t == "tok-5").count(), 1);
        }

        it "cascades deletion to sprints" {
            let db = setup_db();
            create_user(&db, "alice");
            let sprint = create_sprint(&db, "alice", "Focus week");
            assert!(db.delete_user("alice").unwrap());
            assert!(db.get_sprint("alice", sprint.id).unwrap().is_none());
        }
    }

    describe "sprints" {
        it "creates initial tasks and milestones with stats" {
            let db = setup_db();
            create_user(&db, "alice");
            let mut input = sprint_input("Learn Rust");
            input.tasks = vec![CreateTaskInput::titled("Read the book"), CreateTaskInput {
                status: Some(TaskStatus::Done),
                ..CreateTaskInput::titled("Install toolchain")
            }];
            input.milestones = vec![CreateMilestoneInput {
                title: "First crate".into(),
                description: None,
                target_date: Some(date(3, 7)),
                criteria: vec!["published".into(), "  ".into()],
            }];

            let sprint = db.create_sprint("alice", input).unwrap();
            assert_eq!(sprint.status, SprintStatus::Draft);
            assert_eq!(sprint.stats.total_tasks, 2);
            assert_eq!(sprint.stats.completed_tasks, 1);
            assert_eq!(sprint.stats.progress, 50);
            assert_eq!(sprint.stats.total_milestones, 1);

            let detail = db.get_sprint_detail("alice", sprint.id).unwrap().unwrap();
            assert_eq!(detail.tasks[0].title, "Read the book");
            assert_eq!(detail.milestones[0].criteria, vec!["published".to_string()]);
        }

        it "rejects a duplicate title for the same user regardless of case" {
            let db = setup_db();
            create_user(&db, "alice");
            create_sprint(&db, "alice", "Focus Week");
            let err = db.create_sprint("alice", sprint_input("  focus week ")).unwrap_err();
            assert!(matches!(err, StoreError::Conflict(_)));
        }

        it "allows the same title for different users" {
            let db = setup_db();
            create_user(&db, "alice");
            create_user(&db, "bob");
            create_sprint(&db, "alice", "Focus Week");
            assert!(db.create_sprint("bob", sprint_input("Focus Week")).is_ok());
        }

        it "rejects an end date before the start date" {
            let db = setup_db();
            create_user(&db, "alice");
            let mut input = sprint_input("Backwards");
            input.end_date = date(2, 1);
            assert!(matches!(db.create_sprint("alice", input), Err(StoreError::Invalid(_))));
        }

        it "hides other users' sprints" {
            let db = setup_db();
            create_user(&db, "alice");
            create_user(&db, "bob");
            let sprint = create_sprint(&db, "alice", "Private");
            assert!(db.get_sprint("bob", sprint.id).unwrap().is_none());
            assert!(!db.delete_sprint("bob", sprint.id).unwrap());
        }

        it "enforces the status lifecycle" {
            let db = setup_db();
            create_user(&db, "alice");
            let sprint = create_sprint(&db, "alice", "Lifecycle");

            let paused = db.update_sprint("alice", sprint.id, UpdateSprintInput {
                status: Some(SprintStatus::Paused),
                ..Default::default()
            });
            assert!(matches!(paused, Err(StoreError::Conflict(_))));

            for next in [SprintStatus::Active, SprintStatus::Paused, SprintStatus::Completed] {
                let updated = db.update_sprint("alice", sprint.id, UpdateSprintInput {
                    status: Some(next),
                    ..Default::default()
                }).unwrap().unwrap();
                assert_eq!(updated.status, next);
            }

            let reopened = db.update_sprint("alice", sprint.id, UpdateSprintInput {
                status: Some(SprintStatus::Active),
                ..Default::default()
            });
            assert!(matches!(reopened, Err(StoreError::Conflict(_))));
        }

        it "allows renaming a sprint to its own title" {
            let db = setup_db();
            create_user(&db, "alice");
            let sprint = create_sprint(&db, "alice", "Same");
            let updated = db.update_sprint("alice", sprint.id, UpdateSprintInput {
                title: Some("SAME".into()),
                ..Default::default()
            }).unwrap().unwrap();
            assert_eq!(updated.title, "SAME");
        }

        it "counts only open sprints" {
            let db = setup_db();
            create_user(&db, "alice");
            create_sprint(&db, "alice", "One");
            let two = create_sprint(&db, "alice", "Two");
            db.update_sprint("alice", two.id, UpdateSprintInput {
                status: Some(SprintStatus::Cancelled),
                ..Default::default()
            }).unwrap();
            assert_eq!(db.count_open_sprints("alice").unwrap(), 1);
        }

        it "suffixes taken titles" {
            let db = setup_db();
            create_user(&db, "alice");
            create_sprint(&db, "alice", "Plan");
            create_sprint(&db, "alice", "Plan (2)");
            assert_eq!(db.unique_sprint_title("alice", "Plan").unwrap(), "Plan (3)");
            assert_eq!(db.unique_sprint_title("alice", "Fresh").unwrap(), "Fresh");
        }
    }

    describe "updates" {
        it "clears optional fields only when sent as null" {
            let db = setup_db();
            create_user(&db, "alice");
            let sprint = create_sprint(&db, "alice", "Optional");
            let task = db.create_task("alice", sprint.id, CreateTaskInput {
                description: Some("Read the brief".into()),
                due_date: Some(date(3, 5)),
                ..CreateTaskInput::titled("Prep")
            }).unwrap().unwrap();

            let untouched: UpdateTaskInput = serde_json::from_str(r#"{"title": "Prep work"}"#).unwrap();
            let task = db.update_task("alice", sprint.id, task.id, untouched).unwrap().unwrap();
            assert_eq!(task.description.as_deref(), Some("Read the brief"));
            assert_eq!(task.due_date, Some(date(3, 5)));

            let cleared: UpdateTaskInput = serde_json::from_str(r#"{"description": null, "due_date": null}"#).unwrap();
            let task = db.update_task("alice", sprint.id, task.id, cleared).unwrap().unwrap();
            assert_eq!(task.title, "Prep work");
            assert!(task.description.is_none());
            assert!(task.due_date.is_none());

            let sprint = db.update_sprint("alice", sprint.id, UpdateSprintInput {
                goal: Some(None),
                ..Default::default()
            }).unwrap().unwrap();
            assert!(sprint.goal.is_none());
        }

        it "leaves updated_at alone when stats are unchanged" {
            let db = setup_db();
            create_user(&db, "alice");
            let sprint = create_sprint(&db, "alice", "Quiet");
            std::thread::sleep(std::time::Duration::from_millis(5));

            assert_eq!(db.recompute_all_open_stats().unwrap(), 1);
            let after = db.get_sprint("alice", sprint.id).unwrap().unwrap();
            assert_eq!(after.updated_at, sprint.updated_at);

            db.create_task("alice", sprint.id, CreateTaskInput::titled("New")).unwrap();
            let grown = db.get_sprint("alice", sprint.id).unwrap().unwrap();
            assert_eq!(grown.stats.total_tasks, sprint.stats.total_tasks + 1);
            assert!(grown.updated_at > sprint.updated_at);
        }

        it "checks a new sprint without touching the database" {
            let mut input = sprint_input("Checked");
            input.tasks.push(CreateTaskInput::titled("x".repeat(TASK_TITLE_MAX_CHARS + 1)));
            assert!(matches!(
                sprintify_core::db::validate_new_sprint(&input),
                Err(StoreError::Invalid(_))
            ));
            input.tasks[0].title = "x".repeat(TASK_TITLE_MAX_CHARS);
            assert!(sprintify_core::db::validate_new_sprint(&input).is_ok());
        }
    }

    describe "tasks" {
        it "appends tasks and keeps stats current" {
            let db = setup_db();
            create_user(&db, "alice");
            let sprint = create_sprint(&db, "alice", "Tasks");
            let a = db.create_task("alice", sprint.id, CreateTaskInput::titled("A")).unwrap().unwrap();
            let b = db.create_task("alice", sprint.id, CreateTaskInput::titled("B")).unwrap().unwrap();
            assert!(b.position > a.position);

            db.update_task("alice", sprint.id, a.id, UpdateTaskInput {
                status: Some(TaskStatus::Done),
                ..Default::default()
            }).unwrap();
            let sprint = db.get_sprint("alice", sprint.id).unwrap().unwrap();
            assert_eq!(sprint.stats.completed_tasks, 1);
            assert_eq!(sprint.stats.progress, 50);
        }

        it "rejects a dependency cycle" {
            let db = setup_db();
            create_user(&db, "alice");
            let sprint = create_sprint(&db, "alice", "Graph");
            let a = db.create_task("alice", sprint.id, CreateTaskInput::titled("A")).unwrap().unwrap();
            let b = db.create_task("alice", sprint.id, CreateTaskInput {
                depends_on: vec![a.id],
                ..CreateTaskInput::titled("B")
            }).unwrap().unwrap();

            let err = db.update_task("alice", sprint.id, a.id, UpdateTaskInput {
                depends_on: Some(vec![b.id]),
                ..Default::default()
            }).unwrap_err();
            assert!(matches!(err, StoreError::Conflict(_)));
        }

        it "rejects dependencies outside the sprint" {
            let db = setup_db();
            create_user(&db, "alice");
            let one = create_sprint(&db, "alice", "One");
            let two = create_sprint(&db, "alice", "Two");
            let foreign = db.create_task("alice", two.id, CreateTaskInput::titled("X")).unwrap().unwrap();
            let err = db.create_task("alice", one.id, CreateTaskInput {
                depends_on: vec![foreign.id],
                ..CreateTaskInput::titled("Y")
            }).unwrap_err();
            assert!(matches!(err, StoreError::Invalid(_)));
        }

        it "blocks completion until dependencies are done" {
            let db = setup_db();
            create_user(&db, "alice");
            let sprint = create_sprint(&db, "alice", "Blocked");
            let a = db.create_task("alice", sprint.id, CreateTaskInput::titled("A")).unwrap().unwrap();
            let b = db.create_task("alice", sprint.id, CreateTaskInput {
                depends_on: vec![a.id],
                ..CreateTaskInput::titled("B")
            }).unwrap().unwrap();

            let done = UpdateTaskInput { status: Some(TaskStatus::Done), ..Default::default() };
            assert!(matches!(
                db.update_task("alice", sprint.id, b.id, done.clone()),
                Err(StoreError::Conflict(_))
            ));
            db.update_task("alice", sprint.id, a.id, done.clone()).unwrap();
            let b = db.update_task("alice", sprint.id, b.id, done).unwrap().unwrap();
            assert_eq!(b.status, TaskStatus::Done);
            assert!(b.completed_at.is_some());
        }

        it "drops deleted tasks from dependency lists" {
            let db = setup_db();
            create_user(&db, "alice");
            let sprint = create_sprint(&db, "alice", "Cleanup");
            let a = db.create_task("alice", sprint.id, CreateTaskInput::titled("A")).unwrap().unwrap();
            let b = db.create_task("alice", sprint.id, CreateTaskInput {
                depends_on: vec![a.id],
                ..CreateTaskInput::titled("B")
            }).unwrap().unwrap();

            assert!(db.delete_task("alice", sprint.id, a.id).unwrap());
            let tasks = db.list_tasks("alice", sprint.id).unwrap().unwrap();
            assert_eq!(tasks.len(), 1);
            assert_eq!(tasks[0].id, b.id);
            assert!(tasks[0].depends_on.is_empty());
        }

        it "reorders tasks" {
            let db = setup_db();
            create_user(&db, "alice");
            let sprint = create_sprint(&db, "alice", "Order");
            let a = db.create_task("alice", sprint.id, CreateTaskInput::titled("A")).unwrap().unwrap();
            let b = db.create_task("alice", sprint.id, CreateTaskInput::titled("B")).unwrap().unwrap();
            let c = db.create_task("alice", sprint.id, CreateTaskInput::titled("C")).unwrap().unwrap();

            let tasks = db.reorder_tasks("alice", sprint.id, &[c.id]).unwrap().unwrap();
            let ids: Vec<_> = tasks.iter().map(|t| t.id).collect();
            assert_eq!(ids, vec![c.id, a.id, b.id]);
        }
    }

    describe "milestones" {
        it "tracks completion in sprint stats" {
            let db = setup_db();
            create_user(&db, "alice");
            let sprint = create_sprint(&db, "alice", "Milestones");
            let m = db.create_milestone("alice", sprint.id, CreateMilestoneInput {
                title: "Halfway".into(),
                description: None,
                target_date: None,
                criteria: vec![],
            }).unwrap().unwrap();

            let m = db.set_milestone_completed("alice", sprint.id, m.id, true).unwrap().unwrap();
            assert!(m.completed);
            assert!(m.completed_at.is_some());
            let sprint = db.get_sprint("alice", sprint.id).unwrap().unwrap();
            assert_eq!(sprint.stats.completed_milestones, 1);

            assert!(db.delete_milestone("alice", sprint.id, m.id).unwrap());
            let sprint = db.get_sprint("alice", sprint.id).unwrap().unwrap();
            assert_eq!(sprint.stats.total_milestones, 0);
        }
    }

    describe "file storage" {
        it "persists across reopen" {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nested").join("sprintify.db");
            {
                let db = Database::open(&path).unwrap();
                db.migrate().unwrap();
                create_user(&db, "alice");
            }
            let db = Database::open(&path).unwrap();
            db.migrate().unwrap();
            assert!(db.get_user("alice").unwrap().is_some());
        }
    }
}
