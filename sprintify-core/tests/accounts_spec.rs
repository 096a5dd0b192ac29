use speculate2::speculate;

speculate! {
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use sprintify_core::models::*;
    use sprintify_core::quota::{QuotaLimits, QuotaScope};
    use sprintify_core::{Database, StoreError};

    fn setup_db() -> Database {
        let db = Database::open_in_memory().expect("Failed to create test database");
        db.migrate().expect("Failed to migrate");
        db
    }

    fn create_user(db: &Database, uid: &str, role: Role) -> User {
        db.create_user(CreateUserInput {
            uid: uid.into(),
            email: format!("{uid}@example.com"),
            display_name: Some(uid.to_uppercase()),
            role: Some(role),
        })
        .expect("Failed to create user")
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn create_sprint(db: &Database, uid: &str, title: &str, status: SprintStatus, end: NaiveDate) -> Sprint {
        let sprint = db.create_sprint(uid, CreateSprintInput {
            title: title.into(),
            description: None,
            goal: None,
            status: Some(SprintStatus::Active),
            start_date: end - Duration::days(7),
            end_date: end,
            ai_generated: false,
            tasks: vec![CreateTaskInput::titled("Only task")],
            milestones: vec![],
        }).expect("Failed to create sprint");
        if status != SprintStatus::Active {
            db.update_sprint(uid, sprint.id, UpdateSprintInput {
                status: Some(status),
                ..Default::default()
            }).unwrap().unwrap()
        } else {
            sprint
        }
    }

    describe "ai usage" {
        it "counts up to the daily limit and then refuses" {
            let db = setup_db();
            create_user(&db, "alice", Role::Normal);
            let limits = QuotaLimits::new(2, 10);
            let now = at(2026, 5, 10, 9);

            db.record_ai_usage("alice", limits, now).unwrap();
            let status = db.record_ai_usage("alice", limits, now).unwrap();
            assert_eq!(status.daily.remaining, Some(0));

            match db.record_ai_usage("alice", limits, now) {
                Err(StoreError::QuotaExceeded(e)) => assert_eq!(e.scope, QuotaScope::Daily),
                other => panic!("expected quota error, got {:?}", other),
            }
            assert!(db.check_ai_quota("alice", limits, now).is_err());
        }

        it "resets the daily counter on the next day" {
            let db = setup_db();
            create_user(&db, "alice", Role::Normal);
            let limits = QuotaLimits::new(1, 10);
            db.record_ai_usage("alice", limits, at(2026, 5, 10, 23)).unwrap();

            let usage = db.get_ai_usage("alice", at(2026, 5, 11, 0)).unwrap();
            assert_eq!(usage.daily_count, 0);
            assert_eq!(usage.monthly_count, 1);
            assert_eq!(usage.total_count, 1);
            assert!(db.check_ai_quota("alice", limits, at(2026, 5, 11, 0)).is_ok());
        }

        it "bulk resets stale counters" {
            let db = setup_db();
            create_user(&db, "alice", Role::Normal);
            db.record_ai_usage("alice", QuotaLimits::UNLIMITED, at(2026, 5, 31, 12)).unwrap();

            assert_eq!(db.reset_daily_ai_counters(NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()).unwrap(), 1);
            assert_eq!(db.reset_monthly_ai_counters(NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()).unwrap(), 1);
            assert_eq!(db.reset_daily_ai_counters(NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()).unwrap(), 0);

            let usage = db.get_ai_usage("alice", at(2026, 6, 1, 2)).unwrap();
            assert_eq!((usage.daily_count, usage.monthly_count, usage.total_count), (0, 0, 1));
        }
    }

    describe "upgrade requests" {
        it "approves a request and grants premium" {
            let db = setup_db();
            create_user(&db, "alice", Role::Normal);
            create_user(&db, "root", Role::Admin);

            let request = db.create_upgrade_request("alice", CreateUpgradeRequestInput {
                reason: Some("I plan a lot".into()),
            }).unwrap();
            let review = db.approve_upgrade_request(request.id, "root", Some("welcome".into())).unwrap().unwrap();

            assert_eq!(review.request.status, UpgradeStatus::Approved);
            assert_eq!(review.request.reviewed_by.as_deref(), Some("root"));
            assert_eq!(review.notification.user_id, "alice");
            assert_eq!(db.get_user("alice").unwrap().unwrap().role, Role::Premium);
            assert_eq!(db.unread_count("alice").unwrap(), 1);
        }

        it "refuses a second pending request" {
            let db = setup_db();
            create_user(&db, "alice", Role::Normal);
            db.create_upgrade_request("alice", Default::default()).unwrap();
            let err = db.create_upgrade_request("alice", Default::default()).unwrap_err();
            assert!(matches!(err, StoreError::Conflict(_)));
        }

        it "refuses requests from premium users" {
            let db = setup_db();
            create_user(&db, "bob", Role::Premium);
            assert!(matches!(
                db.create_upgrade_request("bob", Default::default()),
                Err(StoreError::Conflict(_))
            ));
        }

        it "cannot review the same request twice" {
            let db = setup_db();
            create_user(&db, "alice", Role::Normal);
            let request = db.create_upgrade_request("alice", Default::default()).unwrap();
            let review = db.reject_upgrade_request(request.id, "root", None).unwrap().unwrap();
            assert_eq!(review.request.status, UpgradeStatus::Rejected);
            assert_eq!(db.get_user("alice").unwrap().unwrap().role, Role::Normal);

            assert!(matches!(
                db.approve_upgrade_request(request.id, "root", None),
                Err(StoreError::Conflict(_))
            ));
            // A rejected user may ask again.
            assert!(db.create_upgrade_request("alice", Default::default()).is_ok());
        }

        it "lists pending requests" {
            let db = setup_db();
            create_user(&db, "alice", Role::Normal);
            create_user(&db, "carol", Role::Normal);
            db.create_upgrade_request("alice", Default::default()).unwrap();
            let carol = db.create_upgrade_request("carol", Default::default()).unwrap();
            db.reject_upgrade_request(carol.id, "root", None).unwrap();

            let pending = db.list_upgrade_requests(Some(UpgradeStatus::Pending)).unwrap();
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].user_id, "alice");
            assert_eq!(db.list_upgrade_requests(None).unwrap().len(), 2);
        }
    }

    describe "notifications" {
        it "marks one or all as read" {
            let db = setup_db();
            create_user(&db, "alice", Role::Normal);
            let first = db.create_notification(CreateNotificationInput::new(
                "alice", NotificationKind::System, "Hello", "Welcome aboard",
            )).unwrap();
            db.create_notification(CreateNotificationInput::new(
                "alice", NotificationKind::Task, "Reminder", "Task due",
            )).unwrap();

            assert!(db.mark_read("alice", first.id).unwrap().unwrap().read);
            assert!(db.mark_read("bob", first.id).unwrap().is_none());
            assert_eq!(db.list_notifications("alice", true, None).unwrap().len(), 1);
            assert_eq!(db.mark_all_read("alice").unwrap(), 1);
            assert_eq!(db.unread_count("alice").unwrap(), 0);
        }
    }

    describe "maintenance" {
        it "closes sprints past their end date" {
            let db = setup_db();
            create_user(&db, "alice", Role::Normal);
            let today = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
            let overdue = create_sprint(&db, "alice", "Overdue", SprintStatus::Active, today - Duration::days(1));
            let paused = create_sprint(&db, "alice", "Paused", SprintStatus::Paused, today - Duration::days(3));
            create_sprint(&db, "alice", "Current", SprintStatus::Active, today);

            let expired = db.expire_sprints(today).unwrap();
            let mut ids: Vec<_> = expired.iter().map(|e| e.sprint.id).collect();
            ids.sort();
            let mut expected = vec![overdue.id, paused.id];
            expected.sort();
            assert_eq!(ids, expected);
            assert!(expired.iter().all(|e| e.sprint.status == SprintStatus::Completed));
            assert_eq!(db.get_sprint("alice", overdue.id).unwrap().unwrap().status, SprintStatus::Completed);
            assert!(db.expire_sprints(today).unwrap().is_empty());
        }

        it "reminds once per day about sprints ending soon" {
            let db = setup_db();
            create_user(&db, "alice", Role::Normal);
            let now = at(2026, 5, 10, 8);
            create_sprint(&db, "alice", "Tomorrow", SprintStatus::Active, now.date_naive() + Duration::days(1));
            create_sprint(&db, "alice", "Next week", SprintStatus::Active, now.date_naive() + Duration::days(7));

            let reminders = db.send_deadline_reminders(now).unwrap();
            assert_eq!(reminders.len(), 1);
            assert_eq!(reminders[0].sprint.title, "Tomorrow");
            assert!(db.send_deadline_reminders(now + Duration::hours(1)).unwrap().is_empty());
        }

        it "summarizes a user's progress" {
            let db = setup_db();
            create_user(&db, "alice", Role::Normal);
            let today = Utc::now().date_naive();
            let sprint = create_sprint(&db, "alice", "Stats", SprintStatus::Active, today);
            let task = db.list_tasks("alice", sprint.id).unwrap().unwrap().remove(0);
            db.update_task("alice", sprint.id, task.id, UpdateTaskInput {
                status: Some(TaskStatus::Done),
                ..Default::default()
            }).unwrap();
            db.create_task("alice", sprint.id, CreateTaskInput {
                due_date: Some(today - Duration::days(2)),
                ..CreateTaskInput::titled("Late")
            }).unwrap();

            let overview = db.user_overview("alice", Utc::now()).unwrap();
            assert_eq!(overview.total_sprints, 1);
            assert_eq!(overview.sprints_by_status["active"], 1);
            assert_eq!(overview.sprints_by_status["draft"], 0);
            assert_eq!(overview.completion_rate, 50);

            let report = db.sprint_report("alice", sprint.id, Utc::now()).unwrap().unwrap();
            assert_eq!(report.overdue_tasks.len(), 1);
            assert_eq!(report.tasks_by_status["done"], 1);
            assert_eq!(report.days_remaining, 0);
        }
    }
}
