#[cfg(test)]
mod tests {
    use crate::commands::appointment::{
        create_appointment_internal, delete_appointment_internal, get_detail_internal,
        update_appointment_internal, AppointmentForm,
    };
    use crate::commands::activity_log::{recent_logs_internal, RECENT_LOG_LIMIT};
    use crate::commands::analytics::load_input;
    use crate::commands::auth::{signup_internal, NewAccount};
    use crate::commands::daily_count::{
        list_daily_counts_internal, upsert_daily_count_internal, DailyCountEntry,
    };
    use crate::db::Profile;
    use crate::error::CounselError;
    use crate::config::AppConfig;
    use crate::db::{self, DbPool};
    use crate::middleware::auth::{issue_token, Claims};
    use crate::models::Role;
    use crate::routes::create_router;
    use crate::state::AppState;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use chrono::NaiveDate;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    /// Router over a lazy pool; nothing here touches the database.
    fn offline_app() -> (Router, AppConfig) {
        let config = AppConfig::for_tests();
        let pool = db::init_pool(&config.database_url).unwrap();
        (create_router(AppState::new(pool, config.clone())), config)
    }

    async fn send(
        app: Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        payload: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match payload {
            Some(payload) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(payload.to_string())
            }
            None => Body::empty(),
        };
        let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn call(app: Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        send(app, Method::GET, uri, token, None).await
    }

    async fn post(app: Router, uri: &str, token: Option<&str>, payload: Value) -> (StatusCode, Value) {
        send(app, Method::POST, uri, token, Some(payload)).await
    }

    #[tokio::test]
    async fn ping_is_public_and_wrapped() {
        let (app, _) = offline_app();
        let (status, body) = call(app, "/api/ping", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "data": "pong" }));
    }

    #[tokio::test]
    async fn api_requires_a_token() {
        let (app, _) = offline_app();
        let (status, body) = call(app.clone(), "/api/branches", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], json!(false));

        let (status, _) = call(app, "/api/appointments/events", Some("not-a-jwt")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // Database-backed scenarios run only when DATABASE_URL is set.
    async fn setup_test_db() -> Option<(DbPool, AppConfig)> {
        dotenvy::dotenv().ok();
        let database_url = std::env::var("DATABASE_URL").ok()?;
        let mut config = AppConfig::for_tests();
        config.database_url = database_url;
        let pool = db::init_pool(&config.database_url).expect("Failed to create pool");
        db::init_database(&pool, &config)
            .await
            .expect("Failed to prepare database");
        Some((pool, config))
    }

    async fn seed_branch(pool: &DbPool, tag: &str) -> (i32, i32, i32) {
        let (branch_id,): (i32,) =
            sqlx::query_as("INSERT INTO branches (name) VALUES ($1) RETURNING id")
                .bind(format!("테스트지점-{}", tag))
                .fetch_one(pool)
                .await
                .unwrap();
        let mut subjects = Vec::new();
        for name in ["심리", "진로"] {
            let (id,): (i32,) = sqlx::query_as(
                "INSERT INTO subjects (name, branch_id) VALUES ($1, $2) RETURNING id",
            )
            .bind(name)
            .bind(branch_id)
            .fetch_one(pool)
            .await
            .unwrap();
            subjects.push(id);
        }
        (branch_id, subjects[0], subjects[1])
    }

    /// Registers an account with password `secret1`, then moves it to the
    /// given role and status.
    async fn seed_profile(pool: &DbPool, tag: &str, role: Role, status: &str) -> Profile {
        let mut profile = signup_internal(
            pool,
            NewAccount {
                name: format!("테스트-{}", &tag[..8]),
                email: format!("{}@test.local", tag),
                password: "secret1".to_string(),
            },
        )
        .await
        .expect("signup failed");
        sqlx::query("UPDATE profiles SET role = $1, status = $2 WHERE id = $3")
            .bind(role.as_str())
            .bind(status)
            .bind(profile.id)
            .execute(pool)
            .await
            .unwrap();
        profile.role = role.as_str().to_string();
        profile.status = status.to_string();
        profile
    }

    async fn set_profile(pool: &DbPool, id: Uuid, column: &str, value: &str) {
        sqlx::query(&format!("UPDATE profiles SET {} = $1 WHERE id = $2", column))
            .bind(value)
            .bind(id)
            .execute(pool)
            .await
            .unwrap();
    }

    async fn remove_profile(pool: &DbPool, id: Uuid) {
        let _ = sqlx::query("DELETE FROM activity_logs WHERE user_id = $1")
            .bind(id)
            .execute(pool)
            .await;
        let _ = sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await;
    }

    fn router_for(pool: &DbPool, config: &AppConfig) -> Router {
        create_router(AppState::new(pool.clone(), config.clone()))
    }

    async fn cleanup(pool: &DbPool, branch_id: i32, counselor: Uuid, contact: &str) {
        let _ = sqlx::query("DELETE FROM activity_logs WHERE user_id = $1")
            .bind(counselor)
            .execute(pool)
            .await;
        let _ = sqlx::query("DELETE FROM appointments WHERE branch_id = $1")
            .bind(branch_id)
            .execute(pool)
            .await;
        let _ = sqlx::query("DELETE FROM db_daily_counts WHERE branch_id = $1")
            .bind(branch_id)
            .execute(pool)
            .await;
        let _ = sqlx::query("DELETE FROM clients WHERE contact = $1")
            .bind(contact)
            .execute(pool)
            .await;
        let _ = sqlx::query("DELETE FROM subjects WHERE branch_id = $1")
            .bind(branch_id)
            .execute(pool)
            .await;
        let _ = sqlx::query("DELETE FROM branches WHERE id = $1")
            .bind(branch_id)
            .execute(pool)
            .await;
        let _ = sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(counselor)
            .execute(pool)
            .await;
    }

    #[tokio::test]
    async fn test_appointment_lifecycle_integration() {
        let Some((pool, config)) = setup_test_db().await else {
            return;
        };
        let tag = Uuid::new_v4().simple().to_string();
        let (branch_id, psych, career) = seed_branch(&pool, &tag).await;
        let contact = format!("010-{}", &tag[..8]);

        let profile = signup_internal(
            &pool,
            NewAccount {
                name: "통합테스트 상담사".to_string(),
                email: format!("{}@test.local", tag),
                password: "secret1".to_string(),
            },
        )
        .await
        .expect("signup failed");
        assert_eq!(profile.role, "Counselor");
        assert_eq!(profile.status, "Active");

        let actor = Claims {
            sub: profile.id.to_string(),
            user_id: profile.id,
            name: profile.name.clone(),
            role: Role::Counselor,
            exp: usize::MAX,
        };

        let form: AppointmentForm = serde_json::from_value(json!({
            "client_name": "통합 내담자",
            "client_contact": contact,
            "branch_id": branch_id,
            "subject_id": psych,
            "type": "Offline",
            "date": "2025-08-13",
            "time": "10:30",
            "status": "상담 예정"
        }))
        .unwrap();
        let validated = form.validate(config.timezone, None).unwrap();
        let id = create_appointment_internal(&pool, &actor, validated)
            .await
            .expect("create failed");

        let detail = get_detail_internal(&pool, config.timezone, id).await.unwrap();
        assert_eq!(detail.time, "10:30");
        assert_eq!(detail.counselor_name.as_deref(), Some("통합테스트 상담사"));
        assert_eq!(detail.client_contact.as_deref(), Some(contact.as_str()));

        // Registering without a date keeps the appointment on 2025-08-13.
        let edit: AppointmentForm = serde_json::from_value(json!({
            "client_name": "통합 내담자(수정)",
            "client_contact": contact,
            "branch_id": branch_id,
            "subject_id": psych,
            "type": "Offline",
            "time": "15:00",
            "status": "등록",
            "registration_type": "국기",
            "registered_subject_ids": [psych, career]
        }))
        .unwrap();
        update_appointment_internal(&pool, config.timezone, &actor, id, edit)
            .await
            .expect("update failed");

        let detail = get_detail_internal(&pool, config.timezone, id).await.unwrap();
        assert_eq!(detail.date, NaiveDate::from_ymd_opt(2025, 8, 13).unwrap());
        assert_eq!(detail.time, "15:00");
        assert_eq!(detail.appointment.status, "등록");
        assert_eq!(detail.registered_subjects.len(), 2);
        assert_eq!(detail.client_name.as_deref(), Some("통합 내담자(수정)"));

        delete_appointment_internal(&pool, &actor, id)
            .await
            .expect("delete failed");
        let actions: Vec<String> = sqlx::query_scalar(
            "SELECT action FROM activity_logs WHERE appointment_id = $1 ORDER BY id ASC",
        )
        .bind(id)
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(actions, vec!["신규 등록", "정보 수정", "삭제"]);

        cleanup(&pool, branch_id, profile.id, &contact).await;
    }

    #[tokio::test]
    async fn test_subject_from_other_branch_is_rejected() {
        let Some((pool, config)) = setup_test_db().await else {
            return;
        };
        let tag = Uuid::new_v4().simple().to_string();
        let (branch_a, _, _) = seed_branch(&pool, &format!("{}-a", tag)).await;
        let (branch_b, foreign, _) = seed_branch(&pool, &format!("{}-b", tag)).await;
        let contact = format!("010-{}", &tag[..8]);

        let actor = Claims {
            sub: Uuid::nil().to_string(),
            user_id: Uuid::nil(),
            name: "없음".to_string(),
            role: Role::Admin,
            exp: usize::MAX,
        };
        let form: AppointmentForm = serde_json::from_value(json!({
            "client_name": "타지점",
            "client_contact": contact,
            "branch_id": branch_a,
            "subject_id": foreign,
            "type": "Online",
            "date": "2025-08-13",
            "time": "11:00",
            "status": "상담 예정"
        }))
        .unwrap();
        let validated = form.validate(config.timezone, None).unwrap();
        let result = create_appointment_internal(&pool, &actor, validated).await;
        assert!(result.is_err());

        // Nothing from the rejected transaction is left behind.
        let clients: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clients WHERE contact = $1")
            .bind(&contact)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(clients, 0);

        cleanup(&pool, branch_a, Uuid::nil(), &contact).await;
        cleanup(&pool, branch_b, Uuid::nil(), &contact).await;
    }

    #[tokio::test]
    async fn test_daily_count_upsert_overwrites() {
        let Some((pool, _)) = setup_test_db().await else {
            return;
        };
        let tag = Uuid::new_v4().simple().to_string();
        let (branch_id, _, _) = seed_branch(&pool, &tag).await;
        let date = NaiveDate::from_ymd_opt(2025, 8, 13).unwrap();

        for (online, offline) in [(3, 1), (5, 2)] {
            upsert_daily_count_internal(
                &pool,
                &DailyCountEntry {
                    date,
                    branch_id,
                    online,
                    offline,
                },
            )
            .await
            .unwrap();
        }

        let rows = list_daily_counts_internal(&pool, Some(date), Some(date), Some(branch_id))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total, 7);
        assert!(rows[0].count.branch_name.is_some());

        cleanup(&pool, branch_id, Uuid::nil(), "").await;
    }

    #[tokio::test]
    async fn test_token_for_unknown_account_is_rejected() {
        let Some((pool, config)) = setup_test_db().await else {
            return;
        };
        let app = router_for(&pool, &config);
        let token = issue_token(&config, Uuid::new_v4(), "없는 관리자", Role::Admin).unwrap();

        let (status, body) = call(app, "/api/admin/users", Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn test_admin_pages_follow_stored_role() {
        let Some((pool, config)) = setup_test_db().await else {
            return;
        };
        let app = router_for(&pool, &config);

        for role in [Role::Counselor, Role::TeamLead] {
            let tag = Uuid::new_v4().simple().to_string();
            let profile = seed_profile(&pool, &tag, role, "Active").await;
            let token = issue_token(&config, profile.id, &profile.name, role).unwrap();
            for uri in ["/api/admin/users", "/api/admin/analytics", "/api/admin/logs"] {
                let (status, body) = call(app.clone(), uri, Some(&token)).await;
                assert_eq!(status, StatusCode::FORBIDDEN, "{} as {:?}", uri, role);
                assert_eq!(body["error"], json!("관리자 권한이 필요합니다."));
            }
            remove_profile(&pool, profile.id).await;
        }

        // A token issued while the account was Admin stops opening admin
        // pages once the account is demoted.
        let tag = Uuid::new_v4().simple().to_string();
        let admin = seed_profile(&pool, &tag, Role::Admin, "Active").await;
        let token = issue_token(&config, admin.id, &admin.name, Role::Admin).unwrap();
        let (status, body) = call(app.clone(), "/api/admin/users", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));

        set_profile(&pool, admin.id, "role", Role::Counselor.as_str()).await;
        let (status, body) = call(app.clone(), "/api/admin/users", Some(&token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], json!("관리자 권한이 필요합니다."));

        // Regular pages stay open to the demoted account.
        let (status, body) = call(app, "/api/appointments/options", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["time_slots"].as_array().map(Vec::len), Some(24));

        remove_profile(&pool, admin.id).await;
    }

    #[tokio::test]
    async fn test_deactivated_account_is_signed_out() {
        let Some((pool, config)) = setup_test_db().await else {
            return;
        };
        let app = router_for(&pool, &config);
        let tag = Uuid::new_v4().simple().to_string();
        let profile = seed_profile(&pool, &tag, Role::Counselor, "Active").await;
        let token = issue_token(&config, profile.id, &profile.name, Role::Counselor).unwrap();

        let (status, body) = call(app.clone(), "/api/calendar/holidays?year=2025", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));

        set_profile(&pool, profile.id, "status", "Inactive").await;
        let (status, body) = call(app.clone(), "/api/branches", Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body["error"],
            json!("퇴사 처리된 계정입니다. 관리자에게 문의하세요.")
        );

        let (status, body) = post(
            app,
            "/api/auth/login",
            None,
            json!({ "email": profile.email, "password": "secret1" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(false));
        assert_eq!(
            body["message"],
            json!("퇴사 처리된 계정입니다. 관리자에게 문의하세요.")
        );
        assert!(body["token"].is_null());

        remove_profile(&pool, profile.id).await;
    }

    #[tokio::test]
    async fn test_duplicate_signup_conflicts() {
        let Some((pool, config)) = setup_test_db().await else {
            return;
        };
        let tag = Uuid::new_v4().simple().to_string();
        let profile = seed_profile(&pool, &tag, Role::Counselor, "Active").await;

        let again = signup_internal(
            &pool,
            NewAccount {
                name: "중복 가입".to_string(),
                email: profile.email.clone(),
                password: "secret2".to_string(),
            },
        )
        .await;
        assert!(matches!(again, Err(CounselError::Conflict(_))));

        // Email is compared after trimming and lowercasing.
        let (status, body) = post(
            router_for(&pool, &config),
            "/api/auth/signup",
            None,
            json!({
                "name": "중복 가입",
                "email": format!("  {}  ", profile.email.to_uppercase()),
                "password": "secret2"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], json!("이미 가입된 이메일입니다."));

        remove_profile(&pool, profile.id).await;
    }

    #[tokio::test]
    async fn test_referenced_branch_and_subject_cannot_be_deleted() {
        let Some((pool, config)) = setup_test_db().await else {
            return;
        };
        let app = router_for(&pool, &config);
        let tag = Uuid::new_v4().simple().to_string();
        let (branch_id, psych, career) = seed_branch(&pool, &tag).await;
        let contact = format!("010-{}", &tag[..8]);
        let admin = seed_profile(&pool, &tag, Role::Admin, "Active").await;
        let token = issue_token(&config, admin.id, &admin.name, Role::Admin).unwrap();

        let (status, body) = post(
            app.clone(),
            "/api/appointments/create",
            Some(&token),
            json!({
                "client_name": "삭제 확인",
                "client_contact": contact,
                "branch_id": branch_id,
                "subject_id": psych,
                "type": "Online",
                "date": "2025-08-13",
                "time": "13:00",
                "status": "상담 예정"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);

        let (status, body) = post(
            app.clone(),
            "/api/admin/subjects/delete",
            Some(&token),
            json!({ "id": psych }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], json!(false));

        let (status, _) = post(
            app.clone(),
            "/api/admin/branches/delete",
            Some(&token),
            json!({ "id": branch_id }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // An unused subject still goes away.
        let (status, _) = post(
            app,
            "/api/admin/subjects/delete",
            Some(&token),
            json!({ "id": career }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subjects WHERE branch_id = $1")
            .bind(branch_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 1);

        cleanup(&pool, branch_id, admin.id, &contact).await;
    }

    #[tokio::test]
    async fn test_analytics_input_per_branch() {
        let Some((pool, config)) = setup_test_db().await else {
            return;
        };
        let tag = Uuid::new_v4().simple().to_string();
        let (branch_a, psych, career) = seed_branch(&pool, &format!("{}-a", tag)).await;
        let (branch_b, other, _) = seed_branch(&pool, &format!("{}-b", tag)).await;
        let contact = format!("010-{}", &tag[..8]);
        let counselor = seed_profile(&pool, &tag, Role::Counselor, "Active").await;
        let actor = Claims {
            sub: counselor.id.to_string(),
            user_id: counselor.id,
            name: counselor.name.clone(),
            role: Role::Counselor,
            exp: usize::MAX,
        };
        let day = NaiveDate::from_ymd_opt(2031, 3, 5).unwrap();

        for (branch_id, online, offline) in [(branch_a, 3, 1), (branch_b, 10, 0)] {
            upsert_daily_count_internal(
                &pool,
                &DailyCountEntry {
                    date: day,
                    branch_id,
                    online,
                    offline,
                },
            )
            .await
            .unwrap();
        }

        let forms = [
            json!({
                "client_name": "분석 등록",
                "client_contact": contact,
                "branch_id": branch_a,
                "subject_id": psych,
                "type": "Offline",
                "date": "2031-03-05",
                "time": "23:30",
                "status": "등록",
                "registration_type": "국기",
                "registered_subject_ids": [career, psych]
            }),
            json!({
                "client_name": "분석 예정",
                "client_contact": contact,
                "branch_id": branch_b,
                "subject_id": other,
                "type": "Online",
                "date": "2031-03-05",
                "time": "10:00",
                "status": "상담 예정"
            }),
        ];
        for form in forms {
            let form: AppointmentForm = serde_json::from_value(form).unwrap();
            let validated = form.validate(config.timezone, None).unwrap();
            create_appointment_internal(&pool, &actor, validated)
                .await
                .expect("create failed");
        }

        let input = load_input(&pool, config.timezone, day, day, Some(branch_a))
            .await
            .unwrap();
        assert_eq!(input.total_db, 4);
        assert_eq!(input.appointments.len(), 1);
        let mut registered = input.appointments[0].registered_subject_ids.clone();
        registered.sort();
        let mut expected = vec![psych, career];
        expected.sort();
        assert_eq!(registered, expected);
        assert_eq!(input.appointments[0].counselor_id, Some(counselor.id));

        // Without a branch filter both branches count, and an appointment
        // with no registered subjects reads back as an empty list.
        let input = load_input(&pool, config.timezone, day, day, None).await.unwrap();
        assert!(input.total_db >= 14);
        let ours: Vec<_> = input
            .appointments
            .iter()
            .filter(|a| a.counselor_id == Some(counselor.id))
            .collect();
        assert_eq!(ours.len(), 2);
        let scheduled = ours
            .iter()
            .find(|a| a.applied_subject_id == other)
            .expect("branch b appointment missing");
        assert!(scheduled.registered_subject_ids.is_empty());

        cleanup(&pool, branch_a, counselor.id, &contact).await;
        cleanup(&pool, branch_b, counselor.id, &contact).await;
    }

    #[tokio::test]
    async fn test_recent_logs_newest_first_with_actor() {
        let Some((pool, _)) = setup_test_db().await else {
            return;
        };
        let tag = Uuid::new_v4().simple().to_string();
        let actor = seed_profile(&pool, &tag, Role::Counselor, "Active").await;

        // Dated ahead of everything else so they fill the recent window.
        sqlx::query(
            "INSERT INTO activity_logs (user_id, action, client_name, created_at)
             SELECT $1, '정보 수정', 'log-' || g, NOW() + INTERVAL '1 day' + g * INTERVAL '1 second'
             FROM generate_series(1, 105) AS g",
        )
        .bind(actor.id)
        .execute(&pool)
        .await
        .unwrap();

        let logs = recent_logs_internal(&pool).await.unwrap();
        assert_eq!(logs.len() as i64, RECENT_LOG_LIMIT);
        assert_eq!(logs[0].client_name.as_deref(), Some("log-105"));
        assert_eq!(logs[99].client_name.as_deref(), Some("log-6"));
        assert!(logs.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert!(logs
            .iter()
            .all(|l| l.actor_name.as_deref() == Some(actor.name.as_str())));

        remove_profile(&pool, actor.id).await;
    }
}
