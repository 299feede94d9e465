#[cfg(test)]
mod integration_tests {
    use crate::test_utils::test_utils::{
        TEST_PASSWORD, create_ingredient, create_tag, create_user, create_user_with_token,
        setup_test_app,
    };
    use axum::http::{HeaderValue, StatusCode, header};
    use axum_test::TestServer;
    use model::entities::{favorite_recipe, ingredient, user::UserRole};
    use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
    use serde_json::{Value, json};

    const PIXEL_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

    async fn post_recipe(server: &TestServer, auth: &HeaderValue, body: Value) -> Value {
        let response = server
            .post("/api/recipes/")
            .add_header(header::AUTHORIZATION, auth.clone())
            .json(&body)
            .await;
        if response.status_code() != StatusCode::CREATED {
            panic!("Expected 201 Created, got {}: {}", response.status_code(), response.text());
        }
        response.json()
    }

    fn recipe_body(name: &str, tags: &[i32], ingredients: &[(i32, i32)]) -> Value {
        json!({
            "name": name,
            "text": "Mix and bake.",
            "cooking_time": 30,
            "tags": tags,
            "ingredients": ingredients
                .iter()
                .map(|(id, amount)| json!({"id": id, "amount": amount}))
                .collect::<Vec<_>>(),
        })
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = setup_test_app().await;
        let server = TestServer::new(app).unwrap();

        let response = server.get("/health").await;

        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_register_and_login_with_token() {
        let (app, _) = setup_test_app().await;
        let server = TestServer::new(app).unwrap();

        let response = server
            .post("/api/users/")
            .json(&json!({
                "email": "cook@example.com",
                "username": "cook",
                "first_name": "Julia",
                "last_name": "Child",
                "password": "bon-appetit-1",
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["username"], "cook");
        assert!(body.get("password").is_none());

        // Duplicate username is rejected field by field
        let response = server
            .post("/api/users/")
            .json(&json!({
                "email": "other@example.com",
                "username": "cook",
                "first_name": "A",
                "last_name": "B",
                "password": "bon-appetit-1",
            }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert!(body["fields"]["username"].is_array());

        // Login accepts the username in place of the email, any case
        let response = server
            .post("/api/auth/token/login/")
            .json(&json!({"email": "COOK", "password": "bon-appetit-1"}))
            .await;
        response.assert_status(StatusCode::OK);
        let token = response.json::<Value>()["auth_token"].as_str().unwrap().to_string();
        assert_eq!(token.len(), 40);

        let auth = HeaderValue::from_str(&format!("Token {token}")).unwrap();
        let response = server
            .get("/api/users/me/")
            .add_header(header::AUTHORIZATION, auth.clone())
            .await;
        response.assert_status(StatusCode::OK);
        assert_eq!(response.json::<Value>()["email"], "cook@example.com");

        let response = server
            .post("/api/auth/token/logout/")
            .add_header(header::AUTHORIZATION, auth.clone())
            .await;
        response.assert_status(StatusCode::NO_CONTENT);

        let response = server
            .get("/api/users/me/")
            .add_header(header::AUTHORIZATION, auth)
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_errors() {
        let (app, state) = setup_test_app().await;
        create_user(&state.db, "alice", UserRole::User).await;
        let server = TestServer::new(app).unwrap();

        let response = server
            .post("/api/auth/token/login/")
            .json(&json!({"email": "alice@example.com"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>()["error"],
            "Must include \"email\" and \"password\"."
        );

        let response = server
            .post("/api/auth/token/login/")
            .json(&json!({"email": "alice@example.com", "password": "nope-nope"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>()["error"],
            "Unable to log in with provided credentials."
        );
    }

    #[tokio::test]
    async fn test_jwt_create_refresh_verify() {
        let (app, state) = setup_test_app().await;
        create_user(&state.db, "alice", UserRole::User).await;
        let server = TestServer::new(app).unwrap();

        let response = server
            .post("/api/token/")
            .json(&json!({"email": "alice@example.com", "password": TEST_PASSWORD}))
            .await;
        response.assert_status(StatusCode::OK);
        let pair: Value = response.json();
        let access = pair["access"].as_str().unwrap().to_string();
        let refresh = pair["refresh"].as_str().unwrap().to_string();

        let bearer = HeaderValue::from_str(&format!("Bearer {access}")).unwrap();
        let response = server
            .get("/api/users/me/")
            .add_header(header::AUTHORIZATION, bearer)
            .await;
        response.assert_status(StatusCode::OK);
        assert_eq!(response.json::<Value>()["username"], "alice");

        let response = server
            .post("/api/token/refresh/")
            .json(&json!({"refresh": refresh}))
            .await;
        response.assert_status(StatusCode::OK);
        assert!(response.json::<Value>()["access"].is_string());

        // An access token cannot be used as a refresh token
        let response = server
            .post("/api/token/refresh/")
            .json(&json!({"refresh": access}))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        let response = server
            .post("/api/token/verify/")
            .json(&json!({"token": access}))
            .await;
        response.assert_status(StatusCode::OK);
        assert_eq!(response.json::<Value>(), json!({}));

        let response = server
            .post("/api/token/verify/")
            .json(&json!({"token": "not-a-jwt"}))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_set_password() {
        let (app, state) = setup_test_app().await;
        let (_, auth) = create_user_with_token(&state.db, "alice", UserRole::User).await;
        let server = TestServer::new(app).unwrap();

        let response = server
            .post("/api/users/set_password/")
            .add_header(header::AUTHORIZATION, auth.clone())
            .json(&json!({"current_password": "wrong-one", "new_password": "brand-new-pass"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.json::<Value>()["fields"]["current_password"].is_array());

        let response = server
            .post("/api/users/set_password/")
            .add_header(header::AUTHORIZATION, auth.clone())
            .json(&json!({"current_password": TEST_PASSWORD}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.json::<Value>()["fields"]["new_password"].is_array());

        let response = server
            .post("/api/users/set_password/")
            .add_header(header::AUTHORIZATION, auth)
            .json(&json!({"current_password": TEST_PASSWORD, "new_password": "brand-new-pass"}))
            .await;
        response.assert_status(StatusCode::NO_CONTENT);

        let response = server
            .post("/api/auth/token/login/")
            .json(&json!({"email": "alice@example.com", "password": "brand-new-pass"}))
            .await;
        response.assert_status(StatusCode::OK);
    }

    #[tokio::test]
    async fn test_recipe_lifecycle() {
        let (app, state) = setup_test_app().await;
        let (author, auth) = create_user_with_token(&state.db, "author", UserRole::User).await;
        let breakfast = create_tag(&state.db, "Breakfast", "breakfast").await;
        let flour = create_ingredient(&state.db, "flour", "g").await;
        let sugar = create_ingredient(&state.db, "sugar", "g").await;
        let server = TestServer::new(app).unwrap();

        let mut body = recipe_body("Pancakes", &[breakfast.id], &[(flour.id, 200), (sugar.id, 50)]);
        body["image"] = json!(PIXEL_PNG);
        let created = post_recipe(&server, &auth, body).await;

        assert_eq!(created["name"], "Pancakes");
        assert_eq!(created["author"]["id"], author.id);
        assert_eq!(created["author"]["is_subscribed"], false);
        assert_eq!(created["tags"][0]["slug"], "breakfast");
        assert_eq!(created["ingredients"].as_array().unwrap().len(), 2);
        assert_eq!(created["ingredients"][0]["name"], "flour");
        assert_eq!(created["ingredients"][0]["amount"], 200);
        assert_eq!(created["is_favorited"], false);
        let image = created["image"].as_str().unwrap();
        assert!(image.starts_with("/media/recipes/images/"));
        assert!(image.ends_with(".png"));

        let image_file = state
            .settings
            .media_root
            .join(image.trim_start_matches("/media/"));
        assert!(image_file.exists());

        let recipe_id = created["id"].as_i64().unwrap();

        // Anonymous read
        let response = server.get(&format!("/api/recipes/{recipe_id}/")).await;
        response.assert_status(StatusCode::OK);

        // Partial update replaces the ingredient set
        let response = server
            .patch(&format!("/api/recipes/{recipe_id}/"))
            .add_header(header::AUTHORIZATION, auth.clone())
            .json(&json!({"cooking_time": 15, "ingredients": [{"id": sugar.id, "amount": 10}]}))
            .await;
        response.assert_status(StatusCode::OK);
        let updated: Value = response.json();
        assert_eq!(updated["cooking_time"], 15);
        assert_eq!(updated["name"], "Pancakes");
        assert_eq!(updated["ingredients"].as_array().unwrap().len(), 1);
        assert_eq!(updated["ingredients"][0]["name"], "sugar");
        assert_eq!(updated["tags"][0]["slug"], "breakfast");

        let response = server
            .delete(&format!("/api/recipes/{recipe_id}/"))
            .add_header(header::AUTHORIZATION, auth)
            .await;
        response.assert_status(StatusCode::NO_CONTENT);
        assert!(!image_file.exists());

        let response = server.get(&format!("/api/recipes/{recipe_id}/")).await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_recipe_validation() {
        let (app, state) = setup_test_app().await;
        let (_, auth) = create_user_with_token(&state.db, "author", UserRole::User).await;
        let tag = create_tag(&state.db, "Lunch", "lunch").await;
        let flour = create_ingredient(&state.db, "flour", "g").await;
        let server = TestServer::new(app).unwrap();

        let response = server
            .post("/api/recipes/")
            .json(&recipe_body("Bread", &[tag.id], &[(flour.id, 100)]))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        let cases = [
            (recipe_body("Bread", &[tag.id], &[]), "ingredients"),
            (recipe_body("Bread", &[], &[(flour.id, 100)]), "tags"),
            (recipe_body("Bread", &[tag.id], &[(flour.id, 0)]), "ingredients[0].amount"),
            (recipe_body("Bread", &[tag.id], &[(flour.id, 1), (flour.id, 2)]), "ingredients"),
            (recipe_body("Bread", &[tag.id], &[(9999, 1)]), "ingredients"),
            (recipe_body("Bread", &[9999], &[(flour.id, 1)]), "tags"),
        ];
        for (body, field) in cases {
            let response = server
                .post("/api/recipes/")
                .add_header(header::AUTHORIZATION, auth.clone())
                .json(&body)
                .await;
            response.assert_status(StatusCode::BAD_REQUEST);
            let error: Value = response.json();
            assert!(error["fields"][field].is_array(), "expected error on {field}: {error}");
        }

        let mut body = recipe_body("Bread", &[tag.id], &[(flour.id, 1)]);
        body["cooking_time"] = json!(0);
        let response = server
            .post("/api/recipes/")
            .add_header(header::AUTHORIZATION, auth.clone())
            .json(&body)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.json::<Value>()["fields"]["cooking_time"].is_array());

        let mut body = recipe_body("Bread", &[tag.id], &[(flour.id, 1)]);
        body["image"] = json!("not an image");
        let response = server
            .post("/api/recipes/")
            .add_header(header::AUTHORIZATION, auth)
            .json(&body)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.json::<Value>()["fields"]["image"].is_array());
    }

    #[tokio::test]
    async fn test_only_author_or_admin_can_modify() {
        let (app, state) = setup_test_app().await;
        let (_, author) = create_user_with_token(&state.db, "author", UserRole::User).await;
        let (_, stranger) = create_user_with_token(&state.db, "stranger", UserRole::User).await;
        let (_, admin) = create_user_with_token(&state.db, "boss", UserRole::Admin).await;
        let tag = create_tag(&state.db, "Lunch", "lunch").await;
        let flour = create_ingredient(&state.db, "flour", "g").await;
        let server = TestServer::new(app).unwrap();

        let created = post_recipe(&server, &author, recipe_body("Bread", &[tag.id], &[(flour.id, 1)])).await;
        let path = format!("/api/recipes/{}/", created["id"]);

        let response = server
            .patch(&path)
            .add_header(header::AUTHORIZATION, stranger.clone())
            .json(&json!({"name": "Mine now"}))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);

        let response = server
            .delete(&path)
            .add_header(header::AUTHORIZATION, stranger)
            .await;
        response.assert_status(StatusCode::FORBIDDEN);

        let response = server.delete(&path).add_header(header::AUTHORIZATION, admin).await;
        response.assert_status(StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_recipe_filters_and_pagination() {
        let (app, state) = setup_test_app().await;
        let (alice, alice_auth) = create_user_with_token(&state.db, "alice", UserRole::User).await;
        let (_, bob_auth) = create_user_with_token(&state.db, "bob", UserRole::User).await;
        let breakfast = create_tag(&state.db, "Breakfast", "breakfast").await;
        let dinner = create_tag(&state.db, "Dinner", "dinner").await;
        let flour = create_ingredient(&state.db, "flour", "g").await;
        let server = TestServer::new(app).unwrap();

        let mut ids = Vec::new();
        for i in 0..7 {
            let (auth, tag) = if i % 2 == 0 {
                (&alice_auth, breakfast.id)
            } else {
                (&bob_auth, dinner.id)
            };
            let created = post_recipe(&server, auth, recipe_body(&format!("Dish {i}"), &[tag], &[(flour.id, 10)])).await;
            ids.push(created["id"].as_i64().unwrap());
        }

        // Default page size is 6
        let page: Value = server.get("/api/recipes/").await.json();
        assert_eq!(page["count"], 7);
        assert_eq!(page["results"].as_array().unwrap().len(), 6);
        assert_eq!(page["next"], "/api/recipes/?page=2");
        assert!(page["previous"].is_null());
        assert_eq!(page["results"][0]["id"], ids[0]);

        let page: Value = server.get("/api/recipes/").add_query_param("page", 2).await.json();
        assert_eq!(page["results"].as_array().unwrap().len(), 1);
        assert_eq!(page["previous"], "/api/recipes/");

        let response = server.get("/api/recipes/").add_query_param("page", 3).await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["error"], "Invalid page.");

        let page: Value = server
            .get("/api/recipes/")
            .add_query_param("limit", 2)
            .add_query_param("offset", 2)
            .await
            .json();
        assert_eq!(page["results"].as_array().unwrap().len(), 2);
        assert_eq!(page["results"][0]["id"], ids[2]);
        assert_eq!(page["next"], "/api/recipes/?limit=2&offset=4");

        let page: Value = server
            .get("/api/recipes/")
            .add_query_param("tags", "dinner")
            .await
            .json();
        assert_eq!(page["count"], 3);

        let page: Value = server
            .get("/api/recipes/?tags=dinner&tags=breakfast")
            .await
            .json();
        assert_eq!(page["count"], 7);

        let page: Value = server
            .get("/api/recipes/")
            .add_query_param("author", alice.id)
            .await
            .json();
        assert_eq!(page["count"], 4);

        let response = server.get("/api/recipes/").add_query_param("author", "alice").await;
        response.assert_status(StatusCode::BAD_REQUEST);

        // Personal filters
        server
            .post(&format!("/api/recipes/{}/favorite/", ids[1]))
            .add_header(header::AUTHORIZATION, alice_auth.clone())
            .await
            .assert_status(StatusCode::CREATED);
        let page: Value = server
            .get("/api/recipes/")
            .add_query_param("is_favorited", 1)
            .add_header(header::AUTHORIZATION, alice_auth.clone())
            .await
            .json();
        assert_eq!(page["count"], 1);
        assert_eq!(page["results"][0]["is_favorited"], true);

        let page: Value = server
            .get("/api/recipes/")
            .add_query_param("is_favorited", 1)
            .await
            .json();
        assert_eq!(page["count"], 0);

        let page: Value = server
            .get("/api/recipes/")
            .add_query_param("is_in_shopping_cart", "true")
            .add_header(header::AUTHORIZATION, alice_auth)
            .await
            .json();
        assert_eq!(page["count"], 0);
    }

    #[tokio::test]
    async fn test_favorite_twice_keeps_one_row() {
        let (app, state) = setup_test_app().await;
        let (user, auth) = create_user_with_token(&state.db, "alice", UserRole::User).await;
        let tag = create_tag(&state.db, "Lunch", "lunch").await;
        let flour = create_ingredient(&state.db, "flour", "g").await;
        let server = TestServer::new(app).unwrap();

        let created = post_recipe(&server, &auth, recipe_body("Bread", &[tag.id], &[(flour.id, 1)])).await;
        let path = format!("/api/recipes/{}/favorite/", created["id"]);

        let response = server.post(&path).add_header(header::AUTHORIZATION, auth.clone()).await;
        response.assert_status(StatusCode::CREATED);
        let short: Value = response.json();
        assert_eq!(short["name"], "Bread");
        assert_eq!(short["cooking_time"], 30);
        assert!(short.get("text").is_none());

        let response = server.post(&path).add_header(header::AUTHORIZATION, auth.clone()).await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let rows = favorite_recipe::Entity::find()
            .filter(favorite_recipe::Column::UserId.eq(user.id))
            .count(&state.db)
            .await
            .unwrap();
        assert_eq!(rows, 1);

        server
            .delete(&path)
            .add_header(header::AUTHORIZATION, auth.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .delete(&path)
            .add_header(header::AUTHORIZATION, auth.clone())
            .await
            .assert_status(StatusCode::NOT_FOUND);

        server
            .post("/api/recipes/9999/favorite/")
            .add_header(header::AUTHORIZATION, auth)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_shopping_cart_and_download() {
        let (app, state) = setup_test_app().await;
        let (_, auth) = create_user_with_token(&state.db, "alice", UserRole::User).await;
        let tag = create_tag(&state.db, "Baking", "baking").await;
        let flour = create_ingredient(&state.db, "flour", "g").await;
        let sugar = create_ingredient(&state.db, "sugar", "g").await;
        let server = TestServer::new(app).unwrap();

        let cake = post_recipe(&server, &auth, recipe_body("Cake", &[tag.id], &[(flour.id, 200), (sugar.id, 50)])).await;
        let bread = post_recipe(&server, &auth, recipe_body("Bread", &[tag.id], &[(flour.id, 100)])).await;
        let cake_cart = format!("/api/recipes/{}/shopping_cart/", cake["id"]);
        let bread_cart = format!("/api/recipes/{}/shopping_cart/", bread["id"]);

        // Removing something that was never added
        let response = server
            .delete(&cake_cart)
            .add_header(header::AUTHORIZATION, auth.clone())
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"], "Recipe is not in the shopping cart.");

        for path in [&cake_cart, &bread_cart] {
            server
                .post(path)
                .add_header(header::AUTHORIZATION, auth.clone())
                .await
                .assert_status(StatusCode::CREATED);
        }
        server
            .post(&cake_cart)
            .add_header(header::AUTHORIZATION, auth.clone())
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let recipe: Value = server
            .get(&format!("/api/recipes/{}/", cake["id"]))
            .add_header(header::AUTHORIZATION, auth.clone())
            .await
            .json();
        assert_eq!(recipe["is_in_shopping_cart"], true);

        let response = server
            .get("/api/recipes/download_shopping_cart/")
            .add_query_param("format", "txt")
            .add_header(header::AUTHORIZATION, auth.clone())
            .await;
        response.assert_status(StatusCode::OK);
        assert_eq!(
            response.header(header::CONTENT_DISPOSITION),
            "attachment; filename=\"alice_shopping_cart.txt\""
        );
        let text = response.text();
        assert!(text.contains("[ ] flour: 300 g"));
        assert!(text.contains("[ ] sugar: 50 g"));

        let response = server
            .get("/api/recipes/download_shopping_cart/")
            .add_header(header::AUTHORIZATION, auth.clone())
            .await;
        response.assert_status(StatusCode::OK);
        assert_eq!(response.header(header::CONTENT_TYPE), "application/pdf");
        assert!(response.as_bytes().starts_with(b"%PDF"));

        server
            .get("/api/recipes/download_shopping_cart/")
            .add_query_param("format", "docx")
            .add_header(header::AUTHORIZATION, auth.clone())
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        server
            .delete(&cake_cart)
            .add_header(header::AUTHORIZATION, auth.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let text = server
            .get("/api/recipes/download_shopping_cart/")
            .add_query_param("format", "txt")
            .add_header(header::AUTHORIZATION, auth)
            .await
            .text();
        assert!(text.contains("[ ] flour: 100 g"));
        assert!(!text.contains("sugar"));

        server
            .get("/api/recipes/download_shopping_cart/")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_ingredient_prefix_search() {
        let (app, state) = setup_test_app().await;
        for (name, unit) in [("abricot", "g"), ("Abalone", "pcs"), ("cabbage", "g"), ("bread", "g")] {
            create_ingredient(&state.db, name, unit).await;
        }
        let server = TestServer::new(app).unwrap();

        let response = server.get("/api/ingredients/").add_query_param("name", "ab").await;
        response.assert_status(StatusCode::OK);
        let names: Vec<String> = response
            .json::<Vec<Value>>()
            .iter()
            .map(|i| i["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Abalone", "abricot"]);

        let all: Vec<Value> = server.get("/api/ingredients/").await.json();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_catalog_writes_require_admin() {
        let (app, state) = setup_test_app().await;
        let (_, user_auth) = create_user_with_token(&state.db, "alice", UserRole::User).await;
        let (_, admin_auth) = create_user_with_token(&state.db, "boss", UserRole::Admin).await;
        let server = TestServer::new(app).unwrap();

        let body = json!({"name": "salt", "measurement_unit": "g"});
        server
            .post("/api/ingredients/")
            .json(&body)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .post("/api/ingredients/")
            .add_header(header::AUTHORIZATION, user_auth.clone())
            .json(&body)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        // Prime the cache, then make sure the admin write shows up
        let before: Vec<Value> = server.get("/api/ingredients/").await.json();
        assert!(before.is_empty());

        server
            .post("/api/ingredients/")
            .add_header(header::AUTHORIZATION, admin_auth.clone())
            .json(&body)
            .await
            .assert_status(StatusCode::CREATED);
        let after: Vec<Value> = server.get("/api/ingredients/").await.json();
        assert_eq!(after.len(), 1);
        assert_eq!(
            ingredient::Entity::find().count(&state.db).await.unwrap(),
            1
        );

        let tag = json!({"name": "Vegan", "color": "#00FF00", "slug": "vegan"});
        server
            .post("/api/tags/")
            .add_header(header::AUTHORIZATION, user_auth)
            .json(&tag)
            .await
            .assert_status(StatusCode::FORBIDDEN);
        server
            .post("/api/tags/")
            .add_header(header::AUTHORIZATION, admin_auth.clone())
            .json(&tag)
            .await
            .assert_status(StatusCode::CREATED);
        server
            .post("/api/tags/")
            .add_header(header::AUTHORIZATION, admin_auth)
            .json(&tag)
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let tags: Vec<Value> = server.get("/api/tags/").await.json();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0]["slug"], "vegan");
    }

    #[tokio::test]
    async fn test_subscriptions() {
        let (app, state) = setup_test_app().await;
        let (alice, alice_auth) = create_user_with_token(&state.db, "alice", UserRole::User).await;
        let (bob, bob_auth) = create_user_with_token(&state.db, "bob", UserRole::User).await;
        let tag = create_tag(&state.db, "Lunch", "lunch").await;
        let flour = create_ingredient(&state.db, "flour", "g").await;
        let server = TestServer::new(app).unwrap();

        for i in 0..4 {
            post_recipe(&server, &bob_auth, recipe_body(&format!("Bob dish {i}"), &[tag.id], &[(flour.id, 5)])).await;
        }

        let subscribe_path = format!("/api/users/{}/subscribe/", bob.id);
        let response = server
            .post(&subscribe_path)
            .add_header(header::AUTHORIZATION, alice_auth.clone())
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(
            response.json::<Value>(),
            json!({"subscriber": "alice", "subscribed_to": "bob"})
        );

        server
            .post(&subscribe_path)
            .add_header(header::AUTHORIZATION, alice_auth.clone())
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        server
            .post("/api/users/9999/subscribe/")
            .add_header(header::AUTHORIZATION, alice_auth.clone())
            .await
            .assert_status(StatusCode::NOT_FOUND);

        // Self-subscription is allowed
        server
            .post(&format!("/api/users/{}/subscribe/", alice.id))
            .add_header(header::AUTHORIZATION, alice_auth.clone())
            .await
            .assert_status(StatusCode::CREATED);

        let page: Value = server
            .get("/api/users/subscriptions/")
            .add_header(header::AUTHORIZATION, alice_auth.clone())
            .await
            .json();
        assert_eq!(page["count"], 2);
        let bob_entry = page["results"]
            .as_array()
            .unwrap()
            .iter()
            .find(|entry| entry["username"] == "bob")
            .unwrap()
            .clone();
        assert_eq!(bob_entry["is_subscribed"], true);
        assert_eq!(bob_entry["recipes_count"], 4);
        assert_eq!(bob_entry["recipes"].as_array().unwrap().len(), 3);
        assert_eq!(bob_entry["recipes"][0]["name"], "Bob dish 3");

        let page: Value = server
            .get("/api/users/subscriptions/")
            .add_query_param("recipes_limit", 1)
            .add_header(header::AUTHORIZATION, alice_auth.clone())
            .await
            .json();
        let first = &page["results"][0];
        assert!(first["recipes"].as_array().unwrap().len() <= 1);

        let user: Value = server
            .get(&format!("/api/users/{}/", bob.id))
            .add_header(header::AUTHORIZATION, alice_auth.clone())
            .await
            .json();
        assert_eq!(user["is_subscribed"], true);

        let followers: Vec<Value> = server
            .get("/api/users/subscribers/")
            .add_header(header::AUTHORIZATION, bob_auth)
            .await
            .json();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0]["username"], "alice");
        assert_eq!(followers[0]["subscribers"], json!(["alice"]));
        assert_eq!(followers[0]["subscribed_to"], json!(["bob", "alice"]));

        server
            .delete(&subscribe_path)
            .add_header(header::AUTHORIZATION, alice_auth.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);
        let response = server
            .delete(&subscribe_path)
            .add_header(header::AUTHORIZATION, alice_auth)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>()["error"],
            "You are not subscribed to this user."
        );
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected() {
        let (app, _) = setup_test_app().await;
        let server = TestServer::new(app).unwrap();

        let response = server
            .get("/api/recipes/")
            .add_header(header::AUTHORIZATION, HeaderValue::from_static("Token deadbeef"))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["success"], false);

        let response = server.get("/api/users/me/").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.json::<Value>()["error"],
            "Authentication credentials were not provided."
        );
    }

    #[tokio::test]
    async fn test_oversized_pagination_is_clamped() {
        let (app, state) = setup_test_app().await;
        create_user(&state.db, "alice", UserRole::User).await;
        create_user(&state.db, "bob", UserRole::User).await;
        let server = TestServer::new(app).unwrap();

        let response = server
            .get("/api/users/")
            .add_query_param("limit", "18446744073709551615")
            .add_query_param("offset", "1")
            .await;
        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["count"], 2);
        assert_eq!(body["results"].as_array().unwrap().len(), 1);
        assert!(body["next"].is_null());

        let response = server
            .get("/api/users/")
            .add_query_param("offset", "18446744073709551615")
            .await;
        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        assert!(body["results"].as_array().unwrap().is_empty());
        assert!(body["next"].is_null());

        let response = server
            .get("/api/users/")
            .add_query_param("page", "18446744073709551615")
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["error"], "Invalid page.");
    }

    #[tokio::test]
    async fn test_invalid_query_parameters_use_error_body() {
        let (app, state) = setup_test_app().await;
        let (_, auth) = create_user_with_token(&state.db, "alice", UserRole::User).await;
        let server = TestServer::new(app).unwrap();

        let response = server
            .get("/api/ingredients/")
            .add_query_param("name", "a".repeat(101))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["success"], false);
        assert!(body["fields"]["name"].is_array());

        let response = server
            .get("/api/users/subscriptions/")
            .add_header(header::AUTHORIZATION, auth.clone())
            .add_query_param("recipes_limit", "5000")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.json::<Value>()["fields"]["recipes_limit"].is_array());

        let response = server
            .get("/api/users/subscriptions/")
            .add_header(header::AUTHORIZATION, auth.clone())
            .add_query_param("recipes_limit", "many")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["success"], false);

        let response = server
            .get("/api/recipes/download_shopping_cart/")
            .add_header(header::AUTHORIZATION, auth)
            .add_query_param("format", "portable-document")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.json::<Value>()["fields"]["format"].is_array());
    }
}
