use super::error::*;
use super::handler;
use crate::application_port::TokenService;
use crate::domain_model::UserId;
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use warp::{Filter, http, reject};

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let timeout = server.request_timeout;

    let telegram_login = warp::path("auth")
        .and(warp::path("telegram"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(16 * 1024))
        .and(warp::body::json())
        .and(with(server.identity_resolver.clone()))
        .and(with(server.token_service.clone()))
        .and(with_timeout(timeout))
        .and_then(handler::telegram_login);

    let refresh = warp::path("auth")
        .and(warp::path("refresh"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(8 * 1024))
        .and(warp::body::json())
        .and(with(server.token_service.clone()))
        .and(with_timeout(timeout))
        .and_then(handler::refresh);

    let me = warp::path("me")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_verification(server.token_service.clone()))
        .and_then(handler::me);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(handler::health);

    telegram_login.or(refresh).or(me).or(health)
}

/// `/api/v1/...` with error recovery, as served by the binary.
pub fn api(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone {
    warp::path("api")
        .and(warp::path("v1"))
        .and(routes(server))
        .recover(recover_error)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn with_timeout(timeout: Duration) -> impl Filter<Extract = (Duration,), Error = Infallible> + Clone {
    warp::any().map(move || timeout)
}

fn with_verification(
    token_service: Arc<dyn TokenService>,
) -> impl Filter<Extract = (UserId,), Error = warp::Rejection> + Clone {
    warp::header::<String>(http::header::AUTHORIZATION.as_ref()).and_then(move |token: String| {
        let token_service = token_service.clone();
        async move {
            if let Some(token) = token.strip_prefix("Bearer ") {
                let user_id = token_service
                    .validate_access_token(token)
                    .map_err(|e| {
                        tracing::debug!(error = %e, "access token rejected");
                        ApiErrorCode::Unauthorized
                    })
                    .map_err(reject::custom)?;
                Ok::<UserId, warp::Rejection>(user_id)
            } else {
                Err(reject::custom(ApiErrorCode::Unauthorized))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use serde_json::{Value, json};
    use warp::http::StatusCode;

    async fn server() -> Arc<Server> {
        let mut settings = Settings::in_memory_for_tests();
        settings.sweeper.interval_secs = 0;
        Arc::new(Server::try_new(&settings).await.unwrap())
    }

    fn body<B: AsRef<[u8]>>(res: &warp::http::Response<B>) -> Value {
        serde_json::from_slice(res.body().as_ref()).unwrap()
    }

    fn login_request(user: i64) -> warp::test::RequestBuilder {
        warp::test::request()
            .method("POST")
            .path("/api/v1/auth/telegram")
            .json(&json!({ "init_data": format!("fake-init-data:{user}") }))
    }

    #[tokio::test]
    async fn telegram_login_returns_pair_and_user() {
        let api = api(server().await);

        let res = login_request(42).reply(&api).await;

        assert_eq!(res.status(), StatusCode::OK);
        let body = body(&res);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["user"]["user_id"], 42);
        assert_eq!(body["data"]["expires_in"], 900);
        assert!(body["data"]["access_token"].as_str().unwrap().contains('.'));
        assert!(body["data"]["refresh_token"].as_str().unwrap().contains('.'));
    }

    #[tokio::test]
    async fn bad_init_data_is_a_bad_request() {
        let api = api(server().await);

        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/auth/telegram")
            .json(&json!({ "init_data": "user=%7B%7D&hash=00" }))
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&res)["error"]["code"], "InvalidInitData");
    }

    #[tokio::test]
    async fn refresh_rotates_and_old_token_is_refused() {
        let api = api(server().await);
        let first = body(&login_request(7).reply(&api).await);
        let old_refresh = first["data"]["refresh_token"].as_str().unwrap().to_owned();

        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/auth/refresh")
            .json(&json!({ "refresh_token": old_refresh }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let rotated = body(&res);
        assert_ne!(rotated["data"]["refresh_token"], first["data"]["refresh_token"]);

        let replay = warp::test::request()
            .method("POST")
            .path("/api/v1/auth/refresh")
            .json(&json!({ "refresh_token": old_refresh }))
            .reply(&api)
            .await;
        assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&replay)["error"]["code"], "InvalidToken");
    }

    #[tokio::test]
    async fn me_requires_a_valid_bearer_token() {
        let api = api(server().await);
        let session = body(&login_request(99).reply(&api).await);
        let access = session["data"]["access_token"].as_str().unwrap();

        let ok = warp::test::request()
            .path("/api/v1/me")
            .header("authorization", format!("Bearer {access}"))
            .reply(&api)
            .await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(body(&ok)["data"]["user_id"], 99);

        let missing = warp::test::request().path("/api/v1/me").reply(&api).await;
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let refresh = session["data"]["refresh_token"].as_str().unwrap();
        let wrong_kind = warp::test::request()
            .path("/api/v1/me")
            .header("authorization", format!("Bearer {refresh}"))
            .reply(&api)
            .await;
        assert_eq!(wrong_kind.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_body_and_unknown_path() {
        let api = api(server().await);

        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/auth/refresh")
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = warp::test::request()
            .path("/api/v1/nowhere")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_is_ok() {
        let api = api(server().await);

        let res = warp::test::request()
            .path("/api/v1/health")
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body(&res)["data"]["status"], "ok");
    }
}
