use salvo::prelude::*;
use serde_json::json;
use tracing::warn;

use crate::ingest::{ReactionPayload, submit};
use crate::web::handlers::{render_error, web_state};

#[handler]
pub async fn receive_reactions(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let Some(state) = web_state(depot) else {
        render_error(res, StatusCode::INTERNAL_SERVER_ERROR, "web state missing");
        return;
    };
    state.metrics.submission_received();

    let payload = match req.parse_json::<ReactionPayload>().await {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "rejected malformed reaction payload");
            state.metrics.submission_rejected();
            render_error(
                res,
                StatusCode::BAD_REQUEST,
                &format!("invalid payload: {err}"),
            );
            return;
        }
    };

    let report = submit(&state.ledger, &payload).await;
    state.metrics.observe(&report);

    let counts = json!({
        "ok": report.is_ok(),
        "scored": report.scored(),
        "recorded": report.recorded(),
        "ignored": report.ignored(),
    });

    match &report.first_error {
        None => res.render(Json(counts)),
        Some(err) => {
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            let mut body = counts;
            body["error"] = json!(err.to_string());
            res.render(Json(body));
        }
    }
}

#[cfg(test)]
mod tests {
    use salvo::prelude::*;
    use salvo::test::{ResponseExt, TestClient};
    use serde_json::{Value, json};

    use crate::ledger::tests::CHAT;
    use crate::web::create_router;
    use crate::web::tests::test_state;

    const URL: &str = "http://127.0.0.1:8080/reactions";

    fn body() -> Value {
        json!({
            "message_id": 5,
            "chat": {"id": CHAT},
            "from_user": {"id": 2, "is_bot": false, "first_name": "Bob", "username": "bob"},
            "reactions": [
                {"emoji": "👍", "from": {"id": 1}},
                {"emoji": "🐳", "from": {"id": 3}},
                {"emoji": "👍", "from": {"id": 2}}
            ]
        })
    }

    #[tokio::test]
    async fn reactions_are_scored_and_counted() {
        let (_file, state) = test_state(None).await;
        let ledger = state.ledger.clone();
        let service = Service::new(create_router(state));

        let mut res = TestClient::post(URL).json(&body()).send(&service).await;
        assert_eq!(res.status_code, Some(StatusCode::OK));
        let reply: Value = res.take_json().await.expect("json body");
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["scored"], 1);
        assert_eq!(reply["recorded"], 1);
        assert_eq!(reply["ignored"], 1);

        assert_eq!(ledger.get_user_rating(CHAT, 2).await.unwrap().rating, 1);
    }

    #[tokio::test]
    async fn malformed_body_is_a_bad_request() {
        let (_file, state) = test_state(None).await;
        let service = Service::new(create_router(state));

        let mut res = TestClient::post(URL)
            .json(&json!({"chat": {"id": CHAT}}))
            .send(&service)
            .await;
        assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST));
        let reply: Value = res.take_json().await.expect("json body");
        assert!(reply["error"].as_str().unwrap().starts_with("invalid payload"));
    }

    #[tokio::test]
    async fn wrong_or_missing_key_is_unauthorized() {
        let (_file, state) = test_state(Some("s3cret")).await;
        let ledger = state.ledger.clone();
        let service = Service::new(create_router(state));

        let res = TestClient::post(URL).json(&body()).send(&service).await;
        assert_eq!(res.status_code, Some(StatusCode::UNAUTHORIZED));

        let res = TestClient::post(URL)
            .add_header("x-api-key", "wrong", true)
            .json(&body())
            .send(&service)
            .await;
        assert_eq!(res.status_code, Some(StatusCode::UNAUTHORIZED));
        assert_eq!(ledger.get_user_rating(CHAT, 2).await.unwrap().rating, 0);
    }

    #[tokio::test]
    async fn key_accepted_from_header_or_query() {
        let (_file, state) = test_state(Some("s3cret")).await;
        let service = Service::new(create_router(state));

        let res = TestClient::post(URL)
            .add_header("x-api-key", "s3cret", true)
            .json(&body())
            .send(&service)
            .await;
        assert_eq!(res.status_code, Some(StatusCode::OK));

        let res = TestClient::post(format!("{URL}?key=s3cret"))
            .json(&body())
            .send(&service)
            .await;
        assert_eq!(res.status_code, Some(StatusCode::OK));
    }
}
