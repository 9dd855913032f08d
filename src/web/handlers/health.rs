use salvo::prelude::*;
use serde_json::json;

#[handler]
pub async fn health_check(res: &mut Response) {
    res.render(Json(json!({ "status": "ok" })));
}

#[cfg(test)]
mod tests {
    use salvo::prelude::*;
    use salvo::test::{ResponseExt, TestClient};
    use serde_json::Value;

    use crate::web::create_router;
    use crate::web::tests::test_state;

    #[tokio::test]
    async fn health_is_open_even_with_a_key() {
        let (_file, state) = test_state(Some("s3cret")).await;
        let service = Service::new(create_router(state));

        let mut res = TestClient::get("http://127.0.0.1:8080/health")
            .send(&service)
            .await;
        assert_eq!(res.status_code, Some(StatusCode::OK));
        let body: Value = res.take_json().await.expect("json body");
        assert_eq!(body["status"], "ok");
    }
}
