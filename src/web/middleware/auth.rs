use salvo::affix_state;
use salvo::prelude::*;
use secrecy::ExposeSecret;
use tracing::warn;

use crate::web::WebState;
use crate::web::handlers::{
    commands::run_command, health::health_check, metrics::metrics, reactions::receive_reactions,
    render_error, web_state,
};

/// Rejects the request with 401 unless the `X-Api-Key` header or the `key`
/// query parameter matches the configured key. Open when no key is set.
#[handler]
pub async fn require_key(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
    ctrl: &mut FlowCtrl,
) {
    let Some(expected) = web_state(depot).and_then(|state| state.key.as_ref()) else {
        return;
    };

    let provided = req
        .header::<String>("x-api-key")
        .or_else(|| req.query::<String>("key"));

    if provided.as_deref() != Some(expected.expose_secret()) {
        warn!(remote = %req.remote_addr(), "rejected request with bad key");
        render_error(res, StatusCode::UNAUTHORIZED, "invalid key");
        ctrl.skip_rest();
    }
}

pub fn create_router(state: WebState) -> Router {
    Router::new()
        .hoop(affix_state::inject(state))
        .push(Router::with_path("health").get(health_check))
        .push(Router::with_path("metrics").get(metrics))
        .push(
            Router::new()
                .hoop(require_key)
                .push(Router::with_path("reactions").post(receive_reactions))
                .push(Router::with_path("commands").post(run_command)),
        )
}
