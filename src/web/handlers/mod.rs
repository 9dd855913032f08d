use salvo::prelude::*;
use serde_json::json;

use crate::web::WebState;

pub mod commands;
pub mod health;
pub mod metrics;
pub mod reactions;

pub(crate) fn render_error(res: &mut Response, status: StatusCode, message: &str) {
    res.status_code(status);
    res.render(Json(json!({ "error": message })));
}

pub(crate) fn web_state(depot: &Depot) -> Option<&WebState> {
    depot.obtain::<WebState>().ok()
}
