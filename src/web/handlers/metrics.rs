use salvo::prelude::*;

use crate::web::handlers::{render_error, web_state};

#[handler]
pub async fn metrics(depot: &mut Depot, res: &mut Response) {
    let Some(state) = web_state(depot) else {
        render_error(res, StatusCode::INTERNAL_SERVER_ERROR, "web state missing");
        return;
    };

    let body = state
        .metrics
        .format_prometheus(state.started_at.elapsed());
    res.render(Text::Plain(body));
}
