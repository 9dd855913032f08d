use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::commands::{CommandContext, CommandOutcome};
use crate::web::handlers::{render_error, web_state};

/// A chat message forwarded by the chat integration.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub text: String,
    #[serde(flatten)]
    pub context: CommandContext,
}

#[handler]
pub async fn run_command(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let Some(state) = web_state(depot) else {
        render_error(res, StatusCode::INTERNAL_SERVER_ERROR, "web state missing");
        return;
    };

    let request = match req.parse_json::<CommandRequest>().await {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "rejected malformed command request");
            render_error(
                res,
                StatusCode::BAD_REQUEST,
                &format!("invalid payload: {err}"),
            );
            return;
        }
    };

    match state.commands.handle(&request.text, &request.context).await {
        Ok(CommandOutcome::Reply(text)) => res.render(Json(json!({ "reply": text }))),
        Ok(CommandOutcome::Ignored) => res.render(Json(json!({ "reply": null }))),
        Err(err) => {
            error!(chat_id = request.context.chat_id, error = %err, "command failed");
            render_error(res, StatusCode::INTERNAL_SERVER_ERROR, &err.to_string());
        }
    }
}
