use crate::AppState;
use crate::api::error::TransferError;
use crate::models::{TransferRequest, TransferResponse};
use axum::{
    Json,
    extract::{Query, State},
};

#[utoipa::path(
    get,
    path = "/transfer",
    params(TransferRequest),
    responses(
        (status = 200, description = "Video stored in the bucket", body = TransferResponse),
        (status = 400, description = "Missing parameters, fetch failure or upload failure"),
        (status = 500, description = "Unexpected internal error")
    ),
    tag = "transfer"
)]
pub async fn transfer_video(
    State(state): State<AppState>,
    Query(req): Query<TransferRequest>,
) -> Result<Json<TransferResponse>, TransferError> {
    let res = state.transfer.transfer(&req).await?;
    Ok(Json(res))
}
