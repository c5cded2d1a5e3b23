pub mod identity;
mod routes;

pub use routes::{build_router, AppState, InnerAppState};

use anyhow::Result;
use creditflow_service::ActivityService;
use tokio::net::TcpListener;

pub async fn serve(listener: TcpListener, service: ActivityService) -> Result<()> {
    let app = routes::build_router(service);
    axum::serve(listener, app).await?;
    Ok(())
}
