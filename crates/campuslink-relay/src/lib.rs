//! Local development relay for CampusLink chat sockets.
//!
//! Serves `GET /ws/chat/{conversation_id}/` and fans the frames of each
//! conversation out to every socket connected to it, translating client
//! commands into the events the real backend would emit. There is no
//! authentication and no persistence.

pub mod connection;
pub mod dispatcher;

use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::connection::Participant;
use crate::dispatcher::Dispatcher;

pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/ws/chat/{conversation_id}/", get(ws_upgrade))
        .with_state(dispatcher)
        .layer(TraceLayer::new_for_http())
}

/// Serve the relay on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, dispatcher: Dispatcher) -> std::io::Result<()> {
    axum::serve(listener, router(dispatcher)).await
}

async fn ws_upgrade(
    State(dispatcher): State<Dispatcher>,
    Path(conversation_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // Subscribe before answering the upgrade: once the client sees the
    // socket open, it is already in the room.
    let membership = dispatcher.join(&conversation_id).await;
    let participant = Participant::guest();

    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, dispatcher, conversation_id, membership, participant)
    })
}
