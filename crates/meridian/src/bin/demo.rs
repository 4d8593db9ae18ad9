//! Demo server.
//!
//! Reads `meridian.toml` if present and `MERIDIAN__*` environment overrides,
//! then serves:
//!
//! - `GET /hello/:name` plain text
//! - `POST /echo` JSON echo
//! - `GET /ws` WebSocket echo
//! - `GET /clock` one SSE event per second
//!
//! Stop it with Ctrl+C; open streams are closed before it exits.

use std::time::Duration;

use meridian::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Serialize, Deserialize)]
struct Echo {
    message: String,
}

#[derive(Debug, Serialize)]
struct Tick {
    seq: u64,
}

fn routes() -> anyhow::Result<Router> {
    let mut router = Router::new();

    router.middleware("/", |req: Req, next: Next| async move {
        let method = req.method().clone();
        let path = req.path().to_string();
        let response = next.run(req).await?;
        debug!(method = %method, path = %path, status = %response.status(), "handled");
        Ok(response)
    })?;

    router.get("/hello/:name", |req: Req| async move {
        let name = req.param("name").unwrap_or("world").to_string();
        Ok(req.resp().text(format!("hello, {name}\n")))
    })?;

    router.post("/echo", |mut req: Req| async move {
        let echo: Echo = req.decode_json().await?;
        req.resp().json(&echo)
    })?;

    router.get("/ws", |mut req: Req| async move {
        let (socket, response) = req.websocket()?;
        tokio::spawn(async move {
            let cancel = Signal::new();
            while let Some(message) = socket.recv().await {
                if let Message::Text(text) = message {
                    if socket.send(&cancel, text.as_str()).await.is_err() {
                        break;
                    }
                }
            }
        });
        Ok(response)
    })?;

    router.get("/clock", |req: Req| async move {
        let (stream, response) = req.sse();
        let cancel = req.cancellation();
        tokio::spawn(async move {
            let closed = stream.closed();
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            for seq in 0.. {
                tokio::select! {
                    () = closed.wait() => break,
                    _ = interval.tick() => {}
                }
                let event = match SseEvent::json(&Tick { seq }) {
                    Ok(event) => event.event("tick").id(seq.to_string()),
                    Err(_) => break,
                };
                if stream.send_event(&cancel, event).await.is_err() {
                    break;
                }
            }
        });
        Ok(response)
    })?;

    Ok(router)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new()
        .with_defaults()
        .with_optional_file("meridian.toml")?
        .with_dotenv()
        .with_env_prefix("MERIDIAN")
        .load()?;
    init_logging(&config.logging.to_log_config())?;

    let router = routes()?;
    info!(addr = %config.server.http_addr, routes = router.route_count(), "starting demo server");
    serve(config, router).await
}
