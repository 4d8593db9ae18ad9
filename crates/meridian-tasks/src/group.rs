//! Groups of services started and stopped together.

use futures_util::future::join_all;
use meridian_core::Signal;
use tracing::debug;

use crate::error::ServiceResult;
use crate::service::{BoxFuture, Service};

/// Combines `services` into one service.
///
/// The group's run body starts members one at a time in registration order
/// and waits for each to signal startup before starting the next. If a
/// member fails to start, remaining members are never started and the
/// member's error becomes the group's start error. If the group is stopped
/// while a member is starting, startup is abandoned without error.
///
/// On exit the group stops every member (in reverse order, without waiting
/// in between) and then waits for all of them. When startup succeeded, the
/// first member stop error is reported as the group's stop error.
///
/// # Example
///
/// ```rust
/// use meridian_tasks::{group, Service};
///
/// # tokio_test::block_on(async {
/// let db = Service::new("db", |cancel, started| async move {
///     started.fire();
///     cancel.wait().await;
///     Ok(())
/// });
/// let http = Service::new("http", |cancel, started| async move {
///     started.fire();
///     cancel.wait().await;
///     Ok(())
/// });
///
/// let app = group("app", vec![db.clone(), http.clone()]);
/// app.start().wait().await;
/// assert!(db.is_running() && http.is_running());
///
/// app.stop().wait().await;
/// assert!(db.stopped().is_fired() && http.stopped().is_fired());
/// # });
/// ```
pub fn group(name: impl Into<String>, services: impl IntoIterator<Item = Service>) -> Service {
    let services: Vec<Service> = services.into_iter().collect();
    let name = name.into();
    let log_name = name.clone();

    Service::from_run_fn(
        name,
        Box::new(move |cancel: Signal, started: Signal| -> BoxFuture<ServiceResult> {
            Box::pin(async move {
                let result = start_members(&services, &cancel, &started).await;
                stop_members(&log_name, &services).await;

                result?;
                match services.iter().find_map(Service::stop_error) {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            })
        }),
    )
}

async fn start_members(services: &[Service], cancel: &Signal, started: &Signal) -> ServiceResult {
    for service in services {
        let member_started = service.start();
        tokio::select! {
            () = member_started.wait() => {}
            () = cancel.wait() => return Ok(()),
        }

        if let Some(err) = service.start_error() {
            debug!(service = %service.name(), "group member failed to start");
            return Err(err);
        }
    }

    started.fire();
    cancel.wait().await;
    Ok(())
}

async fn stop_members(name: &str, services: &[Service]) {
    debug!(group = %name, members = services.len(), "stopping group members");
    let stopped: Vec<Signal> = services.iter().rev().map(Service::stop).collect();
    join_all(stopped.iter().map(Signal::wait)).await;
}
